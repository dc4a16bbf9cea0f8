//! Field-level rules. A rule sees `None` for a missing or null field; only
//! [`Constraints::not_null`] rejects that, every other rule passes on null.

use super::message::{Locale, MessageFormatter};
use super::violation::Violation;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

type Test<V> = Box<dyn Fn(Option<&V>) -> bool + Send + Sync>;

pub struct Rule<V: ?Sized> {
    message_key: &'static str,
    default_message: &'static str,
    args: Vec<Value>,
    test: Test<V>,
}

impl<V: Serialize + ?Sized> Rule<V> {
    pub(crate) fn check(&self, value: Option<&V>) -> bool {
        (self.test)(value)
    }

    pub(crate) fn violation(
        &self,
        field_name: &str,
        value: Option<&V>,
        locale: &Locale,
        formatter: &dyn MessageFormatter,
    ) -> Violation {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(Value::String(field_name.to_string()));
        args.extend(self.args.iter().cloned());
        Violation {
            field_name: field_name.to_string(),
            message: formatter.format(self.message_key, self.default_message, &args, locale),
            message_key: self.message_key.to_string(),
            locale: locale.to_string(),
            offending_value: value
                .and_then(|v| serde_json::to_value(v).ok())
                .unwrap_or(Value::Null),
            args,
        }
    }
}

/// Rules for one field, built fluently: `c.not_null().not_blank().max_length(64)`.
pub struct Constraints<V: ?Sized> {
    rules: Vec<Rule<V>>,
}

impl<V: ?Sized + 'static> Default for Constraints<V> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<V: ?Sized + 'static> Constraints<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn into_rules(self) -> Vec<Rule<V>> {
        self.rules
    }

    fn rule(
        mut self,
        message_key: &'static str,
        default_message: &'static str,
        args: Vec<Value>,
        test: impl Fn(Option<&V>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.rules.push(Rule {
            message_key,
            default_message,
            args,
            test: Box::new(test),
        });
        self
    }

    pub fn not_null(self) -> Self {
        self.rule("notNull", "\"{0}\" must not be null", Vec::new(), |v| v.is_some())
    }

    /// Custom rule on a present value.
    pub fn predicate(
        self,
        message_key: &'static str,
        default_message: &'static str,
        f: impl Fn(&V) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.rule(message_key, default_message, Vec::new(), move |v| v.map_or(true, &f))
    }

    /// Custom rule that also sees missing values.
    pub fn predicate_nullable(
        self,
        message_key: &'static str,
        default_message: &'static str,
        f: impl Fn(Option<&V>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.rule(message_key, default_message, Vec::new(), f)
    }
}

impl Constraints<str> {
    pub fn not_empty(self) -> Self {
        self.rule("notEmpty", "\"{0}\" must not be empty", Vec::new(), |v| {
            v.map_or(true, |s| !s.is_empty())
        })
    }

    pub fn not_blank(self) -> Self {
        self.rule("notBlank", "\"{0}\" must not be blank", Vec::new(), |v| {
            v.map_or(true, |s| !s.trim().is_empty())
        })
    }

    pub fn min_length(self, min: usize) -> Self {
        self.rule(
            "minLength",
            "The length of \"{0}\" must be at least {1}",
            vec![Value::from(min)],
            move |v| v.map_or(true, |s| s.chars().count() >= min),
        )
    }

    pub fn max_length(self, max: usize) -> Self {
        self.rule(
            "maxLength",
            "The length of \"{0}\" must be at most {1}",
            vec![Value::from(max)],
            move |v| v.map_or(true, |s| s.chars().count() <= max),
        )
    }

    pub fn pattern(self, regex: Regex) -> Self {
        let arg = Value::String(regex.as_str().to_string());
        self.rule("pattern", "\"{0}\" must match {1}", vec![arg], move |v| {
            v.map_or(true, |s| regex.is_match(s))
        })
    }

    pub fn email(self) -> Self {
        self.rule("email", "\"{0}\" must be a valid email address", Vec::new(), |v| {
            v.map_or(true, is_email)
        })
    }

    pub fn one_of(self, allowed: &[&str]) -> Self {
        let allowed: Vec<String> = allowed.iter().map(|s| s.to_string()).collect();
        let arg = Value::from(allowed.clone());
        self.rule("oneOf", "\"{0}\" must be one of {1}", vec![arg], move |v| {
            v.map_or(true, |s| allowed.iter().any(|a| a == s))
        })
    }
}

fn is_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !s.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

impl<E: 'static> Constraints<[E]> {
    pub fn not_empty(self) -> Self {
        self.rule("notEmpty", "\"{0}\" must not be empty", Vec::new(), |v| {
            v.map_or(true, |items| !items.is_empty())
        })
    }

    pub fn min_size(self, min: usize) -> Self {
        self.rule(
            "minSize",
            "The size of \"{0}\" must be at least {1}",
            vec![Value::from(min)],
            move |v| v.map_or(true, |items| items.len() >= min),
        )
    }

    pub fn max_size(self, max: usize) -> Self {
        self.rule(
            "maxSize",
            "The size of \"{0}\" must be at most {1}",
            vec![Value::from(max)],
            move |v| v.map_or(true, |items| items.len() <= max),
        )
    }
}

macro_rules! numeric_constraints {
    ($($t:ty),*) => {
        $(
            impl Constraints<$t> {
                pub fn greater_than(self, bound: $t) -> Self {
                    self.rule(
                        "greaterThan",
                        "\"{0}\" must be greater than {1}",
                        vec![Value::from(bound)],
                        move |v| v.map_or(true, |n| *n > bound),
                    )
                }

                pub fn greater_than_or_equal(self, bound: $t) -> Self {
                    self.rule(
                        "greaterThanOrEqual",
                        "\"{0}\" must be greater than or equal to {1}",
                        vec![Value::from(bound)],
                        move |v| v.map_or(true, |n| *n >= bound),
                    )
                }

                pub fn less_than(self, bound: $t) -> Self {
                    self.rule(
                        "lessThan",
                        "\"{0}\" must be less than {1}",
                        vec![Value::from(bound)],
                        move |v| v.map_or(true, |n| *n < bound),
                    )
                }

                pub fn less_than_or_equal(self, bound: $t) -> Self {
                    self.rule(
                        "lessThanOrEqual",
                        "\"{0}\" must be less than or equal to {1}",
                        vec![Value::from(bound)],
                        move |v| v.map_or(true, |n| *n <= bound),
                    )
                }
            }
        )*
    };
}

numeric_constraints!(i32, i64, u32, u64, f64);

#[cfg(test)]
mod tests {
    use super::*;

    fn passes<V: Serialize + ?Sized + 'static>(c: Constraints<V>, v: Option<&V>) -> bool {
        c.into_rules().iter().all(|r| r.check(v))
    }

    #[test]
    fn only_not_null_rejects_missing_values() {
        assert!(!passes(Constraints::<str>::new().not_null(), None));
        assert!(passes(Constraints::<str>::new().not_blank().max_length(3), None));
    }

    #[test]
    fn string_rules() {
        assert!(!passes(Constraints::<str>::new().not_blank(), Some("   ")));
        assert!(passes(Constraints::<str>::new().not_empty(), Some(" ")));
        assert!(!passes(Constraints::<str>::new().max_length(3), Some("abcd")));
        assert!(passes(Constraints::<str>::new().min_length(2), Some("ab")));
        assert!(passes(Constraints::<str>::new().email(), Some("a@b.io")));
        assert!(!passes(Constraints::<str>::new().email(), Some("a@b")));
        assert!(!passes(Constraints::<str>::new().one_of(&["x", "y"]), Some("z")));
        let digits = Regex::new("^[0-9]+$").unwrap();
        assert!(!passes(Constraints::<str>::new().pattern(digits), Some("12a")));
    }

    #[test]
    fn numeric_and_collection_rules() {
        assert!(!passes(Constraints::<i64>::new().greater_than_or_equal(0), Some(&-1)));
        assert!(passes(Constraints::<i64>::new().less_than(10), Some(&9)));
        assert!(!passes(Constraints::<f64>::new().greater_than(0.5), Some(&0.5)));
        let tags = vec!["a".to_string()];
        assert!(!passes(Constraints::<[String]>::new().min_size(2), Some(tags.as_slice())));
    }
}
