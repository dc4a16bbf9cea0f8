use super::constraint::Constraints;
use super::message::{DefaultMessageFormatter, Locale, MessageFormatter};
use super::violation::{Violation, Violations};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

type Check<T> = Box<dyn Fn(&T, &Locale, &dyn MessageFormatter, &mut Violations) + Send + Sync>;

/// Ordered field rules over `T`. Evaluation never short-circuits: every rule runs and every
/// failure is reported.
pub struct Validator<T> {
    checks: Vec<Check<T>>,
    formatter: Arc<dyn MessageFormatter>,
}

impl<T> Validator<T> {
    /// Validator with no rules; always passes.
    pub fn empty() -> Self {
        Self {
            checks: Vec::new(),
            formatter: Arc::new(DefaultMessageFormatter),
        }
    }

    pub fn builder() -> ValidatorBuilder<T> {
        ValidatorBuilder {
            checks: Vec::new(),
            formatter: Arc::new(DefaultMessageFormatter),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn validate(&self, target: &T, locale: &Locale) -> Result<(), Violations> {
        let mut violations = Violations::new();
        for check in &self.checks {
            check(target, locale, self.formatter.as_ref(), &mut violations);
        }
        violations.into_result()
    }
}

impl<T> Default for Validator<T> {
    fn default() -> Self {
        Self::empty()
    }
}

pub struct ValidatorBuilder<T> {
    checks: Vec<Check<T>>,
    formatter: Arc<dyn MessageFormatter>,
}

impl<T: 'static> ValidatorBuilder<T> {
    /// Add rules for one field. `field` projects the value out of `T`; `None` means the field
    /// is missing or null.
    pub fn constraint<V, F, C>(mut self, name: &str, field: F, rules: C) -> Self
    where
        V: Serialize + ?Sized + 'static,
        F: Fn(&T) -> Option<&V> + Send + Sync + 'static,
        C: FnOnce(Constraints<V>) -> Constraints<V>,
    {
        let name = name.to_string();
        let rules = rules(Constraints::new()).into_rules();
        self.checks.push(Box::new(
            move |target: &T, locale: &Locale, formatter: &dyn MessageFormatter, out: &mut Violations| {
                let value = field(target);
                for rule in &rules {
                    if !rule.check(value) {
                        out.push(rule.violation(&name, value, locale, formatter));
                    }
                }
            },
        ));
        self
    }

    /// Rule spanning several fields. Reported under `name` with the whole target as the
    /// violated value.
    pub fn cross_field(
        mut self,
        name: &str,
        message_key: &'static str,
        default_message: &'static str,
        test: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self
    where
        T: Serialize,
    {
        let name = name.to_string();
        self.checks.push(Box::new(
            move |target: &T, locale: &Locale, formatter: &dyn MessageFormatter, out: &mut Violations| {
                if test(target) {
                    return;
                }
                let args = vec![Value::String(name.clone())];
                out.push(Violation {
                    field_name: name.clone(),
                    message: formatter.format(message_key, default_message, &args, locale),
                    message_key: message_key.to_string(),
                    locale: locale.to_string(),
                    offending_value: serde_json::to_value(target).unwrap_or(Value::Null),
                    args,
                });
            },
        ));
        self
    }

    pub fn message_formatter(mut self, formatter: Arc<dyn MessageFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn build(self) -> Validator<T> {
        Validator {
            checks: self.checks,
            formatter: self.formatter,
        }
    }
}
