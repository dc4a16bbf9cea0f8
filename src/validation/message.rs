//! Message rendering for violations. Bundle lookup is pluggable through [`MessageFormatter`].

use serde_json::Value;
use std::fmt;

/// Language tag a violation message is rendered for (`en`, `fr-CA`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Locale(String);

pub const DEFAULT_LOCALE: &str = "en";

impl Locale {
    pub fn new(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        let tag = tag.trim();
        if tag.is_empty() {
            Self::default()
        } else {
            Self(tag.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Primary language subtag: `fr` for `fr-CA`.
    pub fn language(&self) -> &str {
        self.0.split(['-', '_']).next().unwrap_or(&self.0)
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self(DEFAULT_LOCALE.to_string())
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait MessageFormatter: Send + Sync {
    /// Render a violation message. `args[0]` is the field name, the rest are rule arguments.
    fn format(&self, message_key: &str, default_message: &str, args: &[Value], locale: &Locale) -> String;
}

/// Substitutes `{0}`, `{1}`, ... in the default message. Ignores the locale.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultMessageFormatter;

impl MessageFormatter for DefaultMessageFormatter {
    fn format(&self, _message_key: &str, default_message: &str, args: &[Value], _locale: &Locale) -> String {
        substitute(default_message, args)
    }
}

pub fn substitute(template: &str, args: &[Value]) -> String {
    let mut out = template.to_string();
    for (i, arg) in args.iter().enumerate() {
        let rendered = match arg {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out = out.replace(&format!("{{{}}}", i), &rendered);
    }
    out
}
