//! Typed validation: field rules over a document type, all violations collected per run.

mod constraint;
mod message;
mod validator;
mod violation;

pub use constraint::{Constraints, Rule};
pub use message::{substitute, DefaultMessageFormatter, Locale, MessageFormatter, DEFAULT_LOCALE};
pub use validator::{Validator, ValidatorBuilder};
pub use violation::{Violation, Violations};
