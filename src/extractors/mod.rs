//! Request extractors.

pub mod locale;
