//! Per-module handler state. Built once per router generation and shared by every request.

use crate::repository::Repository;
use crate::validation::Validator;
use std::sync::Arc;

/// The four validators of a resource module, built once.
pub struct Validators<T> {
    pub save: Validator<T>,
    pub update: Validator<T>,
    pub replace: Validator<T>,
    pub delete: Validator<T>,
}

pub struct ResourceState<T> {
    /// Module name; also the collection name and the mount path segment.
    pub name: String,
    pub repo: Arc<dyn Repository>,
    pub validators: Validators<T>,
}

/// Which operations get routes. Fixed when the router is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operations {
    pub get: bool,
    pub create: bool,
    pub update: bool,
    pub delete: bool,
}

impl Default for Operations {
    fn default() -> Self {
        Self {
            get: true,
            create: true,
            update: true,
            delete: true,
        }
    }
}
