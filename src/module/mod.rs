//! Application modules: named route bundles mounted for one router generation.
//!
//! [`ResourceModule`] describes a document collection (type, validators, enabled
//! operations); [`RepoModule`] binds it to a repository and turns it into routes.

use crate::repository::Repository;
use crate::routes::resource_routes;
use crate::state::{Operations, ResourceState, Validators};
use crate::validation::Validator;
use async_trait::async_trait;
use axum::Router;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;

/// A named bundle of routes. Paths are absolute and start with `/<name>`.
#[async_trait]
pub trait AppModule: Send + Sync {
    fn name(&self) -> &str;

    fn routes(&self) -> Router;

    /// Release what the module bound. Called once its router generation has drained.
    async fn stop(&self) {}
}

/// A REST collection over documents of type `Doc`.
///
/// Update and replace validation default to the save rules; delete has no rules unless
/// overridden. All operations are enabled unless a flag says otherwise.
pub trait ResourceModule: Send + Sync + 'static {
    type Doc: DeserializeOwned + Send + Sync + 'static;

    /// Collection name and mount path segment.
    fn name(&self) -> &str;

    fn save_validator(&self) -> Validator<Self::Doc> {
        Validator::empty()
    }

    fn update_validator(&self) -> Validator<Self::Doc> {
        self.save_validator()
    }

    fn replace_validator(&self) -> Validator<Self::Doc> {
        self.save_validator()
    }

    fn delete_validator(&self) -> Validator<Self::Doc> {
        Validator::empty()
    }

    fn get_enabled(&self) -> bool {
        true
    }

    fn create_enabled(&self) -> bool {
        true
    }

    fn update_enabled(&self) -> bool {
        true
    }

    fn delete_enabled(&self) -> bool {
        true
    }
}

/// A [`ResourceModule`] bound to its repository. Validators and flags are evaluated once, here.
pub struct RepoModule<M: ResourceModule> {
    state: Arc<ResourceState<M::Doc>>,
    operations: Operations,
    _module: PhantomData<fn() -> M>,
}

impl<M: ResourceModule> RepoModule<M> {
    pub fn new(module: M, repo: Arc<dyn Repository>) -> Self {
        let validators = Validators {
            save: module.save_validator(),
            update: module.update_validator(),
            replace: module.replace_validator(),
            delete: module.delete_validator(),
        };
        let operations = Operations {
            get: module.get_enabled(),
            create: module.create_enabled(),
            update: module.update_enabled(),
            delete: module.delete_enabled(),
        };
        Self {
            state: Arc::new(ResourceState {
                name: module.name().to_string(),
                repo,
                validators,
            }),
            operations,
            _module: PhantomData,
        }
    }

    pub fn operations(&self) -> Operations {
        self.operations
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.state.repo
    }
}

#[async_trait]
impl<M: ResourceModule> AppModule for RepoModule<M> {
    fn name(&self) -> &str {
        &self.state.name
    }

    fn routes(&self) -> Router {
        resource_routes(self.state.clone(), self.operations)
    }

    async fn stop(&self) {
        self.state.repo.close().await;
        tracing::debug!(module = %self.state.name, "module stopped");
    }
}
