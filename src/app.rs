//! Router assembly for one generation: common routes, every module, the error translator.

use crate::config::Configuration;
use crate::error::{translate_errors, AppError, ConfigError};
use crate::module::AppModule;
use crate::routes::{common_routes, RESERVED_NAMES};
use async_trait::async_trait;
use axum::{extract::DefaultBodyLimit, http::Uri, middleware, Router};
use std::collections::HashSet;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Supplies the modules of an application. Called once per router generation with the
/// snapshot that generation serves, so repositories are bound from current configuration.
#[async_trait]
pub trait Application: Send + Sync + 'static {
    async fn modules(&self, config: &Configuration) -> Result<Vec<Box<dyn AppModule>>, AppError>;
}

/// A built router and the modules behind it.
pub struct Mounted {
    pub router: Router,
    modules: Vec<Box<dyn AppModule>>,
}

impl Mounted {
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Stop every module, in mount order.
    pub async fn stop(&self) {
        for module in &self.modules {
            module.stop().await;
        }
    }
}

async fn fallback(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}

pub async fn assemble(app: &dyn Application, config: Arc<Configuration>) -> Result<Mounted, AppError> {
    let modules = app.modules(&config).await?;
    build_router(modules, config)
}

pub fn build_router(modules: Vec<Box<dyn AppModule>>, config: Arc<Configuration>) -> Result<Mounted, AppError> {
    let mut names: HashSet<&str> = RESERVED_NAMES.iter().copied().collect();
    for module in &modules {
        if !names.insert(module.name()) {
            return Err(ConfigError::DuplicateModule(module.name().to_string()).into());
        }
    }
    let mut router = common_routes(config.clone());
    for module in &modules {
        router = router.merge(module.routes());
        tracing::info!(module = %module.name(), "module mounted");
    }
    let router = router
        .fallback(fallback)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.body_limit()))
        .layer(middleware::from_fn(translate_errors))
        .layer(TraceLayer::new_for_http());
    Ok(Mounted { router, modules })
}
