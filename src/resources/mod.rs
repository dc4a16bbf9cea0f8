//! Bundled resource modules served by the `resource-server` binary.

mod product;
mod widget;

pub use product::{Product, ProductModule, PRODUCTS};
pub use widget::{Widget, WidgetModule, WIDGETS};

use crate::app::Application;
use crate::config::Configuration;
use crate::error::AppError;
use crate::module::{AppModule, RepoModule};
use crate::store::StoreBinder;
use async_trait::async_trait;

/// `widgets` and `products`, bound to the store named by the `store` section.
#[derive(Default)]
pub struct Catalog {
    binder: StoreBinder,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Application for Catalog {
    async fn modules(&self, config: &Configuration) -> Result<Vec<Box<dyn AppModule>>, AppError> {
        let store = self.binder.open(config).await?;
        let modules: Vec<Box<dyn AppModule>> = vec![
            Box::new(RepoModule::new(WidgetModule, store.collection(WIDGETS).await?)),
            Box::new(RepoModule::new(ProductModule, store.collection(PRODUCTS).await?)),
        ];
        Ok(modules)
    }
}
