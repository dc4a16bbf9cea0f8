//! Example consumer: a separate crate that defines its own resource modules and serves them
//! with resource-server's configuration merger and server controller.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Or from this directory: `cargo run`

use async_trait::async_trait;
use resource_server::{
    default_sources, AppError, AppModule, Application, ConfigMerger, Configuration, MemoryStore, PropertiesSource,
    RepoModule, ResourceModule, ServerController, Validator,
};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

#[derive(Deserialize)]
struct Article {
    title: Option<String>,
}

/// Articles are loaded out of band; HTTP only reads them.
struct Articles;

impl ResourceModule for Articles {
    type Doc = Article;

    fn name(&self) -> &str {
        "articles"
    }

    fn save_validator(&self) -> Validator<Article> {
        Validator::builder()
            .constraint("title", |a: &Article| a.title.as_deref(), |c| c.not_null().not_blank())
            .build()
    }

    fn create_enabled(&self) -> bool {
        false
    }

    fn update_enabled(&self) -> bool {
        false
    }

    fn delete_enabled(&self) -> bool {
        false
    }
}

#[derive(Deserialize)]
struct Account {
    email: Option<String>,
    confirm: Option<bool>,
}

/// Accounts can only be deleted with `{"confirm": true}` in the request body.
struct Accounts;

impl ResourceModule for Accounts {
    type Doc = Account;

    fn name(&self) -> &str {
        "accounts"
    }

    fn save_validator(&self) -> Validator<Account> {
        Validator::builder()
            .constraint("email", |a: &Account| a.email.as_deref(), |c| c.not_null().email())
            .build()
    }

    fn delete_validator(&self) -> Validator<Account> {
        Validator::builder()
            .constraint(
                "confirm",
                |a: &Account| a.confirm.as_ref(),
                |c| c.predicate_nullable("confirmRequired", "\"{0}\" must be true to delete", |v| v == Some(&true)),
            )
            .build()
    }
}

#[derive(Default)]
struct Consumer {
    store: Arc<MemoryStore>,
}

#[async_trait]
impl Application for Consumer {
    async fn modules(&self, _config: &Configuration) -> Result<Vec<Box<dyn AppModule>>, AppError> {
        let modules: Vec<Box<dyn AppModule>> = vec![
            Box::new(RepoModule::new(Articles, self.store.collection("articles"))),
            Box::new(RepoModule::new(Accounts, self.store.collection("accounts"))),
        ];
        Ok(modules)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("resource_server=info,example_consumer=info")),
        )
        .init();

    let merger = Arc::new(ConfigMerger::new(default_sources(
        Path::new("conf"),
        "consumer",
        PropertiesSource::default(),
    )));
    merger.retrieve().await;
    let _watch = merger.listen()?;

    let handle = ServerController::start(Arc::new(Consumer::default()), merger).await?;
    if let Some(addr) = handle.local_addr() {
        tracing::info!("Example consumer listening on http://{}", addr);
    }
    tokio::signal::ctrl_c().await?;
    handle.shutdown().await;
    Ok(())
}
