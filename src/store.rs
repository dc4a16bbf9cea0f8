//! Store binding from the `store` configuration section.
//!
//! ```toml
//! [store]
//! kind = "postgres"          # or "memory" (default)
//! url = "postgres://localhost/resources"
//! schema = "resource_server"
//! max_connections = 5
//! ```

use crate::config::Configuration;
use crate::error::AppError;
use crate::repository::postgres::{quote_ident, valid_identifier};
use crate::repository::{MemoryStore, PgRepository, Repository, StoreError};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;
use std::sync::Arc;

pub const STORE_SECTION: &str = "store";

fn default_schema() -> String {
    "resource_server".into()
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    #[default]
    Memory,
    Postgres {
        url: String,
        #[serde(default = "default_schema")]
        schema: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

/// Repositories for one router generation.
pub enum Store {
    Memory(Arc<MemoryStore>),
    Postgres { pool: PgPool, schema: String },
}

impl Store {
    pub async fn collection(&self, name: &str) -> Result<Arc<dyn Repository>, StoreError> {
        match self {
            Store::Memory(store) => Ok(store.collection(name)),
            Store::Postgres { pool, schema } => {
                Ok(Arc::new(PgRepository::open(pool.clone(), schema, name).await?))
            }
        }
    }
}

/// Opens a [`Store`] per generation. Memory collections are shared by every generation;
/// Postgres gets a fresh pool, closed when the generation's modules stop.
#[derive(Default)]
pub struct StoreBinder {
    memory: Arc<MemoryStore>,
}

impl StoreBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(&self, config: &Configuration) -> Result<Store, AppError> {
        let store_config: StoreConfig = config.section(STORE_SECTION)?.unwrap_or_default();
        match store_config {
            StoreConfig::Memory => {
                tracing::info!("using in-memory store");
                Ok(Store::Memory(self.memory.clone()))
            }
            StoreConfig::Postgres {
                url,
                schema,
                max_connections,
            } => {
                if !valid_identifier(&schema) {
                    return Err(StoreError::InvalidCollection(schema).into());
                }
                ensure_database_exists(&url).await?;
                let pool = PgPoolOptions::new()
                    .max_connections(max_connections)
                    .connect(&url)
                    .await
                    .map_err(StoreError::from)?;
                sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&schema)))
                    .execute(&pool)
                    .await
                    .map_err(StoreError::from)?;
                tracing::info!(schema = %schema, "using postgres store");
                Ok(Store::Postgres { pool, schema })
            }
        }
    }
}

/// Ensure the database named by `database_url` exists, creating it if not. A url without a
/// database path (or naming `postgres`) is left alone. CREATE DATABASE runs against the
/// `postgres` database on the same server.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let target = connect_options(database_url)?;
    let db_name = match target_database(&target) {
        Some(name) => name,
        None => return Ok(()),
    };
    let mut conn: sqlx::PgConnection = target
        .clone()
        .database("postgres")
        .connect()
        .await
        .map_err(StoreError::from)?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await
        .map_err(StoreError::from)?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await
            .map_err(StoreError::from)?;
        tracing::info!(database = %db_name, "database created");
    }
    Ok(())
}

fn connect_options(url: &str) -> Result<PgConnectOptions, AppError> {
    PgConnectOptions::from_str(url).map_err(|e| AppError::BadRequest(format!("invalid store url: {}", e)))
}

fn target_database(options: &PgConnectOptions) -> Option<String> {
    options
        .get_database()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "postgres")
        .map(str::to_string)
}
