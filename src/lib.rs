//! Resource server: generic document-collection REST modules over pluggable repositories,
//! served from layered, hot-reloaded configuration.

pub mod app;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod merge;
pub mod module;
pub mod repository;
pub mod resources;
pub mod routes;
pub mod server;
pub mod state;
pub mod store;
pub mod validation;

pub use app::{assemble, build_router, Application, Mounted};
pub use config::{
    default_sources, ChangeListener, ConfigMerger, ConfigSource, ConfigWatch, Configuration, EnvSource, FileSource,
    MemorySource, Mode, PropertiesSource,
};
pub use error::{translate_errors, AppError, ConfigError, ErrorEnvelope, ValidationErrors};
pub use module::{AppModule, RepoModule, ResourceModule};
pub use repository::{Document, MemoryRepository, MemoryStore, PgRepository, Repository, StoreError, Update};
pub use resources::Catalog;
pub use routes::{common_routes, resource_routes};
pub use server::{BounceRequest, BounceStats, ServerController, ServerHandle, ServerState};
pub use state::Operations;
pub use store::{ensure_database_exists, StoreBinder, StoreConfig};
pub use validation::{Locale, Validator, Violation, Violations};
