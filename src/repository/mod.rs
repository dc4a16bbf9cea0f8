//! Document repository contract and its in-memory and Postgres implementations.
//!
//! A repository owns one collection of JSON documents keyed by the string field `_id`.
//! Queries are containment matches: a document matches when every key of the query is
//! present with an equal (or, for objects and arrays, contained) value.

mod memory;
pub(crate) mod postgres;

pub use memory::{MemoryRepository, MemoryStore};
pub use postgres::PgRepository;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// A stored document. Always carries a string `_id` once persisted.
pub type Document = Map<String, Value>;

/// Identity field of every document.
pub const ID_FIELD: &str = "_id";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid collection name: {0}")]
    InvalidCollection(String),
    #[error("stored payload for '{0}' is not a JSON object")]
    Corrupt(String),
    #[error("invalid update: {0}")]
    InvalidUpdate(String),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
}

/// Field-level modification: `$set` replaces top-level fields, `$unset` removes them.
/// `_id` is never touched by either.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    set: Document,
    unset: Vec<String>,
}

impl Update {
    pub fn set(fields: Document) -> Self {
        Self {
            set: fields,
            unset: Vec::new(),
        }
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.unset.push(field.into());
        self
    }

    /// Parse the operator form `{"$set": {...}, "$unset": {"field": ""}}`.
    pub fn from_operators(value: &Value) -> Result<Self, StoreError> {
        let ops = value
            .as_object()
            .ok_or_else(|| StoreError::InvalidUpdate("update must be a JSON object".into()))?;
        let mut update = Update::default();
        for (op, arg) in ops {
            match (op.as_str(), arg) {
                ("$set", Value::Object(fields)) => update.set.extend(fields.clone()),
                ("$unset", Value::Object(fields)) => update.unset.extend(fields.keys().cloned()),
                ("$set" | "$unset", _) => {
                    return Err(StoreError::InvalidUpdate(format!("{} expects an object", op)))
                }
                _ => return Err(StoreError::InvalidUpdate(format!("unsupported operator {}", op))),
            }
        }
        Ok(update)
    }

    pub fn set_fields(&self) -> Document {
        let mut fields = self.set.clone();
        fields.remove(ID_FIELD);
        fields
    }

    pub fn unset_fields(&self) -> Vec<String> {
        self.unset.iter().filter(|f| f.as_str() != ID_FIELD).cloned().collect()
    }

    pub fn apply(&self, doc: &mut Document) {
        for (key, value) in self.set_fields() {
            doc.insert(key, value);
        }
        for key in self.unset_fields() {
            doc.remove(&key);
        }
    }
}

/// Asynchronous CRUD over one collection. Operations addressing a single document return
/// `None` when nothing matched; callers turn that into a 404.
#[async_trait]
pub trait Repository: Send + Sync {
    fn collection_name(&self) -> &str;

    /// Insert, or upsert when the document already carries an `_id`. Returns the stored document.
    async fn save(&self, doc: Document) -> Result<Document, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError>;

    async fn list(&self) -> Result<Vec<Document>, StoreError>;

    async fn find(&self, query: &Document) -> Result<Vec<Document>, StoreError>;

    async fn find_one(&self, query: &Document) -> Result<Option<Document>, StoreError>;

    /// Returns the document after the update.
    async fn update_by_id(&self, id: &str, update: &Update) -> Result<Option<Document>, StoreError>;

    /// Updates the first match. Returns the document after the update.
    async fn update(&self, query: &Document, update: &Update) -> Result<Option<Document>, StoreError>;

    /// Replaces the whole document, keeping `id` as its identity.
    async fn replace_by_id(&self, id: &str, doc: Document) -> Result<Option<Document>, StoreError>;

    async fn replace(&self, query: &Document, doc: Document) -> Result<Option<Document>, StoreError>;

    /// Returns the deleted document.
    async fn delete_by_id(&self, id: &str) -> Result<Option<Document>, StoreError>;

    async fn delete(&self, query: &Document) -> Result<Option<Document>, StoreError>;

    /// Removes every document, returning how many were removed.
    async fn delete_all(&self) -> Result<u64, StoreError>;

    async fn drop_collection(&self) -> Result<(), StoreError>;

    /// Releases the binding. Called when the router generation using it is drained.
    async fn close(&self) {}
}

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn id_of(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

pub fn with_id(mut doc: Document, id: &str) -> Document {
    doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    doc
}

/// JSON containment, the same relation as Postgres `jsonb @>`.
pub fn contains(doc: &Value, query: &Value) -> bool {
    match (doc, query) {
        (Value::Object(d), Value::Object(q)) => q
            .iter()
            .all(|(k, qv)| d.get(k).map_or(false, |dv| contains(dv, qv))),
        (Value::Array(d), Value::Array(q)) => q.iter().all(|qv| d.iter().any(|dv| contains(dv, qv))),
        (d, q) => d == q,
    }
}

pub fn matches(doc: &Document, query: &Document) -> bool {
    query
        .iter()
        .all(|(k, qv)| doc.get(k).map_or(false, |dv| contains(dv, qv)))
}
