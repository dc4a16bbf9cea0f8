//! In-process collections. Data lives in a [`MemoryStore`] that outlives router generations,
//! so a bounce re-binds to the same documents.

use super::{generate_id, id_of, matches, with_id, Document, Repository, StoreError, Update, ID_FIELD};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

/// Named in-memory collections, created on first use.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Arc<MemoryRepository>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(&self, name: &str) -> Arc<MemoryRepository> {
        let mut collections = match self.collections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryRepository::new(name)))
            .clone()
    }
}

/// One collection, insertion ordered.
pub struct MemoryRepository {
    name: String,
    docs: RwLock<Vec<Document>>,
}

impl MemoryRepository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: RwLock::new(Vec::new()),
        }
    }
}

fn position(docs: &[Document], id: &str) -> Option<usize> {
    docs.iter().position(|d| id_of(d) == Some(id))
}

fn position_matching(docs: &[Document], query: &Document) -> Option<usize> {
    docs.iter().position(|d| matches(d, query))
}

#[async_trait]
impl Repository for MemoryRepository {
    fn collection_name(&self) -> &str {
        &self.name
    }

    async fn save(&self, mut doc: Document) -> Result<Document, StoreError> {
        let id = match id_of(&doc) {
            Some(id) => id.to_string(),
            None => generate_id(),
        };
        doc = with_id(doc, &id);
        let mut docs = self.docs.write().await;
        match position(&docs, &id) {
            Some(i) => docs[i] = doc.clone(),
            None => docs.push(doc.clone()),
        }
        Ok(doc)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let docs = self.docs.read().await;
        Ok(position(&docs, id).map(|i| docs[i].clone()))
    }

    async fn list(&self) -> Result<Vec<Document>, StoreError> {
        Ok(self.docs.read().await.clone())
    }

    async fn find(&self, query: &Document) -> Result<Vec<Document>, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs.iter().filter(|d| matches(d, query)).cloned().collect())
    }

    async fn find_one(&self, query: &Document) -> Result<Option<Document>, StoreError> {
        let docs = self.docs.read().await;
        Ok(position_matching(&docs, query).map(|i| docs[i].clone()))
    }

    async fn update_by_id(&self, id: &str, update: &Update) -> Result<Option<Document>, StoreError> {
        let mut docs = self.docs.write().await;
        Ok(position(&docs, id).map(|i| {
            update.apply(&mut docs[i]);
            docs[i].clone()
        }))
    }

    async fn update(&self, query: &Document, update: &Update) -> Result<Option<Document>, StoreError> {
        let mut docs = self.docs.write().await;
        Ok(position_matching(&docs, query).map(|i| {
            update.apply(&mut docs[i]);
            docs[i].clone()
        }))
    }

    async fn replace_by_id(&self, id: &str, doc: Document) -> Result<Option<Document>, StoreError> {
        let mut docs = self.docs.write().await;
        Ok(position(&docs, id).map(|i| {
            docs[i] = with_id(doc, id);
            docs[i].clone()
        }))
    }

    async fn replace(&self, query: &Document, doc: Document) -> Result<Option<Document>, StoreError> {
        let mut docs = self.docs.write().await;
        let Some(i) = position_matching(&docs, query) else {
            return Ok(None);
        };
        let id = id_of(&docs[i]).map(str::to_string).unwrap_or_else(generate_id);
        let mut doc = doc;
        doc.remove(ID_FIELD);
        docs[i] = with_id(doc, &id);
        Ok(Some(docs[i].clone()))
    }

    async fn delete_by_id(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let mut docs = self.docs.write().await;
        Ok(position(&docs, id).map(|i| docs.remove(i)))
    }

    async fn delete(&self, query: &Document) -> Result<Option<Document>, StoreError> {
        let mut docs = self.docs.write().await;
        Ok(position_matching(&docs, query).map(|i| docs.remove(i)))
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut docs = self.docs.write().await;
        let removed = docs.len() as u64;
        docs.clear();
        Ok(removed)
    }

    async fn drop_collection(&self) -> Result<(), StoreError> {
        self.docs.write().await.clear();
        Ok(())
    }

    async fn close(&self) {
        tracing::debug!(collection = %self.name, "memory collection released");
    }
}
