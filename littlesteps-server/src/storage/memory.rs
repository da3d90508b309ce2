//! In-memory backend for development and tests
//!
//! Collections live behind an async `RwLock`. Filter, sort and update
//! semantics follow the document store so the HTTP contract can be exercised
//! without a database. Outages and latency can be simulated.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Filter, FindOptions, StorageBackend, StorageError};
use crate::models::{Document, DocumentId, Fields, Patch, SortOrder, Value};

/// Thread-safe in-memory document store
#[derive(Debug, Default)]
pub struct MemoryBackend {
    // Insertion order is kept per collection
    collections: RwLock<HashMap<String, Vec<Document>>>,
    offline: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail as if the store were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every operation, e.g. to trip the connector timeout.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn preflight(&self) -> Result<(), StorageError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

fn sort_documents(docs: &mut [Document], options: &FindOptions) {
    let Some(sort) = &options.sort else {
        return;
    };
    docs.sort_by(|a, b| {
        let ordering = match (a.get(sort.field), b.get(sort.field)) {
            (Some(x), Some(y)) => x.sort_cmp(y),
            (Some(_), None) => CmpOrdering::Greater,
            (None, Some(_)) => CmpOrdering::Less,
            (None, None) => CmpOrdering::Equal,
        };
        match sort.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.preflight().await
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<Document, StorageError> {
        self.preflight().await?;
        let doc = Document::new(DocumentId::new(), fields);
        self.collections
            .write()
            .await
            .entry(collection.to_owned())
            .or_default()
            .push(doc.clone());
        Ok(doc)
    }

    async fn find_by_id(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, StorageError> {
        self.preflight().await?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == *id))
            .cloned())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StorageError> {
        self.preflight().await?;
        let collections = self.collections.read().await;
        let mut docs: Vec<Document> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| filter.matches(&d.fields))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sort_documents(&mut docs, options);
        Ok(docs)
    }

    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        patch: &Patch,
    ) -> Result<Option<Document>, StorageError> {
        self.preflight().await?;
        let mut collections = self.collections.write().await;
        let Some(doc) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == *id))
        else {
            return Ok(None);
        };
        patch.apply(&mut doc.fields);
        Ok(Some(doc.clone()))
    }

    async fn add_to_set(
        &self,
        collection: &str,
        id: &DocumentId,
        field: &str,
        value: Value,
    ) -> Result<Option<Document>, StorageError> {
        self.preflight().await?;
        let mut collections = self.collections.write().await;
        let Some(doc) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == *id))
        else {
            return Ok(None);
        };

        let slot = doc
            .fields
            .entry(field.to_owned())
            .or_insert_with(|| Value::Array(Vec::new()));
        match slot {
            Value::Array(items) => {
                if !items.contains(&value) {
                    items.push(value);
                }
            }
            other => {
                return Err(StorageError::Corrupt(format!(
                    "cannot add to '{}': field holds {}, not an array",
                    field,
                    other.kind_name()
                )))
            }
        }
        Ok(Some(doc.clone()))
    }

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<bool, StorageError> {
        self.preflight().await?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let before = docs.len();
        docs.retain(|d| d.id != *id);
        Ok(docs.len() < before)
    }

    async fn shutdown(&self) {}
}
