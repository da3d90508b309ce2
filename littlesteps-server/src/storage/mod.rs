//! Storage connector
//!
//! # Design Principles
//!
//! - One connector per process, built at startup and passed to handlers
//! - The driver owns pooling; no locks are taken around it here
//! - Every operation is bounded by the configured timeout
//! - No retries: a failed or timed-out call is `Unavailable` to the caller

pub mod filter;
pub mod memory;
pub mod mongo;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{BackendKind, StorageConfig};
use crate::models::{Document, DocumentId, Fields, Patch, Value};

pub use filter::{DateRange, Filter, FindOptions};
pub use memory::MemoryBackend;
pub use mongo::MongoBackend;

/// Storage error type
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Initial connection failed; raised once at startup
    #[error("could not connect to the document store: {0}")]
    Connection(String),

    #[error("storage configuration error: {0}")]
    Config(String),

    #[error("storage operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Transient driver failure on a single operation
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be mapped back to a document
    #[error("malformed stored document: {0}")]
    Corrupt(String),
}

/// Backend operations behind the connector.
///
/// Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    async fn ping(&self) -> Result<(), StorageError>;

    /// Insert a new document; the store assigns the identifier.
    async fn insert(&self, collection: &str, fields: Fields) -> Result<Document, StorageError>;

    async fn find_by_id(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, StorageError>;

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StorageError>;

    /// Apply a partial update, returning the document after the update,
    /// or `None` if it does not exist.
    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        patch: &Patch,
    ) -> Result<Option<Document>, StorageError>;

    /// Add `value` to the array `field` unless already present.
    async fn add_to_set(
        &self,
        collection: &str,
        id: &DocumentId,
        field: &str,
        value: Value,
    ) -> Result<Option<Document>, StorageError>;

    /// Delete a document, returning whether it existed.
    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<bool, StorageError>;

    /// Close the underlying client.
    async fn shutdown(&self);
}

struct ConnectorInner {
    backend: Arc<dyn StorageBackend>,
    timeout: Duration,
    closed: AtomicBool,
}

/// Owns the store connection for the life of the process.
///
/// Cloning is cheap and shares the same connection.
#[derive(Clone)]
pub struct Connector {
    inner: Arc<ConnectorInner>,
}

impl Connector {
    /// Connect using configuration, failing fast if the store is unreachable.
    pub async fn connect(config: &StorageConfig) -> Result<Self, StorageError> {
        let backend: Arc<dyn StorageBackend> = match config.backend {
            BackendKind::Mongo => Arc::new(
                MongoBackend::connect(&config.uri, config.database.as_deref(), config.timeout)
                    .await?,
            ),
            BackendKind::Memory => {
                warn!("using in-memory storage; data will not survive a restart");
                Arc::new(MemoryBackend::new())
            }
        };
        Ok(Self::with_backend(backend, config.timeout))
    }

    /// Wrap an already constructed backend.
    pub fn with_backend(backend: Arc<dyn StorageBackend>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ConnectorInner {
                backend,
                timeout,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Handle for one named collection.
    pub fn collection(&self, name: &str) -> CollectionHandle {
        CollectionHandle {
            name: name.to_owned(),
            connector: self.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.backend.name()
    }

    /// Liveness check for health probes.
    pub async fn ping(&self) -> Result<(), StorageError> {
        self.bounded("ping", self.inner.backend.ping()).await
    }

    /// Close the connection. Later calls are no-ops.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(backend = self.backend_name(), "closing storage connection");
        self.inner.backend.shutdown().await;
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("connector has been shut down".into()));
        }
        match tokio::time::timeout(self.inner.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout = ?self.inner.timeout, "storage operation timed out");
                Err(StorageError::Timeout {
                    operation,
                    timeout: self.inner.timeout,
                })
            }
        }
    }
}

/// Bounded operations on one collection
#[derive(Clone)]
pub struct CollectionHandle {
    name: String,
    connector: Connector,
}

impl CollectionHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &dyn StorageBackend {
        self.connector.inner.backend.as_ref()
    }

    pub async fn insert(&self, fields: Fields) -> Result<Document, StorageError> {
        let doc = self
            .connector
            .bounded("insert", self.backend().insert(&self.name, fields))
            .await?;
        debug!(collection = %self.name, id = %doc.id, "inserted document");
        Ok(doc)
    }

    pub async fn get(&self, id: &DocumentId) -> Result<Option<Document>, StorageError> {
        self.connector
            .bounded("find_by_id", self.backend().find_by_id(&self.name, id))
            .await
    }

    pub async fn find(
        &self,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StorageError> {
        self.connector
            .bounded("find", self.backend().find(&self.name, filter, options))
            .await
    }

    pub async fn update(
        &self,
        id: &DocumentId,
        patch: &Patch,
    ) -> Result<Option<Document>, StorageError> {
        self.connector
            .bounded("update", self.backend().update(&self.name, id, patch))
            .await
    }

    pub async fn add_to_set(
        &self,
        id: &DocumentId,
        field: &str,
        value: Value,
    ) -> Result<Option<Document>, StorageError> {
        self.connector
            .bounded(
                "add_to_set",
                self.backend().add_to_set(&self.name, id, field, value),
            )
            .await
    }

    pub async fn delete(&self, id: &DocumentId) -> Result<bool, StorageError> {
        let deleted = self
            .connector
            .bounded("delete", self.backend().delete(&self.name, id))
            .await?;
        debug!(collection = %self.name, id = %id, deleted, "delete");
        Ok(deleted)
    }
}
