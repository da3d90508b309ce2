//! CRUD handler for one resource type
//!
//! Operation order is always: parse identifier, validate body or filters,
//! check references, then a single write. A failure before the write leaves
//! the store untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::models::mapper::parse_id;
use crate::models::{
    Document, DocumentId, Fields, Mapper, NullPolicy, ResourceSchema, ValidationError, Value,
};
use crate::storage::{CollectionHandle, Connector, FindOptions, StorageError};

/// Handler error type
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{resource} '{id}' not found")]
    NotFound { resource: String, id: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Handler bound to one resource schema and the shared connector
#[derive(Clone)]
pub struct ResourceHandler {
    schema: Arc<ResourceSchema>,
    connector: Connector,
    nulls: NullPolicy,
}

impl ResourceHandler {
    pub fn new(schema: Arc<ResourceSchema>, connector: Connector, nulls: NullPolicy) -> Self {
        Self {
            schema,
            connector,
            nulls,
        }
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    fn mapper(&self) -> Mapper<'_> {
        Mapper::new(&self.schema, self.nulls)
    }

    fn collection(&self) -> CollectionHandle {
        self.connector.collection(self.schema.name)
    }

    fn not_found(&self, id: &DocumentId) -> HandlerError {
        HandlerError::NotFound {
            resource: self.schema.name.to_owned(),
            id: id.to_string(),
        }
    }

    /// Validate and insert a new document.
    pub async fn create(&self, body: serde_json::Value) -> Result<Document, HandlerError> {
        let fields = self.mapper().create_fields(body)?;
        self.check_references(&fields).await?;

        let doc = self.collection().insert(fields).await?;
        info!(collection = self.schema.name, id = %doc.id, "created document");
        Ok(doc)
    }

    pub async fn get(&self, id: &str) -> Result<Document, HandlerError> {
        let id = parse_id(id)?;
        self.collection()
            .get(&id)
            .await?
            .ok_or_else(|| self.not_found(&id))
    }

    /// Documents matching every filter; all documents when `params` is empty.
    pub async fn list(&self, params: &BTreeMap<String, String>) -> Result<Vec<Document>, HandlerError> {
        let filter = self.mapper().filter(params)?;
        let options = FindOptions {
            sort: self.schema.sort.clone(),
        };

        let docs = self.collection().find(&filter, &options).await?;
        debug!(collection = self.schema.name, count = docs.len(), "listed documents");
        Ok(docs)
    }

    /// Partial update: only fields present in `body` change.
    pub async fn update(&self, id: &str, body: serde_json::Value) -> Result<Document, HandlerError> {
        let id = parse_id(id)?;
        let patch = self.mapper().patch(body)?;
        self.check_references(&patch.set).await?;

        let doc = self
            .collection()
            .update(&id, &patch)
            .await?
            .ok_or_else(|| self.not_found(&id))?;
        info!(
            collection = self.schema.name,
            id = %doc.id,
            set = patch.set.len(),
            unset = patch.unset.len(),
            "updated document"
        );
        Ok(doc)
    }

    /// Delete a document. Deleting twice is `NotFound` the second time.
    pub async fn delete(&self, id: &str) -> Result<(), HandlerError> {
        let id = parse_id(id)?;
        if !self.collection().delete(&id).await? {
            return Err(self.not_found(&id));
        }
        info!(collection = self.schema.name, id = %id, "deleted document");
        Ok(())
    }

    /// Run a named link operation, adding an identifier to an array field.
    pub async fn link(
        &self,
        id: &str,
        link: &str,
        body: serde_json::Value,
    ) -> Result<Document, HandlerError> {
        let spec = self.schema.find_link(link).ok_or_else(|| HandlerError::NotFound {
            resource: format!("{} operation", self.schema.name),
            id: link.to_owned(),
        })?;
        let id = parse_id(id)?;
        let target = self.mapper().link_target(spec, body)?;

        let doc = self
            .collection()
            .add_to_set(&id, spec.field, target)
            .await?
            .ok_or_else(|| self.not_found(&id))?;
        info!(collection = self.schema.name, id = %doc.id, link, "linked document");
        Ok(doc)
    }

    /// Verify declared references point at existing documents.
    ///
    /// This is a read before the write; the store enforces no integrity of
    /// its own, and a referenced document deleted afterwards is not noticed.
    async fn check_references(&self, fields: &Fields) -> Result<(), HandlerError> {
        for reference in &self.schema.references {
            let Some(Value::String(raw)) = fields.get(reference.field) else {
                continue;
            };
            let target = parse_id(raw)?;
            let exists = self
                .connector
                .collection(reference.collection)
                .get(&target)
                .await?
                .is_some();
            if !exists {
                return Err(ValidationError::UnknownReference {
                    field: reference.field.to_owned(),
                    id: raw.clone(),
                }
                .into());
            }
        }
        Ok(())
    }
}
