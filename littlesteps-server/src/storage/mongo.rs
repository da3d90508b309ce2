//! MongoDB backend
//!
//! Documents keep their native `ObjectId` under `_id`; every other field maps
//! one to one between `Value` and BSON. Partial updates use `$set` / `$unset`
//! and links use `$addToSet`, each as a single atomic store call.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document as BsonDocument};
use mongodb::options::{ClientOptions, ReturnDocument};
use mongodb::{Client, Collection, Database};
use tracing::info;

use super::{Filter, FindOptions, StorageBackend, StorageError};
use crate::models::mapper::format_timestamp;
use crate::models::{Document, DocumentId, Fields, Patch, SortOrder, Value, STORE_ID_FIELD};

const APP_NAME: &str = "littlesteps-db";

/// Backend over a single MongoDB client
pub struct MongoBackend {
    client: Client,
    db: Database,
}

impl MongoBackend {
    /// Connect and verify the server answers a `ping`.
    ///
    /// The database is `database` if given, otherwise the one named in the
    /// URI path. Server selection and connect timeouts are both set to
    /// `timeout`, so an unreachable store fails within that bound.
    pub async fn connect(
        uri: &str,
        database: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| StorageError::Config(format!("invalid connection URI: {}", e)))?;
        options.server_selection_timeout = Some(timeout);
        options.connect_timeout = Some(timeout);
        options.app_name = Some(APP_NAME.to_owned());

        let db_name = database
            .map(str::to_owned)
            .or_else(|| options.default_database.clone())
            .ok_or_else(|| {
                StorageError::Config(
                    "database name not found in connection URI and OPERATIONAL_DB_NAME is unset"
                        .into(),
                )
            })?;

        let client = Client::with_options(options)
            .map_err(|e| StorageError::Config(format!("invalid client options: {}", e)))?;
        let db = client.database(&db_name);

        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        info!(database = %db_name, "connected to operational store");

        Ok(Self { client, db })
    }

    fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.db.collection::<BsonDocument>(name)
    }
}

impl From<mongodb::error::Error> for StorageError {
    fn from(e: mongodb::error::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

fn to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Int(i) => Bson::Int64(*i),
        Value::Float(f) => Bson::Double(*f),
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(to_bson).collect()),
        Value::Object(fields) => Bson::Document(to_bson_document(fields)),
    }
}

fn to_bson_document(fields: &Fields) -> BsonDocument {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), to_bson(v)))
        .collect()
}

fn from_bson(bson: Bson) -> Value {
    match bson {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::Int(i64::from(i)),
        Bson::Int64(i) => Value::Int(i),
        Bson::Double(f) => Value::Float(f),
        Bson::String(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        // Native dates surface in the same form the service writes timestamps
        Bson::DateTime(at) => DateTime::<Utc>::from_timestamp_millis(at.timestamp_millis())
            .map(|at| Value::String(format_timestamp(at)))
            .unwrap_or(Value::Null),
        Bson::Array(items) => Value::Array(items.into_iter().map(from_bson).collect()),
        Bson::Document(doc) => {
            Value::Object(doc.into_iter().map(|(k, v)| (k, from_bson(v))).collect())
        }
        // Values written by other tools: expose their relaxed extended JSON form
        other => Value::from(other.into_relaxed_extjson()),
    }
}

fn decode(mut raw: BsonDocument) -> Result<Document, StorageError> {
    let id = match raw.remove(STORE_ID_FIELD) {
        Some(Bson::ObjectId(oid)) => DocumentId::from(oid),
        Some(other) => {
            return Err(StorageError::Corrupt(format!(
                "_id is {:?}, expected an ObjectId",
                other.element_type()
            )))
        }
        None => return Err(StorageError::Corrupt("document has no _id".into())),
    };
    let fields = raw.into_iter().map(|(k, v)| (k, from_bson(v))).collect();
    Ok(Document::new(id, fields))
}

fn id_filter(id: &DocumentId) -> BsonDocument {
    let mut filter = BsonDocument::new();
    filter.insert(STORE_ID_FIELD, id.object_id());
    filter
}

fn filter_document(filter: &Filter) -> BsonDocument {
    let mut query = to_bson_document(&filter.equals);
    if let Some(range) = &filter.range {
        let mut text = BsonDocument::new();
        let mut native = BsonDocument::new();
        for (op, bound) in [("$gte", &range.from), ("$lt", &range.until)] {
            if let Some(bound) = bound {
                text.insert(op, bound.clone());
                if let Some(at) = bson_datetime(bound) {
                    native.insert(op, at);
                }
            }
        }
        if !text.is_empty() {
            // Timestamps are stored as RFC 3339 text, older records as native dates
            let mut arms = vec![Bson::Document(field_condition(&range.field, text))];
            if !native.is_empty() {
                arms.push(Bson::Document(field_condition(&range.field, native)));
            }
            query.insert("$or", arms);
        }
    }
    query
}

fn field_condition(field: &str, bounds: BsonDocument) -> BsonDocument {
    let mut condition = BsonDocument::new();
    condition.insert(field, bounds);
    condition
}

fn bson_datetime(raw: &str) -> Option<BsonDateTime> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| BsonDateTime::from_millis(at.timestamp_millis()))
}

fn update_document(patch: &Patch) -> BsonDocument {
    let mut update = BsonDocument::new();
    if !patch.set.is_empty() {
        update.insert("$set", to_bson_document(&patch.set));
    }
    if !patch.unset.is_empty() {
        let unset: BsonDocument = patch.unset.iter().map(|k| (k.clone(), Bson::from(""))).collect();
        update.insert("$unset", unset);
    }
    update
}

#[async_trait]
impl StorageBackend for MongoBackend {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<Document, StorageError> {
        let result = self
            .collection(collection)
            .insert_one(to_bson_document(&fields))
            .await?;
        let id = result.inserted_id.as_object_id().ok_or_else(|| {
            StorageError::Corrupt(format!("store assigned a non-ObjectId id: {}", result.inserted_id))
        })?;
        Ok(Document::new(DocumentId::from(id), fields))
    }

    async fn find_by_id(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, StorageError> {
        self.collection(collection)
            .find_one(id_filter(id))
            .await?
            .map(decode)
            .transpose()
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StorageError> {
        let coll = self.collection(collection);
        let mut find = coll.find(filter_document(filter));
        if let Some(sort) = &options.sort {
            let direction = match sort.order {
                SortOrder::Ascending => 1,
                SortOrder::Descending => -1,
            };
            let mut order = BsonDocument::new();
            order.insert(sort.field, direction);
            find = find.sort(order);
        }

        let raw: Vec<BsonDocument> = find.await?.try_collect().await?;
        raw.into_iter().map(decode).collect()
    }

    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        patch: &Patch,
    ) -> Result<Option<Document>, StorageError> {
        if patch.is_empty() {
            return self.find_by_id(collection, id).await;
        }
        self.collection(collection)
            .find_one_and_update(id_filter(id), update_document(patch))
            .return_document(ReturnDocument::After)
            .await?
            .map(decode)
            .transpose()
    }

    async fn add_to_set(
        &self,
        collection: &str,
        id: &DocumentId,
        field: &str,
        value: Value,
    ) -> Result<Option<Document>, StorageError> {
        let mut addition = BsonDocument::new();
        addition.insert(field, to_bson(&value));
        self.collection(collection)
            .find_one_and_update(id_filter(id), doc! { "$addToSet": addition })
            .return_document(ReturnDocument::After)
            .await?
            .map(decode)
            .transpose()
    }

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<bool, StorageError> {
        let result = self.collection(collection).delete_one(id_filter(id)).await?;
        Ok(result.deleted_count > 0)
    }

    async fn shutdown(&self) {
        self.client.clone().shutdown().await;
    }
}
