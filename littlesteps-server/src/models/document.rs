//! Documents, identifiers and partial updates

use std::fmt;

use mongodb::bson::oid::ObjectId;
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::value::{Fields, Value};
use super::ValidationError;

/// Wire name of the identifier field
pub const ID_FIELD: &str = "id";

/// Store-native name of the identifier field
pub const STORE_ID_FIELD: &str = "_id";

/// Document identifier: opaque string on the wire, `ObjectId` in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(ObjectId);

impl DocumentId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(ObjectId::new())
    }

    /// Parse a wire identifier (24 hex characters).
    ///
    /// ```
    /// use littlesteps_server::models::DocumentId;
    ///
    /// assert!(DocumentId::parse("65f1c0a2b3d4e5f6a7b8c9d0").is_ok());
    /// assert!(DocumentId::parse("not-an-id").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        ObjectId::parse_str(s)
            .map(Self)
            .map_err(|_| ValidationError::InvalidId {
                value: s.to_owned(),
            })
    }

    pub fn object_id(&self) -> ObjectId {
        self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ObjectId> for DocumentId {
    fn from(oid: ObjectId) -> Self {
        Self(oid)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

/// One record in a collection
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: DocumentId, fields: Fields) -> Self {
        Self { id, fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Serializes as a flat object with the identifier under `id`.
impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry(ID_FIELD, &self.id.to_string())?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Validated partial update: fields to overwrite and fields to remove
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub set: Fields,
    pub unset: Vec<String>,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Apply to an in-memory field map.
    pub fn apply(&self, fields: &mut Fields) {
        for (k, v) in &self.set {
            fields.insert(k.clone(), v.clone());
        }
        for k in &self.unset {
            fields.remove(k);
        }
    }
}
