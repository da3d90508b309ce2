//! Document model, resource schemas and the wire mapper
//!
//! All client input is validated when it is mapped into these types.
//! Invalid input returns ValidationError, not panic.

pub mod document;
pub mod mapper;
pub mod schema;
pub mod validation;
pub mod value;

pub use document::{Document, DocumentId, Patch, ID_FIELD, STORE_ID_FIELD};
pub use mapper::Mapper;
pub use schema::{
    FieldKind, FieldSpec, LinkSpec, NullPolicy, ResourceSchema, SchemaRegistry, SortKey,
    SortOrder, ValidationMode,
};
pub use validation::ValidationError;
pub use value::{Fields, Value};
