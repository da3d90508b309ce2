//! Validation error types

use std::fmt;

/// Validation error raised before any storage call is attempted
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Request body was not a JSON object, or could not be parsed
    InvalidBody { reason: String },

    /// Required field is absent
    MissingField { field: String },

    /// Field value has the wrong type
    TypeMismatch { field: String, expected: &'static str },

    /// Field name the store would read as an operator or a path
    ReservedFieldName { field: String },

    /// Field not declared by a strict resource schema
    UnknownField { field: String },

    /// Field is assigned by the store and cannot be written
    ImmutableField { field: String },

    /// Identifier is not a valid store identifier
    InvalidId { value: String },

    /// String doesn't match the required format (date, timestamp)
    InvalidFormat { field: String, reason: &'static str },

    /// Referenced document does not exist
    UnknownReference { field: String, id: String },

    /// Field cannot be used as a list filter
    NotFilterable { field: String },

    /// Update body carried nothing to change
    EmptyUpdate,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBody { reason } => write!(f, "invalid request body: {}", reason),
            Self::MissingField { field } => write!(f, "missing required field: {}", field),
            Self::TypeMismatch { field, expected } => {
                write!(f, "{} must be {}", field, expected)
            }
            Self::ReservedFieldName { field } => write!(
                f,
                "invalid field name '{}': names may not start with '$' or contain '.'",
                field.escape_default()
            ),
            Self::UnknownField { field } => write!(f, "unknown field: {}", field),
            Self::ImmutableField { field } => write!(f, "{} cannot be set by the client", field),
            Self::InvalidId { value } => write!(f, "invalid identifier: '{}'", value),
            Self::InvalidFormat { field, reason } => write!(f, "{}: {}", field, reason),
            Self::UnknownReference { field, id } => {
                write!(f, "{} references '{}', which does not exist", field, id)
            }
            Self::NotFilterable { field } => write!(f, "{} cannot be used as a filter", field),
            Self::EmptyUpdate => write!(f, "no fields provided for update"),
        }
    }
}

impl std::error::Error for ValidationError {}
