//! Free-form metadata attached to routes.
//!
//! Metadata lives in its own store keyed by `(entity, entity id)`. Values must be scalars;
//! the limits below are enforced before anything is written.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ledgerline_shared::{DomainError, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Longest accepted metadata key.
pub const MAX_KEY_LEN: usize = 100;

/// Longest accepted string value.
pub const MAX_VALUE_LEN: usize = 2000;

/// Entity kinds that carry metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataEntity {
    /// An operation route.
    OperationRoute,
    /// A transaction route.
    TransactionRoute,
}

impl MetadataEntity {
    /// Collection name used by the metadata store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OperationRoute => "OperationRoute",
            Self::TransactionRoute => "TransactionRoute",
        }
    }
}

/// A stored metadata document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    /// ID of the entity the document belongs to.
    pub entity_id: String,
    /// The metadata itself.
    pub data: Map<String, Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl MetadataRecord {
    /// Creates a record stamped with `now`.
    #[must_use]
    pub fn new(entity_id: impl Into<String>, data: Map<String, Value>, now: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether every filter pair equals the stored value.
    ///
    /// String values compare verbatim; other scalars compare by their JSON rendering.
    #[must_use]
    pub fn matches(&self, filter: &BTreeMap<String, String>) -> bool {
        filter.iter().all(|(key, expected)| match self.data.get(key) {
            Some(Value::String(s)) => s == expected,
            Some(other) => other.to_string() == *expected,
            None => false,
        })
    }
}

/// Metadata validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// A key is blank.
    #[error("metadata keys must not be empty")]
    EmptyKey,

    /// A key exceeds [`MAX_KEY_LEN`].
    #[error("metadata key '{0}' exceeds {MAX_KEY_LEN} characters")]
    KeyTooLong(String),

    /// A string value exceeds [`MAX_VALUE_LEN`].
    #[error("metadata value for '{0}' exceeds {MAX_VALUE_LEN} characters")]
    ValueTooLong(String),

    /// A value is an object or array.
    #[error("metadata value for '{0}' must be a scalar")]
    NestedValue(String),
}

impl DomainError for MetadataError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyKey | Self::KeyTooLong(_) => "INVALID_METADATA_KEY",
            Self::ValueTooLong(_) => "INVALID_METADATA_VALUE",
            Self::NestedValue(_) => "NESTED_METADATA",
        }
    }
}

/// Checks a metadata document against the key and value limits.
///
/// # Errors
///
/// Returns the first offending entry.
pub fn validate_metadata(data: &Map<String, Value>) -> Result<(), MetadataError> {
    for (key, value) in data {
        if key.trim().is_empty() {
            return Err(MetadataError::EmptyKey);
        }
        if key.chars().count() > MAX_KEY_LEN {
            return Err(MetadataError::KeyTooLong(key.clone()));
        }
        match value {
            Value::Object(_) | Value::Array(_) => {
                return Err(MetadataError::NestedValue(key.clone()));
            }
            Value::String(s) if s.chars().count() > MAX_VALUE_LEN => {
                return Err(MetadataError::ValueTooLong(key.clone()));
            }
            _ => {}
        }
    }
    Ok(())
}
