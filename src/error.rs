//! Error types for backstage-core

use thiserror::Error;

/// Errors that can occur in the audit, event, and repository layers
#[derive(Debug, Error)]
pub enum CoreError {
    /// Update or delete targeted an entity that does not exist in the tenant
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Create collided with an existing identifier
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: String, id: String },

    /// A record, event, or input violated a model invariant
    #[error("Validation error: {0}")]
    Validation(String),

    /// API key authentication failure
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// File-backed store I/O failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// An event handler rejected a delivery
    #[error("Handler '{subscriber}' failed: {reason}")]
    Handler { subscriber: String, reason: String },
}

impl CoreError {
    pub(crate) fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Result type alias for backstage-core operations
pub type Result<T> = std::result::Result<T, CoreError>;
