//! Error types for MPDB
//!
//! Provides a unified error type for all operations, plus the mapping from
//! each failure class onto the status code sent back to clients.

use thiserror::Error;

/// Result type alias using MpdbError
pub type Result<T> = std::result::Result<T, MpdbError>;

/// Unified error type for MPDB operations
#[derive(Debug, Error)]
pub enum MpdbError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Input Errors
    // -------------------------------------------------------------------------
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Collection not found: {collection} in database {database}")]
    CollectionNotFound { database: String, collection: String },

    #[error("Document not found: {id} in collection {collection}")]
    DocumentNotFound { collection: String, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    // -------------------------------------------------------------------------
    // Access Errors
    // -------------------------------------------------------------------------
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Login failed")]
    InvalidCredentials,

    #[error("Access denied: {0}")]
    PermissionDenied(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MpdbError {
    /// Shorthand for a validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        MpdbError::Validation(message.into())
    }

    /// True for any of the level-specific absence errors
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MpdbError::DatabaseNotFound(_)
                | MpdbError::CollectionNotFound { .. }
                | MpdbError::DocumentNotFound { .. }
        )
    }

    /// Status code reported to the client for this error
    pub fn status_code(&self) -> u16 {
        match self {
            MpdbError::Validation(_) | MpdbError::Json(_) | MpdbError::Protocol(_) => 400,
            MpdbError::Unauthenticated | MpdbError::InvalidCredentials => 401,
            MpdbError::PermissionDenied(_) => 403,
            MpdbError::DatabaseNotFound(_)
            | MpdbError::CollectionNotFound { .. }
            | MpdbError::DocumentNotFound { .. } => 404,
            MpdbError::Conflict(_) => 409,
            MpdbError::Io(_) | MpdbError::Config(_) => 500,
        }
    }
}
