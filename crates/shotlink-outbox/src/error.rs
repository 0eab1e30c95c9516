//! Outbox error types.

use thiserror::Error;

/// Outbox error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] shotlink_database::DatabaseError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] shotlink_transport::TransportError),

    /// Record source error
    #[error("Source error: {0}")]
    Source(#[from] shotlink_source::SourceError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
