//! Mirror error types.

use thiserror::Error;

/// Mirror error type.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] shotlink_database::DatabaseError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] shotlink_transport::TransportError),
}

/// Result type alias using MirrorError.
pub type MirrorResult<T> = Result<T, MirrorError>;
