//! Source error types.

use thiserror::Error;

/// Source error type.
#[derive(Error, Debug)]
pub enum SourceError {
    /// CSV read error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A row could not be turned into a record
    #[error("Invalid row {line}: {reason}")]
    InvalidRow { line: u64, reason: String },
}

/// Result type alias using SourceError.
pub type SourceResult<T> = Result<T, SourceError>;
