//! Transport error types.

use thiserror::Error;

/// Transport error type.
#[derive(Error, Debug)]
pub enum TransportError {
    /// MQTT client request error
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Not connected error
    #[error("Not connected to broker")]
    NotConnected,

    /// Bounded retry gave up
    #[error("Publish to {topic} failed after {attempts} attempts")]
    PublishExhausted { topic: String, attempts: u32 },

    /// Reconnect backoff gave up
    #[error("Reconnect gave up after {0} attempts")]
    ReconnectExhausted(u32),

    /// Payload did not match the expected wire format
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using TransportError.
pub type TransportResult<T> = Result<T, TransportError>;
