//! # Observability
//!
//! Centralized structured logging for the shotlink producer and receiver.
//!
//! Services call [`init_with_config`] once at startup and use the standard
//! `tracing` macros everywhere else. Every event is appended as one JSON line
//! to a central log file (`~/.shotlink/logs/shotlink.jsonl` unless
//! overridden), so a producer and a receiver running on the same host share
//! a single stream:
//!
//! - `tail -f ~/.shotlink/logs/shotlink.jsonl | jq` for pretty JSON
//! - `jq 'select(.record_id == "r2")'` to follow one record
//!
//! Multi-process safety comes from append-only writes flushed per line.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "shotlink-producer".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! })?;
//! tracing::info!("producer started");
//! ```

mod central;
mod json_layer;

use std::io;
use std::path::PathBuf;

pub use central::{default_log_path, CentralLogWriter};
pub use json_layer::{JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g. "shotlink-producer").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g. "debug", "info", "warn").
    /// Overridden by the `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.shotlink/logs/shotlink.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact human-readable logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with default settings for the named service.
pub fn init(service_name: &str) -> io::Result<PathBuf> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Initialize logging with custom configuration.
///
/// Returns the path of the JSONL file the service writes to. Fails only if
/// that file cannot be opened. A second call in the same process is a no-op
/// apart from opening the file, because the global subscriber is already set.
pub fn init_with_config(config: LogConfig) -> io::Result<PathBuf> {
    central::init_central_subscriber(&config)
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }
}
