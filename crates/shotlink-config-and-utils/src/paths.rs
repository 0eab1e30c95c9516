//! File system paths for the producer and receiver.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

const PRODUCER_DATABASE_NAME: &str = "producer.sqlite";
const RECEIVER_DATABASE_NAME: &str = "receiver.sqlite";

/// Manages file system paths under the shotlink base directory.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.shotlink)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.shotlink`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".shotlink"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.shotlink).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.shotlink/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Producer database: primary store, backlog, raw acknowledgment log.
    pub fn producer_database_file(&self) -> PathBuf {
        self.base_dir.join(PRODUCER_DATABASE_NAME)
    }

    /// Receiver database: mirrored records.
    pub fn receiver_database_file(&self) -> PathBuf {
        self.base_dir.join(RECEIVER_DATABASE_NAME)
    }

    /// Get the logs directory (~/.shotlink/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Central JSONL log file shared by both services.
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("shotlink.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
