//! Configuration management for the producer and receiver.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default broker host.
pub const DEFAULT_BROKER_HOST: &str = "broker.emqx.io";

/// Default broker port (plain MQTT).
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const ENV_LOG_LEVEL: &str = "SHOTLINK_LOG_LEVEL";
const ENV_BROKER_HOST: &str = "SHOTLINK_BROKER_HOST";
const ENV_BROKER_PORT: &str = "SHOTLINK_BROKER_PORT";

/// Main configuration shared by both sides of the link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub topics: TopicConfig,
    #[serde(default)]
    pub reliability: ReliabilityConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix for the per-process client id; a random suffix is appended.
    pub client_id_prefix: String,
    /// MQTT keep-alive in seconds.
    pub keep_alive_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BROKER_HOST.to_string(),
            port: DEFAULT_BROKER_PORT,
            client_id_prefix: "shotlink".to_string(),
            keep_alive_secs: 30,
        }
    }
}

/// Topic names for the three channels of the protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub data: String,
    pub ack: String,
    pub heartbeat: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            data: "try".to_string(),
            ack: "try_ack".to_string(),
            heartbeat: "try_heartbeat".to_string(),
        }
    }
}

/// Acknowledgment and liveness timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityConfig {
    /// Heartbeat emission period, also the resend scheduler tick.
    pub heartbeat_interval_ms: u64,
    /// How long a send waits for its acknowledgment.
    pub ack_wait_ms: u64,
    /// Maximum gap between re-checks of the acknowledgment set.
    pub ack_poll_interval_ms: u64,
    /// How long an unclaimed acknowledgment is retained.
    pub ack_retention_secs: u64,
    /// Upper bound on retained acknowledgments.
    pub ack_capacity: usize,
    /// Silence after which the consumer is reported offline.
    pub offline_after_ms: u64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 10_000,
            ack_wait_ms: 2_000,
            ack_poll_interval_ms: 100,
            ack_retention_secs: 600,
            ack_capacity: 10_000,
            offline_after_ms: 30_000,
        }
    }
}

impl ReliabilityConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn ack_wait(&self) -> Duration {
        Duration::from_millis(self.ack_wait_ms)
    }

    pub fn ack_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ack_poll_interval_ms)
    }

    pub fn ack_retention(&self) -> Duration {
        Duration::from_secs(self.ack_retention_secs)
    }

    pub fn offline_after(&self) -> Duration {
        Duration::from_millis(self.offline_after_ms)
    }
}

/// Publish retry and reconnect backoff policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per outbound message before it is dropped.
    pub publish_attempts: u32,
    /// Fixed delay between publish attempts.
    pub publish_retry_delay_ms: u64,
    /// Connection attempts after a disconnect before giving up for good.
    pub reconnect_max_attempts: u32,
    /// First reconnect delay; doubles after every failed attempt.
    pub reconnect_base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            publish_attempts: 3,
            publish_retry_delay_ms: 2_000,
            reconnect_max_attempts: 5,
            reconnect_base_delay_ms: 2_000,
        }
    }
}

impl RetryConfig {
    pub fn publish_retry_delay(&self) -> Duration {
        Duration::from_millis(self.publish_retry_delay_ms)
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            broker: BrokerConfig::default(),
            topics: TopicConfig::default(),
            reliability: ReliabilityConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `<base_dir>/config.json`, falling back to
    /// defaults, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.with_env_overrides()
    }

    /// Load configuration from a specific file. Missing keys take defaults.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `<base_dir>/config.json`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Apply `SHOTLINK_*` environment overrides.
    pub fn with_env_overrides(self) -> CoreResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(host) = lookup(ENV_BROKER_HOST) {
            self.broker.host = host;
        }
        if let Some(port) = lookup(ENV_BROKER_PORT) {
            self.broker.port = port.trim().parse().map_err(|_| {
                CoreError::Config(format!("{ENV_BROKER_PORT} is not a valid port: {port}"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings that would make the reliability loops spin or stall.
    pub fn validate(&self) -> CoreResult<()> {
        if self.broker.host.trim().is_empty() {
            return Err(CoreError::Config("broker.host must not be empty".into()));
        }
        let topics = [&self.topics.data, &self.topics.ack, &self.topics.heartbeat];
        if topics.iter().any(|t| t.trim().is_empty()) {
            return Err(CoreError::Config("topic names must not be empty".into()));
        }
        if let Some(topic) = topics.iter().find(|t| t.contains(['+', '#'])) {
            return Err(CoreError::Config(format!(
                "topic {topic:?} contains an MQTT wildcard; publish topics must be literal"
            )));
        }
        if topics[0] == topics[1] || topics[0] == topics[2] || topics[1] == topics[2] {
            return Err(CoreError::Config("topic names must be distinct".into()));
        }

        let r = &self.reliability;
        if r.heartbeat_interval_ms == 0 || r.ack_wait_ms == 0 || r.ack_poll_interval_ms == 0 {
            return Err(CoreError::Config(
                "heartbeat interval, ack wait and poll interval must be positive".into(),
            ));
        }
        if r.ack_capacity == 0 {
            return Err(CoreError::Config("reliability.ack_capacity must be positive".into()));
        }
        if self.retry.publish_attempts == 0 || self.retry.reconnect_max_attempts == 0 {
            return Err(CoreError::Config("retry attempt counts must be at least 1".into()));
        }
        Ok(())
    }
}
