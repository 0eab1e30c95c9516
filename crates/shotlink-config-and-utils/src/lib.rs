//! Configuration, file system paths, and logging bootstrap shared by the
//! shotlink producer and receiver.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    BrokerConfig, Config, ReliabilityConfig, RetryConfig, TopicConfig, DEFAULT_BROKER_HOST,
    DEFAULT_BROKER_PORT, DEFAULT_LOG_LEVEL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
