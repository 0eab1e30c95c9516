//! Bounded-retry publish.

use crate::{Transport, TransportError, TransportResult};
use shotlink_config_and_utils::RetryConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Publishes with a fixed number of attempts and a fixed delay between them.
///
/// Used for every outbound message. On exhaustion the message is dropped and
/// `PublishExhausted` is returned; callers log it and move on.
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn Transport>,
    attempts: u32,
    delay: Duration,
}

impl Publisher {
    pub fn new(transport: Arc<dyn Transport>, attempts: u32, delay: Duration) -> Self {
        Self {
            transport,
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn from_config(transport: Arc<dyn Transport>, config: &RetryConfig) -> Self {
        Self::new(transport, config.publish_attempts, config.publish_retry_delay())
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Publish `payload` to `topic`, retrying on failure.
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> TransportResult<()> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.transport.publish(topic, payload).await {
                Ok(()) => {
                    debug!(topic, attempt, bytes = payload.len(), "Published");
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.attempts {
                        error!(topic, attempt, error = %e, "Publish failed, dropping message");
                        return Err(TransportError::PublishExhausted {
                            topic: topic.to_string(),
                            attempts: attempt,
                        });
                    }

                    warn!(
                        topic,
                        attempt,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %e,
                        "Publish failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}
