//! Reconnect with exponential backoff.

use crate::{Transport, TransportError, TransportEvent, TransportResult};
use shotlink_config_and_utils::RetryConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Restores the broker connection after a disconnect.
///
/// Each recovery makes up to `max_attempts` connection attempts. The first is
/// immediate; after each failure the manager sleeps, starting at `base_delay`
/// and doubling. Exhaustion is permanent and surfaces as
/// `ReconnectExhausted`, which the process treats as fatal.
///
/// The manager subscribes to transport events when it is created, so no
/// disconnect after construction is missed.
pub struct ReconnectManager {
    transport: Arc<dyn Transport>,
    events: broadcast::Receiver<TransportEvent>,
    max_attempts: u32,
    base_delay: Duration,
}

impl ReconnectManager {
    pub fn new(transport: Arc<dyn Transport>, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            events: transport.events(),
            transport,
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(transport: Arc<dyn Transport>, config: &RetryConfig) -> Self {
        Self::new(
            transport,
            config.reconnect_max_attempts,
            config.reconnect_base_delay(),
        )
    }

    /// Run one recovery cycle.
    pub async fn reconnect(&self) -> TransportResult<()> {
        let mut delay = self.base_delay;

        for attempt in 1..=self.max_attempts {
            info!(attempt, max_attempts = self.max_attempts, "Reconnecting to broker");

            match self.transport.connect().await {
                Ok(()) => {
                    info!(attempt, "Reconnected to broker");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Reconnect attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }

        error!(max_attempts = self.max_attempts, "Max reconnect attempts reached");
        Err(TransportError::ReconnectExhausted(self.max_attempts))
    }

    /// Watch transport events and recover from every disconnect until
    /// shutdown. Returns an error only when a recovery cycle is exhausted.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> TransportResult<()> {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Reconnect manager stopping");
                    return Ok(());
                }
                event = self.events.recv() => match event {
                    Ok(TransportEvent::Disconnected(reason)) => {
                        if *shutdown.borrow() {
                            return Ok(());
                        }
                        warn!(reason = reason.as_deref().unwrap_or("unknown"), "Broker connection lost");
                        if !self.transport.is_connected() {
                            self.reconnect().await?;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Reconnect manager lagged behind transport events");
                        if !self.transport.is_connected() {
                            self.reconnect().await?;
                        }
                    }
                    Err(RecvError::Closed) => return Ok(()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBroker;

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_backoff_doubles_and_gives_up() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        let manager = ReconnectManager::new(Arc::new(broker.client()), 5, Duration::from_secs(2));

        let started = tokio::time::Instant::now();
        let result = manager.reconnect().await;

        assert!(matches!(result, Err(TransportError::ReconnectExhausted(5))));
        // 2 + 4 + 8 + 16 + 32
        assert_eq!(started.elapsed(), Duration::from_secs(62));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_succeeds_when_broker_returns() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        let client = Arc::new(broker.client());
        let manager = ReconnectManager::new(client.clone(), 5, Duration::from_secs(2));

        let restore = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            restore.set_available(true);
        });

        manager.reconnect().await.unwrap();
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_run_recovers_dropped_connection() {
        let broker = MemoryBroker::new();
        let client = Arc::new(broker.client());
        client.connect().await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = ReconnectManager::new(client.clone(), 3, Duration::from_millis(10));
        let handle = tokio::spawn(manager.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(10)).await;

        broker.drop_connections();
        for _ in 0..50 {
            if client.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(client.is_connected());

        shutdown_tx.send(true).unwrap();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_run_fails_when_exhausted() {
        let broker = MemoryBroker::new();
        let client = Arc::new(broker.client());
        client.connect().await.unwrap();

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = ReconnectManager::new(client, 2, Duration::from_millis(5));
        let handle = tokio::spawn(manager.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(10)).await;

        broker.set_available(false);
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(TransportError::ReconnectExhausted(2))));
    }
}
