//! Inbound acknowledgment handling on the producer.

use crate::{AckTracker, LivenessMonitor, OutboxResult, RecordStore};
use shotlink_transport::{AckMessage, TransportEvent};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Routes ack-topic messages: heartbeat acks to the liveness monitor, record
/// acks to the tracker. Every well-formed ack is logged to the store first.
pub struct AckHandler {
    tracker: Arc<AckTracker>,
    liveness: Arc<LivenessMonitor>,
    store: RecordStore,
    ack_topic: String,
}

impl AckHandler {
    pub fn new(
        tracker: Arc<AckTracker>,
        liveness: Arc<LivenessMonitor>,
        store: RecordStore,
        ack_topic: impl Into<String>,
    ) -> Self {
        Self {
            tracker,
            liveness,
            store,
            ack_topic: ack_topic.into(),
        }
    }

    /// Handle one ack payload. Malformed payloads are dropped with a warning;
    /// only a store failure is an error.
    pub async fn handle(&self, payload: &[u8]) -> OutboxResult<()> {
        let ack = match AckMessage::parse(payload) {
            Ok(ack) => ack,
            Err(e) => {
                warn!(error = %e, "Dropping malformed acknowledgment");
                return Ok(());
            }
        };
        if ack.id.is_empty() {
            warn!("Dropping acknowledgment with empty _id");
            return Ok(());
        }

        let raw: serde_json::Value = serde_json::from_slice(payload)?;
        self.store.log_acknowledgment(&ack.id, raw).await?;

        if !ack.is_received() {
            debug!(record_id = %ack.id, ack = %ack.ack, "Ignoring acknowledgment marker");
            return Ok(());
        }

        if ack.is_heartbeat() {
            self.liveness.mark_online();
        } else {
            let woken = self.tracker.record_ack(&ack.id);
            debug!(record_id = %ack.id, woken, "Acknowledgment received");
        }
        Ok(())
    }

    /// Consume transport events until shutdown.
    ///
    /// Takes a receiver created before the transport connected, so acks that
    /// race the first subscription are not missed.
    pub async fn run(
        &self,
        mut events: broadcast::Receiver<TransportEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> OutboxResult<()> {
        info!(topic = %self.ack_topic, "Acknowledgment handler started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Acknowledgment handler stopping");
                    return Ok(());
                }
                event = events.recv() => match event {
                    Ok(TransportEvent::Message(message)) if message.topic == self.ack_topic => {
                        self.handle(&message.payload).await?;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Acknowledgment handler lagged, skipped acks will time out");
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
    use crate::LivenessState;
    use shotlink_database::AsyncDatabase;
    use std::time::Duration;

    async fn handler() -> (AckHandler, Arc<AckTracker>, Arc<LivenessMonitor>, RecordStore) {
        let tracker = Arc::new(AckTracker::new(Duration::from_secs(600), 100));
        let liveness = Arc::new(LivenessMonitor::new(Duration::from_secs(30)));
        let store = RecordStore::new(AsyncDatabase::open_in_memory().await.unwrap());
        let handler = AckHandler::new(tracker.clone(), liveness.clone(), store.clone(), "try_ack");
        (handler, tracker, liveness, store)
    }

    #[tokio::test]
    async fn test_record_ack_reaches_tracker_and_log() {
        let (handler, tracker, liveness, store) = handler().await;

        handler.handle(br#"{"_id":"r1","ack":"received"}"#).await.unwrap();

        assert!(tracker.is_acknowledged("r1"));
        assert!(!liveness.take_online_edge());
        assert_eq!(
            store.logged_acknowledgment("r1").await.unwrap(),
            Some(serde_json::json!({"_id": "r1", "ack": "received"}))
        );
    }

    #[tokio::test]
    async fn test_heartbeat_ack_sets_online_once() {
        let (handler, tracker, liveness, _store) = handler().await;

        handler.handle(br#"{"_id":"heartbeat","ack":"received"}"#).await.unwrap();

        assert_eq!(liveness.state(), LivenessState::Online);
        assert!(liveness.take_online_edge());
        assert!(!liveness.take_online_edge());
        assert!(!tracker.is_acknowledged("heartbeat"));
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_acks_are_dropped() {
        let (handler, tracker, liveness, store) = handler().await;

        handler.handle(b"{not json").await.unwrap();
        handler.handle(br#"{"ack":"received"}"#).await.unwrap();
        handler.handle(br#"{"_id":"","ack":"received"}"#).await.unwrap();
        handler.handle(br#"{"_id":"r9","ack":"rejected"}"#).await.unwrap();

        assert!(tracker.is_empty());
        assert!(!liveness.take_online_edge());
        // Well-formed acks are logged even with an unknown marker.
        assert!(store.logged_acknowledgment("r9").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_ack_is_harmless() {
        let (handler, tracker, _liveness, _store) = handler().await;

        handler.handle(br#"{"_id":"r1","ack":"received"}"#).await.unwrap();
        handler.handle(br#"{"_id":"r1","ack":"received"}"#).await.unwrap();

        assert_eq!(tracker.len(), 1);
    }
}
