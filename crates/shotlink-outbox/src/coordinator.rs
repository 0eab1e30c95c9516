//! Delivery coordinator.
//!
//! Per record: publish, wait for the ack, backlog on timeout, and always
//! write the primary store. Publish failures are logged and never stop the
//! pipeline; store failures are fatal.

use crate::{AckTracker, BacklogStore, OutboxResult, RecordStore};
use shotlink_database::MachineStatusRecord;
use shotlink_source::RecordSource;
use shotlink_transport::{DataMessage, Publisher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// How a single delivery resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The receiver acknowledged within the wait window.
    Acknowledged,
    /// No ack in time; the record is in the backlog.
    Backlogged,
}

pub struct DeliveryCoordinator {
    publisher: Publisher,
    tracker: Arc<AckTracker>,
    backlog: BacklogStore,
    store: RecordStore,
    data_topic: String,
    ack_wait: Duration,
    poll_interval: Duration,
}

impl DeliveryCoordinator {
    pub fn new(
        publisher: Publisher,
        tracker: Arc<AckTracker>,
        backlog: BacklogStore,
        store: RecordStore,
        data_topic: impl Into<String>,
        ack_wait: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            publisher,
            tracker,
            backlog,
            store,
            data_topic: data_topic.into(),
            ack_wait,
            poll_interval,
        }
    }

    /// Deliver one record.
    pub async fn deliver(&self, record: &MachineStatusRecord) -> OutboxResult<DeliveryOutcome> {
        let payload = DataMessage::from(record).to_payload()?;

        // An ack already held for this id answers an earlier publish.
        self.tracker.forget(&record.id);
        if let Err(e) = self.publisher.publish(&self.data_topic, &payload).await {
            warn!(record_id = %record.id, error = %e, "Data publish dropped");
        }

        let acknowledged = self
            .tracker
            .wait_for(&record.id, self.ack_wait, self.poll_interval)
            .await;

        let outcome = if acknowledged {
            info!(record_id = %record.id, "Record acknowledged");
            DeliveryOutcome::Acknowledged
        } else {
            warn!(
                record_id = %record.id,
                wait_ms = self.ack_wait.as_millis() as u64,
                "No acknowledgment, storing in backlog"
            );
            self.backlog.insert(record).await?;
            DeliveryOutcome::Backlogged
        };

        self.store.upsert(record).await?;
        self.tracker.forget(&record.id);
        Ok(outcome)
    }

    /// Deliver records from `source` in schedule order until it is exhausted
    /// or shutdown is signalled.
    pub async fn run(
        &self,
        mut source: Box<dyn RecordSource>,
        mut shutdown: watch::Receiver<bool>,
    ) -> OutboxResult<()> {
        info!(pending = source.remaining(), "Delivery coordinator started");

        loop {
            let next = tokio::select! {
                _ = shutdown.changed() => {
                    info!("Delivery coordinator stopping");
                    return Ok(());
                }
                next = source.next_record() => next?,
            };

            let Some(record) = next else {
                info!("Record source exhausted");
                return Ok(());
            };

            self.deliver(&record).await?;
            source.mark_consumed(&record.id).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;
    use shotlink_database::AsyncDatabase;
    use shotlink_source::VecRecordSource;
    use shotlink_transport::{AckMessage, MemoryBroker, Transport, TransportEvent};

    struct Fixture {
        coordinator: DeliveryCoordinator,
        tracker: Arc<AckTracker>,
        backlog: BacklogStore,
        store: RecordStore,
        broker: MemoryBroker,
    }

    async fn fixture() -> Fixture {
        let broker = MemoryBroker::new();
        let client = Arc::new(broker.client());
        client.connect().await.unwrap();

        let db = AsyncDatabase::open_in_memory().await.unwrap();
        let tracker = Arc::new(AckTracker::new(Duration::from_secs(600), 100));
        let backlog = BacklogStore::new(db.clone());
        let store = RecordStore::new(db);
        let coordinator = DeliveryCoordinator::new(
            Publisher::new(client, 3, Duration::from_millis(5)),
            tracker.clone(),
            backlog.clone(),
            store.clone(),
            "try",
            Duration::from_millis(200),
            Duration::from_millis(20),
        );

        Fixture {
            coordinator,
            tracker,
            backlog,
            store,
            broker,
        }
    }

    /// A receiver stand-in that acks every data message.
    async fn spawn_auto_acker(broker: &MemoryBroker) {
        let client = broker.client();
        client.subscribe("try").await.unwrap();
        client.connect().await.unwrap();
        let mut events = client.events();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let TransportEvent::Message(message) = event {
                    let data = DataMessage::parse(&message.payload).unwrap();
                    let ack = AckMessage::received(data.id).to_payload().unwrap();
                    client.publish("try_ack", &ack).await.unwrap();
                }
            }
        });
    }

    #[tokio::test]
    async fn test_ack_in_window_is_not_backlogged() {
        let f = fixture().await;
        let tracker = f.tracker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            tracker.record_ack("r1");
        });

        let outcome = f.coordinator.deliver(&record("r1")).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Acknowledged);
        assert!(!f.backlog.contains("r1").await.unwrap());
        assert!(f.store.get("r1").await.unwrap().is_some());
        assert!(!f.tracker.is_acknowledged("r1"));
    }

    #[tokio::test]
    async fn test_missing_ack_goes_to_backlog_and_primary() {
        let f = fixture().await;

        let outcome = f.coordinator.deliver(&record("r2")).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Backlogged);
        assert!(f.backlog.contains("r2").await.unwrap());
        assert!(f.store.get("r2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ack_held_from_earlier_publish_does_not_count() {
        let f = fixture().await;
        f.tracker.record_ack("r1");

        let outcome = f.coordinator.deliver(&record("r1")).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Backlogged);
        assert!(f.backlog.contains("r1").await.unwrap());
    }

    #[tokio::test]
    async fn test_publish_failure_still_advances() {
        let f = fixture().await;
        f.broker.fail_next_publishes(10);

        let outcome = f.coordinator.deliver(&record("r3")).await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Backlogged);
        assert_eq!(f.store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_consumes_source() {
        let f = fixture().await;
        spawn_auto_acker(&f.broker).await;

        // Route acks straight into the tracker.
        let ack_client = f.broker.client();
        ack_client.subscribe("try_ack").await.unwrap();
        ack_client.connect().await.unwrap();
        let mut acks = ack_client.events();
        let tracker = f.tracker.clone();
        tokio::spawn(async move {
            while let Ok(event) = acks.recv().await {
                if let TransportEvent::Message(message) = event {
                    tracker.record_ack(&AckMessage::parse(&message.payload).unwrap().id);
                }
            }
        });

        let source = VecRecordSource::new([record("a"), record("b"), record("c")]);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        f.coordinator.run(Box::new(source), shutdown_rx).await.unwrap();

        assert_eq!(f.store.count().await.unwrap(), 3);
        assert_eq!(f.backlog.count().await.unwrap(), 0);
    }
}
