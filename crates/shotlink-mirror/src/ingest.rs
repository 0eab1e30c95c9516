//! Inbound message handling on the receiver.

use crate::{Acknowledger, MirrorResult};
use shotlink_database::{queries, AsyncDatabase, MachineStatusRecord, RecordTable};
use shotlink_transport::{DataMessage, HeartbeatMessage};
use tracing::{debug, info, warn};

/// Receiver's copy of delivered records.
#[derive(Clone)]
pub struct MirrorStore {
    db: AsyncDatabase,
}

impl MirrorStore {
    pub fn new(db: AsyncDatabase) -> Self {
        Self { db }
    }

    pub async fn upsert(&self, record: MachineStatusRecord) -> MirrorResult<()> {
        self.db
            .call(move |conn| queries::upsert_record(conn, RecordTable::Received, &record))
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> MirrorResult<Option<MachineStatusRecord>> {
        let id = id.to_string();
        Ok(self
            .db
            .call(move |conn| queries::get_record(conn, RecordTable::Received, &id))
            .await?)
    }

    pub async fn count(&self) -> MirrorResult<usize> {
        let count = self
            .db
            .call(|conn| queries::count_records(conn, RecordTable::Received))
            .await?;
        Ok(count as usize)
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A data record was stored; carries its id.
    Stored(String),
    /// A heartbeat was answered; carries its id.
    HeartbeatAcknowledged(String),
    /// The payload was malformed: no write, no ack.
    Discarded,
    /// The topic is not one the mirror handles.
    Ignored,
}

pub struct MessageIngest {
    store: MirrorStore,
    acknowledger: Acknowledger,
    data_topic: String,
    heartbeat_topic: String,
}

impl MessageIngest {
    pub fn new(
        store: MirrorStore,
        acknowledger: Acknowledger,
        data_topic: impl Into<String>,
        heartbeat_topic: impl Into<String>,
    ) -> Self {
        Self {
            store,
            acknowledger,
            data_topic: data_topic.into(),
            heartbeat_topic: heartbeat_topic.into(),
        }
    }

    /// Handle one inbound message.
    ///
    /// Data is upserted before it is acknowledged, so an ack always means the
    /// record is durable. A store failure is returned as an error and no ack
    /// is sent.
    pub async fn handle(&self, topic: &str, payload: &[u8]) -> MirrorResult<IngestOutcome> {
        if topic == self.data_topic {
            let message = match DataMessage::parse(payload) {
                Ok(message) => message,
                Err(e) => {
                    warn!(topic, error = %e, "Discarding malformed data message");
                    return Ok(IngestOutcome::Discarded);
                }
            };

            let id = message.id.clone();
            self.store.upsert(message.into_record()).await?;
            self.acknowledger.acknowledge(&id).await;
            info!(record_id = %id, "Record stored and acknowledged");
            Ok(IngestOutcome::Stored(id))
        } else if topic == self.heartbeat_topic {
            let heartbeat = match HeartbeatMessage::parse(payload) {
                Ok(heartbeat) => heartbeat,
                Err(e) => {
                    warn!(topic, error = %e, "Discarding malformed heartbeat");
                    return Ok(IngestOutcome::Discarded);
                }
            };

            self.acknowledger.acknowledge(&heartbeat.id).await;
            debug!(heartbeat_id = %heartbeat.id, "Heartbeat acknowledged");
            Ok(IngestOutcome::HeartbeatAcknowledged(heartbeat.id))
        } else {
            debug!(topic, "Ignoring message on unhandled topic");
            Ok(IngestOutcome::Ignored)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shotlink_transport::{AckMessage, MemoryBroker, Publisher, Transport, TransportEvent};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast;

    const VALID: &[u8] = br#"{"_id":"r1","data.machine_id":5,"data.machine_status":true,
        "data.shot_count":77,"data.shot_status":1,"data.status":"running",
        "updated_on":"2024-03-01T10:00:00"}"#;

    struct Fixture {
        ingest: MessageIngest,
        store: MirrorStore,
        acks: broadcast::Receiver<TransportEvent>,
        _listener: shotlink_transport::MemoryTransport,
    }

    async fn fixture() -> Fixture {
        let broker = MemoryBroker::new();
        let receiver = Arc::new(broker.client());
        receiver.connect().await.unwrap();

        let listener = broker.client();
        listener.subscribe("try_ack").await.unwrap();
        listener.connect().await.unwrap();
        let acks = listener.events();

        let store = MirrorStore::new(AsyncDatabase::open_in_memory().await.unwrap());
        let acknowledger = Acknowledger::new(
            Publisher::new(receiver, 3, Duration::from_millis(5)),
            "try_ack",
        );
        let ingest = MessageIngest::new(store.clone(), acknowledger, "try", "try_heartbeat");

        Fixture {
            ingest,
            store,
            acks,
            _listener: listener,
        }
    }

    fn drain_acks(rx: &mut broadcast::Receiver<TransportEvent>) -> Vec<AckMessage> {
        let mut acks = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TransportEvent::Message(message) = event {
                acks.push(AckMessage::parse(&message.payload).unwrap());
            }
        }
        acks
    }

    #[tokio::test]
    async fn test_valid_data_is_stored_then_acked() {
        let mut f = fixture().await;

        let outcome = f.ingest.handle("try", VALID).await.unwrap();

        assert_eq!(outcome, IngestOutcome::Stored("r1".to_string()));
        let stored = f.store.get("r1").await.unwrap().unwrap();
        assert_eq!(stored.shot_count, 77);
        assert_eq!(drain_acks(&mut f.acks), vec![AckMessage::received("r1")]);
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let mut f = fixture().await;

        f.ingest.handle("try", VALID).await.unwrap();
        f.ingest.handle("try", VALID).await.unwrap();

        assert_eq!(f.store.count().await.unwrap(), 1);
        assert_eq!(drain_acks(&mut f.acks).len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_data_is_discarded_without_ack() {
        let mut f = fixture().await;

        for payload in [
            &b"{broken"[..],
            &br#"{"_id":"r2","data.machine_id":5}"#[..],
            &br#"{"_id":"","data.machine_id":5,"data.machine_status":true,"data.shot_count":1,
                "data.shot_status":1,"data.status":"x","updated_on":"2024-03-01T10:00:00"}"#[..],
        ] {
            let outcome = f.ingest.handle("try", payload).await.unwrap();
            assert_eq!(outcome, IngestOutcome::Discarded);
        }

        assert_eq!(f.store.count().await.unwrap(), 0);
        assert!(drain_acks(&mut f.acks).is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_is_acked_without_write() {
        let mut f = fixture().await;

        let outcome = f
            .ingest
            .handle("try_heartbeat", br#"{"_id":"heartbeat","ack":"ping"}"#)
            .await
            .unwrap();

        assert_eq!(outcome, IngestOutcome::HeartbeatAcknowledged("heartbeat".to_string()));
        assert_eq!(f.store.count().await.unwrap(), 0);
        assert_eq!(drain_acks(&mut f.acks), vec![AckMessage::received("heartbeat")]);
    }

    #[tokio::test]
    async fn test_other_topics_are_ignored() {
        let mut f = fixture().await;

        let outcome = f.ingest.handle("elsewhere", VALID).await.unwrap();

        assert_eq!(outcome, IngestOutcome::Ignored);
        assert_eq!(f.store.count().await.unwrap(), 0);
        assert!(drain_acks(&mut f.acks).is_empty());
    }
}
