//! Producer's primary store and acknowledgment log.

use crate::OutboxResult;
use shotlink_database::{queries, AsyncDatabase, MachineStatusRecord, RecordTable};

/// Every record the producer handles lands in `machine_status_records`,
/// delivered or not. Raw ack payloads go to `raw_acknowledgments`.
#[derive(Clone)]
pub struct RecordStore {
    db: AsyncDatabase,
}

impl RecordStore {
    pub fn new(db: AsyncDatabase) -> Self {
        Self { db }
    }

    pub async fn upsert(&self, record: &MachineStatusRecord) -> OutboxResult<()> {
        let record = record.clone();
        self.db
            .call(move |conn| queries::upsert_record(conn, RecordTable::Primary, &record))
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> OutboxResult<Option<MachineStatusRecord>> {
        let id = id.to_string();
        Ok(self
            .db
            .call(move |conn| queries::get_record(conn, RecordTable::Primary, &id))
            .await?)
    }

    pub async fn count(&self) -> OutboxResult<usize> {
        let count = self
            .db
            .call(|conn| queries::count_records(conn, RecordTable::Primary))
            .await?;
        Ok(count as usize)
    }

    /// Log an acknowledgment payload, replacing the previous one for its id.
    pub async fn log_acknowledgment(&self, id: &str, message: serde_json::Value) -> OutboxResult<()> {
        let id = id.to_string();
        self.db
            .call(move |conn| queries::upsert_raw_acknowledgment(conn, &id, &message))
            .await?;
        Ok(())
    }

    pub async fn logged_acknowledgment(&self, id: &str) -> OutboxResult<Option<serde_json::Value>> {
        let id = id.to_string();
        let logged = self
            .db
            .call(move |conn| queries::get_raw_acknowledgment(conn, &id))
            .await?;
        Ok(logged.map(|ack| ack.message))
    }
}
