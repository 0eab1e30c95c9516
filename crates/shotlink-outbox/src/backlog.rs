//! Durable backlog of records awaiting confirmed delivery.

use crate::OutboxResult;
use shotlink_database::{queries, AsyncDatabase, MachineStatusRecord, RecordTable};
use tracing::debug;

/// Backlog entries live in the `delivery_backlog` table, keyed by record id.
/// Every call is committed on its own.
#[derive(Clone)]
pub struct BacklogStore {
    db: AsyncDatabase,
}

impl BacklogStore {
    pub fn new(db: AsyncDatabase) -> Self {
        Self { db }
    }

    /// Upsert a record into the backlog.
    pub async fn insert(&self, record: &MachineStatusRecord) -> OutboxResult<()> {
        let record = record.clone();
        let id = record.id.clone();
        self.db
            .call(move |conn| queries::upsert_record(conn, RecordTable::Backlog, &record))
            .await?;
        debug!(record_id = %id, "Backlog entry stored");
        Ok(())
    }

    /// All entries, oldest `updated_on` first.
    pub async fn list(&self) -> OutboxResult<Vec<MachineStatusRecord>> {
        Ok(self
            .db
            .call(|conn| queries::list_records(conn, RecordTable::Backlog))
            .await?)
    }

    /// Delete an entry. Returns whether it existed.
    pub async fn remove(&self, id: &str) -> OutboxResult<bool> {
        let id = id.to_string();
        Ok(self
            .db
            .call(move |conn| queries::delete_record(conn, RecordTable::Backlog, &id))
            .await?)
    }

    pub async fn contains(&self, id: &str) -> OutboxResult<bool> {
        let id = id.to_string();
        let found = self
            .db
            .call(move |conn| queries::get_record(conn, RecordTable::Backlog, &id))
            .await?;
        Ok(found.is_some())
    }

    pub async fn count(&self) -> OutboxResult<usize> {
        let count = self
            .db
            .call(|conn| queries::count_records(conn, RecordTable::Backlog))
            .await?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let backlog = BacklogStore::new(AsyncDatabase::open_in_memory().await.unwrap());

        backlog.insert(&record("r1")).await.unwrap();
        backlog.insert(&record("r1")).await.unwrap();

        assert_eq!(backlog.count().await.unwrap(), 1);
        assert!(backlog.contains("r1").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove() {
        let backlog = BacklogStore::new(AsyncDatabase::open_in_memory().await.unwrap());
        backlog.insert(&record("r1")).await.unwrap();
        backlog.insert(&record("r2")).await.unwrap();

        assert!(backlog.remove("r1").await.unwrap());
        assert!(!backlog.remove("r1").await.unwrap());

        let remaining: Vec<String> = backlog.list().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(remaining, vec!["r2"]);
    }
}
