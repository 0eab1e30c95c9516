//! Record sources for the shotlink producer.
//!
//! A source hands out records in schedule order and forgets each one once the
//! producer marks it consumed.

mod csv_source;
mod error;
mod vec_source;

pub use csv_source::{Clock, ScheduledCsvSource};
pub use error::{SourceError, SourceResult};
pub use vec_source::VecRecordSource;

use async_trait::async_trait;
use shotlink_database::MachineStatusRecord;

/// A schedule of records to deliver.
#[async_trait]
pub trait RecordSource: Send {
    /// Wait until the next record is due and return it, or `None` once the
    /// source is exhausted. The record stays pending until `mark_consumed`.
    async fn next_record(&mut self) -> SourceResult<Option<MachineStatusRecord>>;

    /// Remove the earliest pending record with this id. Later rows that reuse
    /// the id stay pending.
    async fn mark_consumed(&mut self, id: &str) -> SourceResult<()>;

    /// Number of records still pending.
    fn remaining(&self) -> usize;
}
