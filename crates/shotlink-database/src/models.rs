//! Model types for the record and acknowledgment tables.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Storage format for `updated_on`. Fractional seconds are optional on read.
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// One timestamped machine-status sample.
///
/// The id is assigned upstream and never changes; persisting a record whose id
/// already exists replaces every other field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineStatusRecord {
    pub id: String,
    pub machine_id: i64,
    pub machine_status: bool,
    pub shot_count: i64,
    pub shot_status: i64,
    pub status: String,
    pub updated_on: NaiveDateTime,
}

/// Tables holding [`MachineStatusRecord`] rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTable {
    /// Producer's primary store; written for every record it handles.
    Primary,
    /// Producer's records awaiting confirmed delivery.
    Backlog,
    /// Receiver's mirror of delivered records.
    Received,
}

impl RecordTable {
    pub fn name(self) -> &'static str {
        match self {
            RecordTable::Primary => "machine_status_records",
            RecordTable::Backlog => "delivery_backlog",
            RecordTable::Received => "received_records",
        }
    }
}

/// A logged acknowledgment payload, keyed by the acknowledged id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawAcknowledgment {
    pub id: String,
    pub message: serde_json::Value,
    pub received_at: String,
}
