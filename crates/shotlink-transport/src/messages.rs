//! Wire messages exchanged over the broker.
//!
//! All payloads are JSON objects:
//! - data: the record with `data.`-prefixed field names and an ISO-8601 `updated_on`
//! - heartbeat: `{"_id": "heartbeat", "ack": "ping"}`
//! - acknowledgment: `{"_id": <id>, "ack": "received"}`

use crate::{TransportError, TransportResult};
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use shotlink_database::MachineStatusRecord;

/// Reserved id carried by heartbeats and their acknowledgments.
pub const HEARTBEAT_ID: &str = "heartbeat";
/// Marker of a positive acknowledgment.
pub const ACK_RECEIVED: &str = "received";
/// Marker carried by an outbound heartbeat.
pub const HEARTBEAT_PING: &str = "ping";

/// Accepted `updated_on` layouts, ISO first. The last one is the raw
/// `Date Time` form written by older producers.
const UPDATED_ON_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Parse an `updated_on` string in any accepted layout.
pub(crate) fn parse_updated_on(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    UPDATED_ON_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

fn serialize_updated_on<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

fn deserialize_updated_on<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_updated_on(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized updated_on {raw:?}")))
}

/// A record on the data topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataMessage {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "data.machine_id")]
    pub machine_id: i64,
    #[serde(rename = "data.machine_status")]
    pub machine_status: bool,
    #[serde(rename = "data.shot_count")]
    pub shot_count: i64,
    #[serde(rename = "data.shot_status")]
    pub shot_status: i64,
    #[serde(rename = "data.status")]
    pub status: String,
    #[serde(
        serialize_with = "serialize_updated_on",
        deserialize_with = "deserialize_updated_on"
    )]
    pub updated_on: NaiveDateTime,
}

impl DataMessage {
    /// Parse a data payload.
    ///
    /// Any JSON error, missing or mistyped field, or empty id is reported as
    /// `Malformed`.
    pub fn parse(payload: &[u8]) -> TransportResult<Self> {
        let message: Self = serde_json::from_slice(payload)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        if message.id.trim().is_empty() {
            return Err(TransportError::Malformed("empty _id".to_string()));
        }
        Ok(message)
    }

    /// Encode as a JSON payload.
    pub fn to_payload(&self) -> TransportResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Convert into the stored record shape.
    pub fn into_record(self) -> MachineStatusRecord {
        MachineStatusRecord {
            id: self.id,
            machine_id: self.machine_id,
            machine_status: self.machine_status,
            shot_count: self.shot_count,
            shot_status: self.shot_status,
            status: self.status,
            updated_on: self.updated_on,
        }
    }
}

impl From<&MachineStatusRecord> for DataMessage {
    fn from(record: &MachineStatusRecord) -> Self {
        Self {
            id: record.id.clone(),
            machine_id: record.machine_id,
            machine_status: record.machine_status,
            shot_count: record.shot_count,
            shot_status: record.shot_status,
            status: record.status.clone(),
            updated_on: record.updated_on,
        }
    }
}

/// A heartbeat on the heartbeat topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub ack: String,
}

impl HeartbeatMessage {
    /// The heartbeat the producer emits every period.
    pub fn ping() -> Self {
        Self {
            id: HEARTBEAT_ID.to_string(),
            ack: HEARTBEAT_PING.to_string(),
        }
    }

    /// Parse a heartbeat payload. Only `_id` is required.
    pub fn parse(payload: &[u8]) -> TransportResult<Self> {
        let message: Self = serde_json::from_slice(payload)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        if message.id.is_empty() {
            return Err(TransportError::Malformed("empty _id".to_string()));
        }
        Ok(message)
    }

    pub fn to_payload(&self) -> TransportResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// An acknowledgment on the ack topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub ack: String,
}

impl AckMessage {
    /// Positive acknowledgment for `id`.
    pub fn received(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ack: ACK_RECEIVED.to_string(),
        }
    }

    pub fn parse(payload: &[u8]) -> TransportResult<Self> {
        serde_json::from_slice(payload).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    pub fn to_payload(&self) -> TransportResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn is_received(&self) -> bool {
        self.ack == ACK_RECEIVED
    }

    pub fn is_heartbeat(&self) -> bool {
        self.id == HEARTBEAT_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record() -> MachineStatusRecord {
        MachineStatusRecord {
            id: "64f1c0".to_string(),
            machine_id: 3,
            machine_status: true,
            shot_count: 1520,
            shot_status: 1,
            status: "running".to_string(),
            updated_on: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(14, 5, 9)
                .unwrap(),
        }
    }

    #[test]
    fn test_data_message_wire_field_names() {
        let payload = DataMessage::from(&record()).to_payload().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(value["_id"], "64f1c0");
        assert_eq!(value["data.machine_id"], 3);
        assert_eq!(value["data.machine_status"], true);
        assert_eq!(value["data.shot_count"], 1520);
        assert_eq!(value["data.shot_status"], 1);
        assert_eq!(value["data.status"], "running");
        assert_eq!(value["updated_on"], "2024-03-01T14:05:09");
    }

    #[test]
    fn test_data_message_parses_legacy_timestamp() {
        let payload = br#"{"_id":"a","data.machine_id":1,"data.machine_status":false,
            "data.shot_count":2,"data.shot_status":0,"data.status":"idle",
            "updated_on":"03/01/2024 02:05:09 PM"}"#;

        let parsed = DataMessage::parse(payload).unwrap().into_record();
        assert_eq!(parsed.updated_on, record().updated_on);
        assert!(!parsed.machine_status);
    }

    #[test]
    fn test_data_message_rejects_malformed() {
        let missing_field = br#"{"_id":"a","data.machine_id":1}"#;
        assert!(matches!(
            DataMessage::parse(missing_field),
            Err(TransportError::Malformed(_))
        ));

        let wrong_type = br#"{"_id":"a","data.machine_id":"one","data.machine_status":true,
            "data.shot_count":2,"data.shot_status":0,"data.status":"x",
            "updated_on":"2024-03-01T00:00:00"}"#;
        assert!(DataMessage::parse(wrong_type).is_err());

        let empty_id = br#"{"_id":"","data.machine_id":1,"data.machine_status":true,
            "data.shot_count":2,"data.shot_status":0,"data.status":"x",
            "updated_on":"2024-03-01T00:00:00"}"#;
        assert!(DataMessage::parse(empty_id).is_err());

        assert!(DataMessage::parse(b"not json").is_err());
    }

    #[test]
    fn test_heartbeat_ping_payload() {
        let value: serde_json::Value =
            serde_json::from_slice(&HeartbeatMessage::ping().to_payload().unwrap()).unwrap();
        assert_eq!(value, serde_json::json!({"_id": "heartbeat", "ack": "ping"}));

        let parsed = HeartbeatMessage::parse(br#"{"_id":"heartbeat"}"#).unwrap();
        assert_eq!(parsed.id, HEARTBEAT_ID);
    }

    #[test]
    fn test_ack_message_classification() {
        let ack = AckMessage::parse(br#"{"_id":"heartbeat","ack":"received"}"#).unwrap();
        assert!(ack.is_heartbeat());
        assert!(ack.is_received());

        let ack = AckMessage::parse(br#"{"_id":"r1","ack":"nope"}"#).unwrap();
        assert!(!ack.is_heartbeat());
        assert!(!ack.is_received());

        assert!(AckMessage::parse(br#"{"ack":"received"}"#).is_err());
    }
}
