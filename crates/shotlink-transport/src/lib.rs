//! Broker transport for shotlink.
//!
//! This crate provides:
//! - The `Transport` trait and its event stream
//! - `MqttTransport` for a real broker and `MemoryBroker` for in-process runs
//! - Wire formats for data, heartbeat, and acknowledgment messages
//! - `Publisher`: bounded-retry publish used for every outbound message
//! - `ReconnectManager`: reconnect with exponential backoff

mod error;
mod memory;
mod messages;
mod mqtt;
mod reconnect;
mod retry;
mod transport;

pub use error::{TransportError, TransportResult};
pub use memory::{MemoryBroker, MemoryTransport};
pub use messages::{AckMessage, DataMessage, HeartbeatMessage, ACK_RECEIVED, HEARTBEAT_ID, HEARTBEAT_PING};
pub use mqtt::MqttTransport;
pub use reconnect::ReconnectManager;
pub use retry::Publisher;
pub use transport::{InboundMessage, Transport, TransportEvent};
