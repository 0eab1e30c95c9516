//! Transport abstraction shared by the producer and the receiver.

use crate::TransportResult;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// A message delivered on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Events emitted by a transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connected (or reconnected) to the broker.
    Connected,
    /// Lost the broker connection, with the reason when known.
    Disconnected(Option<String>),
    /// Received a message on a subscribed topic.
    Message(InboundMessage),
}

/// Publish/subscribe connection to a broker.
///
/// Subscriptions are remembered and re-established on every successful
/// `connect`, so callers subscribe once at startup.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the broker. Returns once the broker accepted the session.
    async fn connect(&self) -> TransportResult<()>;

    /// Publish a single attempt. Fails fast when not connected.
    async fn publish(&self, topic: &str, payload: &[u8]) -> TransportResult<()>;

    /// Subscribe to a topic now (if connected) and after every reconnect.
    async fn subscribe(&self, topic: &str) -> TransportResult<()>;

    /// Close the connection without triggering reconnection by the caller.
    async fn disconnect(&self) -> TransportResult<()>;

    /// Check if connected.
    fn is_connected(&self) -> bool;

    /// Subscribe to transport events.
    fn events(&self) -> broadcast::Receiver<TransportEvent>;
}
