//! In-process broker.
//!
//! `MemoryBroker` routes published payloads to every connected client
//! subscribed to the topic. It supports fault injection (broker outage,
//! dropped connections, failed publishes) so the reliability layer can be
//! exercised without a network.

use crate::{InboundMessage, Transport, TransportError, TransportEvent, TransportResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

struct ClientSlot {
    topics: HashSet<String>,
    events: broadcast::Sender<TransportEvent>,
}

struct BrokerState {
    available: bool,
    failing_publishes: u32,
    next_client_id: u64,
    clients: HashMap<u64, ClientSlot>,
}

/// An in-process publish/subscribe broker.
///
/// Cloning is cheap; clones share the same routing table.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                available: true,
                failing_publishes: 0,
                next_client_id: 1,
                clients: HashMap::new(),
            })),
        }
    }

    /// Create a new client of this broker. The client starts disconnected.
    pub fn client(&self) -> MemoryTransport {
        let id = {
            let mut state = self.state.lock();
            let id = state.next_client_id;
            state.next_client_id += 1;
            id
        };
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        MemoryTransport {
            id,
            broker: self.clone(),
            subscriptions: Mutex::new(HashSet::new()),
            event_tx,
        }
    }

    /// Take the broker up or down. Going down drops every connection and
    /// refuses new ones until it comes back.
    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
        info!(available, "Memory broker availability changed");
        if !available {
            self.drop_connections();
        }
    }

    /// Drop every connected client. Clients see `Disconnected` and may
    /// reconnect immediately if the broker is available.
    pub fn drop_connections(&self) {
        let dropped: Vec<ClientSlot> = {
            let mut state = self.state.lock();
            state.clients.drain().map(|(_, slot)| slot).collect()
        };
        for slot in dropped {
            let _ = slot
                .events
                .send(TransportEvent::Disconnected(Some("connection dropped by broker".to_string())));
        }
    }

    /// Make the next `count` publishes fail.
    pub fn fail_next_publishes(&self, count: u32) {
        self.state.lock().failing_publishes = count;
    }

    /// Number of connected clients.
    pub fn connected_clients(&self) -> usize {
        self.state.lock().clients.len()
    }

    fn route(&self, topic: &str, payload: &[u8]) -> TransportResult<usize> {
        let mut state = self.state.lock();
        if !state.available {
            return Err(TransportError::Connection("broker unavailable".to_string()));
        }
        if state.failing_publishes > 0 {
            state.failing_publishes -= 1;
            return Err(TransportError::Connection("publish rejected".to_string()));
        }

        let mut delivered = 0;
        for slot in state.clients.values() {
            if slot.topics.contains(topic) {
                let message = InboundMessage {
                    topic: topic.to_string(),
                    payload: payload.to_vec(),
                };
                if slot.events.send(TransportEvent::Message(message)).is_ok() {
                    delivered += 1;
                }
            }
        }
        Ok(delivered)
    }
}

/// A client connection to a [`MemoryBroker`].
pub struct MemoryTransport {
    id: u64,
    broker: MemoryBroker,
    subscriptions: Mutex<HashSet<String>>,
    event_tx: broadcast::Sender<TransportEvent>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> TransportResult<()> {
        {
            let mut state = self.broker.state.lock();
            if !state.available {
                return Err(TransportError::Connection("broker unavailable".to_string()));
            }
            if state.clients.contains_key(&self.id) {
                debug!(client_id = self.id, "Already connected");
                return Ok(());
            }
            state.clients.insert(
                self.id,
                ClientSlot {
                    topics: self.subscriptions.lock().clone(),
                    events: self.event_tx.clone(),
                },
            );
        }

        debug!(client_id = self.id, "Connected to memory broker");
        let _ = self.event_tx.send(TransportEvent::Connected);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let delivered = self.broker.route(topic, payload)?;
        debug!(client_id = self.id, topic, delivered, "Published");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> TransportResult<()> {
        self.subscriptions.lock().insert(topic.to_string());
        if let Some(slot) = self.broker.state.lock().clients.get_mut(&self.id) {
            slot.topics.insert(topic.to_string());
        }
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        let removed = self.broker.state.lock().clients.remove(&self.id).is_some();
        if removed {
            let _ = self
                .event_tx
                .send(TransportEvent::Disconnected(Some("client disconnected".to_string())));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.broker.state.lock().clients.contains_key(&self.id)
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.event_tx.subscribe()
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.broker.state.lock().clients.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_message(rx: &mut broadcast::Receiver<TransportEvent>) -> InboundMessage {
        loop {
            match rx.recv().await.unwrap() {
                TransportEvent::Message(message) => return message,
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_routes_to_subscribers_only() {
        let broker = MemoryBroker::new();
        let publisher = broker.client();
        let subscriber = broker.client();
        let bystander = broker.client();

        subscriber.subscribe("data").await.unwrap();
        bystander.subscribe("other").await.unwrap();
        for client in [&publisher, &subscriber, &bystander] {
            client.connect().await.unwrap();
        }

        let mut sub_rx = subscriber.events();
        let mut bystander_rx = bystander.events();
        publisher.publish("data", b"hello").await.unwrap();

        let message = next_message(&mut sub_rx).await;
        assert_eq!(message.topic, "data");
        assert_eq!(message.payload, b"hello");
        assert!(bystander_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_while_disconnected_fails_fast() {
        let broker = MemoryBroker::new();
        let client = broker.client();

        assert!(matches!(
            client.publish("data", b"x").await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_unavailable_broker_refuses_and_drops() {
        let broker = MemoryBroker::new();
        let client = broker.client();
        client.connect().await.unwrap();
        let mut rx = client.events();

        broker.set_available(false);
        assert!(!client.is_connected());
        assert!(matches!(rx.recv().await.unwrap(), TransportEvent::Disconnected(_)));
        assert!(client.connect().await.is_err());

        broker.set_available(true);
        client.connect().await.unwrap();
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_subscriptions_survive_reconnect() {
        let broker = MemoryBroker::new();
        let publisher = broker.client();
        let subscriber = broker.client();
        subscriber.subscribe("acks").await.unwrap();
        publisher.connect().await.unwrap();
        subscriber.connect().await.unwrap();

        broker.drop_connections();
        publisher.connect().await.unwrap();
        subscriber.connect().await.unwrap();

        let mut rx = subscriber.events();
        publisher.publish("acks", b"after").await.unwrap();
        assert_eq!(next_message(&mut rx).await.payload, b"after");
    }

    #[tokio::test]
    async fn test_injected_publish_failures() {
        let broker = MemoryBroker::new();
        let client = broker.client();
        client.connect().await.unwrap();

        broker.fail_next_publishes(2);
        assert!(client.publish("t", b"1").await.is_err());
        assert!(client.publish("t", b"2").await.is_err());
        assert!(client.publish("t", b"3").await.is_ok());
    }
}
