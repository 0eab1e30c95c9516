//! MQTT transport over rumqttc.

use crate::{InboundMessage, Transport, TransportError, TransportEvent, TransportResult};
use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use shotlink_config_and_utils::BrokerConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

const REQUEST_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// MQTT client with QoS 1 publish and subscribe.
///
/// The rumqttc event loop is parked in `eventloop` while disconnected and
/// owned by a poll task while connected. The poll task hands it back before
/// announcing a disconnect, so a reconnect attempt always finds it.
pub struct MqttTransport {
    client: AsyncClient,
    client_id: String,
    host: String,
    port: u16,
    eventloop: Arc<Mutex<Option<EventLoop>>>,
    connected: Arc<AtomicBool>,
    subscriptions: SyncMutex<Vec<String>>,
    event_tx: broadcast::Sender<TransportEvent>,
}

impl MqttTransport {
    /// Create a transport for the configured broker. Nothing is sent until
    /// `connect`.
    pub fn new(config: &BrokerConfig) -> Self {
        let client_id = format!("{}-{}", config.client_id_prefix, uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            client,
            client_id,
            host: config.host.clone(),
            port: config.port,
            eventloop: Arc::new(Mutex::new(Some(eventloop))),
            connected: Arc::new(AtomicBool::new(false)),
            subscriptions: SyncMutex::new(Vec::new()),
            event_tx,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Poll until the broker answers the CONNECT.
    async fn await_connack(eventloop: &mut EventLoop) -> TransportResult<()> {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    return if ack.code == ConnectReturnCode::Success {
                        Ok(())
                    } else {
                        Err(TransportError::Connection(format!(
                            "broker refused connection: {:?}",
                            ack.code
                        )))
                    };
                }
                Ok(_) => {}
                Err(e) => return Err(TransportError::Connection(e.to_string())),
            }
        }
    }

    fn spawn_poll_task(&self, mut eventloop: EventLoop) {
        let slot = self.eventloop.clone();
        let connected = self.connected.clone();
        let event_tx = self.event_tx.clone();
        let client_id = self.client_id.clone();

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = InboundMessage {
                            topic: publish.topic.clone(),
                            payload: publish.payload.to_vec(),
                        };
                        let _ = event_tx.send(TransportEvent::Message(message));
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        debug!(client_id = %client_id, "Subscription acknowledged");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(client_id = %client_id, error = %e, "MQTT connection lost");
                        *slot.lock().await = Some(eventloop);
                        connected.store(false, Ordering::SeqCst);
                        let _ = event_tx.send(TransportEvent::Disconnected(Some(e.to_string())));
                        break;
                    }
                }
            }
        });
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&self) -> TransportResult<()> {
        let mut guard = self.eventloop.lock().await;
        let Some(mut eventloop) = guard.take() else {
            debug!(client_id = %self.client_id, "Already connected");
            return Ok(());
        };

        info!(client_id = %self.client_id, host = %self.host, port = self.port, "Connecting to MQTT broker");

        if let Err(e) = Self::await_connack(&mut eventloop).await {
            *guard = Some(eventloop);
            return Err(e);
        }
        drop(guard);

        self.connected.store(true, Ordering::SeqCst);

        let topics = self.subscriptions.lock().clone();
        for topic in &topics {
            self.client.subscribe(topic.as_str(), QoS::AtLeastOnce).await?;
        }

        self.spawn_poll_task(eventloop);
        info!(client_id = %self.client_id, subscriptions = topics.len(), "Connected to MQTT broker");
        let _ = self.event_tx.send(TransportEvent::Connected);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> TransportResult<()> {
        {
            let mut subscriptions = self.subscriptions.lock();
            if !subscriptions.iter().any(|t| t == topic) {
                subscriptions.push(topic.to_string());
            }
        }
        if self.is_connected() {
            self.client.subscribe(topic, QoS::AtLeastOnce).await?;
        }
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        if self.is_connected() {
            self.client.disconnect().await?;
            info!(client_id = %self.client_id, "Disconnecting from MQTT broker");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.event_tx.subscribe()
    }
}
