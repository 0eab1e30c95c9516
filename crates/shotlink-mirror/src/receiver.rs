//! Receiver wiring.

use crate::{Acknowledger, MessageIngest, MirrorError, MirrorResult, MirrorStore};
use shotlink_config_and_utils::Config;
use shotlink_database::AsyncDatabase;
use shotlink_transport::{Publisher, ReconnectManager, Transport, TransportEvent};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{info, warn};

/// A named long-running receiver task.
pub type MirrorTask = Pin<Box<dyn Future<Output = MirrorResult<()>> + Send>>;

fn task(future: impl Future<Output = MirrorResult<()>> + Send + 'static) -> MirrorTask {
    Box::pin(future)
}

pub struct Receiver {
    config: Config,
    transport: Arc<dyn Transport>,
    ingest: MessageIngest,
    store: MirrorStore,
    events: broadcast::Receiver<TransportEvent>,
    reconnect: ReconnectManager,
}

impl Receiver {
    pub fn new(config: &Config, transport: Arc<dyn Transport>, db: AsyncDatabase) -> Self {
        let store = MirrorStore::new(db);
        let acknowledger = Acknowledger::new(
            Publisher::from_config(transport.clone(), &config.retry),
            config.topics.ack.clone(),
        );
        let ingest = MessageIngest::new(
            store.clone(),
            acknowledger,
            config.topics.data.clone(),
            config.topics.heartbeat.clone(),
        );

        Self {
            config: config.clone(),
            events: transport.events(),
            reconnect: ReconnectManager::from_config(transport.clone(), &config.retry),
            transport,
            ingest,
            store,
        }
    }

    pub fn store(&self) -> MirrorStore {
        self.store.clone()
    }

    /// Subscribe to the data and heartbeat topics and connect.
    pub async fn start(&self) -> MirrorResult<()> {
        self.transport.subscribe(&self.config.topics.data).await?;
        self.transport.subscribe(&self.config.topics.heartbeat).await?;
        self.reconnect.reconnect().await?;
        info!(
            data_topic = %self.config.topics.data,
            heartbeat_topic = %self.config.topics.heartbeat,
            "Receiver connected"
        );
        Ok(())
    }

    /// Split into the receiver's long-running tasks: message ingest and
    /// reconnect.
    pub fn into_tasks(self, shutdown: watch::Receiver<bool>) -> Vec<(&'static str, MirrorTask)> {
        let ingest = self.ingest;
        let events = self.events;
        let reconnect = self.reconnect;
        let reconnect_shutdown = shutdown.clone();

        vec![
            ("ingest", task(run_ingest(ingest, events, shutdown))),
            (
                "reconnect",
                task(async move { reconnect.run(reconnect_shutdown).await.map_err(MirrorError::from) }),
            ),
        ]
    }
}

/// Feed every inbound message to `ingest` until shutdown. Store failures end
/// the task.
async fn run_ingest(
    ingest: MessageIngest,
    mut events: broadcast::Receiver<TransportEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> MirrorResult<()> {
    info!("Receiver ingest started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("Receiver ingest stopping");
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(TransportEvent::Message(message)) => {
                    ingest.handle(&message.topic, &message.payload).await?;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Receiver lagged, skipped messages will be resent");
                }
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }
}
