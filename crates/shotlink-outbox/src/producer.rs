//! Producer wiring.
//!
//! Builds every producer component from one `Config` and hands back the
//! long-running tasks for a supervisor to spawn.

use crate::{
    AckHandler, AckTracker, BacklogStore, DeliveryCoordinator, LivenessMonitor, OutboxError,
    OutboxResult, RecordStore, ResendScheduler,
};
use shotlink_config_and_utils::Config;
use shotlink_database::AsyncDatabase;
use shotlink_source::RecordSource;
use shotlink_transport::{Publisher, ReconnectManager, Transport, TransportEvent};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::info;

/// A named long-running producer task.
pub type ProducerTask = Pin<Box<dyn Future<Output = OutboxResult<()>> + Send>>;

fn task(future: impl Future<Output = OutboxResult<()>> + Send + 'static) -> ProducerTask {
    Box::pin(future)
}

pub struct Producer {
    config: Config,
    transport: Arc<dyn Transport>,
    publisher: Publisher,
    tracker: Arc<AckTracker>,
    liveness: Arc<LivenessMonitor>,
    backlog: BacklogStore,
    store: RecordStore,
    ack_events: broadcast::Receiver<TransportEvent>,
    reconnect: ReconnectManager,
}

impl Producer {
    pub fn new(config: &Config, transport: Arc<dyn Transport>, db: AsyncDatabase) -> Self {
        let reliability = &config.reliability;

        Self {
            publisher: Publisher::from_config(transport.clone(), &config.retry),
            tracker: Arc::new(AckTracker::new(
                reliability.ack_retention(),
                reliability.ack_capacity,
            )),
            liveness: Arc::new(LivenessMonitor::new(reliability.offline_after())),
            backlog: BacklogStore::new(db.clone()),
            store: RecordStore::new(db),
            ack_events: transport.events(),
            reconnect: ReconnectManager::from_config(transport.clone(), &config.retry),
            transport,
            config: config.clone(),
        }
    }

    pub fn tracker(&self) -> Arc<AckTracker> {
        self.tracker.clone()
    }

    pub fn liveness(&self) -> Arc<LivenessMonitor> {
        self.liveness.clone()
    }

    pub fn backlog(&self) -> BacklogStore {
        self.backlog.clone()
    }

    pub fn store(&self) -> RecordStore {
        self.store.clone()
    }

    /// Subscribe to the ack topic and connect, with reconnect backoff if the
    /// broker is not reachable yet.
    pub async fn start(&self) -> OutboxResult<()> {
        self.transport.subscribe(&self.config.topics.ack).await?;
        self.reconnect.reconnect().await?;
        info!(
            data_topic = %self.config.topics.data,
            ack_topic = %self.config.topics.ack,
            heartbeat_topic = %self.config.topics.heartbeat,
            "Producer connected"
        );
        Ok(())
    }

    /// Split into the producer's long-running tasks.
    ///
    /// The delivery task finishes when the source is exhausted; the others
    /// run until shutdown or a fatal error.
    pub fn into_tasks(
        self,
        source: Box<dyn RecordSource>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<(&'static str, ProducerTask)> {
        let topics = &self.config.topics;
        let reliability = &self.config.reliability;

        let coordinator = DeliveryCoordinator::new(
            self.publisher.clone(),
            self.tracker.clone(),
            self.backlog.clone(),
            self.store.clone(),
            topics.data.clone(),
            reliability.ack_wait(),
            reliability.ack_poll_interval(),
        );
        let scheduler = ResendScheduler::new(
            self.publisher.clone(),
            self.tracker.clone(),
            self.liveness.clone(),
            self.backlog.clone(),
            topics.data.clone(),
            reliability.heartbeat_interval(),
            reliability.ack_wait(),
            reliability.ack_poll_interval(),
        );
        let handler = AckHandler::new(
            self.tracker.clone(),
            self.liveness.clone(),
            self.store.clone(),
            topics.ack.clone(),
        );

        let liveness = self.liveness.clone();
        let publisher = self.publisher.clone();
        let heartbeat_topic = topics.heartbeat.clone();
        let heartbeat_period = reliability.heartbeat_interval();
        let ack_events = self.ack_events;
        let reconnect = self.reconnect;

        let delivery_shutdown = shutdown.clone();
        let heartbeat_shutdown = shutdown.clone();
        let resend_shutdown = shutdown.clone();
        let acks_shutdown = shutdown.clone();
        let reconnect_shutdown = shutdown;

        vec![
            ("delivery", task(async move { coordinator.run(source, delivery_shutdown).await })),
            (
                "heartbeat",
                task(async move {
                    liveness
                        .run_heartbeat(publisher, heartbeat_topic, heartbeat_period, heartbeat_shutdown)
                        .await
                }),
            ),
            ("resend", task(async move { scheduler.run(resend_shutdown).await })),
            ("acks", task(async move { handler.run(ack_events, acks_shutdown).await })),
            (
                "reconnect",
                task(async move { reconnect.run(reconnect_shutdown).await.map_err(OutboxError::from) }),
            ),
        ]
    }
}
