//! Backlog resend, gated on the receiver coming online.

use crate::{AckTracker, BacklogStore, LivenessMonitor, OutboxResult};
use shotlink_transport::{DataMessage, Publisher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Result of one backlog drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries republished.
    pub attempted: usize,
    /// Entries acknowledged and deleted.
    pub delivered: usize,
    /// Entries left for the next online edge.
    pub remaining: usize,
}

/// Ticks on the heartbeat period. A tick that consumes an online edge drains
/// the backlog once; any other tick does nothing.
pub struct ResendScheduler {
    publisher: Publisher,
    tracker: Arc<AckTracker>,
    liveness: Arc<LivenessMonitor>,
    backlog: BacklogStore,
    data_topic: String,
    period: Duration,
    ack_wait: Duration,
    poll_interval: Duration,
}

impl ResendScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        publisher: Publisher,
        tracker: Arc<AckTracker>,
        liveness: Arc<LivenessMonitor>,
        backlog: BacklogStore,
        data_topic: impl Into<String>,
        period: Duration,
        ack_wait: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            publisher,
            tracker,
            liveness,
            backlog,
            data_topic: data_topic.into(),
            period,
            ack_wait,
            poll_interval,
        }
    }

    /// One scheduler tick. Returns the drain report when the tick drained.
    pub async fn tick(&self) -> OutboxResult<Option<DrainReport>> {
        if !self.liveness.take_online_edge() {
            return Ok(None);
        }
        self.drain().await.map(Some)
    }

    /// Republish every backlog entry and delete the ones acknowledged in
    /// time. Each delete is committed individually.
    pub async fn drain(&self) -> OutboxResult<DrainReport> {
        let entries = self.backlog.list().await?;
        if entries.is_empty() {
            debug!("Backlog empty, nothing to resend");
            return Ok(DrainReport::default());
        }

        info!(entries = entries.len(), "Resending backlog");
        let mut report = DrainReport {
            attempted: entries.len(),
            ..DrainReport::default()
        };

        for record in &entries {
            let payload = DataMessage::from(record).to_payload()?;
            if let Err(e) = self.publisher.publish(&self.data_topic, &payload).await {
                warn!(record_id = %record.id, error = %e, "Resend publish dropped");
            }

            if self
                .tracker
                .wait_for(&record.id, self.ack_wait, self.poll_interval)
                .await
            {
                self.backlog.remove(&record.id).await?;
                report.delivered += 1;
                info!(record_id = %record.id, "Backlog entry delivered");
            } else {
                debug!(record_id = %record.id, "Backlog entry still unacknowledged");
            }
            self.tracker.forget(&record.id);
        }

        report.remaining = self.backlog.count().await?;
        info!(
            attempted = report.attempted,
            delivered = report.delivered,
            remaining = report.remaining,
            "Backlog resend finished"
        );
        Ok(report)
    }

    /// Tick every period until shutdown. Also prunes stale acks.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> OutboxResult<()> {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Resend scheduler stopping");
                    return Ok(());
                }
                result = self.tick() => { result?; }
            }

            self.tracker.prune();

            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Resend scheduler stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.period) => {}
            }
        }
    }
}
