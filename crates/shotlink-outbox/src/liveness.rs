//! Receiver liveness.
//!
//! Heartbeat acks set an edge-triggered online flag that the resend scheduler
//! reads and clears. The monitor also tracks an explicit Online/Offline state,
//! used only for logging: the receiver is considered offline once no
//! heartbeat ack has arrived for `offline_after`.

use crate::OutboxResult;
use parking_lot::Mutex;
use shotlink_transport::{HeartbeatMessage, Publisher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Receiver state as seen by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    Offline,
    Online,
}

pub struct LivenessMonitor {
    online_edge: AtomicBool,
    state: Mutex<(LivenessState, Option<Instant>)>,
    offline_after: Duration,
}

impl LivenessMonitor {
    pub fn new(offline_after: Duration) -> Self {
        Self {
            online_edge: AtomicBool::new(false),
            state: Mutex::new((LivenessState::Offline, None)),
            offline_after,
        }
    }

    /// Handle one heartbeat acknowledgment.
    pub fn mark_online(&self) {
        self.online_edge.store(true, Ordering::SeqCst);

        let mut state = self.state.lock();
        if state.0 == LivenessState::Offline {
            info!("Receiver is online");
        } else {
            debug!("Heartbeat acknowledged");
        }
        *state = (LivenessState::Online, Some(Instant::now()));
    }

    /// Read and clear the online flag. True at most once per `mark_online`.
    pub fn take_online_edge(&self) -> bool {
        self.online_edge.swap(false, Ordering::SeqCst)
    }

    pub fn state(&self) -> LivenessState {
        self.state.lock().0
    }

    /// Move to Offline if the last heartbeat ack is too old.
    pub fn check_offline(&self) -> LivenessState {
        let mut state = self.state.lock();
        if let (LivenessState::Online, Some(last_ack)) = *state {
            let silent_for = last_ack.elapsed();
            if silent_for >= self.offline_after {
                warn!(
                    silent_ms = silent_for.as_millis() as u64,
                    "No heartbeat acknowledgment, receiver is offline"
                );
                state.0 = LivenessState::Offline;
            }
        }
        state.0
    }

    /// Publish a heartbeat every `period` until shutdown. The first heartbeat
    /// goes out immediately.
    pub async fn run_heartbeat(
        &self,
        publisher: Publisher,
        topic: String,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> OutboxResult<()> {
        let payload = HeartbeatMessage::ping().to_payload()?;
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Heartbeat emitter stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = publisher.publish(&topic, &payload).await {
                warn!(error = %e, "Heartbeat dropped");
            }
            self.check_offline();
        }
    }
}
