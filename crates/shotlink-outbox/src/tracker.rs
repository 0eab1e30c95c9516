//! Acknowledgment tracker.
//!
//! Holds the ids acknowledged by the receiver and wakes tasks waiting for
//! them. A waiter registers a oneshot before checking the set, so an ack that
//! lands between the check and the wait is never lost. The poll interval only
//! bounds how long a waiter goes without re-checking the set.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

/// Arrival time plus a sequence number, unique per recorded ack.
type AckStamp = (Instant, u64);

#[derive(Default)]
struct TrackerState {
    received: HashMap<String, AckStamp>,
    /// Same entries as `received`, oldest first.
    by_age: BTreeMap<AckStamp, String>,
    next_seq: u64,
    waiters: HashMap<String, Vec<oneshot::Sender<()>>>,
}

impl TrackerState {
    fn insert(&mut self, id: &str, at: Instant) {
        let stamp = (at, self.next_seq);
        self.next_seq += 1;
        if let Some(previous) = self.received.insert(id.to_string(), stamp) {
            self.by_age.remove(&previous);
        }
        self.by_age.insert(stamp, id.to_string());
    }

    fn remove(&mut self, id: &str) {
        if let Some(stamp) = self.received.remove(id) {
            self.by_age.remove(&stamp);
        }
    }

    fn pop_oldest(&mut self) -> Option<Instant> {
        let ((at, _), id) = self.by_age.pop_first()?;
        self.received.remove(&id);
        Some(at)
    }

    fn oldest(&self) -> Option<Instant> {
        self.by_age.first_key_value().map(|((at, _), _)| *at)
    }

    fn evict_over(&mut self, capacity: usize) {
        while self.received.len() > capacity && self.pop_oldest().is_some() {}
    }
}

/// Set of acknowledged ids, bounded by age and size.
pub struct AckTracker {
    state: Mutex<TrackerState>,
    retention: Duration,
    capacity: usize,
}

impl AckTracker {
    pub fn new(retention: Duration, capacity: usize) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            retention,
            capacity: capacity.max(1),
        }
    }

    /// Record an acknowledgment and wake every waiter for that id.
    ///
    /// Returns how many waiters were woken. Acks nobody waits for are kept
    /// until a wait consumes them or they are pruned.
    pub fn record_ack(&self, id: &str) -> usize {
        let mut state = self.state.lock();
        state.insert(id, Instant::now());

        let mut woken = 0;
        if let Some(waiters) = state.waiters.remove(id) {
            for waiter in waiters {
                if waiter.send(()).is_ok() {
                    woken += 1;
                }
            }
        }

        state.evict_over(self.capacity);
        woken
    }

    pub fn is_acknowledged(&self, id: &str) -> bool {
        self.state.lock().received.contains_key(id)
    }

    /// Remove an id once the wait that needed it has resolved.
    pub fn forget(&self, id: &str) {
        self.state.lock().remove(id);
    }

    /// Number of acknowledged ids held.
    pub fn len(&self) -> usize {
        self.state.lock().received.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop acks older than the retention window, then the oldest beyond
    /// capacity. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        let mut state = self.state.lock();
        let before = state.received.len();
        let now = Instant::now();

        while state
            .oldest()
            .is_some_and(|at| now.duration_since(at) >= self.retention)
        {
            state.pop_oldest();
        }
        state.evict_over(self.capacity);

        let dropped = before - state.received.len();
        if dropped > 0 {
            debug!(dropped, remaining = state.received.len(), "Pruned acknowledgments");
        }
        dropped
    }

    /// Wait up to `window` for an acknowledgment of `id`.
    ///
    /// Returns immediately if the ack is already present. Otherwise waits for
    /// the ack handler's notification, re-checking the set at least every
    /// `poll` in case a notification was missed.
    pub async fn wait_for(&self, id: &str, window: Duration, poll: Duration) -> bool {
        let deadline = Instant::now() + window;
        let poll = poll.max(Duration::from_millis(1));

        let mut rx = {
            let mut state = self.state.lock();
            if state.received.contains_key(id) {
                return true;
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.entry(id.to_string()).or_default().push(tx);
            rx
        };

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let step = poll.min(deadline - now);

            match tokio::time::timeout(step, &mut rx).await {
                Ok(Ok(())) => return true,
                Ok(Err(_)) => return self.is_acknowledged(id),
                Err(_) => {
                    if self.is_acknowledged(id) {
                        return true;
                    }
                }
            }
        }

        drop(rx);
        let mut state = self.state.lock();
        if let Some(waiters) = state.waiters.get_mut(id) {
            waiters.retain(|tx| !tx.is_closed());
            if waiters.is_empty() {
                state.waiters.remove(id);
            }
        }
        state.received.contains_key(id)
    }

    #[cfg(test)]
    fn waiter_count(&self) -> usize {
        self.state.lock().waiters.values().map(Vec::len).sum()
    }
}
