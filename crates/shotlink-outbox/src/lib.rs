//! Producer-side reliable delivery for shotlink.
//!
//! This crate provides:
//! - AckTracker: acknowledged ids with per-id wakeups and bounded retention
//! - LivenessMonitor: heartbeat emission and the edge-triggered online flag
//! - BacklogStore / RecordStore: durable backlog and primary store
//! - DeliveryCoordinator: publish, wait, backlog on timeout
//! - ResendScheduler: backlog drain on each online edge
//! - AckHandler: routes inbound acknowledgments
//! - Producer: wires the above into supervised tasks

mod acks;
mod backlog;
mod coordinator;
mod error;
mod liveness;
mod producer;
mod resend;
mod store;
mod tracker;

pub use acks::AckHandler;
pub use backlog::BacklogStore;
pub use coordinator::{DeliveryCoordinator, DeliveryOutcome};
pub use error::{OutboxError, OutboxResult};
pub use liveness::{LivenessMonitor, LivenessState};
pub use producer::{Producer, ProducerTask};
pub use resend::{DrainReport, ResendScheduler};
pub use store::RecordStore;
pub use tracker::AckTracker;
