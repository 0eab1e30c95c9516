//! Receiver-side mirror for shotlink.
//!
//! Data messages are upserted into the `received_records` table and then
//! acknowledged; heartbeats are acknowledged without touching the store.

mod acknowledger;
mod error;
mod ingest;
mod receiver;

pub use acknowledger::Acknowledger;
pub use error::{MirrorError, MirrorResult};
pub use ingest::{IngestOutcome, MessageIngest, MirrorStore};
pub use receiver::{MirrorTask, Receiver};
