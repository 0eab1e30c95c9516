//! SQLite persistence for shotlink.
//!
//! This crate provides:
//! - `AsyncDatabase`: a single dedicated SQLite thread fed through a channel,
//!   so store calls never block the tokio workers
//! - Schema migrations for the producer and receiver tables
//! - `MachineStatusRecord` and the acknowledgment log model
//! - Query helpers (`queries`) that run inside `AsyncDatabase::call`
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//! db.call(move |conn| queries::upsert_record(conn, RecordTable::Primary, &record)).await?;
//! ```

mod error;
mod executor;
mod migrations;
mod models;
pub mod queries;

pub use error::{DatabaseError, DatabaseResult};
pub use executor::AsyncDatabase;
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::{MachineStatusRecord, RawAcknowledgment, RecordTable};
