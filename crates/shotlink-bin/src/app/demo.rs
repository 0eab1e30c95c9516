//! In-process demo: producer and receiver share a `MemoryBroker`.
//!
//! With a receiver delay, the first records miss their ack window and land
//! in the backlog; the resend scheduler drains it once the receiver's
//! heartbeat acks arrive.

use super::supervisor::{ctrl_c, supervise};
use shotlink_config_and_utils::Config;
use shotlink_database::{AsyncDatabase, MachineStatusRecord};
use shotlink_mirror::Receiver;
use shotlink_outbox::{BacklogStore, Producer, RecordStore};
use shotlink_source::VecRecordSource;
use shotlink_transport::MemoryBroker;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

const PROGRESS_POLL: Duration = Duration::from_millis(200);

fn generate_records(count: usize) -> Vec<MachineStatusRecord> {
    let now = chrono::Local::now().naive_local();
    (0..count)
        .map(|i| MachineStatusRecord {
            id: format!("demo-{i:04}"),
            machine_id: (i % 4) as i64 + 1,
            machine_status: true,
            shot_count: (i as i64 + 1) * 10,
            shot_status: 1,
            status: "running".to_string(),
            updated_on: now,
        })
        .collect()
}

/// Resolves once every record is in the primary store and the backlog is
/// empty.
async fn all_delivered(store: RecordStore, backlog: BacklogStore, expected: usize) {
    loop {
        tokio::time::sleep(PROGRESS_POLL).await;
        match (store.count().await, backlog.count().await) {
            (Ok(stored), Ok(pending)) => {
                if stored >= expected && pending == 0 {
                    info!(stored, "All demo records delivered");
                    return;
                }
            }
            (Err(e), _) | (_, Err(e)) => warn!(error = %e, "Failed to read demo progress"),
        }
    }
}

async fn run_demo_receiver(
    config: &Config,
    broker: &MemoryBroker,
    delay: Duration,
    mut done: watch::Receiver<bool>,
) -> Result<usize, Box<dyn Error>> {
    if !delay.is_zero() {
        info!(delay_ms = delay.as_millis() as u64, "Receiver offline");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = done.wait_for(|finished| *finished) => return Ok(0),
        }
    }

    let db = AsyncDatabase::open_in_memory().await?;
    let receiver = Receiver::new(config, Arc::new(broker.client()), db);
    receiver.start().await?;
    let store = receiver.store();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stop = async move {
        let _ = done.wait_for(|finished| *finished).await;
    };
    supervise(receiver.into_tasks(shutdown_rx), shutdown_tx, stop).await?;

    Ok(store.count().await?)
}

/// Deliver `records` generated records end to end and print a JSON summary.
pub async fn run_demo(
    config: Config,
    records: usize,
    receiver_delay_ms: u64,
) -> Result<(), Box<dyn Error>> {
    let broker = MemoryBroker::new();
    let producer = Producer::new(
        &config,
        Arc::new(broker.client()),
        AsyncDatabase::open_in_memory().await?,
    );
    producer.start().await?;

    let store = producer.store();
    let backlog = producer.backlog();
    let (done_tx, done_rx) = watch::channel(false);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = producer.into_tasks(
        Box::new(VecRecordSource::new(generate_records(records))),
        shutdown_rx,
    );

    let stop = {
        let store = store.clone();
        let backlog = backlog.clone();
        async move {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = all_delivered(store, backlog, records) => {}
            }
        }
    };
    let producer_side = async {
        let result = supervise(tasks, shutdown_tx, stop).await;
        let _ = done_tx.send(true);
        result
    };
    let receiver_side = run_demo_receiver(
        &config,
        &broker,
        Duration::from_millis(receiver_delay_ms),
        done_rx,
    );

    let (produced, received) = tokio::join!(producer_side, receiver_side);
    produced?;
    let received = received?;

    let summary = serde_json::json!({
        "records": records,
        "producer_stored": store.count().await?,
        "backlog_remaining": backlog.count().await?,
        "receiver_stored": received,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
