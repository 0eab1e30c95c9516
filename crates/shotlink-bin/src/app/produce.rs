//! Producer service.

use super::supervisor::{ctrl_c, supervise};
use shotlink_config_and_utils::{Config, Paths};
use shotlink_database::AsyncDatabase;
use shotlink_outbox::Producer;
use shotlink_source::{RecordSource, ScheduledCsvSource};
use shotlink_transport::{MqttTransport, Transport};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Run the producer until Ctrl-C or a fatal task error.
///
/// Heartbeat and resend keep running after the schedule is exhausted so
/// the backlog still drains once the receiver comes back.
pub async fn run_producer(
    config: Config,
    paths: Paths,
    source_path: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = ScheduledCsvSource::from_path(&source_path)?;
    info!(
        source = %source_path.display(),
        rows = source.remaining(),
        "Loaded record schedule"
    );

    let db = AsyncDatabase::open(&paths.producer_database_file()).await?;
    let mqtt = MqttTransport::new(&config.broker);
    info!(
        broker_host = %config.broker.host,
        broker_port = config.broker.port,
        client_id = %mqtt.client_id(),
        "Starting producer"
    );
    let transport: Arc<dyn Transport> = Arc::new(mqtt);

    let producer = Producer::new(&config, transport.clone(), db);
    producer.start().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = producer.into_tasks(Box::new(source), shutdown_rx);
    let result = supervise(tasks, shutdown_tx, ctrl_c()).await;

    if let Err(e) = transport.disconnect().await {
        warn!(error = %e, "Failed to disconnect cleanly");
    }
    info!("Producer stopped");
    result
}
