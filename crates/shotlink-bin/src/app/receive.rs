//! Receiver service.

use super::supervisor::{ctrl_c, supervise};
use shotlink_config_and_utils::{Config, Paths};
use shotlink_database::AsyncDatabase;
use shotlink_mirror::Receiver;
use shotlink_transport::{MqttTransport, Transport};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Run the receiver until Ctrl-C or a fatal task error.
pub async fn run_receiver(config: Config, paths: Paths) -> Result<(), Box<dyn std::error::Error>> {
    let db = AsyncDatabase::open(&paths.receiver_database_file()).await?;
    let mqtt = MqttTransport::new(&config.broker);
    info!(
        broker_host = %config.broker.host,
        broker_port = config.broker.port,
        client_id = %mqtt.client_id(),
        "Starting receiver"
    );
    let transport: Arc<dyn Transport> = Arc::new(mqtt);

    let receiver = Receiver::new(&config, transport.clone(), db);
    receiver.start().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let result = supervise(receiver.into_tasks(shutdown_rx), shutdown_tx, ctrl_c()).await;

    if let Err(e) = transport.disconnect().await {
        warn!(error = %e, "Failed to disconnect cleanly");
    }
    info!("Receiver stopped");
    result
}
