//! Shotlink - reliable machine-status delivery between a producer and a
//! receiver over a publish/subscribe broker.

mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use shotlink_config_and_utils::{init_logging, Config, Paths};

/// Shotlink command-line interface.
#[derive(Parser)]
#[command(name = "shotlink")]
#[command(about = "Deliver machine-status records over MQTT with acks, backlog, and resend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (databases, logs, config). Defaults to ~/.shotlink
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Configuration file to use instead of <base_dir>/config.json
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the producer: replay a CSV schedule and deliver each record
    Produce {
        /// CSV file of scheduled machine-status rows
        #[arg(short, long)]
        source: PathBuf,
    },
    /// Run the receiver: mirror delivered records and acknowledge them
    Receive,
    /// Print the producer's undelivered backlog as JSON
    Backlog,
    /// Run producer and receiver in-process against an in-memory broker
    Demo {
        /// Number of generated records to deliver
        #[arg(long, default_value_t = 5)]
        records: usize,

        /// Keep the receiver offline for this long so records land in the backlog
        #[arg(long, default_value_t = 0)]
        receiver_delay_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)?.with_env_overrides()?,
        None => Config::load(&paths)?,
    };
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    paths.ensure_dirs()?;
    let service_name = match cli.command {
        Commands::Produce { .. } => "shotlink-producer",
        Commands::Receive => "shotlink-receiver",
        Commands::Backlog => "shotlink-cli",
        Commands::Demo { .. } => "shotlink-demo",
    };
    init_logging(service_name, &config.log_level, &paths, true)?;

    match cli.command {
        Commands::Produce { source } => app::run_producer(config, paths, source).await?,
        Commands::Receive => app::run_receiver(config, paths).await?,
        Commands::Backlog => app::print_backlog(&paths).await?,
        Commands::Demo {
            records,
            receiver_delay_ms,
        } => app::run_demo(config, records, receiver_delay_ms).await?,
    }

    Ok(())
}
