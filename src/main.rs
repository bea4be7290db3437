//! cdc2pilosa - replicate row changes into a Pilosa index
//!
//! Replays committed transactions of the `EMPLOYEES` table as field writes
//! against the `employees` index, one batch per transaction.

mod core;
mod events;
mod pilosa;
mod protocol;
mod replication;
mod tracing_context;

use crate::core::config::{HandlerConfig, LogFormat};
use crate::events::PilosaHandler;
use crate::pilosa::PilosaConnector;
use crate::protocol::messages::{HostConfig, MetaData};
use crate::replication::ReplayHost;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(
    name = "cdc2pilosa",
    about = "Replay committed row changes into a Pilosa index",
    version
)]
struct Args {
    /// JSON lines file of transactions (reads stdin when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Index store address, overrides PILOSA_ADDRESS
    #[arg(short, long)]
    address: Option<String>,

    /// JSON file describing the source tables' columns
    #[arg(short, long)]
    metadata: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = HandlerConfig::from_env()?;
    if let Some(address) = args.address.clone() {
        config = config.with_address(address);
    }

    init_tracing(config.log_format);

    info!("Index store address: {}", config.address);
    info!("Watched table: {}", config.watched_table);
    info!("Target index: {}", config.index_name);

    // Set up signal handling for graceful shutdown
    let shutdown_signal = Arc::new(AtomicBool::new(false));
    let signal_clone = shutdown_signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, finishing the current transaction");
            signal_clone.store(true, Ordering::SeqCst);
        }
    });

    match run(args, config, shutdown_signal).await {
        Ok(()) => {
            info!("Replication completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Replication failed: {:#}", e);
            Err(e)
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .init(),
        LogFormat::Json => fmt().json().with_env_filter(filter).init(),
    }
}

async fn run(args: Args, config: HandlerConfig, shutdown_signal: Arc<AtomicBool>) -> Result<()> {
    let metadata = match &args.metadata {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading metadata from {}", path.display()))?;
            serde_json::from_str::<MetaData>(&text)
                .with_context(|| format!("parsing metadata from {}", path.display()))?
        }
        None => MetaData::default(),
    };

    let connector = PilosaConnector::new(config.request_timeout);
    let handler = PilosaHandler::from_config(connector, &config);
    let host_config = HostConfig {
        handler_name: "pilosa".to_string(),
        ..HostConfig::default()
    };
    let mut host = ReplayHost::new(handler, host_config, shutdown_signal).with_metadata(metadata);

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let result = host.run(reader).await;
    info!("Replay finished: {}", host.state());
    Ok(result?)
}
