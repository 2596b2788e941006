//! WanderNode - WanderMesh node daemon
//!
//! Runs an in-process simulation of WanderMesh nodes and optionally sends a
//! demo message from the first node to the last.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wandermesh_network::{ChannelRegistry, LogChannel};
use wandermesh_protocol::Priority;
use wandernode::config::LoggingConfig;
use wandernode::{Config, Simulation};

#[derive(Parser, Debug)]
#[command(name = "wandernode")]
#[command(about = "WanderMesh opportunistic store-and-forward node")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "WANDERNODE_CONFIG")]
    config: Option<PathBuf>,

    /// Write a default configuration and exit
    #[arg(long)]
    init: bool,

    /// Log level (overrides configuration and RUST_LOG)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Number of simulated nodes
    #[arg(short, long)]
    nodes: Option<usize>,

    /// Send this text from the first node to the last
    #[arg(short, long)]
    send: Option<String>,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(short, long)]
    duration_secs: Option<u64>,
}

fn init_logging(logging: &LoggingConfig, level_override: Option<&str>) {
    let filter = match level_override {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level)),
    };

    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init {
        let config = Config::create_default(args.config)?;
        println!("Configuration written to {}", config.config_path().display());
        return Ok(());
    }

    let config = Config::load(args.config)?;
    init_logging(&config.logging, args.log_level.as_deref());

    info!("Starting WanderNode");
    info!("Configuration: {}", config.config_path().display());

    let mut channels = ChannelRegistry::new();
    channels.register(Arc::new(LogChannel));

    let count = args.nodes.unwrap_or(config.node.simulated_nodes);
    let mut simulation = Simulation::chain(&config, count, channels).await?;
    simulation.start().await?;

    if let Some(text) = args.send {
        let ids = simulation.ids();
        if let (Some(first), Some(last)) = (ids.first(), ids.last()) {
            simulation
                .send(first, last, text.into_bytes(), Priority::normal())
                .await?;
        }
    }

    match args.duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!("Run time of {}s elapsed", secs);
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C signal");
                }
            }
        }
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Received Ctrl+C signal");
        }
    }

    for (id, stats) in simulation.stats().await {
        let pending = match simulation.node(&id) {
            Some(node) => node.queue_stats().await.total,
            None => 0,
        };
        info!(
            "{}: processed {}, delivered {}, transmitted {}, failures {}, clones {}, dropped {}, pending {}",
            id,
            stats.messages_processed,
            stats.delivered,
            stats.transmitted,
            stats.transmit_failures,
            stats.clones_created,
            stats.dropped(),
            pending
        );
    }

    simulation.shutdown().await;
    info!("WanderNode stopped");

    Ok(())
}
