//! Fusion server: HMD upper-body packets over UDP plus lower-body snapshots
//! from a producer thread, both feeding one shared workspace.
//!
//! Camera inference is not part of this binary; `--replay` plays back a
//! recorded JSON-lines snapshot file in its place.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use pose_fusion::config::Config;
use pose_fusion::listener::PacketListener;
use pose_fusion::logging;
use pose_fusion::producer::{ProducerThread, ReplaySource};
use pose_fusion::workspace::FusionWorkspace;

const CONFIG_PATH: &str = "pose_fusion.toml";

#[derive(Parser, Debug)]
#[command(version = env!("GIT_VERSION"), about = "Upper/lower body fusion workspace server")]
struct Args {
    /// Interface for HMD packets (default: 0.0.0.0)
    #[arg(long)]
    host: Option<String>,

    /// UDP port for HMD packets (default: 9000)
    #[arg(long)]
    port: Option<u16>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file; missing file means defaults
    #[arg(short, long, default_value = CONFIG_PATH)]
    config: PathBuf,

    /// JSON-lines file of lower-body snapshots to replay
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Pause between replayed snapshots
    #[arg(long)]
    replay_interval_ms: Option<u64>,

    /// Keep recorded timestamps instead of restamping with the wall clock
    #[arg(long)]
    keep_timestamps: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load_optional(&args.config)?;
    if let Some(host) = args.host {
        config.listener.host = host;
    }
    if let Some(port) = args.port {
        config.listener.port = port;
    }
    if let Some(interval) = args.replay_interval_ms {
        config.producer.interval_ms = interval;
    }
    if args.keep_timestamps {
        config.producer.restamp = false;
    }
    config.listener.verbose |= args.verbose;

    logging::init(&config.logging.level, config.listener.verbose);
    info!("Fusion server ({})", env!("GIT_VERSION"));
    info!(
        "Workspace: sample every {} lower-body updates, staleness={:?}",
        config.workspace.sample_every, config.workspace.staleness
    );

    let workspace = Arc::new(FusionWorkspace::with_logging(config.workspace.clone()));

    // Bind before starting producers so a busy port fails fast
    let listener = PacketListener::from_config(&config.listener).await?;
    let stop = listener.stop_handle();

    let producer = match &args.replay {
        Some(path) => {
            let source = ReplaySource::open(path, config.producer.restamp)?;
            info!("Replaying lower-body snapshots from {}", path.display());
            Some(ProducerThread::spawn(
                "replay",
                source,
                Arc::clone(&workspace),
                &config.producer,
            )?)
        }
        None => {
            info!("No lower-body producer configured, upper body only");
            None
        }
    };

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down fusion workspace");
                stop.stop();
            }
            Err(e) => warn!("Ctrl-C handler unavailable: {}", e),
        }
    });

    let stats = listener.run(workspace.packet_handler()).await;

    if let Some(producer) = producer {
        producer.stop();
        let produced = producer.join();
        info!("Producer delivered {} snapshots", produced);
    }
    info!(
        "Listener received {} packets ({} dropped, {} handler failures); {} lower-body updates",
        stats.received,
        stats.dropped,
        stats.handler_failures,
        workspace.lower_body_updates()
    );
    Ok(())
}
