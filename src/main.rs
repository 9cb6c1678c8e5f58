//! Standalone UDP pose receiver: logs every JSON pose packet from the HMD rig.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde_json::Value;
use tracing::{debug, info, warn};

use pose_fusion::config::Config;
use pose_fusion::listener::PacketListener;
use pose_fusion::logging;
use pose_fusion::pose::UpperBodyPacket;

const CONFIG_PATH: &str = "pose_fusion.toml";
const SAMPLE_JOINTS: usize = 4;

#[derive(Parser, Debug)]
#[command(version = env!("GIT_VERSION"), about = "Raw UDP pose receiver")]
struct Args {
    /// Interface to bind (default: 0.0.0.0)
    #[arg(long)]
    host: Option<String>,

    /// UDP port to listen on (default: 9000)
    #[arg(long)]
    port: Option<u16>,

    /// Increase logging verbosity (prints sample joint positions)
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file; missing file means defaults
    #[arg(short, long, default_value = CONFIG_PATH)]
    config: PathBuf,
}

fn log_packet(payload: Value, addr: SocketAddr) -> Result<()> {
    let packet = UpperBodyPacket::from_value(payload);
    let hmd = packet.hmd();
    let timestamp = if packet.has_timestamp() {
        format!("{:.3}", packet.timestamp())
    } else {
        "none".to_string()
    };

    info!(
        "Packet from {} timestamp={} hmd=({:.3}, {:.3}, {:.3}) yaw={:.1}",
        addr, timestamp, hmd.position.x, hmd.position.y, hmd.position.z, hmd.rotation.y
    );
    if packet.joint_count() > 0 {
        debug!("Sample joints {}", packet.joint_summary(SAMPLE_JOINTS));
    }
    Ok(())
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
    config.listener.verbose |= args.verbose;

    logging::init(&config.logging.level, config.listener.verbose);
    info!("Pose receiver ({})", env!("GIT_VERSION"));

    let listener = PacketListener::from_config(&config.listener).await?;
    let stop = listener.stop_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down UDP receiver");
                stop.stop();
            }
            Err(e) => warn!("Ctrl-C handler unavailable: {}", e),
        }
    });

    let stats = listener.run(log_packet).await;
    info!(
        "Received {} packets ({} dropped, {} handler failures)",
        stats.received, stats.dropped, stats.handler_failures
    );
    Ok(())
}
