//! Headless Blastroom peer.
//!
//! Joins a room over NATS, keeps the room state in sync, and runs the
//! frame loop with no local input until interrupted. Useful as a room
//! anchor: it answers presence announcements, takes part in the obstacle
//! leader election, and logs a periodic summary of the room.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `BLASTROOM_CONFIG` or `blastroom.yaml`
//! 3. Connect to NATS and open the room's lease and retained buckets
//! 4. Start the session (claims the identity, announces the player)
//! 5. Run frames until Ctrl-C, or until another process takes the identity
//! 6. Shut down, releasing leases

mod error;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use blastroom_core::{FrameIntent, RoomConfig, Session};
use blastroom_net::NatsBroker;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::NodeError;

const DEFAULT_CONFIG: &str = "blastroom.yaml";
const SUMMARY_INTERVAL: Duration = Duration::from_secs(10);

/// Application entry point for the node.
///
/// # Errors
///
/// Returns an error if configuration, connection, or joining the room fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("blastroom-node starting");

    // 2. Load configuration.
    let config = load_config()?;
    info!(
        room = config.room,
        player = config.player,
        width = config.grid.width,
        height = config.grid.height,
        "Configuration loaded"
    );

    // 3-4. Connect and join.
    let mut session = join(&config).await?;

    // 5. Run until interrupted.
    let outcome = run(&mut session, &config).await;

    // 6. Leave.
    session.shutdown().await;
    outcome?;
    info!("blastroom-node stopped");
    Ok(())
}

/// Load configuration from `BLASTROOM_CONFIG`, falling back to
/// `blastroom.yaml`, falling back to defaults.
fn load_config() -> Result<RoomConfig, NodeError> {
    let path = std::env::var("BLASTROOM_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    if path.exists() {
        Ok(RoomConfig::from_file(&path)?)
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(RoomConfig::parse("")?)
    }
}

async fn join(config: &RoomConfig) -> Result<Session, NodeError> {
    info!(nats_url = config.nats_url, "Connecting to NATS");
    let broker = NatsBroker::connect(&config.nats_url, &config.room, config.lease_ttl()).await?;
    let session = Session::start(Arc::new(broker), config).await?;
    info!(room = config.room, player = session.identity(), "Joined room");
    Ok(session)
}

async fn run(session: &mut Session, config: &RoomConfig) -> Result<(), NodeError> {
    let mut frames = tokio::time::interval(config.timing.tick());
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut summary = tokio::time::interval(SUMMARY_INTERVAL);
    summary.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                }
                info!("Shutdown requested");
                return Ok(());
            }
            _ = frames.tick() => {
                let report = session.tick(FrameIntent::IDLE);
                if report.local_died {
                    info!(player = session.identity(), "Local player died");
                }
                session.ensure_identity()?;
            }
            _ = summary.tick() => {
                let s = session.room().summary();
                info!(
                    players = s.players,
                    alive = s.alive,
                    bombs = s.bombs,
                    lethal_cells = s.lethal_cells,
                    obstacles = s.obstacles,
                    leader = session.is_leader(),
                    "Room summary"
                );
            }
        }
    }
}
