//! ghost Node Agent
//!
//! Measures the host, tracks instance allocations and cleanup holds, and
//! reports schedulable capacity to the control plane.
//!
//! ## Architecture
//!
//! - **Capacity Accountant**: capacity minus allocations minus held resources
//! - **Hold Policy**: how long a destroyed instance's resources stay held
//! - **Heartbeat Loop**: reports free capacity to the control plane periodically
//!
//! Holds are kept in memory only; restarting the agent releases them.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use ghost_node_agent::capacity::CapacityAccountant;
use ghost_node_agent::client::{ControlPlaneClient, HeartbeatSink};
use ghost_node_agent::config::Config;
use ghost_node_agent::resources::SystemResources;
use ghost_node_agent::{heartbeat, hold};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so the log level can default from it
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting ghost node agent");
    info!(
        node_id = %config.node_id,
        control_plane_url = %config.control_plane_url,
        data_dir = %config.data_dir,
        cleanup_hold = ?config.cleanup_hold,
        scrub_secs_per_gb = ?config.scrub_secs_per_gb,
        "Configuration loaded"
    );

    let system = SystemResources::measure(Path::new(&config.data_dir));
    let capacity = system.capacity();
    info!(
        cpu_cores = system.cpu_cores,
        total_memory_bytes = system.total_memory_bytes,
        available_memory_bytes = system.available_memory_bytes,
        total_disk_bytes = system.total_disk_bytes,
        "Measured host resources"
    );

    let accountant = Arc::new(CapacityAccountant::new(
        capacity,
        hold::from_config(&config),
    ));
    let sink: Arc<dyn HeartbeatSink> = Arc::new(ControlPlaneClient::new(&config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut heartbeat_handle = tokio::spawn({
        let config = config.clone();
        let accountant = Arc::clone(&accountant);
        async move { heartbeat::run_heartbeat_loop(config, accountant, sink, shutdown_rx).await }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut heartbeat_handle => {
            match result {
                Ok(Ok(())) => info!("Heartbeat loop exited normally"),
                Ok(Err(e)) => error!(error = %e, "Heartbeat loop error"),
                Err(e) => error!(error = %e, "Heartbeat task panicked"),
            }
            return Ok(());
        }
    }

    let _ = shutdown_tx.send(true);

    info!("Waiting for heartbeat loop to stop...");
    match heartbeat_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Heartbeat loop error"),
        Err(e) => error!(error = %e, "Heartbeat task panicked"),
    }

    info!("Node agent shutdown complete");
    Ok(())
}
