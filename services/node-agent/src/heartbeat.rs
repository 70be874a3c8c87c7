//! Heartbeat loop for reporting node capacity to the control plane.
//!
//! Each heartbeat carries the capacity still free for scheduling, which
//! already excludes resources held while destroyed instances are cleaned up.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::capacity::CapacityAccountant;
use crate::client::{HeartbeatRequest, HeartbeatSink};
use crate::config::Config;

/// Build the next heartbeat from the accountant's current view.
pub async fn build_heartbeat(accountant: &CapacityAccountant) -> HeartbeatRequest {
    let snapshot = accountant.snapshot().await;
    HeartbeatRequest::from_snapshot(&snapshot)
}

/// Run the heartbeat loop until shutdown.
pub async fn run_heartbeat_loop(
    config: Config,
    accountant: Arc<CapacityAccountant>,
    sink: Arc<dyn HeartbeatSink>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let interval = Duration::from_secs(config.heartbeat_interval_secs);

    info!(
        node_id = %config.node_id,
        interval_secs = config.heartbeat_interval_secs,
        "Starting heartbeat loop"
    );

    let mut consecutive_failures = 0u32;
    let mut interval_timer = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = interval_timer.tick() => {
                let request = build_heartbeat(&accountant).await;

                if request.held.iter().any(|(_, amount)| amount != 0) {
                    debug!(held = ?request.held, "Reporting resources held for cleanup");
                }

                match sink.send_heartbeat(&request).await {
                    Ok(response) => {
                        consecutive_failures = 0;
                        debug!(
                            accepted = response.accepted,
                            next_interval = response.next_heartbeat_secs,
                            instance_count = request.instance_count,
                            "Heartbeat acknowledged"
                        );
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        if consecutive_failures <= 3 {
                            warn!(
                                error = %e,
                                consecutive_failures,
                                "Heartbeat failed"
                            );
                        } else {
                            error!(
                                error = %e,
                                consecutive_failures,
                                "Heartbeat failed repeatedly"
                            );
                        }
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Heartbeat loop shutting down");
                    break;
                }
            }
        }
    }

    Ok(())
}
