//! Configuration for the node agent.

use anyhow::{Context, Result};
use ghost_reservations::Expiry;

/// Node agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this node.
    pub node_id: String,

    /// Control plane API URL.
    pub control_plane_url: String,

    /// Data directory; its filesystem provides the node's local disk.
    pub data_dir: String,

    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// How long freed resources stay held after a workload is destroyed.
    ///
    /// `None` releases capacity immediately.
    pub cleanup_hold: Option<Expiry>,

    /// Extra hold per GiB of local disk, for backends that scrub disks.
    pub scrub_secs_per_gb: Option<f64>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let node_id = lookup("GHOST_NODE_ID")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("node_{}", uuid::Uuid::new_v4().simple()));

        let control_plane_url = lookup("GHOST_CONTROL_PLANE_URL")
            .unwrap_or_else(|| "http://127.0.0.1:8080".to_string());

        let data_dir = lookup("GHOST_DATA_DIR").unwrap_or_else(|| "/var/lib/ghost".to_string());

        let heartbeat_interval_secs = lookup("GHOST_HEARTBEAT_INTERVAL")
            .and_then(|s| s.parse().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(10);

        let log_level = lookup("GHOST_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let cleanup_hold = match lookup("GHOST_CLEANUP_HOLD") {
            Some(raw) => parse_hold(&raw).context("GHOST_CLEANUP_HOLD")?,
            None => None,
        };

        let scrub_secs_per_gb = match lookup("GHOST_SCRUB_SECS_PER_GB") {
            Some(raw) => {
                let rate: f64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("GHOST_SCRUB_SECS_PER_GB: invalid rate '{raw}'"))?;
                if !rate.is_finite() || rate < 0.0 {
                    anyhow::bail!("GHOST_SCRUB_SECS_PER_GB: rate must be a non-negative number");
                }
                (rate > 0.0).then_some(rate)
            }
            None => None,
        };

        Ok(Self {
            node_id,
            control_plane_url,
            data_dir,
            heartbeat_interval_secs,
            log_level,
            cleanup_hold,
            scrub_secs_per_gb,
        })
    }
}

/// A hold must be relative; a zero or negative hold disables holding.
fn parse_hold(raw: &str) -> Result<Option<Expiry>> {
    match raw.parse::<Expiry>()? {
        Expiry::At(instant) => {
            anyhow::bail!("hold must be a duration in seconds, got instant {instant}")
        }
        Expiry::After(delta) if delta <= chrono::Duration::zero() => Ok(None),
        hold => Ok(Some(hold)),
    }
}
