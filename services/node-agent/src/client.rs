//! Control plane API client for the node agent.
//!
//! The node reports its schedulable capacity, including resources still held
//! for cleanup, through periodic heartbeats.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ghost_reservations::{ResourceMap, LOCAL_GB, MEMORY_MB, VCPUS};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::capacity::CapacitySnapshot;
use crate::config::Config;

/// Destination for heartbeats.
#[async_trait]
pub trait HeartbeatSink: Send + Sync {
    async fn send_heartbeat(&self, request: &HeartbeatRequest) -> Result<HeartbeatResponse>;
}

/// Control plane API client.
pub struct ControlPlaneClient {
    client: reqwest::Client,
    base_url: String,
    node_id: String,
}

impl ControlPlaneClient {
    /// Create a new control plane client.
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.control_plane_url.trim_end_matches('/').to_string(),
            node_id: config.node_id.clone(),
        })
    }

    fn heartbeat_url(&self) -> String {
        format!("{}/v1/nodes/{}/heartbeat", self.base_url, self.node_id)
    }
}

#[async_trait]
impl HeartbeatSink for ControlPlaneClient {
    async fn send_heartbeat(&self, request: &HeartbeatRequest) -> Result<HeartbeatResponse> {
        let url = self.heartbeat_url();
        debug!(url = %url, "Sending heartbeat");

        let response = self
            .client
            .post(&url)
            .json(request)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Heartbeat rejected");
            anyhow::bail!("Heartbeat failed with status: {}", status);
        }

        let body: HeartbeatResponse = response.json().await?;
        Ok(body)
    }
}

/// Heartbeat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeartbeatRequest {
    /// Current node state.
    pub state: NodeState,

    /// Available CPU cores.
    pub available_cpu_cores: i32,

    /// Available memory in bytes.
    pub available_memory_bytes: i64,

    /// Available local disk in GiB.
    pub available_disk_gb: i64,

    /// Resources held for post-teardown cleanup.
    pub held: ResourceMap,

    /// Number of live instances.
    pub instance_count: i32,
}

impl HeartbeatRequest {
    /// Build a heartbeat from a capacity snapshot.
    ///
    /// Available amounts are clamped at zero; an oversubscribed node reports
    /// itself as degraded instead.
    pub fn from_snapshot(snapshot: &CapacitySnapshot) -> Self {
        let state = if snapshot.is_oversubscribed() {
            NodeState::Degraded
        } else {
            NodeState::Active
        };

        let free = &snapshot.free;
        Self {
            state,
            available_cpu_cores: i32::try_from(free.get(VCPUS).max(0)).unwrap_or(i32::MAX),
            available_memory_bytes: free.get(MEMORY_MB).max(0).saturating_mul(1024 * 1024),
            available_disk_gb: free.get(LOCAL_GB).max(0),
            held: snapshot.held.clone(),
            instance_count: i32::try_from(snapshot.instance_count).unwrap_or(i32::MAX),
        }
    }
}

/// Node state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Active,
    Degraded,
}

/// Heartbeat response.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatResponse {
    /// Whether the heartbeat was accepted.
    pub accepted: bool,

    /// Next heartbeat interval in seconds.
    pub next_heartbeat_secs: i32,
}
