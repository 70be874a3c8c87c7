//! Cleanup hold policies.
//!
//! When a workload is destroyed the backend may keep working on its
//! resources (zeroing disks, tearing down memory mappings). A hold policy
//! decides how long the freed amounts stay reserved; the capacity
//! accountant turns that decision into a reservation.

use std::sync::Arc;

use chrono::Duration;
use ghost_reservations::{Expiry, ResourceMap, LOCAL_GB};

use crate::config::Config;

/// Resources allocated to one live instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceAllocation {
    pub instance_id: String,
    pub resources: ResourceMap,
}

/// Backend-specific decision on how long a destroyed instance's resources
/// stay unavailable.
pub trait HoldPolicy: Send + Sync {
    /// Expiry for the hold, or `None` to free the resources immediately.
    fn hold_for(&self, allocation: &InstanceAllocation) -> Option<Expiry>;
}

/// Resources become available as soon as the instance is gone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHold;

impl HoldPolicy for NoHold {
    fn hold_for(&self, _allocation: &InstanceAllocation) -> Option<Expiry> {
        None
    }
}

/// Every destroyed instance is held for the same expiry.
#[derive(Debug, Clone, Copy)]
pub struct FixedHold(pub Expiry);

impl HoldPolicy for FixedHold {
    fn hold_for(&self, _allocation: &InstanceAllocation) -> Option<Expiry> {
        Some(self.0)
    }
}

/// Hold that grows with the local disk to be scrubbed.
#[derive(Debug, Clone, Copy)]
pub struct ScrubHold {
    pub base: Duration,
    pub per_gb: Duration,
}

impl ScrubHold {
    pub fn new(base: Duration, secs_per_gb: f64) -> Self {
        let nanos = (secs_per_gb * 1e9).round().clamp(0.0, i64::MAX as f64);
        Self {
            base,
            per_gb: Duration::nanoseconds(nanos as i64),
        }
    }
}

impl HoldPolicy for ScrubHold {
    fn hold_for(&self, allocation: &InstanceAllocation) -> Option<Expiry> {
        let disk_gb = allocation.resources.get(LOCAL_GB).max(0);
        let scrub = i32::try_from(disk_gb)
            .ok()
            .and_then(|gb| self.per_gb.checked_mul(gb))
            .unwrap_or(Duration::MAX);
        let hold = self.base.checked_add(&scrub).unwrap_or(Duration::MAX);

        (hold > Duration::zero()).then_some(Expiry::After(hold))
    }
}

/// Pick the policy described by the configuration.
pub fn from_config(config: &Config) -> Arc<dyn HoldPolicy> {
    let base = match config.cleanup_hold {
        Some(Expiry::After(delta)) => delta,
        Some(Expiry::At(_)) | None => Duration::zero(),
    };

    match (config.scrub_secs_per_gb, config.cleanup_hold) {
        (Some(rate), _) => Arc::new(ScrubHold::new(base, rate)),
        (None, Some(hold)) => Arc::new(FixedHold(hold)),
        (None, None) => Arc::new(NoHold),
    }
}
