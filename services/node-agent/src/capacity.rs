//! Capacity accounting for the node.
//!
//! Schedulable capacity is what the host physically has, minus what live
//! instances are allocated, minus what destroyed instances still hold while
//! the backend finishes cleaning up after them:
//!
//! ```text
//! free = capacity - allocated - held
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use ghost_reservations::{
    Clock, Expiry, Reservation, ReservationError, ResourceMap, SharedReservationSet, SystemClock,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::hold::{HoldPolicy, InstanceAllocation};

/// Errors from capacity accounting.
#[derive(Debug, Error)]
pub enum CapacityError {
    #[error("instance already allocated: {0}")]
    AlreadyAllocated(String),

    #[error("invalid hold: {0}")]
    InvalidHold(#[from] ReservationError),
}

/// Point-in-time view of the node's capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacitySnapshot {
    pub capacity: ResourceMap,
    pub allocated: ResourceMap,
    pub held: ResourceMap,
    pub free: ResourceMap,
    pub instance_count: usize,
}

impl CapacitySnapshot {
    /// True when some resource is committed beyond the physical capacity.
    pub fn is_oversubscribed(&self) -> bool {
        self.free.iter().any(|(_, amount)| amount < 0)
    }
}

/// Tracks allocations and cleanup holds against the node's capacity.
pub struct CapacityAccountant {
    capacity: ResourceMap,
    clock: Arc<dyn Clock>,
    policy: Arc<dyn HoldPolicy>,
    reservations: SharedReservationSet,
    allocations: RwLock<HashMap<String, ResourceMap>>,
}

impl CapacityAccountant {
    /// Create an accountant driven by the system clock.
    pub fn new(capacity: ResourceMap, policy: Arc<dyn HoldPolicy>) -> Self {
        Self::with_clock(capacity, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        capacity: ResourceMap,
        policy: Arc<dyn HoldPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            capacity,
            reservations: SharedReservationSet::with_clock(Arc::clone(&clock)),
            clock,
            policy,
            allocations: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> &ResourceMap {
        &self.capacity
    }

    /// Handle to the node's reservation set.
    pub fn reservations(&self) -> &SharedReservationSet {
        &self.reservations
    }

    /// Record resources allocated to a new instance.
    pub async fn allocate(
        &self,
        instance_id: &str,
        resources: ResourceMap,
    ) -> Result<(), CapacityError> {
        let mut allocations = self.allocations.write().await;
        if allocations.contains_key(instance_id) {
            return Err(CapacityError::AlreadyAllocated(instance_id.to_string()));
        }

        debug!(instance_id, resources = ?resources, "Allocating instance resources");
        allocations.insert(instance_id.to_string(), resources);
        Ok(())
    }

    /// Release an instance's allocation after it has been destroyed.
    ///
    /// The hold policy decides whether the freed resources stay reserved.
    /// The reservation is added before the allocation is dropped, so the
    /// resources never appear free in between. Unknown instances are a no-op.
    pub async fn release(&self, instance_id: &str) -> Result<Option<Reservation>, CapacityError> {
        let mut allocations = self.allocations.write().await;

        let Some(resources) = allocations.get(instance_id) else {
            warn!(instance_id, "Release for unknown instance");
            return Ok(None);
        };

        let allocation = InstanceAllocation {
            instance_id: instance_id.to_string(),
            resources: resources.clone(),
        };

        let reservation = match self.policy.hold_for(&allocation) {
            Some(expiry) => {
                let reservation =
                    Reservation::with_clock(self.clock.as_ref(), expiry, allocation.resources)?;
                info!(
                    instance_id,
                    expire_at = %reservation.expire_at(),
                    resources = ?reservation.resources(),
                    "Holding resources for cleanup"
                );
                self.reservations.add(reservation.clone());
                Some(reservation)
            }
            None => None,
        };

        allocations.remove(instance_id);
        Ok(reservation)
    }

    /// Hold resources directly, independent of any allocation.
    pub fn hold(&self, expiry: Expiry, resources: ResourceMap) -> Result<(), CapacityError> {
        let reservation = Reservation::with_clock(self.clock.as_ref(), expiry, resources)?;
        self.reservations.add(reservation);
        Ok(())
    }

    /// Resources still held by unexpired reservations.
    pub fn held(&self) -> ResourceMap {
        self.reservations.totals()
    }

    /// Sum of all live allocations.
    pub async fn allocated(&self) -> ResourceMap {
        sum_allocations(&*self.allocations.read().await)
    }

    pub async fn instance_count(&self) -> usize {
        self.allocations.read().await.len()
    }

    /// Capacity left for new instances, per capacity resource.
    pub async fn free(&self) -> ResourceMap {
        self.snapshot().await.free
    }

    pub async fn snapshot(&self) -> CapacitySnapshot {
        let allocations = self.allocations.read().await;
        let allocated = sum_allocations(&allocations);
        let held = self.reservations.totals();
        let free = self.capacity.minus(&allocated).minus(&held);

        CapacitySnapshot {
            capacity: self.capacity.clone(),
            allocated,
            held,
            free,
            instance_count: allocations.len(),
        }
    }
}

fn sum_allocations(allocations: &HashMap<String, ResourceMap>) -> ResourceMap {
    let mut total = ResourceMap::new();
    for resources in allocations.values() {
        total.add(resources);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hold::{FixedHold, NoHold};
    use chrono::{Duration, TimeZone, Utc};
    use ghost_reservations::{ManualClock, LOCAL_GB, MEMORY_MB, VCPUS};

    fn map(entries: &[(&str, i64)]) -> ResourceMap {
        entries.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn node_capacity() -> ResourceMap {
        map(&[(VCPUS, 16), (MEMORY_MB, 65536), (LOCAL_GB, 500)])
    }

    fn setup(policy: Arc<dyn HoldPolicy>) -> (Arc<ManualClock>, CapacityAccountant) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let accountant = CapacityAccountant::with_clock(node_capacity(), policy, clock.clone());
        (clock, accountant)
    }

    fn hold_secs(secs: i64) -> Arc<dyn HoldPolicy> {
        Arc::new(FixedHold(Expiry::After(Duration::seconds(secs))))
    }

    #[tokio::test]
    async fn test_allocate_reduces_free() {
        let (_, accountant) = setup(Arc::new(NoHold));
        accountant
            .allocate("inst_1", map(&[(VCPUS, 4), (MEMORY_MB, 8192)]))
            .await
            .unwrap();

        assert_eq!(
            accountant.free().await,
            map(&[(VCPUS, 12), (MEMORY_MB, 57344), (LOCAL_GB, 500)])
        );
        assert_eq!(accountant.instance_count().await, 1);
    }

    #[tokio::test]
    async fn test_double_allocate_rejected() {
        let (_, accountant) = setup(Arc::new(NoHold));
        accountant.allocate("inst_1", map(&[(VCPUS, 1)])).await.unwrap();

        let err = accountant
            .allocate("inst_1", map(&[(VCPUS, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, CapacityError::AlreadyAllocated(id) if id == "inst_1"));
    }

    #[tokio::test]
    async fn test_release_without_hold_frees_immediately() {
        let (_, accountant) = setup(Arc::new(NoHold));
        accountant.allocate("inst_1", map(&[(VCPUS, 4)])).await.unwrap();

        assert_eq!(accountant.release("inst_1").await.unwrap(), None);
        assert_eq!(accountant.free().await, node_capacity());
    }

    #[tokio::test]
    async fn test_release_holds_until_expiry() {
        let (clock, accountant) = setup(hold_secs(30));
        accountant
            .allocate("inst_1", map(&[(VCPUS, 4), (LOCAL_GB, 50)]))
            .await
            .unwrap();

        let reservation = accountant.release("inst_1").await.unwrap().unwrap();
        assert_eq!(reservation.resources(), &map(&[(VCPUS, 4), (LOCAL_GB, 50)]));

        let snapshot = accountant.snapshot().await;
        assert!(snapshot.allocated.is_empty());
        assert_eq!(snapshot.held, map(&[(VCPUS, 4), (LOCAL_GB, 50)]));
        assert_eq!(snapshot.free.get(VCPUS), 12);
        assert_eq!(snapshot.instance_count, 0);

        clock.advance(Duration::seconds(30));
        assert!(accountant.held().is_empty());
        assert_eq!(accountant.free().await, node_capacity());
    }

    #[tokio::test]
    async fn test_release_unknown_instance() {
        let (_, accountant) = setup(hold_secs(30));
        assert_eq!(accountant.release("inst_missing").await.unwrap(), None);
        assert!(accountant.reservations().is_empty());
    }

    #[tokio::test]
    async fn test_direct_hold() {
        let (clock, accountant) = setup(Arc::new(NoHold));
        accountant
            .hold(Expiry::from_secs(10).unwrap(), map(&[(MEMORY_MB, 1024)]))
            .unwrap();

        assert_eq!(accountant.free().await.get(MEMORY_MB), 64512);

        clock.advance(Duration::seconds(10));
        assert_eq!(accountant.free().await.get(MEMORY_MB), 65536);
    }

    #[tokio::test]
    async fn test_oversubscription_is_visible() {
        let (_, accountant) = setup(hold_secs(60));
        accountant.allocate("inst_1", map(&[(VCPUS, 10)])).await.unwrap();
        accountant.release("inst_1").await.unwrap();
        accountant.allocate("inst_2", map(&[(VCPUS, 10)])).await.unwrap();

        let snapshot = accountant.snapshot().await;
        assert_eq!(snapshot.free.get(VCPUS), -4);
        assert!(snapshot.is_oversubscribed());
    }
}
