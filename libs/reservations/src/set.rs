//! The per-node set of pending reservations.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::reservation::Reservation;
use crate::resources::ResourceMap;

/// Counters describing how much work the set has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReservationSetStats {
    /// Number of pruning passes.
    pub prunes: u64,

    /// Reservations dropped by pruning.
    pub pruned_reservations: u64,

    /// Full rebuilds of the aggregate.
    pub rebuilds: u64,
}

/// Unexpired reservations for one node and the resources they hold.
///
/// Not internally synchronized; use [`SharedReservationSet`] when more than
/// one task needs access.
pub struct ReservationSet {
    clock: Arc<dyn Clock>,
    reservations: Vec<Reservation>,
    /// Minimum `expire_at` over `reservations`, `None` iff empty.
    next_expiry: Option<DateTime<Utc>>,
    /// Exact per-resource sum over `reservations` when `Some`.
    aggregate: Option<ResourceMap>,
    stats: ReservationSetStats,
}

impl ReservationSet {
    /// Create an empty set driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty set driven by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            reservations: Vec::new(),
            next_expiry: None,
            aggregate: None,
            stats: ReservationSetStats::default(),
        }
    }

    /// Add a reservation.
    ///
    /// A valid aggregate absorbs the new amounts directly; an invalid one
    /// stays invalid until the next [`totals`](Self::totals).
    pub fn add(&mut self, reservation: Reservation) {
        if let Some(aggregate) = self.aggregate.as_mut() {
            aggregate.add(reservation.resources());
        }

        debug!(
            expire_at = %reservation.expire_at(),
            resources = ?reservation.resources(),
            "Adding reservation"
        );

        self.reservations.push(reservation);
        self.next_expiry = self.reservations.iter().map(Reservation::expire_at).min();
    }

    /// Resources held by unexpired reservations, per resource.
    ///
    /// Reservations whose `expire_at` is at or before the current instant are
    /// dropped first. When nothing has expired and nothing was added since the
    /// last call, the cached aggregate is returned without rescanning.
    pub fn totals(&mut self) -> &ResourceMap {
        let now = self.clock.now();

        if self.next_expiry.is_some_and(|next| next <= now) {
            self.prune(now);
        }

        let aggregate = match self.aggregate.take() {
            Some(aggregate) => aggregate,
            None => self.rebuild(),
        };

        self.aggregate.insert(aggregate)
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let before = self.reservations.len();
        self.reservations.retain(|r| !r.is_expired_at(now));
        let pruned = before - self.reservations.len();

        self.next_expiry = self.reservations.iter().map(Reservation::expire_at).min();
        self.aggregate = None;

        self.stats.prunes += 1;
        self.stats.pruned_reservations += pruned as u64;

        debug!(
            pruned,
            remaining = self.reservations.len(),
            next_expiry = ?self.next_expiry,
            "Pruned expired reservations"
        );
    }

    fn rebuild(&mut self) -> ResourceMap {
        let mut aggregate = ResourceMap::new();
        for reservation in &self.reservations {
            aggregate.add(reservation.resources());
        }

        self.stats.rebuilds += 1;
        aggregate
    }

    /// Soonest expiration among retained reservations.
    pub fn next_expiry(&self) -> Option<DateTime<Utc>> {
        self.next_expiry
    }

    /// Whether the aggregate is currently valid.
    pub fn is_cached(&self) -> bool {
        self.aggregate.is_some()
    }

    /// Retained reservations, including expired ones not yet pruned.
    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter()
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    pub fn stats(&self) -> ReservationSetStats {
        self.stats
    }
}

impl Default for ReservationSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReservationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReservationSet")
            .field("reservations", &self.reservations)
            .field("next_expiry", &self.next_expiry)
            .field("aggregate", &self.aggregate)
            .field("stats", &self.stats)
            .finish()
    }
}

/// A [`ReservationSet`] behind a single lock, shareable across tasks.
///
/// Every operation holds the lock for its whole duration, so the caches are
/// never observed half-updated.
#[derive(Debug, Clone, Default)]
pub struct SharedReservationSet {
    inner: Arc<Mutex<ReservationSet>>,
}

impl SharedReservationSet {
    pub fn new(set: ReservationSet) -> Self {
        Self {
            inner: Arc::new(Mutex::new(set)),
        }
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::new(ReservationSet::with_clock(clock))
    }

    pub fn add(&self, reservation: Reservation) {
        self.lock().add(reservation);
    }

    /// Snapshot of the held totals.
    pub fn totals(&self) -> ResourceMap {
        self.lock().totals().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn next_expiry(&self) -> Option<DateTime<Utc>> {
        self.lock().next_expiry()
    }

    pub fn stats(&self) -> ReservationSetStats {
        self.lock().stats()
    }

    // The set has no window where a panic leaves it inconsistent.
    fn lock(&self) -> MutexGuard<'_, ReservationSet> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
