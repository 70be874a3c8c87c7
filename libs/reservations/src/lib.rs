//! # ghost-reservations
//!
//! Temporal resource reservations for a compute node.
//!
//! Some virtualization backends keep scrubbing a workload's disk or memory
//! after the workload itself is gone. Until that work finishes the freed
//! capacity must not be offered to the scheduler again. A [`Reservation`]
//! records "this much of each resource stays held until `expire_at`", and a
//! [`ReservationSet`] answers how much is still held right now.
//!
//! ## Caching
//!
//! The set keeps two caches:
//!
//! - `next_expiry`: the soonest `expire_at` of any held reservation. A query
//!   only looks for expired entries once this instant has passed.
//! - the aggregate: per-resource totals. Adding a reservation folds it into
//!   a valid aggregate; pruning discards the aggregate so the next query
//!   rebuilds it.
//!
//! Repeated queries with nothing added and nothing expired touch neither the
//! collection nor the sums.
//!
//! ## Durability
//!
//! Reservations live only in memory. A restart of the owning process drops
//! every pending reservation and the freed capacity becomes schedulable
//! immediately. Reservations guard against mis-scheduling during cleanup;
//! they are not a ledger.
//!
//! ## Example
//!
//! ```
//! use chrono::{Duration, TimeZone, Utc};
//! use ghost_reservations::{Expiry, ManualClock, Reservation, ReservationSet, ResourceMap};
//! use std::sync::Arc;
//!
//! let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
//! let mut set = ReservationSet::with_clock(clock.clone());
//!
//! let held: ResourceMap = [("vcpus", 2), ("memory_mb", 4096)].into_iter().collect();
//! let expiry = Expiry::from_secs(30).unwrap();
//! set.add(Reservation::with_clock(clock.as_ref(), expiry, held).unwrap());
//! assert_eq!(set.totals().get("vcpus"), 2);
//!
//! clock.advance(Duration::seconds(30));
//! assert!(set.totals().is_empty());
//! ```

mod clock;
mod error;
mod reservation;
mod resources;
mod set;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ReservationError;
pub use reservation::{Expiry, Reservation};
pub use resources::{ResourceMap, LOCAL_GB, MEMORY_MB, VCPUS};
pub use set::{ReservationSet, ReservationSetStats, SharedReservationSet};
