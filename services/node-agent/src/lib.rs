//! ghost Node Agent Library
//!
//! The node agent runs on each compute host and reports how much capacity
//! is free for new workloads. Capacity freed by a destroyed workload is held
//! back while the virtualization backend is still cleaning up after it, so
//! the scheduler never places work on resources that are not yet usable.
//!
//! ## Modules
//!
//! - `capacity`: physical capacity minus allocations minus cleanup holds
//! - `hold`: policies deciding how long freed resources stay held
//! - `heartbeat`: periodic capacity reports to the control plane
//! - `resources`: host measurement (CPU, memory, disk)
//!
//! Hold bookkeeping lives in the `ghost-reservations` crate.

pub mod capacity;
pub mod client;
pub mod config;
pub mod heartbeat;
pub mod hold;
pub mod resources;

// Re-export commonly used types
pub use capacity::{CapacityAccountant, CapacityError, CapacitySnapshot};
pub use client::{ControlPlaneClient, HeartbeatRequest, HeartbeatSink, NodeState};
pub use hold::{FixedHold, HoldPolicy, InstanceAllocation, NoHold, ScrubHold};
