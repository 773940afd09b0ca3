//! USB subsystem
//!
//! Device enumeration, descriptor snapshots and the handle lifecycle.
//! Everything here is synchronous and blocking; the host's interface claim
//! is the only lock involved.

pub mod descriptor;
pub mod driver;
pub mod enumerator;
pub mod host;
pub mod lifecycle;
pub mod snapshot;
pub mod transfers;

// Re-export public types
pub use descriptor::{DeviceDescriptor, DeviceLocation};
pub use driver::{KernelDriverSupport, select_driver_support};
pub use enumerator::{DeviceFilter, Topology};
pub use host::{DiscoveredDevice, RusbHost, UsbHost, UsbSession};
pub use lifecycle::{ClaimedDevice, HandleManager, HandleState, ReleaseReport};
pub use snapshot::{DeviceSnapshot, SnapshotList};
