//! Instance lifecycle: slot ids, region allocation, provisioning, and the
//! recycling cache.
//!
//! The pieces compose bottom-up: [`SlotPool`] hands out integer handles,
//! [`InstanceAllocator`] maps a handle plus template bounds to a
//! non-overlapping region, [`Provisioner`] materializes blocks there, and
//! [`InstanceCache`] parks finished copies so the whole chain can be
//! skipped next time. [`InstanceManager`] wires them together for the
//! coordinator.

pub mod allocator;
pub mod cache;
pub mod manager;
pub mod provision;
pub mod slot;

pub use allocator::{Allocation, InstanceAllocator};
pub use cache::{InstanceCache, InstanceCopy};
pub use manager::InstanceManager;
pub use provision::{NullProvisioner, Provisioner};
pub use slot::SlotPool;
