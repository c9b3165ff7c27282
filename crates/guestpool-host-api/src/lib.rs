//! Capability trait interfaces for guestpool
//!
//! This crate defines the narrow interfaces between the allocation,
//! provisioning and reaping algorithms and the operating system: the
//! identity database, the mount table, the process table and the scratch
//! filesystem. It contains no platform code itself; production adapters
//! live in `guestpool-host-linux`, and `MockSystem` provides an in-memory
//! implementation for tests.

mod mock;
mod records;
mod traits;

pub use mock::*;
pub use records::*;
pub use traits::*;
