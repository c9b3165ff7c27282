//! Guest-slot allocation and account lifecycle for guestpool
//!
//! The core is deliberately OS-free: it speaks to the identity database,
//! mount table, process table and filesystem only through the capability
//! traits in `guestpool-host-api`, so everything here runs unchanged against
//! `MockSystem` in tests and the Linux adapters in production.
//!
//! Components:
//! - [`next_guest_identity`]: pick the slot to hand out, recycling orphans
//!   before extending the pool
//! - [`provision`]: build the ephemeral tmpfs home and the account bound to
//!   it, with step-local rollback
//! - [`teardown`]: best-effort reclamation of processes, mounts, scratch
//!   files and the account itself
//! - [`GuestPool`]: the four framework-facing operations sequencing the
//!   above and reducing every failure to an [`Outcome`]

mod outcome;
mod pool;
mod provision;
mod reaper;
mod slots;

pub use outcome::*;
pub use pool::*;
pub use provision::*;
pub use reaper::*;
pub use slots::*;
