//! Lifecycle outcomes and cleanup tiers
//!
//! The framework-facing entry points reduce every code path to one of these
//! outcomes. What went wrong and how much to clean up are kept separate: the
//! [`CleanupPlan`] is computed from which provisioning step failed, never
//! inferred from the outcome itself.

/// Standardized result of a lifecycle operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Proceed; for authenticate this means a slot was provisioned
    Success,

    /// Guest login disabled, the request is not for the guest pool, or the
    /// pool is temporarily unavailable. No resources were committed.
    Denied,

    /// No slot available; fail closed rather than exceed capacity
    Exhausted,

    /// A group/account/mount/filesystem operation failed; whatever was
    /// partially created has already been rolled back
    InfrastructureFailure,

    /// Provisioning appeared to succeed but a post-condition check failed;
    /// the strongest rollback tier was applied
    VerificationFailure,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// How much to undo when a provisioning step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupPlan {
    /// Nothing was created yet
    None,

    /// Only the empty mount-point directory exists
    RemoveDir,

    /// The directory may have content but nothing is mounted
    RemoveTree,

    /// A live mount is backing the directory: unmount, then remove the tree
    UnmountAndRemove,
}
