//! Guest slot naming and allocation
//!
//! A slot name is the pool base name followed by a positive decimal index,
//! e.g. `guest3`. The set of allocatable names is fully determined by the
//! configured base name and capacity; nothing outside that pattern is ever
//! handed out or reaped.

use std::collections::BTreeSet;
use std::fmt;

use guestpool_config::PoolPolicy;
use guestpool_host_api::{HomeStorage, HostError, IdentityStore};
use thiserror::Error;
use tracing::{debug, info};

/// One numbered position in the guest pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotName {
    text: String,
    index: u32,
}

impl SlotName {
    /// Build the canonical name for `base` + `index`
    pub fn new(base: &str, index: u32) -> Self {
        Self {
            text: format!("{}{}", base, index),
            index,
        }
    }

    /// Parse an account name as a slot of this pool. Returns `None` unless
    /// the name is `base` followed by a positive decimal integer.
    pub fn parse(name: &str, base: &str) -> Option<Self> {
        let suffix = name.strip_prefix(base)?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let index: u32 = suffix.parse().ok()?;
        if index == 0 {
            return None;
        }
        Some(Self {
            // keep the spelling actually present in the database
            text: name.to_string(),
            index,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Allocation failures
#[derive(Debug, Error)]
pub enum AllocError {
    /// The guest group must exist before allocation; creating it is the
    /// caller's job.
    #[error("Guest group '{0}' does not exist")]
    GroupMissing(String),

    /// More valid guest accounts than the configured capacity: the pool was
    /// resized down or mutated externally. Refuse rather than guess.
    #[error("Pool oversubscribed: {valid} guest accounts with capacity {capacity}")]
    Oversubscribed { valid: usize, capacity: u32 },

    /// Every slot index is occupied by an account with a live home
    #[error("No guest slot available (capacity {0})")]
    Exhausted(u32),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Choose the next guest identity to hand out.
///
/// Candidates are every identity-database row whose name parses as a slot of
/// this pool and whose primary group is the guest group, independent of
/// capacity, because stale accounts can outlive a config change. Rows whose
/// home path is gone are orphans from an interrupted teardown and are safe to
/// recycle immediately; recycling takes priority over extending the pool, and
/// the highest-indexed orphan within capacity is taken so the choice is
/// deterministic. Otherwise the lowest free index in `1..=capacity` is used.
/// Nothing outside `1..=capacity` is ever handed out; stale rows beyond the
/// bound are left for teardown.
pub fn next_guest_identity(
    identity: &dyn IdentityStore,
    storage: &dyn HomeStorage,
    policy: &PoolPolicy,
) -> Result<SlotName, AllocError> {
    let group = identity
        .group_by_name(&policy.group)?
        .ok_or_else(|| AllocError::GroupMissing(policy.group.clone()))?;

    let mut valid: Vec<SlotName> = Vec::new();
    let mut orphans: Vec<SlotName> = Vec::new();

    for record in identity.all_users()? {
        let slot = match SlotName::parse(&record.name, &policy.guest_name) {
            Some(slot) => slot,
            None => continue,
        };
        if record.gid != group.gid {
            continue;
        }
        if storage.path_exists(&record.home) {
            valid.push(slot);
        } else {
            orphans.push(slot);
        }
    }

    debug!(
        valid = valid.len(),
        orphans = orphans.len(),
        capacity = policy.capacity,
        "Scanned guest pool"
    );

    if valid.len() > policy.capacity as usize {
        return Err(AllocError::Oversubscribed {
            valid: valid.len(),
            capacity: policy.capacity,
        });
    }

    if let Some(slot) = orphans
        .into_iter()
        .filter(|s| s.index() <= policy.capacity)
        .max_by_key(|s| s.index())
    {
        info!(slot = %slot, "Recycling orphaned guest slot");
        return Ok(slot);
    }

    let taken: BTreeSet<u32> = valid.iter().map(|s| s.index()).collect();
    for index in 1..=policy.capacity {
        if !taken.contains(&index) {
            return Ok(SlotName::new(&policy.guest_name, index));
        }
    }

    Err(AllocError::Exhausted(policy.capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use guestpool_host_api::MockSystem;
    use std::path::Path;

    fn policy(capacity: u32) -> PoolPolicy {
        PoolPolicy {
            capacity,
            ..PoolPolicy::default()
        }
    }

    #[test]
    fn slot_name_parsing() {
        assert_eq!(SlotName::parse("guest1", "guest").unwrap().index(), 1);
        assert_eq!(SlotName::parse("guest42", "guest").unwrap().index(), 42);

        assert!(SlotName::parse("guest", "guest").is_none());
        assert!(SlotName::parse("guest0", "guest").is_none());
        assert!(SlotName::parse("guest1a", "guest").is_none());
        assert!(SlotName::parse("alice", "guest").is_none());
        assert!(SlotName::parse("xguest1", "guest").is_none());
    }

    #[test]
    fn empty_pool_yields_first_slot() {
        let mock = MockSystem::new();
        mock.add_group("guests");

        let slot = next_guest_identity(&mock, &mock, &policy(5)).unwrap();
        assert_eq!(slot.as_str(), "guest1");
    }

    #[test]
    fn missing_group_is_a_precondition_failure() {
        let mock = MockSystem::new();
        let err = next_guest_identity(&mock, &mock, &policy(5)).unwrap_err();
        assert!(matches!(err, AllocError::GroupMissing(_)));
    }

    #[test]
    fn lowest_free_index_wins() {
        let mock = MockSystem::new();
        let gid = mock.add_group("guests");
        mock.add_user("guest1", gid, Path::new("/tmp/guest1.a/home"), true);
        mock.add_user("guest3", gid, Path::new("/tmp/guest3.a/home"), true);

        let slot = next_guest_identity(&mock, &mock, &policy(5)).unwrap();
        assert_eq!(slot.as_str(), "guest2");
    }

    #[test]
    fn orphan_is_recycled_before_extending() {
        let mock = MockSystem::new();
        let gid = mock.add_group("guests");
        mock.add_user("guest1", gid, Path::new("/tmp/guest1.a/home"), true);
        mock.add_user("guest2", gid, Path::new("/tmp/guest2.a/home"), false);
        mock.add_user("guest3", gid, Path::new("/tmp/guest3.a/home"), true);

        let slot = next_guest_identity(&mock, &mock, &policy(5)).unwrap();
        assert_eq!(slot.as_str(), "guest2");
    }

    #[test]
    fn highest_indexed_orphan_is_taken() {
        let mock = MockSystem::new();
        let gid = mock.add_group("guests");
        mock.add_user("guest1", gid, Path::new("/tmp/guest1.a/home"), false);
        mock.add_user("guest4", gid, Path::new("/tmp/guest4.a/home"), false);

        let slot = next_guest_identity(&mock, &mock, &policy(5)).unwrap();
        assert_eq!(slot.as_str(), "guest4");
    }

    #[test]
    fn full_pool_is_exhausted() {
        let mock = MockSystem::new();
        let gid = mock.add_group("guests");
        for i in 1..=3 {
            let home = format!("/tmp/guest{}.a/home", i);
            mock.add_user(&format!("guest{}", i), gid, Path::new(&home), true);
        }

        let err = next_guest_identity(&mock, &mock, &policy(3)).unwrap_err();
        assert!(matches!(err, AllocError::Exhausted(3)));
    }

    #[test]
    fn oversubscribed_pool_fails_closed() {
        let mock = MockSystem::new();
        let gid = mock.add_group("guests");
        for i in 1..=4 {
            let home = format!("/tmp/guest{}.a/home", i);
            mock.add_user(&format!("guest{}", i), gid, Path::new(&home), true);
        }

        // capacity was lowered after the accounts were created
        let err = next_guest_identity(&mock, &mock, &policy(2)).unwrap_err();
        assert!(matches!(
            err,
            AllocError::Oversubscribed {
                valid: 4,
                capacity: 2
            }
        ));
    }

    #[test]
    fn foreign_accounts_are_ignored() {
        let mock = MockSystem::new();
        let guests = mock.add_group("guests");
        let staff = mock.add_group("staff");
        // guest-named but wrong group: not a pool member
        mock.add_user("guest1", staff, Path::new("/home/guest1"), true);
        // right group, wrong name pattern
        mock.add_user("alice", guests, Path::new("/home/alice"), true);

        let slot = next_guest_identity(&mock, &mock, &policy(2)).unwrap();
        assert_eq!(slot.as_str(), "guest1");
    }

    #[test]
    fn stale_orphan_beyond_capacity_is_not_recycled() {
        let mock = MockSystem::new();
        let gid = mock.add_group("guests");
        // leftover row from before the limit was lowered to 5
        mock.add_user("guest7", gid, Path::new("/tmp/guest7.a/home"), false);

        let slot = next_guest_identity(&mock, &mock, &policy(5)).unwrap();
        assert_eq!(slot.as_str(), "guest1");
    }

    #[test]
    fn never_allocates_outside_capacity() {
        for capacity in 1..=6u32 {
            let mock = MockSystem::new();
            let gid = mock.add_group("guests");
            // a stale orphan past every capacity under test
            mock.add_user("guest9", gid, Path::new("/tmp/guest9.a/home"), false);
            let slot = next_guest_identity(&mock, &mock, &policy(capacity)).unwrap();
            assert!(slot.index() >= 1 && slot.index() <= capacity);
        }
    }
}
