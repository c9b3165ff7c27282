//! Resolved pool policy
//!
//! The raw schema is all `Option`s; this is the fully populated form the
//! core consumes. Defaults are applied here, once, so the allocation and
//! provisioning algorithms never decide defaults mid-flight.

use crate::schema::RawConfig;

/// Default requested/slot base name
pub const DEFAULT_GUEST_NAME: &str = "guest";

/// Default guest group
pub const DEFAULT_GUEST_GROUP: &str = "guests";

/// Default slot capacity
pub const DEFAULT_LIMIT: u32 = 5;

/// Default ephemeral home size cap, in megabytes
pub const DEFAULT_HOME_SIZE_MIB: u32 = 300;

/// Fully resolved guest pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolPolicy {
    /// Whether guest login is enabled at all
    pub enabled: bool,

    /// Requested login name and slot-name prefix
    pub guest_name: String,

    /// Group all guest accounts belong to
    pub group: String,

    /// Maximum number of concurrent guest slots
    pub capacity: u32,

    /// Size cap of each ephemeral home, in megabytes
    pub home_size_mib: u32,
}

impl PoolPolicy {
    /// Build a policy from a validated raw config, filling in defaults
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            enabled: raw.guest.enabled.unwrap_or(true),
            guest_name: raw
                .guest
                .name
                .unwrap_or_else(|| DEFAULT_GUEST_NAME.to_string()),
            group: raw
                .guest
                .group
                .unwrap_or_else(|| DEFAULT_GUEST_GROUP.to_string()),
            capacity: raw.guest.limit.unwrap_or(DEFAULT_LIMIT),
            home_size_mib: raw.guest.home_size_mib.unwrap_or(DEFAULT_HOME_SIZE_MIB),
        }
    }
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self::from_raw(RawConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let policy = PoolPolicy::default();
        assert!(policy.enabled);
        assert_eq!(policy.guest_name, "guest");
        assert_eq!(policy.group, "guests");
        assert_eq!(policy.capacity, 5);
        assert_eq!(policy.home_size_mib, 300);
    }

    #[test]
    fn partial_raw_fills_defaults() {
        let raw: RawConfig = toml::from_str("[guest]\nlimit = 2\n").unwrap();
        let policy = PoolPolicy::from_raw(raw);
        assert_eq!(policy.capacity, 2);
        assert_eq!(policy.guest_name, "guest");
    }
}
