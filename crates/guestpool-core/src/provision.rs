//! Account provisioning
//!
//! Builds the ephemeral tmpfs home and the OS account bound to it, as a
//! sequence of individually fallible steps. A failure rolls back only what
//! this call created, per the [`CleanupPlan`] of the failing step, before the
//! error is returned; the caller never sees a half-provisioned slot.

use std::path::{Path, PathBuf};

use guestpool_config::PoolPolicy;
use guestpool_host_api::{
    DesktopPrefs, HomeStorage, HostError, IdentityStore, MountManager,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{CleanupPlan, SlotName};

/// A freshly provisioned, tmpfs-backed guest home
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralHome {
    /// The tmpfs mount point (a unique temp directory)
    pub mount_point: PathBuf,

    /// The account's home directory, directly under the mount point
    pub home: PathBuf,
}

/// Which provisioning step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    /// Creating the unique mount-point directory
    MountPoint,

    /// Mounting the tmpfs
    Mount,

    /// Confirming the mount took effect
    MountVerify,

    /// Creating or repairing the account and its home content
    AccountSetup,

    /// Confirming the account resolves in the identity database
    Verify,
}

impl ProvisionStep {
    /// Cleanup owed when this step fails, derived from what the earlier
    /// steps have already committed
    pub fn cleanup(self) -> CleanupPlan {
        match self {
            Self::MountPoint => CleanupPlan::None,
            Self::Mount => CleanupPlan::RemoveDir,
            // mount claimed success but is not in the table, so the
            // directory may have been written to without tmpfs backing
            Self::MountVerify => CleanupPlan::RemoveTree,
            Self::AccountSetup | Self::Verify => CleanupPlan::UnmountAndRemove,
        }
    }
}

/// Provisioning failure; the step's cleanup has already been applied
#[derive(Debug, Error)]
#[error("Provisioning failed at {step:?}: {source}")]
pub struct ProvisionError {
    pub step: ProvisionStep,
    #[source]
    pub source: HostError,
}

/// Make sure the guest group exists, creating it as a system group if
/// missing. Called before allocation; a failure here is fatal to the whole
/// login attempt and nothing on the filesystem has been touched yet.
pub fn ensure_group(identity: &dyn IdentityStore, group: &str) -> Result<(), HostError> {
    if identity.group_by_name(group)?.is_some() {
        return Ok(());
    }
    info!(group, "Guest group missing, creating it");
    identity.create_system_group(group)
}

/// Provision the chosen slot: mount a size-capped, non-executable tmpfs at a
/// fresh mount point and bind a new or recycled account to a home beneath it.
pub fn provision(
    identity: &dyn IdentityStore,
    mounts: &dyn MountManager,
    storage: &dyn HomeStorage,
    desktop: &dyn DesktopPrefs,
    policy: &PoolPolicy,
    slot: &SlotName,
) -> Result<EphemeralHome, ProvisionError> {
    let mount_point = storage
        .create_mount_point(&format!("{}.", slot))
        .map_err(|e| fail(ProvisionStep::MountPoint, e, mounts, storage, None))?;
    debug!(slot = %slot, mount_point = %mount_point.display(), "Created mount point");

    if let Err(e) = mounts.mount_tmpfs(&mount_point, policy.home_size_mib) {
        return Err(fail(ProvisionStep::Mount, e, mounts, storage, Some(&mount_point)));
    }

    match mounts.is_mounted(&mount_point) {
        Ok(true) => {}
        Ok(false) => {
            let e = HostError::Mount(format!(
                "mount of {} reported success but did not take effect",
                mount_point.display()
            ));
            return Err(fail(ProvisionStep::MountVerify, e, mounts, storage, Some(&mount_point)));
        }
        Err(e) => {
            return Err(fail(ProvisionStep::MountVerify, e, mounts, storage, Some(&mount_point)));
        }
    }
    debug!(mount_point = %mount_point.display(), size_mib = policy.home_size_mib, "Mounted tmpfs home");

    let home = mount_point.join("home");
    let existing = match identity.user_by_name(slot.as_str()) {
        Ok(record) => record,
        Err(e) => {
            return Err(fail(ProvisionStep::AccountSetup, e, mounts, storage, Some(&mount_point)));
        }
    };

    let setup = match existing {
        Some(record) => recycle_account(identity, storage, slot, &home, &record),
        None => {
            debug!(slot = %slot, "Creating fresh guest account");
            identity.create_user(slot.as_str(), &home, &policy.group)
        }
    };
    if let Err(e) = setup {
        return Err(fail(ProvisionStep::AccountSetup, e, mounts, storage, Some(&mount_point)));
    }

    // Desktop convenience only; a locked screensaver on a throwaway account
    // is annoying, not fatal.
    if let Err(e) = desktop.disable_screen_lock(slot.as_str()) {
        warn!(slot = %slot, error = %e, "Could not disable screen lock");
    }

    match identity.user_by_name(slot.as_str()) {
        Ok(Some(_)) => {}
        Ok(None) => {
            let e = HostError::Identity(format!(
                "account {} not resolvable after provisioning",
                slot
            ));
            return Err(fail(ProvisionStep::Verify, e, mounts, storage, Some(&mount_point)));
        }
        Err(e) => {
            return Err(fail(ProvisionStep::Verify, e, mounts, storage, Some(&mount_point)));
        }
    }

    info!(slot = %slot, home = %home.display(), "Guest account provisioned");
    Ok(EphemeralHome { mount_point, home })
}

/// Recycle path: the account row survived a lost home. Repoint it at the new
/// mount, rebuild the home with owner-only permissions, reseed it from the
/// skeleton and hand it back to the account's uid/gid.
fn recycle_account(
    identity: &dyn IdentityStore,
    storage: &dyn HomeStorage,
    slot: &SlotName,
    home: &Path,
    record: &guestpool_host_api::AccountRecord,
) -> Result<(), HostError> {
    debug!(slot = %slot, uid = record.uid, "Recycling existing guest account");
    identity.set_home(slot.as_str(), home)?;
    storage.create_home(home)?;
    storage.seed_skeleton(home)?;
    storage.chown_tree(home, record.uid, record.gid)
}

/// Apply the failing step's cleanup and wrap the error. Rollback failures
/// are logged; the original error is what the caller needs to see.
fn fail(
    step: ProvisionStep,
    source: HostError,
    mounts: &dyn MountManager,
    storage: &dyn HomeStorage,
    mount_point: Option<&Path>,
) -> ProvisionError {
    let plan = step.cleanup();
    warn!(step = ?step, plan = ?plan, error = %source, "Provisioning step failed, rolling back");

    if let Some(mount_point) = mount_point {
        match plan {
            CleanupPlan::None => {}
            CleanupPlan::RemoveDir => {
                if let Err(e) = storage.remove_dir(mount_point) {
                    warn!(path = %mount_point.display(), error = %e, "Rollback: remove_dir failed");
                }
            }
            CleanupPlan::RemoveTree => {
                if let Err(e) = storage.remove_tree(mount_point) {
                    warn!(path = %mount_point.display(), error = %e, "Rollback: remove_tree failed");
                }
            }
            CleanupPlan::UnmountAndRemove => {
                if let Err(e) = mounts.unmount(mount_point) {
                    warn!(path = %mount_point.display(), error = %e, "Rollback: unmount failed, trying lazy");
                    if let Err(e) = mounts.unmount_lazy(mount_point) {
                        warn!(path = %mount_point.display(), error = %e, "Rollback: lazy unmount failed");
                    }
                }
                if let Err(e) = storage.remove_tree(mount_point) {
                    warn!(path = %mount_point.display(), error = %e, "Rollback: remove_tree failed");
                }
            }
        }
    }

    ProvisionError { step, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guestpool_host_api::MockSystem;

    fn setup() -> (MockSystem, PoolPolicy) {
        let mock = MockSystem::new();
        mock.add_group("guests");
        (mock, PoolPolicy::default())
    }

    fn slot(i: u32) -> SlotName {
        SlotName::new("guest", i)
    }

    #[test]
    fn fresh_provision_creates_account_and_mount() {
        let (mock, policy) = setup();

        let home = provision(&mock, &mock, &mock, &mock, &policy, &slot(1)).unwrap();

        assert_eq!(home.home, home.mount_point.join("home"));
        assert_eq!(mock.mounted_paths(), vec![home.mount_point.clone()]);
        let record = mock.user("guest1").unwrap();
        assert_eq!(record.home, home.home);
        assert!(mock.was_seeded(&home.home));
        assert!(mock.screen_lock_disabled_for("guest1"));
    }

    #[test]
    fn recycle_repairs_existing_account() {
        let (mock, policy) = setup();
        let gid = mock.group("guests").unwrap().gid;
        let uid = mock.add_user("guest2", gid, Path::new("/tmp/guest2.old/home"), false);

        let home = provision(&mock, &mock, &mock, &mock, &policy, &slot(2)).unwrap();

        let record = mock.user("guest2").unwrap();
        assert_eq!(record.uid, uid, "recycling must keep the uid");
        assert_eq!(record.home, home.home);
        assert!(mock.was_seeded(&home.home));
        assert_eq!(mock.owner_of(&home.home), Some((uid, gid)));
    }

    #[test]
    fn mkdtemp_failure_needs_no_cleanup() {
        let (mock, policy) = setup();
        *mock.fail_mkdtemp.lock().unwrap() = true;

        let err = provision(&mock, &mock, &mock, &mock, &policy, &slot(1)).unwrap_err();
        assert_eq!(err.step, ProvisionStep::MountPoint);
        assert!(mock.mounted_paths().is_empty());
    }

    #[test]
    fn mount_failure_removes_the_directory() {
        let (mock, policy) = setup();
        *mock.fail_mount.lock().unwrap() = true;

        let err = provision(&mock, &mock, &mock, &mock, &policy, &slot(1)).unwrap_err();
        assert_eq!(err.step, ProvisionStep::Mount);
        assert!(!mock.dir_exists(Path::new("/tmp/guest1.000001")));
        assert!(mock.mounted_paths().is_empty());
    }

    #[test]
    fn silent_mount_noop_is_detected_and_rolled_back() {
        let (mock, policy) = setup();
        *mock.mount_silently_noop.lock().unwrap() = true;

        let err = provision(&mock, &mock, &mock, &mock, &policy, &slot(1)).unwrap_err();
        assert_eq!(err.step, ProvisionStep::MountVerify);
        assert!(!mock.dir_exists(Path::new("/tmp/guest1.000001")));
        assert!(mock.user("guest1").is_none());
    }

    #[test]
    fn useradd_failure_unmounts_and_removes() {
        let (mock, policy) = setup();
        *mock.fail_user_create.lock().unwrap() = true;

        let err = provision(&mock, &mock, &mock, &mock, &policy, &slot(1)).unwrap_err();
        assert_eq!(err.step, ProvisionStep::AccountSetup);
        assert!(mock.mounted_paths().is_empty(), "tmpfs must not linger");
        assert!(!mock.dir_exists(Path::new("/tmp/guest1.000001")));
    }

    #[test]
    fn recycle_failure_unmounts_and_removes() {
        let (mock, policy) = setup();
        let gid = mock.group("guests").unwrap().gid;
        mock.add_user("guest1", gid, Path::new("/tmp/guest1.old/home"), false);
        *mock.fail_seed_skeleton.lock().unwrap() = true;

        let err = provision(&mock, &mock, &mock, &mock, &policy, &slot(1)).unwrap_err();
        assert_eq!(err.step, ProvisionStep::AccountSetup);
        assert!(mock.mounted_paths().is_empty());
    }

    #[test]
    fn verification_failure_is_the_strongest_tier() {
        let (mock, policy) = setup();
        *mock.forget_new_users.lock().unwrap() = true;

        let err = provision(&mock, &mock, &mock, &mock, &policy, &slot(1)).unwrap_err();
        assert_eq!(err.step, ProvisionStep::Verify);
        assert_eq!(err.step.cleanup(), CleanupPlan::UnmountAndRemove);
        assert!(mock.mounted_paths().is_empty());
        assert!(!mock.dir_exists(Path::new("/tmp/guest1.000001")));
    }

    #[test]
    fn screen_lock_failure_does_not_fail_provisioning() {
        let (mock, policy) = setup();
        *mock.fail_screen_lock.lock().unwrap() = true;

        let home = provision(&mock, &mock, &mock, &mock, &policy, &slot(1));
        assert!(home.is_ok());
    }

    #[test]
    fn ensure_group_creates_missing_group() {
        let mock = MockSystem::new();
        ensure_group(&mock, "guests").unwrap();
        assert!(mock.group("guests").is_some());

        // second call is a no-op
        ensure_group(&mock, "guests").unwrap();
    }

    #[test]
    fn ensure_group_propagates_creation_failure() {
        let mock = MockSystem::new();
        *mock.fail_group_create.lock().unwrap() = true;
        assert!(ensure_group(&mock, "guests").is_err());
    }
}
