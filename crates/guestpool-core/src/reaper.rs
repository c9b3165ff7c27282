//! Session teardown
//!
//! Reclaims everything a guest session held: processes, the tmpfs home
//! mount, stray scratch files and the account row itself. Every step is
//! best-effort: teardown runs after the user's session has already ended,
//! so it logs and keeps going instead of aborting on partial failure.

use std::path::Path;
use std::time::{Duration, Instant};

use guestpool_host_api::{HomeStorage, IdentityStore, MountManager, ProcessTable};
use tracing::{debug, info, warn};

/// Bounds for the process-reaping loop
#[derive(Debug, Clone)]
pub struct ReapPolicy {
    /// Maximum kill/re-check rounds before giving up on stragglers
    pub max_kill_rounds: u32,

    /// Pause between a kill and the next process-list check
    pub kill_wait: Duration,

    /// Wall-clock budget for the whole kill loop
    pub kill_budget: Duration,
}

impl Default for ReapPolicy {
    fn default() -> Self {
        Self {
            max_kill_rounds: 10,
            kill_wait: Duration::from_millis(200),
            kill_budget: Duration::from_secs(5),
        }
    }
}

/// What teardown managed to reclaim, for logging and tests
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    /// The account row was present when teardown started
    pub account_found: bool,

    /// Kill rounds actually executed
    pub kill_rounds: u32,

    /// Pids still owned by the identity when the loop gave up (0 when the
    /// loop ended because the list was empty)
    pub pids_remaining: usize,

    /// The home mount point was unmounted (directly or lazily)
    pub unmounted: bool,

    /// Scratch entries removed
    pub scratch_removed: usize,

    /// The account row was deleted
    pub account_deleted: bool,

    /// The mount-point tree was removed
    pub tree_removed: bool,
}

/// Tear down a guest identity at session close.
///
/// Kill loop first: the mount cannot be released while the user's processes
/// hold files open in it. The loop is bounded both by round count and wall
/// clock; when the budget runs out teardown proceeds anyway and logs that
/// processes may remain.
pub fn teardown(
    identity: &dyn IdentityStore,
    mounts: &dyn MountManager,
    processes: &dyn ProcessTable,
    storage: &dyn HomeStorage,
    policy: &ReapPolicy,
    name: &str,
) -> TeardownReport {
    let mut report = TeardownReport::default();

    let record = match identity.user_by_name(name) {
        Ok(Some(record)) => record,
        Ok(None) => {
            debug!(name, "No account row, nothing to reap");
            return report;
        }
        Err(e) => {
            warn!(name, error = %e, "Identity lookup failed, nothing reaped");
            return report;
        }
    };
    report.account_found = true;

    // home is <mount_point>/home; reap the whole mount point
    let mount_point = record
        .home
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| record.home.clone());

    let started = Instant::now();
    loop {
        let pids = match processes.pids_owned_by(name) {
            Ok(pids) => pids,
            Err(e) => {
                warn!(name, error = %e, "Process listing failed, proceeding with teardown");
                break;
            }
        };
        if pids.is_empty() {
            report.pids_remaining = 0;
            break;
        }
        report.pids_remaining = pids.len();

        if report.kill_rounds >= policy.max_kill_rounds
            || started.elapsed() >= policy.kill_budget
        {
            warn!(
                name,
                remaining = pids.len(),
                rounds = report.kill_rounds,
                "Kill budget exhausted, proceeding; some processes may be force-detached"
            );
            break;
        }

        report.kill_rounds += 1;
        debug!(name, pids = pids.len(), round = report.kill_rounds, "Killing guest processes");
        if let Err(e) = processes.kill_all_owned_by(name) {
            warn!(name, error = %e, "Kill failed");
        }
        if !policy.kill_wait.is_zero() {
            std::thread::sleep(policy.kill_wait);
        }
    }

    match mounts.unmount(&mount_point) {
        Ok(()) => report.unmounted = true,
        Err(e) => {
            warn!(path = %mount_point.display(), error = %e, "Unmount failed, trying lazy unmount");
            match mounts.unmount_lazy(&mount_point) {
                Ok(()) => report.unmounted = true,
                Err(e) => {
                    warn!(path = %mount_point.display(), error = %e, "Lazy unmount failed");
                }
            }
        }
    }

    match storage.scratch_entries_owned_by(record.uid) {
        Ok(entries) => {
            for entry in entries {
                match storage.remove_entry(&entry) {
                    Ok(()) => report.scratch_removed += 1,
                    Err(e) => {
                        warn!(path = %entry.display(), error = %e, "Could not remove scratch entry");
                    }
                }
            }
        }
        Err(e) => warn!(uid = record.uid, error = %e, "Scratch enumeration failed"),
    }

    match identity.delete_user(name) {
        Ok(()) => report.account_deleted = true,
        Err(e) => warn!(name, error = %e, "Account deletion failed"),
    }

    match storage.remove_tree(&mount_point) {
        Ok(()) => report.tree_removed = true,
        Err(e) => {
            // the mount point may already be gone
            warn!(path = %mount_point.display(), error = %e, "Mount point removal failed");
        }
    }

    info!(name, report = ?report, "Guest session torn down");
    report
}
