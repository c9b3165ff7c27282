//! tmpfs mount adapter
//!
//! Ephemeral guest homes are tmpfs mounts capped in size, mode 711, with
//! execution disabled. Mount-table verification compares device numbers
//! instead of trusting the mount command's exit code.

use std::ffi::OsStr;
use std::path::Path;

use guestpool_host_api::{HostError, HostResult, MountManager};
use nix::sys::stat::stat;
use tracing::debug;

use crate::runner::run;

/// Production mount manager
pub struct SystemMountManager;

impl SystemMountManager {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemMountManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MountManager for SystemMountManager {
    fn mount_tmpfs(&self, target: &Path, size_mib: u32) -> HostResult<()> {
        let options = format!("size={}m,mode=711,noexec", size_mib);
        debug!(target = %target.display(), options = %options, "mount tmpfs");
        let args: Vec<&OsStr> = vec![
            OsStr::new("-t"),
            OsStr::new("tmpfs"),
            OsStr::new("-o"),
            OsStr::new(&options),
            OsStr::new("none"),
            target.as_os_str(),
        ];
        run("mount", &args).require_success("mount").map(|_| ())
    }

    fn is_mounted(&self, target: &Path) -> HostResult<bool> {
        // a mount point sits on a different device than its parent
        let target_stat = match stat(target) {
            Ok(s) => s,
            Err(nix::errno::Errno::ENOENT) => return Ok(false),
            Err(e) => {
                return Err(HostError::Mount(format!(
                    "stat {}: {}",
                    target.display(),
                    e
                )))
            }
        };
        let parent = target.parent().unwrap_or_else(|| Path::new("/"));
        let parent_stat = stat(parent)
            .map_err(|e| HostError::Mount(format!("stat {}: {}", parent.display(), e)))?;

        Ok(target_stat.st_dev != parent_stat.st_dev)
    }

    fn unmount(&self, target: &Path) -> HostResult<()> {
        debug!(target = %target.display(), "umount");
        run("umount", &[target.as_os_str()])
            .require_success("umount")
            .map(|_| ())
    }

    fn unmount_lazy(&self, target: &Path) -> HostResult<()> {
        debug!(target = %target.display(), "umount -l -f");
        let args: Vec<&OsStr> = vec![OsStr::new("-l"), OsStr::new("-f"), target.as_os_str()];
        run("umount", &args).require_success("umount -l").map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_directory_is_not_a_mount_point() {
        let dir = tempfile::tempdir().unwrap();
        let mounts = SystemMountManager::new();
        assert!(!mounts.is_mounted(dir.path()).unwrap());
    }

    #[test]
    fn missing_path_is_not_mounted() {
        let mounts = SystemMountManager::new();
        assert!(!mounts.is_mounted(Path::new("/no/such/mount")).unwrap());
    }

    #[test]
    fn unmounting_a_non_mount_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mounts = SystemMountManager::new();
        assert!(mounts.unmount(dir.path()).is_err());
    }
}
