//! Ephemeral home and scratch-space filesystem operations

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use guestpool_host_api::{HomeStorage, HostError, HostResult};
use nix::unistd::{chown, Gid, Uid};
use tracing::debug;

/// Default scratch space shared by all local users
const DEFAULT_SCRATCH_ROOT: &str = "/tmp";

/// Default skeleton template for fresh homes
const DEFAULT_SKEL_DIR: &str = "/etc/skel";

/// Production home storage rooted in the shared scratch directory
pub struct TmpfsHomeStorage {
    scratch_root: PathBuf,
    skel_dir: PathBuf,
}

impl TmpfsHomeStorage {
    pub fn new() -> Self {
        Self {
            scratch_root: PathBuf::from(DEFAULT_SCRATCH_ROOT),
            skel_dir: PathBuf::from(DEFAULT_SKEL_DIR),
        }
    }

    /// Override the scratch root and skeleton directory (tests)
    pub fn with_roots(scratch_root: PathBuf, skel_dir: PathBuf) -> Self {
        Self {
            scratch_root,
            skel_dir,
        }
    }
}

impl Default for TmpfsHomeStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl HomeStorage for TmpfsHomeStorage {
    fn create_mount_point(&self, prefix: &str) -> HostResult<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.scratch_root)?;
        // from here on the directory's lifetime is managed by the
        // provision/teardown flow, not by the TempDir guard
        Ok(dir.into_path())
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_home(&self, path: &Path) -> HostResult<()> {
        fs::create_dir(path)?;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
        Ok(())
    }

    fn seed_skeleton(&self, path: &Path) -> HostResult<()> {
        if !self.skel_dir.is_dir() {
            debug!(skel = %self.skel_dir.display(), "No skeleton directory, seeding nothing");
            return Ok(());
        }
        copy_tree(&self.skel_dir, path)
    }

    fn chown_tree(&self, path: &Path, uid: u32, gid: u32) -> HostResult<()> {
        let uid = Uid::from_raw(uid);
        let gid = Gid::from_raw(gid);
        chown_recursive(path, uid, gid)
    }

    fn remove_dir(&self, path: &Path) -> HostResult<()> {
        fs::remove_dir(path)?;
        Ok(())
    }

    fn remove_tree(&self, path: &Path) -> HostResult<()> {
        fs::remove_dir_all(path)?;
        Ok(())
    }

    fn scratch_entries_owned_by(&self, uid: u32) -> HostResult<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.scratch_root)? {
            let entry = entry?;
            // symlink_metadata: do not follow links out of the scratch dir
            let metadata = match fs::symlink_metadata(entry.path()) {
                Ok(m) => m,
                Err(_) => continue, // raced with concurrent removal
            };
            if metadata.uid() == uid {
                entries.push(entry.path());
            }
        }
        Ok(entries)
    }

    fn remove_entry(&self, path: &Path) -> HostResult<()> {
        let metadata = fs::symlink_metadata(path)?;
        if metadata.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn copy_tree(src: &Path, dst: &Path) -> HostResult<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            fs::create_dir(&target)?;
            copy_tree(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            std::os::unix::fs::symlink(link, &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn chown_recursive(path: &Path, uid: Uid, gid: Gid) -> HostResult<()> {
    chown(path, Some(uid), Some(gid))
        .map_err(|e| HostError::Internal(format!("chown {}: {}", path.display(), e)))?;
    if path.is_dir() {
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            chown_recursive(&entry.path(), uid, gid)?;
        }
    }
    Ok(())
}
