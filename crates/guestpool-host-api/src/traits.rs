//! Capability traits over mutable OS state
//!
//! The identity database, mount table and process table are process-wide,
//! externally owned state with no transaction support. Each trait here is a
//! narrow capability so the core algorithms can run against in-memory fakes;
//! the production adapters shell out to OS primitives.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::{AccountRecord, GroupRecord};

/// Errors from host adapter operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Command failed: {command} exited {code}: {detail}")]
    CommandFailed {
        command: String,
        code: i32,
        detail: String,
    },

    #[error("Identity database error: {0}")]
    Identity(String),

    #[error("Mount operation failed: {0}")]
    Mount(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Read and mutate the OS identity database
pub trait IdentityStore: Send + Sync {
    /// Look up a user by login name
    fn user_by_name(&self, name: &str) -> HostResult<Option<AccountRecord>>;

    /// Enumerate every user row in the database
    fn all_users(&self) -> HostResult<Vec<AccountRecord>>;

    /// Look up a group by name
    fn group_by_name(&self, name: &str) -> HostResult<Option<GroupRecord>>;

    /// Create a system group
    fn create_system_group(&self, name: &str) -> HostResult<()>;

    /// Create a user with the given home directory, primary group and an
    /// interactive shell, populating the home from the system skeleton
    fn create_user(&self, name: &str, home: &Path, group: &str) -> HostResult<()>;

    /// Repoint an existing user's home directory attribute
    fn set_home(&self, name: &str, home: &Path) -> HostResult<()>;

    /// Delete a user, ignoring "currently logged in" complaints
    fn delete_user(&self, name: &str) -> HostResult<()>;
}

/// Mount and unmount the size-capped volatile home filesystem
pub trait MountManager: Send + Sync {
    /// Mount a tmpfs at `target`, capped at `size_mib` megabytes, mode 711,
    /// with execution disabled
    fn mount_tmpfs(&self, target: &Path, size_mib: u32) -> HostResult<()>;

    /// Query the mount table: is `target` a mount point right now?
    fn is_mounted(&self, target: &Path) -> HostResult<bool>;

    /// Unmount `target`
    fn unmount(&self, target: &Path) -> HostResult<()>;

    /// Lazy/forced unmount fallback for a busy `target`
    fn unmount_lazy(&self, target: &Path) -> HostResult<()>;
}

/// Enumerate and terminate processes by owning user
pub trait ProcessTable: Send + Sync {
    /// Pids of all processes owned by `user`
    fn pids_owned_by(&self, user: &str) -> HostResult<Vec<u32>>;

    /// Forcibly kill every process owned by `user`
    fn kill_all_owned_by(&self, user: &str) -> HostResult<()>;
}

/// Filesystem operations for ephemeral homes and shared scratch space
pub trait HomeStorage: Send + Sync {
    /// Create a fresh, uniquely named directory to serve as a mount point.
    /// `prefix` is the slot name plus a trailing dot.
    fn create_mount_point(&self, prefix: &str) -> HostResult<PathBuf>;

    /// Does this path exist on disk?
    fn path_exists(&self, path: &Path) -> bool;

    /// Create a home directory with owner-only permissions
    fn create_home(&self, path: &Path) -> HostResult<()>;

    /// Populate a home directory from the system skeleton template
    fn seed_skeleton(&self, path: &Path) -> HostResult<()>;

    /// Recursively change ownership of a directory tree
    fn chown_tree(&self, path: &Path, uid: u32, gid: u32) -> HostResult<()>;

    /// Remove an empty directory
    fn remove_dir(&self, path: &Path) -> HostResult<()>;

    /// Recursively remove a directory tree
    fn remove_tree(&self, path: &Path) -> HostResult<()>;

    /// Top-level scratch-space entries owned by `uid` (artifacts left
    /// outside the managed home)
    fn scratch_entries_owned_by(&self, uid: u32) -> HostResult<Vec<PathBuf>>;

    /// Remove one scratch entry (file or tree)
    fn remove_entry(&self, path: &Path) -> HostResult<()>;
}

/// Best-effort desktop-environment conveniences for a freshly created user
pub trait DesktopPrefs: Send + Sync {
    /// Disable the screen lock for the user's upcoming session. Callers
    /// treat failure as log-only.
    fn disable_screen_lock(&self, user: &str) -> HostResult<()>;
}

/// Bundle of capability handles wired into the lifecycle controller
#[derive(Clone)]
pub struct SystemHandles {
    pub identity: Arc<dyn IdentityStore>,
    pub mounts: Arc<dyn MountManager>,
    pub processes: Arc<dyn ProcessTable>,
    pub storage: Arc<dyn HomeStorage>,
    pub desktop: Arc<dyn DesktopPrefs>,
}
