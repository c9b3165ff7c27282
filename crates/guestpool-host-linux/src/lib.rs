//! Linux adapters for guestpool
//!
//! Production implementations of the capability traits in
//! `guestpool-host-api`. Mutations of the identity database and mount table
//! go through the stock command-line tools (`groupadd`, `useradd`, `mount`,
//! `pkill`, ...) invoked with argument vectors, never through a shell, while
//! lookups use `nix` and direct filesystem inspection.

mod desktop;
mod identity;
mod mount;
mod process;
mod runner;
mod storage;

pub use desktop::*;
pub use identity::*;
pub use mount::*;
pub use process::*;
pub use runner::*;
pub use storage::*;

use guestpool_host_api::SystemHandles;
use std::sync::Arc;

/// Wire up the full set of production adapters
pub fn system_handles() -> SystemHandles {
    SystemHandles {
        identity: Arc::new(SystemIdentityStore::new()),
        mounts: Arc::new(SystemMountManager::new()),
        processes: Arc::new(SystemProcessTable::new()),
        storage: Arc::new(TmpfsHomeStorage::new()),
        desktop: Arc::new(GnomeDesktopPrefs::new()),
    }
}
