//! Desktop-environment conveniences
//!
//! Guests get a throwaway session; a screensaver lock they have no password
//! for would dead-end it. The toggle runs as the target user and is strictly
//! best-effort: callers log failures and move on.

use guestpool_host_api::{DesktopPrefs, HostResult};
use tracing::debug;

use crate::runner::run;

/// GNOME screen-lock toggle via gsettings
pub struct GnomeDesktopPrefs;

impl GnomeDesktopPrefs {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GnomeDesktopPrefs {
    fn default() -> Self {
        Self::new()
    }
}

impl DesktopPrefs for GnomeDesktopPrefs {
    fn disable_screen_lock(&self, user: &str) -> HostResult<()> {
        debug!(user, "Disabling screen lock");
        run(
            "runuser",
            &[
                "-u",
                user,
                "--",
                "gsettings",
                "set",
                "org.gnome.desktop.screensaver",
                "lock-enabled",
                "false",
            ],
        )
        .require_success("runuser gsettings")
        .map(|_| ())
    }
}
