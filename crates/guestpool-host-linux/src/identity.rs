//! Identity database adapter
//!
//! Lookups go through the resolver (`nix` passwd/group queries, honoring
//! nsswitch); enumeration uses `getent passwd` so non-file sources are
//! covered too; mutations use the stock shadow-utils commands.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use guestpool_host_api::{AccountRecord, GroupRecord, HostError, HostResult, IdentityStore};
use nix::unistd::{Group, User};
use tracing::debug;

use crate::runner::run;

/// Shell given to freshly created guest accounts
const GUEST_SHELL: &str = "/bin/bash";

/// Production identity store
pub struct SystemIdentityStore;

impl SystemIdentityStore {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityStore for SystemIdentityStore {
    fn user_by_name(&self, name: &str) -> HostResult<Option<AccountRecord>> {
        let user = User::from_name(name)
            .map_err(|e| HostError::Identity(format!("getpwnam {}: {}", name, e)))?;
        Ok(user.map(|u| AccountRecord {
            name: u.name,
            uid: u.uid.as_raw(),
            gid: u.gid.as_raw(),
            home: u.dir,
        }))
    }

    fn all_users(&self) -> HostResult<Vec<AccountRecord>> {
        let out = run("getent", &["passwd"]).require_success("getent passwd")?;
        Ok(parse_passwd(&out.stdout_text()))
    }

    fn group_by_name(&self, name: &str) -> HostResult<Option<GroupRecord>> {
        let group = Group::from_name(name)
            .map_err(|e| HostError::Identity(format!("getgrnam {}: {}", name, e)))?;
        Ok(group.map(|g| GroupRecord {
            name: g.name,
            gid: g.gid.as_raw(),
        }))
    }

    fn create_system_group(&self, name: &str) -> HostResult<()> {
        debug!(group = name, "groupadd");
        run("groupadd", &["-r", name])
            .require_success("groupadd")
            .map(|_| ())
    }

    fn create_user(&self, name: &str, home: &Path, group: &str) -> HostResult<()> {
        debug!(user = name, home = %home.display(), "useradd");
        let args: Vec<&OsStr> = vec![
            OsStr::new("-m"),
            OsStr::new("-d"),
            home.as_os_str(),
            OsStr::new("-g"),
            OsStr::new(group),
            OsStr::new("-s"),
            OsStr::new(GUEST_SHELL),
            OsStr::new(name),
        ];
        run("useradd", &args).require_success("useradd").map(|_| ())
    }

    fn set_home(&self, name: &str, home: &Path) -> HostResult<()> {
        debug!(user = name, home = %home.display(), "usermod -d");
        let args: Vec<&OsStr> = vec![OsStr::new("-d"), home.as_os_str(), OsStr::new(name)];
        run("usermod", &args).require_success("usermod").map(|_| ())
    }

    fn delete_user(&self, name: &str) -> HostResult<()> {
        debug!(user = name, "userdel -f");
        // -f also ignores "user is currently logged in"; the reaper has
        // already killed the processes by the time this runs
        run("userdel", &["-f", name])
            .require_success("userdel")
            .map(|_| ())
    }
}

/// Parse `getent passwd` output into account records. Malformed lines are
/// skipped rather than failing the whole enumeration.
fn parse_passwd(text: &str) -> Vec<AccountRecord> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split(':');
            let name = fields.next()?;
            let _passwd = fields.next()?;
            let uid: u32 = fields.next()?.parse().ok()?;
            let gid: u32 = fields.next()?.parse().ok()?;
            let _gecos = fields.next()?;
            let home = fields.next()?;
            Some(AccountRecord {
                name: name.to_string(),
                uid,
                gid,
                home: PathBuf::from(home),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_passwd_lines() {
        let text = "root:x:0:0:root:/root:/bin/bash\n\
                    guest1:x:1001:989::/tmp/guest1.tY3b2k/home:/bin/bash\n";
        let records = parse_passwd(text);

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name, "guest1");
        assert_eq!(records[1].uid, 1001);
        assert_eq!(records[1].gid, 989);
        assert_eq!(records[1].home, PathBuf::from("/tmp/guest1.tY3b2k/home"));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let text = "ok:x:1:1::/home/ok:/bin/sh\nnot-a-passwd-line\nshort:x:2\n";
        let records = parse_passwd(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "ok");
    }

    #[test]
    fn root_is_resolvable() {
        let store = SystemIdentityStore::new();
        let root = store.user_by_name("root").unwrap().unwrap();
        assert_eq!(root.uid, 0);
    }

    #[test]
    fn unknown_user_is_none() {
        let store = SystemIdentityStore::new();
        assert!(store
            .user_by_name("no-such-user-zzz")
            .unwrap()
            .is_none());
    }
}
