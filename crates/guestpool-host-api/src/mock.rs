//! Mock system for testing
//!
//! `MockSystem` implements every capability trait over in-memory state so
//! the allocator, provisioner and reaper can be exercised without touching
//! the real identity database, mount table or filesystem. Failure-injection
//! toggles simulate the partial-failure scenarios the lifecycle has to
//! survive.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::{
    AccountRecord, DesktopPrefs, GroupRecord, HomeStorage, HostError, HostResult,
    IdentityStore, MountManager, ProcessTable, SystemHandles,
};

#[derive(Debug, Default)]
struct MockState {
    users: BTreeMap<String, AccountRecord>,
    groups: BTreeMap<String, GroupRecord>,
    next_uid: u32,
    next_gid: u32,
    /// Paths that "exist on disk"
    dirs: BTreeSet<PathBuf>,
    /// Active mount points
    mounted: BTreeSet<PathBuf>,
    /// Homes that received skeleton content
    seeded: BTreeSet<PathBuf>,
    /// Recorded chown_tree calls
    owners: HashMap<PathBuf, (u32, u32)>,
    /// Live pids per user
    processes: HashMap<String, Vec<u32>>,
    /// Scratch entries as (path, owner uid)
    scratch: Vec<(PathBuf, u32)>,
    /// Users whose screen lock was disabled
    screen_lock_disabled: Vec<String>,
    mkdtemp_counter: u32,
}

/// In-memory system fake for unit/integration testing
pub struct MockSystem {
    state: Mutex<MockState>,

    /// Make mount-point creation fail (no usable temp path)
    pub fail_mkdtemp: Mutex<bool>,

    /// Make the tmpfs mount command fail
    pub fail_mount: Mutex<bool>,

    /// Mount command "succeeds" but the mount never appears in the table
    pub mount_silently_noop: Mutex<bool>,

    /// Make the first (non-lazy) unmount fail, as with a busy filesystem
    pub fail_unmount: Mutex<bool>,

    /// Make group creation fail
    pub fail_group_create: Mutex<bool>,

    /// Make user creation fail
    pub fail_user_create: Mutex<bool>,

    /// Make home-attribute updates fail
    pub fail_set_home: Mutex<bool>,

    /// Make skeleton seeding fail
    pub fail_seed_skeleton: Mutex<bool>,

    /// User creation reports success but the row never lands in the
    /// database, so post-provision verification fails
    pub forget_new_users: Mutex<bool>,

    /// Make process listing fail
    pub fail_process_list: Mutex<bool>,

    /// Number of kill rounds that leave the user's processes running
    /// before a kill finally takes effect
    pub kill_rounds_required: Mutex<u32>,

    /// Make the screen-lock toggle fail
    pub fail_screen_lock: Mutex<bool>,
}

impl MockSystem {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_uid: 1000,
                next_gid: 1000,
                ..Default::default()
            }),
            fail_mkdtemp: Mutex::new(false),
            fail_mount: Mutex::new(false),
            mount_silently_noop: Mutex::new(false),
            fail_unmount: Mutex::new(false),
            fail_group_create: Mutex::new(false),
            fail_user_create: Mutex::new(false),
            fail_set_home: Mutex::new(false),
            fail_seed_skeleton: Mutex::new(false),
            forget_new_users: Mutex::new(false),
            fail_process_list: Mutex::new(false),
            kill_rounds_required: Mutex::new(0),
            fail_screen_lock: Mutex::new(false),
        }
    }

    /// Bundle this mock into capability handles for the controller
    pub fn handles(self: &Arc<Self>) -> SystemHandles {
        SystemHandles {
            identity: self.clone(),
            mounts: self.clone(),
            processes: self.clone(),
            storage: self.clone(),
            desktop: self.clone(),
        }
    }

    /// Seed a group row
    pub fn add_group(&self, name: &str) -> u32 {
        let mut state = self.state.lock().unwrap();
        let gid = state.next_gid;
        state.next_gid += 1;
        state.groups.insert(
            name.to_string(),
            GroupRecord {
                name: name.to_string(),
                gid,
            },
        );
        gid
    }

    /// Seed a user row. When `home_exists` is false the row is an orphan:
    /// the database entry survives but the home path is gone.
    pub fn add_user(&self, name: &str, gid: u32, home: &Path, home_exists: bool) -> u32 {
        let mut state = self.state.lock().unwrap();
        let uid = state.next_uid;
        state.next_uid += 1;
        state.users.insert(
            name.to_string(),
            AccountRecord {
                name: name.to_string(),
                uid,
                gid,
                home: home.to_path_buf(),
            },
        );
        if home_exists {
            state.dirs.insert(home.to_path_buf());
        }
        uid
    }

    /// Seed live pids for a user
    pub fn set_processes(&self, user: &str, pids: &[u32]) {
        self.state
            .lock()
            .unwrap()
            .processes
            .insert(user.to_string(), pids.to_vec());
    }

    /// Seed a scratch-space entry owned by `uid`
    pub fn add_scratch_entry(&self, path: &Path, uid: u32) {
        self.state
            .lock()
            .unwrap()
            .scratch
            .push((path.to_path_buf(), uid));
    }

    pub fn user(&self, name: &str) -> Option<AccountRecord> {
        self.state.lock().unwrap().users.get(name).cloned()
    }

    pub fn group(&self, name: &str) -> Option<GroupRecord> {
        self.state.lock().unwrap().groups.get(name).cloned()
    }

    pub fn mounted_paths(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().mounted.iter().cloned().collect()
    }

    pub fn dir_exists(&self, path: &Path) -> bool {
        self.state.lock().unwrap().dirs.contains(path)
    }

    pub fn was_seeded(&self, home: &Path) -> bool {
        self.state.lock().unwrap().seeded.contains(home)
    }

    pub fn owner_of(&self, path: &Path) -> Option<(u32, u32)> {
        self.state.lock().unwrap().owners.get(path).copied()
    }

    pub fn scratch_paths(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .unwrap()
            .scratch
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn screen_lock_disabled_for(&self, user: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .screen_lock_disabled
            .iter()
            .any(|u| u == user)
    }

    pub fn live_pids(&self, user: &str) -> Vec<u32> {
        self.state
            .lock()
            .unwrap()
            .processes
            .get(user)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for MockSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityStore for MockSystem {
    fn user_by_name(&self, name: &str) -> HostResult<Option<AccountRecord>> {
        Ok(self.state.lock().unwrap().users.get(name).cloned())
    }

    fn all_users(&self) -> HostResult<Vec<AccountRecord>> {
        Ok(self.state.lock().unwrap().users.values().cloned().collect())
    }

    fn group_by_name(&self, name: &str) -> HostResult<Option<GroupRecord>> {
        Ok(self.state.lock().unwrap().groups.get(name).cloned())
    }

    fn create_system_group(&self, name: &str) -> HostResult<()> {
        if *self.fail_group_create.lock().unwrap() {
            return Err(HostError::Identity("mock groupadd failure".into()));
        }
        self.add_group(name);
        Ok(())
    }

    fn create_user(&self, name: &str, home: &Path, group: &str) -> HostResult<()> {
        if *self.fail_user_create.lock().unwrap() {
            return Err(HostError::Identity("mock useradd failure".into()));
        }
        let forget = *self.forget_new_users.lock().unwrap();
        let mut state = self.state.lock().unwrap();
        if state.users.contains_key(name) {
            return Err(HostError::Identity(format!("user {} already exists", name)));
        }
        let gid = match state.groups.get(group) {
            Some(g) => g.gid,
            None => return Err(HostError::Identity(format!("no such group: {}", group))),
        };
        let uid = state.next_uid;
        state.next_uid += 1;
        if !forget {
            state.users.insert(
                name.to_string(),
                AccountRecord {
                    name: name.to_string(),
                    uid,
                    gid,
                    home: home.to_path_buf(),
                },
            );
        }
        // useradd -m creates, seeds and chowns the home either way
        state.dirs.insert(home.to_path_buf());
        state.seeded.insert(home.to_path_buf());
        state.owners.insert(home.to_path_buf(), (uid, gid));
        Ok(())
    }

    fn set_home(&self, name: &str, home: &Path) -> HostResult<()> {
        if *self.fail_set_home.lock().unwrap() {
            return Err(HostError::Identity("mock usermod failure".into()));
        }
        let mut state = self.state.lock().unwrap();
        match state.users.get_mut(name) {
            Some(record) => {
                record.home = home.to_path_buf();
                Ok(())
            }
            None => Err(HostError::Identity(format!("no such user: {}", name))),
        }
    }

    fn delete_user(&self, name: &str) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.users.remove(name) {
            Some(_) => Ok(()),
            None => Err(HostError::Identity(format!("no such user: {}", name))),
        }
    }
}

impl MountManager for MockSystem {
    fn mount_tmpfs(&self, target: &Path, _size_mib: u32) -> HostResult<()> {
        if *self.fail_mount.lock().unwrap() {
            return Err(HostError::Mount("mock mount failure".into()));
        }
        if *self.mount_silently_noop.lock().unwrap() {
            return Ok(());
        }
        self.state
            .lock()
            .unwrap()
            .mounted
            .insert(target.to_path_buf());
        Ok(())
    }

    fn is_mounted(&self, target: &Path) -> HostResult<bool> {
        Ok(self.state.lock().unwrap().mounted.contains(target))
    }

    fn unmount(&self, target: &Path) -> HostResult<()> {
        if *self.fail_unmount.lock().unwrap() {
            return Err(HostError::Mount("mock target is busy".into()));
        }
        let mut state = self.state.lock().unwrap();
        if state.mounted.remove(target) {
            Ok(())
        } else {
            Err(HostError::Mount(format!("not mounted: {}", target.display())))
        }
    }

    fn unmount_lazy(&self, target: &Path) -> HostResult<()> {
        self.state.lock().unwrap().mounted.remove(target);
        Ok(())
    }
}

impl ProcessTable for MockSystem {
    fn pids_owned_by(&self, user: &str) -> HostResult<Vec<u32>> {
        if *self.fail_process_list.lock().unwrap() {
            return Err(HostError::Internal("mock process listing failure".into()));
        }
        Ok(self.live_pids(user))
    }

    fn kill_all_owned_by(&self, user: &str) -> HostResult<()> {
        let mut rounds = self.kill_rounds_required.lock().unwrap();
        if *rounds > 0 {
            *rounds -= 1;
            return Ok(());
        }
        self.state.lock().unwrap().processes.remove(user);
        Ok(())
    }
}

impl HomeStorage for MockSystem {
    fn create_mount_point(&self, prefix: &str) -> HostResult<PathBuf> {
        if *self.fail_mkdtemp.lock().unwrap() {
            return Err(HostError::Internal("mock mkdtemp failure".into()));
        }
        let mut state = self.state.lock().unwrap();
        state.mkdtemp_counter += 1;
        let path = PathBuf::from(format!("/tmp/{}{:06}", prefix, state.mkdtemp_counter));
        state.dirs.insert(path.clone());
        Ok(path)
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.state.lock().unwrap().dirs.contains(path)
    }

    fn create_home(&self, path: &Path) -> HostResult<()> {
        self.state.lock().unwrap().dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn seed_skeleton(&self, path: &Path) -> HostResult<()> {
        if *self.fail_seed_skeleton.lock().unwrap() {
            return Err(HostError::Internal("mock skeleton copy failure".into()));
        }
        self.state.lock().unwrap().seeded.insert(path.to_path_buf());
        Ok(())
    }

    fn chown_tree(&self, path: &Path, uid: u32, gid: u32) -> HostResult<()> {
        self.state
            .lock()
            .unwrap()
            .owners
            .insert(path.to_path_buf(), (uid, gid));
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> HostResult<()> {
        self.state.lock().unwrap().dirs.remove(path);
        Ok(())
    }

    fn remove_tree(&self, path: &Path) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        state.dirs.retain(|p| !p.starts_with(path));
        state.seeded.retain(|p| !p.starts_with(path));
        Ok(())
    }

    fn scratch_entries_owned_by(&self, uid: u32) -> HostResult<Vec<PathBuf>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .scratch
            .iter()
            .filter(|(_, owner)| *owner == uid)
            .map(|(p, _)| p.clone())
            .collect())
    }

    fn remove_entry(&self, path: &Path) -> HostResult<()> {
        self.state.lock().unwrap().scratch.retain(|(p, _)| p != path);
        Ok(())
    }
}

impl DesktopPrefs for MockSystem {
    fn disable_screen_lock(&self, user: &str) -> HostResult<()> {
        if *self.fail_screen_lock.lock().unwrap() {
            return Err(HostError::Internal("mock gsettings failure".into()));
        }
        self.state
            .lock()
            .unwrap()
            .screen_lock_disabled
            .push(user.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_user_is_visible() {
        let mock = MockSystem::new();
        let gid = mock.add_group("guests");
        mock.add_user("guest1", gid, Path::new("/tmp/guest1.000001/home"), true);

        let record = mock.user_by_name("guest1").unwrap().unwrap();
        assert_eq!(record.gid, gid);
        assert!(mock.path_exists(&record.home));
    }

    #[test]
    fn orphan_user_home_does_not_exist() {
        let mock = MockSystem::new();
        let gid = mock.add_group("guests");
        mock.add_user("guest2", gid, Path::new("/tmp/guest2.000001/home"), false);

        let record = mock.user_by_name("guest2").unwrap().unwrap();
        assert!(!mock.path_exists(&record.home));
    }

    #[test]
    fn create_user_hands_the_home_to_the_new_account() {
        let mock = MockSystem::new();
        mock.add_group("guests");
        mock.create_user("guest1", Path::new("/tmp/guest1.000001/home"), "guests")
            .unwrap();

        let record = mock.user_by_name("guest1").unwrap().unwrap();
        assert_eq!(
            mock.owner_of(&record.home),
            Some((record.uid, record.gid))
        );
    }

    #[test]
    fn create_user_requires_group() {
        let mock = MockSystem::new();
        let err = mock
            .create_user("guest1", Path::new("/tmp/g/home"), "guests")
            .unwrap_err();
        assert!(matches!(err, HostError::Identity(_)));
    }

    #[test]
    fn unmount_of_unmounted_path_errors() {
        let mock = MockSystem::new();
        assert!(mock.unmount(Path::new("/tmp/guest1.000001")).is_err());
    }

    #[test]
    fn kill_rounds_leave_stragglers() {
        let mock = MockSystem::new();
        mock.set_processes("guest1", &[100, 101]);
        *mock.kill_rounds_required.lock().unwrap() = 1;

        mock.kill_all_owned_by("guest1").unwrap();
        assert_eq!(mock.pids_owned_by("guest1").unwrap().len(), 2);

        mock.kill_all_owned_by("guest1").unwrap();
        assert!(mock.pids_owned_by("guest1").unwrap().is_empty());
    }
}
