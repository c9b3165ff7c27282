//! Records observed in the OS identity database
//!
//! These rows are not owned by guestpool; they are read from the passwd and
//! group databases and mutated only through [`IdentityStore`] operations.
//!
//! [`IdentityStore`]: crate::IdentityStore

use std::path::PathBuf;

/// One user row from the identity database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    /// Login name
    pub name: String,

    /// Numeric user id
    pub uid: u32,

    /// Primary group id
    pub gid: u32,

    /// Home directory as recorded in the database (may not exist on disk)
    pub home: PathBuf,
}

/// One group row from the identity database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    /// Group name
    pub name: String,

    /// Numeric group id
    pub gid: u32,
}
