//! # Permission Bits & Access Checks
//!
//! lxfs stores permissions in its own 12-bit layout, distinct from the
//! POSIX mode bits carried on the wire. [`Permissions::from_mode`] and
//! [`Permissions::to_mode`] translate between the two.
//!
//! Access is decided by the first matching class: the owner bits apply
//! when the caller's uid is the owner, otherwise the group bits when the
//! caller's gid is the group, otherwise the other bits. Classes never
//! combine, so an owner without the owner bit is refused even when the
//! other bits would allow it.

use bitflags::bitflags;
use core_types::{Credentials, Gid, Uid};
use ipc::flags::mode;

use crate::error::{FsError, FsResult};

bitflags! {
    /// On-disk permission bits of a directory entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u16 {
        const OWNER_READ = 0x001;
        const OWNER_WRITE = 0x002;
        const OWNER_EXEC = 0x004;
        const GROUP_READ = 0x008;
        const GROUP_WRITE = 0x010;
        const GROUP_EXEC = 0x020;
        const OTHER_READ = 0x040;
        const OTHER_WRITE = 0x080;
        const OTHER_EXEC = 0x100;
        const SET_UID = 0x200;
        const SET_GID = 0x400;
        const STICKY = 0x800;
    }
}

const MODE_MAP: [(u32, Permissions); 12] = [
    (mode::S_IRUSR, Permissions::OWNER_READ),
    (mode::S_IWUSR, Permissions::OWNER_WRITE),
    (mode::S_IXUSR, Permissions::OWNER_EXEC),
    (mode::S_IRGRP, Permissions::GROUP_READ),
    (mode::S_IWGRP, Permissions::GROUP_WRITE),
    (mode::S_IXGRP, Permissions::GROUP_EXEC),
    (mode::S_IROTH, Permissions::OTHER_READ),
    (mode::S_IWOTH, Permissions::OTHER_WRITE),
    (mode::S_IXOTH, Permissions::OTHER_EXEC),
    (mode::S_ISUID, Permissions::SET_UID),
    (mode::S_ISGID, Permissions::SET_GID),
    (mode::S_ISVTX, Permissions::STICKY),
];

impl Permissions {
    /// Translates POSIX mode bits; file type bits are ignored
    pub fn from_mode(mode: u32) -> Self {
        MODE_MAP
            .iter()
            .filter(|(bit, _)| mode & bit != 0)
            .fold(Permissions::empty(), |acc, (_, perm)| acc | *perm)
    }

    /// POSIX permission bits (no file type)
    pub fn to_mode(self) -> u32 {
        MODE_MAP
            .iter()
            .filter(|(_, perm)| self.contains(*perm))
            .fold(0, |acc, (bit, _)| acc | bit)
    }
}

/// The class a caller falls into for one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessClass {
    Owner,
    Group,
    Other,
}

impl AccessClass {
    pub fn of(owner: Uid, group: Gid, creds: Credentials) -> Self {
        if creds.uid == owner {
            AccessClass::Owner
        } else if creds.gid == group {
            AccessClass::Group
        } else {
            AccessClass::Other
        }
    }

    fn bits(self) -> (Permissions, Permissions, Permissions) {
        match self {
            AccessClass::Owner => (
                Permissions::OWNER_READ,
                Permissions::OWNER_WRITE,
                Permissions::OWNER_EXEC,
            ),
            AccessClass::Group => (
                Permissions::GROUP_READ,
                Permissions::GROUP_WRITE,
                Permissions::GROUP_EXEC,
            ),
            AccessClass::Other => (
                Permissions::OTHER_READ,
                Permissions::OTHER_WRITE,
                Permissions::OTHER_EXEC,
            ),
        }
    }
}

/// Kind of access being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Access {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Access {
    pub const READ: Access = Access {
        read: true,
        write: false,
        execute: false,
    };

    pub const WRITE: Access = Access {
        read: false,
        write: true,
        execute: false,
    };

    pub fn new(read: bool, write: bool) -> Self {
        Self {
            read,
            write,
            execute: false,
        }
    }
}

/// Whether `creds` may perform `access` on an object with these attributes
pub fn allows(
    permissions: Permissions,
    owner: Uid,
    group: Gid,
    creds: Credentials,
    access: Access,
) -> bool {
    let (read, write, exec) = AccessClass::of(owner, group, creds).bits();
    (!access.read || permissions.contains(read))
        && (!access.write || permissions.contains(write))
        && (!access.execute || permissions.contains(exec))
}

/// Like [`allows`], failing with `AccessDenied` naming `what`
pub fn check_access(
    permissions: Permissions,
    owner: Uid,
    group: Gid,
    creds: Credentials,
    access: Access,
    what: &str,
) -> FsResult<()> {
    if allows(permissions, owner, group, creds, access) {
        Ok(())
    } else {
        Err(FsError::AccessDenied(format!(
            "{} (uid {} as {:?})",
            what,
            creds.uid,
            AccessClass::of(owner, group, creds)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_translation() {
        let perms = Permissions::from_mode(0o644);
        assert_eq!(
            perms,
            Permissions::OWNER_READ
                | Permissions::OWNER_WRITE
                | Permissions::GROUP_READ
                | Permissions::OTHER_READ
        );
        assert_eq!(perms.bits(), 0x001 | 0x002 | 0x008 | 0x040);
        assert_eq!(perms.to_mode(), 0o644);
    }

    #[test]
    fn test_mode_translation_ignores_type_bits() {
        let perms = Permissions::from_mode(mode::S_IFREG | 0o755);
        assert_eq!(perms.to_mode(), 0o755);
    }

    #[test]
    fn test_special_bits() {
        let perms = Permissions::from_mode(0o7000);
        assert_eq!(
            perms,
            Permissions::SET_UID | Permissions::SET_GID | Permissions::STICKY
        );
        assert_eq!(perms.bits(), 0xE00);
    }

    #[test]
    fn test_owner_class_wins_over_other() {
        // ---rw-rw-: the owner is refused even though everyone else may write
        let perms = Permissions::from_mode(0o066);
        let owner = Credentials::new(1, 1);
        assert!(!allows(perms, 1, 1, owner, Access::WRITE));
        assert!(allows(perms, 1, 1, Credentials::new(2, 2), Access::WRITE));
    }

    #[test]
    fn test_group_class() {
        let perms = Permissions::from_mode(0o640);
        let member = Credentials::new(7, 1);
        assert!(allows(perms, 1, 1, member, Access::READ));
        assert!(!allows(perms, 1, 1, member, Access::WRITE));
        assert_eq!(AccessClass::of(1, 1, member), AccessClass::Group);
    }

    #[test]
    fn test_no_root_bypass() {
        let perms = Permissions::from_mode(0o600);
        assert!(!allows(perms, 1, 1, Credentials::root(), Access::READ));
    }

    #[test]
    fn test_check_access_error() {
        let perms = Permissions::from_mode(0o644);
        let err = check_access(perms, 1, 1, Credentials::new(2, 2), Access::WRITE, "/a")
            .unwrap_err();
        assert!(matches!(err, FsError::AccessDenied(_)));
    }

    #[test]
    fn test_empty_access_always_allowed() {
        assert!(allows(
            Permissions::empty(),
            1,
            1,
            Credentials::new(2, 2),
            Access::default()
        ));
    }
}
