//! Caller credentials
//!
//! Every filesystem request is evaluated against the uid/gid of the
//! requesting process. There is no supplementary group list: a caller is
//! either the owner, in the owning group, or "other".

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric user id
pub type Uid = u32;

/// Numeric group id
pub type Gid = u32;

/// Process id of a requester
pub type Pid = i32;

/// The superuser
pub const ROOT_UID: Uid = 0;

/// The uid/gid pair a request runs as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credentials {
    pub uid: Uid,
    pub gid: Gid,
}

impl Credentials {
    pub const fn new(uid: Uid, gid: Gid) -> Self {
        Self { uid, gid }
    }

    /// Credentials of the superuser
    pub const fn root() -> Self {
        Self::new(ROOT_UID, 0)
    }

    pub fn is_root(&self) -> bool {
        self.uid == ROOT_UID
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_credentials() {
        assert!(Credentials::root().is_root());
        assert!(!Credentials::new(1, 0).is_root());
    }

    #[test]
    fn test_display() {
        assert_eq!(Credentials::new(1000, 100).to_string(), "1000:100");
    }
}
