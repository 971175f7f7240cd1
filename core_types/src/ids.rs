//! Unique identifiers for system entities

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a mounted volume
///
/// Assigned when a device is mounted; used to tag log lines and to tell
/// two mounts of the same device name apart across remounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MountId(Uuid);

impl MountId {
    /// Creates a new random mount ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a mount ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mount({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_id_uniqueness() {
        let id1 = MountId::new();
        let id2 = MountId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_mount_id_round_trip() {
        let uuid = Uuid::new_v4();
        let id = MountId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn test_mount_id_serialization() {
        let id = MountId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: MountId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_mount_id_display() {
        let id = MountId::new();
        assert!(id.to_string().starts_with("Mount("));
    }
}
