//! Mounted volumes, keyed by device name

use std::collections::BTreeMap;

use hal::BlockDevice;
use log::info;

use crate::block_store::Volume;
use crate::error::{FsError, FsResult};

/// The volumes one server instance answers for
pub struct MountTable<D: BlockDevice> {
    volumes: BTreeMap<String, Volume<D>>,
}

impl<D: BlockDevice> MountTable<D> {
    pub fn new() -> Self {
        Self {
            volumes: BTreeMap::new(),
        }
    }

    /// Registers `volume` under `device`
    pub fn mount(&mut self, device: impl Into<String>, volume: Volume<D>) -> FsResult<()> {
        let device = device.into();
        if self.volumes.contains_key(&device) {
            return Err(FsError::AlreadyExists(format!("device {}", device)));
        }
        info!(
            "mounted {} on {} ({} blocks of {} bytes)",
            volume.mount_id(),
            device,
            volume.volume_size(),
            volume.block_size()
        );
        self.volumes.insert(device, volume);
        Ok(())
    }

    pub fn unmount(&mut self, device: &str) -> FsResult<Volume<D>> {
        let mut volume = self
            .volumes
            .remove(device)
            .ok_or_else(|| FsError::UnknownDevice(device.to_string()))?;
        volume.flush_all()?;
        info!("unmounted {}", device);
        Ok(volume)
    }

    pub fn get_mut(&mut self, device: &str) -> FsResult<&mut Volume<D>> {
        self.volumes
            .get_mut(device)
            .ok_or_else(|| FsError::UnknownDevice(device.to_string()))
    }

    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.volumes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

impl<D: BlockDevice> Default for MountTable<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{format, FormatOptions};
    use hal::RamDisk;

    fn volume() -> Volume<RamDisk> {
        let mut disk = RamDisk::with_block_size(32, 512);
        format(&mut disk, &FormatOptions::default(), 0).unwrap();
        Volume::mount(disk).unwrap()
    }

    #[test]
    fn test_mount_and_lookup() {
        let mut table = MountTable::new();
        table.mount("sd0", volume()).unwrap();
        assert!(table.get_mut("sd0").is_ok());
        assert!(matches!(table.get_mut("sd1"), Err(FsError::UnknownDevice(_))));
        assert_eq!(table.devices().collect::<Vec<_>>(), vec!["sd0"]);
    }

    #[test]
    fn test_duplicate_mount_rejected() {
        let mut table = MountTable::new();
        table.mount("sd0", volume()).unwrap();
        assert!(matches!(
            table.mount("sd0", volume()),
            Err(FsError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_unmount() {
        let mut table = MountTable::new();
        table.mount("sd0", volume()).unwrap();
        table.unmount("sd0").unwrap();
        assert!(table.is_empty());
        assert!(table.unmount("sd0").is_err());
    }
}
