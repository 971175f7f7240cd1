//! # Daemon Runtime
//!
//! Turns a [`DriverConfig`] into a running [`LxfsServer`].

use std::io;

use hal::{BlockError, FileDisk};
use kernel_api::{Clock, MessageTransport, StreamTransport, SystemClock};
use log::info;
use services_lxfs::layout::format;
use services_lxfs::{
    ConfigError, DriverConfig, FormatOptions, FsError, LxfsServer, MountConfig, MountTable,
    ServerError, Volume,
};
use thiserror::Error;

/// Daemon error types
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Image {device}: {source}")]
    Image {
        device: String,
        #[source]
        source: BlockError,
    },

    #[error("Volume {device}: {source}")]
    Volume {
        device: String,
        #[source]
        source: FsError,
    },

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Opens the image behind `mount`
///
/// A missing image is created and formatted when the mount asks for it
/// with `create_blocks`; otherwise it is an error.
pub fn open_image(
    mount: &MountConfig,
    options: &FormatOptions,
    now: u64,
) -> Result<FileDisk, DaemonError> {
    let image_error = |source: BlockError| DaemonError::Image {
        device: mount.device.clone(),
        source,
    };

    if mount.image.exists() {
        return FileDisk::open(&mount.image, mount.block_size).map_err(image_error);
    }
    let blocks = mount
        .create_blocks
        .ok_or_else(|| image_error(BlockError::NotReady))?;

    let mut disk = FileDisk::create(&mount.image, blocks, mount.block_size).map_err(image_error)?;
    format(&mut disk, options, now).map_err(|source| DaemonError::Volume {
        device: mount.device.clone(),
        source,
    })?;
    info!(
        "formatted {} as {} ({} blocks of {} bytes)",
        mount.image.display(),
        mount.device,
        blocks,
        mount.block_size
    );
    Ok(disk)
}

/// Opens and mounts every configured volume
pub fn mount_all(config: &DriverConfig, now: u64) -> Result<MountTable<FileDisk>, DaemonError> {
    let mut table = MountTable::new();
    for mount in &config.mounts {
        let volume_error = |source: FsError| DaemonError::Volume {
            device: mount.device.clone(),
            source,
        };
        let disk = open_image(mount, &config.format, now)?;
        let volume = Volume::mount(disk)
            .map_err(volume_error)?
            .with_symlink_hops(config.symlink_hop_limit);
        table.mount(mount.device.clone(), volume).map_err(volume_error)?;
    }
    Ok(table)
}

/// Builds a server for `config` on the given transport and clock
pub fn build_server<T: MessageTransport, C: Clock>(
    config: &DriverConfig,
    transport: T,
    clock: C,
) -> Result<LxfsServer<T, FileDisk, C>, DaemonError> {
    config.validate()?;
    let mounts = mount_all(config, clock.now_secs())?;
    Ok(LxfsServer::new(config.server_name.clone(), transport, mounts, clock)
        .with_max_io(config.max_io_size))
}

/// Serves requests read from stdin, replying on stdout
pub fn serve_stdio(config: &DriverConfig) -> Result<(), DaemonError> {
    let transport = StreamTransport::new(io::stdin().lock(), io::stdout().lock());
    let mut server = build_server(config, transport, SystemClock)?;
    server.run()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_image_without_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mount = MountConfig::new("sd0", dir.path().join("absent.img"));
        let err = open_image(&mount, &FormatOptions::default(), 0).unwrap_err();
        assert!(matches!(
            err,
            DaemonError::Image {
                source: BlockError::NotReady,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_image_created_and_formatted() {
        let dir = tempfile::tempdir().unwrap();
        let mut mount = MountConfig::new("sd0", dir.path().join("new.img"));
        mount.block_size = 512;
        mount.create_blocks = Some(32);

        let disk = open_image(&mount, &FormatOptions::default(), 0).unwrap();
        let volume = Volume::mount(disk).unwrap();
        assert_eq!(volume.volume_size(), 32);
        assert!(mount.image.exists());
    }
}
