//! Driver configuration
//!
//! Loaded from a JSON file; every field has a default so a partial file
//! (or none at all) is valid.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use hal::{DEFAULT_BLOCK_SIZE, MIN_BLOCK_SIZE};
use ipc::SERVER_MAX_SIZE;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::block_store::DEFAULT_SYMLINK_HOPS;
use crate::layout::FormatOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// One volume to serve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Device name requests address the volume by
    pub device: String,
    /// Host file holding the volume image
    pub image: PathBuf,
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Create and format the image with this many blocks when it does
    /// not exist yet
    #[serde(default)]
    pub create_blocks: Option<u64>,
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

impl MountConfig {
    pub fn new(device: impl Into<String>, image: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            image: image.into(),
            block_size: DEFAULT_BLOCK_SIZE,
            create_blocks: None,
        }
    }
}

/// Top-level driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Name the server logs under
    pub server_name: String,
    /// `error`, `warn`, `info`, `debug`, `trace` or `off`
    pub log_level: String,
    /// Symbolic-link expansions allowed per lookup
    pub symlink_hop_limit: u32,
    /// Largest read answered in one reply
    pub max_io_size: usize,
    pub mounts: Vec<MountConfig>,
    /// Applied to images created on startup
    pub format: FormatOptions,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            server_name: "lxfs".to_string(),
            log_level: "info".to_string(),
            symlink_hop_limit: DEFAULT_SYMLINK_HOPS,
            max_io_size: SERVER_MAX_SIZE,
            mounts: Vec::new(),
            format: FormatOptions::default(),
        }
    }
}

impl DriverConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.level_filter()?;
        if self.symlink_hop_limit == 0 {
            return Err(ConfigError::Invalid(
                "symlink_hop_limit must be at least 1".to_string(),
            ));
        }
        if self.max_io_size == 0 {
            return Err(ConfigError::Invalid("max_io_size must be positive".to_string()));
        }

        let mut devices = BTreeSet::new();
        for mount in &self.mounts {
            if mount.device.is_empty() {
                return Err(ConfigError::Invalid("mount with an empty device name".to_string()));
            }
            if !devices.insert(mount.device.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "device {} mounted twice",
                    mount.device
                )));
            }
            if mount.block_size < MIN_BLOCK_SIZE || !mount.block_size.is_power_of_two() {
                return Err(ConfigError::Invalid(format!(
                    "device {}: block size {} is not a power of two of at least {}",
                    mount.device, mount.block_size, MIN_BLOCK_SIZE
                )));
            }
        }
        Ok(())
    }

    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.log_level)))
    }
}
