//! Image-file backed block device
//!
//! Lets the daemon serve a volume stored in a regular host file.

use crate::{BlockDevice, BlockError, MIN_BLOCK_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A block device stored in a host file
#[derive(Debug)]
pub struct FileDisk {
    file: File,
    block_size: usize,
    block_count: u64,
}

impl FileDisk {
    /// Open an existing image; its length must be a multiple of `block_size`
    pub fn open(path: impl AsRef<Path>, block_size: usize) -> Result<Self, BlockError> {
        if block_size < MIN_BLOCK_SIZE || !block_size.is_power_of_two() {
            return Err(BlockError::InvalidSize);
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| BlockError::NotReady)?;
        let len = file.metadata().map_err(|_| BlockError::IoError)?.len();
        if len % block_size as u64 != 0 {
            return Err(BlockError::InvalidSize);
        }
        Ok(Self {
            file,
            block_size,
            block_count: len / block_size as u64,
        })
    }

    /// Create (or truncate) an image of `block_count` zeroed blocks
    pub fn create(
        path: impl AsRef<Path>,
        block_count: u64,
        block_size: usize,
    ) -> Result<Self, BlockError> {
        if block_size < MIN_BLOCK_SIZE || !block_size.is_power_of_two() {
            return Err(BlockError::InvalidSize);
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|_| BlockError::NotReady)?;
        file.set_len(block_count * block_size as u64)
            .map_err(|_| BlockError::IoError)?;
        Ok(Self {
            file,
            block_size,
            block_count,
        })
    }

    fn seek_to(&mut self, block_idx: u64, buffer_len: usize) -> Result<(), BlockError> {
        if block_idx >= self.block_count {
            return Err(BlockError::OutOfBounds);
        }
        if buffer_len < self.block_size {
            return Err(BlockError::InvalidSize);
        }
        self.file
            .seek(SeekFrom::Start(block_idx * self.block_size as u64))
            .map_err(|_| BlockError::IoError)?;
        Ok(())
    }
}

impl BlockDevice for FileDisk {
    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&mut self, block_idx: u64, buffer: &mut [u8]) -> Result<(), BlockError> {
        self.seek_to(block_idx, buffer.len())?;
        let block_size = self.block_size;
        self.file
            .read_exact(&mut buffer[..block_size])
            .map_err(|_| BlockError::IoError)
    }

    fn write_block(&mut self, block_idx: u64, buffer: &[u8]) -> Result<(), BlockError> {
        self.seek_to(block_idx, buffer.len())?;
        self.file
            .write_all(&buffer[..self.block_size])
            .map_err(|_| BlockError::IoError)
    }

    fn flush(&mut self) -> Result<(), BlockError> {
        self.file.sync_data().map_err(|_| BlockError::IoError)
    }
}
