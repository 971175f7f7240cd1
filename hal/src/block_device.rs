/// Block device abstraction for storage
///
/// Provides a minimal block device API for reading and writing fixed-size blocks.
/// A mounted lxfs volume sits directly on top of one of these.
use core::fmt;

/// Default block size (4 KiB)
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Smallest block size a device may report
pub const MIN_BLOCK_SIZE: usize = 512;

/// Block device errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// Block index out of bounds
    OutOfBounds,
    /// I/O error (hardware failure, timeout, etc.)
    IoError,
    /// Device not ready
    NotReady,
    /// Invalid block size
    InvalidSize,
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds => write!(f, "block index out of bounds"),
            Self::IoError => write!(f, "I/O error"),
            Self::NotReady => write!(f, "device not ready"),
            Self::InvalidSize => write!(f, "invalid block size"),
        }
    }
}

impl std::error::Error for BlockError {}

/// Block device trait
///
/// Implementers provide block-level read/write operations.
/// All operations work with fixed-size blocks of `block_size()` bytes.
pub trait BlockDevice {
    /// Get the total number of blocks on this device
    fn block_count(&self) -> u64;

    /// Get the block size in bytes
    fn block_size(&self) -> usize {
        DEFAULT_BLOCK_SIZE
    }

    /// Read a block into the provided buffer
    ///
    /// # Arguments
    /// * `block_idx` - Block index to read
    /// * `buffer` - Buffer to read into (must be at least `block_size()` bytes)
    ///
    /// # Errors
    /// Returns `BlockError::OutOfBounds` if block_idx >= block_count()
    /// Returns `BlockError::IoError` on hardware failure
    /// Returns `BlockError::InvalidSize` if buffer is too small
    fn read_block(&mut self, block_idx: u64, buffer: &mut [u8]) -> Result<(), BlockError>;

    /// Write a block from the provided buffer
    ///
    /// # Arguments
    /// * `block_idx` - Block index to write
    /// * `buffer` - Buffer to write from (must be at least `block_size()` bytes)
    ///
    /// # Errors
    /// Returns `BlockError::OutOfBounds` if block_idx >= block_count()
    /// Returns `BlockError::IoError` on hardware failure
    /// Returns `BlockError::InvalidSize` if buffer is too small
    fn write_block(&mut self, block_idx: u64, buffer: &[u8]) -> Result<(), BlockError>;

    /// Flush any pending writes to persistent storage
    ///
    /// For devices with write caching, this ensures all writes are durable.
    fn flush(&mut self) -> Result<(), BlockError> {
        // Default implementation: no-op (assume writes are synchronous)
        Ok(())
    }

    /// Force a single block to durable storage
    ///
    /// Devices without per-block control flush everything.
    fn flush_block(&mut self, _block_idx: u64) -> Result<(), BlockError> {
        self.flush()
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for Box<D> {
    fn block_count(&self) -> u64 {
        (**self).block_count()
    }

    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn read_block(&mut self, block_idx: u64, buffer: &mut [u8]) -> Result<(), BlockError> {
        (**self).read_block(block_idx, buffer)
    }

    fn write_block(&mut self, block_idx: u64, buffer: &[u8]) -> Result<(), BlockError> {
        (**self).write_block(block_idx, buffer)
    }

    fn flush(&mut self) -> Result<(), BlockError> {
        (**self).flush()
    }

    fn flush_block(&mut self, block_idx: u64) -> Result<(), BlockError> {
        (**self).flush_block(block_idx)
    }
}

/// RAM disk - an in-memory block device
///
/// Useful for testing and for volatile scratch volumes.
/// Data is lost when the disk is dropped.
#[derive(Debug, Clone)]
pub struct RamDisk {
    data: Vec<u8>,
    block_size: usize,
    flushes: u64,
}

impl RamDisk {
    /// Create a new RAM disk with the specified number of default-sized blocks
    pub fn new(block_count: usize) -> Self {
        Self::with_block_size(block_count, DEFAULT_BLOCK_SIZE)
    }

    /// Create a RAM disk with an explicit block size
    pub fn with_block_size(block_count: usize, block_size: usize) -> Self {
        Self {
            data: vec![0u8; block_count * block_size],
            block_size,
            flushes: 0,
        }
    }

    /// Create a RAM disk with a specific capacity in megabytes
    pub fn with_capacity_mb(mb: usize) -> Self {
        let block_count = (mb * 1024 * 1024) / DEFAULT_BLOCK_SIZE;
        Self::new(block_count)
    }

    /// Raw view of one block (for inspection in tests)
    pub fn block(&self, block_idx: u64) -> Option<&[u8]> {
        let start = (block_idx as usize).checked_mul(self.block_size)?;
        self.data.get(start..start + self.block_size)
    }

    /// Number of flushes issued against this disk
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    fn range(&self, block_idx: u64, buffer_len: usize) -> Result<core::ops::Range<usize>, BlockError> {
        if block_idx >= self.block_count() {
            return Err(BlockError::OutOfBounds);
        }
        if buffer_len < self.block_size {
            return Err(BlockError::InvalidSize);
        }
        let start = block_idx as usize * self.block_size;
        Ok(start..start + self.block_size)
    }
}

impl BlockDevice for RamDisk {
    fn block_count(&self) -> u64 {
        (self.data.len() / self.block_size) as u64
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&mut self, block_idx: u64, buffer: &mut [u8]) -> Result<(), BlockError> {
        let range = self.range(block_idx, buffer.len())?;
        buffer[..self.block_size].copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_block(&mut self, block_idx: u64, buffer: &[u8]) -> Result<(), BlockError> {
        let range = self.range(block_idx, buffer.len())?;
        let block_size = self.block_size;
        self.data[range].copy_from_slice(&buffer[..block_size]);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), BlockError> {
        self.flushes += 1;
        Ok(())
    }
}
