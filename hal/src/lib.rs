//! # Hardware Abstraction Layer (HAL)
//!
//! Block device abstraction used by the lxfs driver.
//!
//! ## Design Principles
//!
//! 1. **Trait-based**: All block I/O goes through [`BlockDevice`]
//! 2. **Synchronous**: A call returns once the block has been transferred
//! 3. **Testable**: [`RamDisk`] stands in for hardware in tests

pub mod block_device;
pub mod file_disk;

pub use block_device::{BlockDevice, BlockError, RamDisk, DEFAULT_BLOCK_SIZE, MIN_BLOCK_SIZE};
pub use file_disk::FileDisk;
