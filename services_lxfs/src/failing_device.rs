//! # Failing Block Device
//!
//! A BlockDevice wrapper that injects I/O errors, for exercising the
//! rollback and error paths of the filesystem engine.

use std::collections::BTreeMap;

use hal::{BlockDevice, BlockError};

/// Policy for when failures should occur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Never fail (passthrough)
    Never,
    /// Fail every write and flush after N successful writes
    AfterWrites(usize),
    /// Fail writes to specific block indices
    OnBlocks(Vec<u64>),
    /// Fail writes to specific blocks once each has been written `count` times
    AfterWritesToBlocks { count: usize, blocks: Vec<u64> },
    /// Fail reads of specific block indices
    ReadsOfBlocks(Vec<u64>),
    /// Fail reads of `block` once it has been written `writes` times
    ReadsAfterWritesTo { block: u64, writes: usize },
}

/// Wrapper around a BlockDevice that can simulate failures
pub struct FailingBlockDevice<D: BlockDevice> {
    inner: D,
    policy: FailurePolicy,
    write_count: usize,
    block_write_counts: BTreeMap<u64, usize>,
}

impl<D: BlockDevice> FailingBlockDevice<D> {
    /// Create a new failing block device with the given policy
    pub fn new(inner: D, policy: FailurePolicy) -> Self {
        Self {
            inner,
            policy,
            write_count: 0,
            block_write_counts: BTreeMap::new(),
        }
    }

    fn write_should_fail(&self, block_idx: u64) -> bool {
        match &self.policy {
            FailurePolicy::AfterWrites(n) => self.write_count >= *n,
            FailurePolicy::OnBlocks(blocks) => blocks.contains(&block_idx),
            FailurePolicy::AfterWritesToBlocks { count, blocks } => {
                blocks.contains(&block_idx) && self.writes_to(block_idx) >= *count
            }
            _ => false,
        }
    }

    fn read_should_fail(&self, block_idx: u64) -> bool {
        match &self.policy {
            FailurePolicy::ReadsOfBlocks(blocks) => blocks.contains(&block_idx),
            FailurePolicy::ReadsAfterWritesTo { block, writes } => {
                *block == block_idx && self.writes_to(block_idx) >= *writes
            }
            _ => false,
        }
    }

    fn writes_to(&self, block_idx: u64) -> usize {
        self.block_write_counts.get(&block_idx).copied().unwrap_or(0)
    }

    /// Get the underlying device (for inspection)
    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }

    /// Get the number of writes that have occurred
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    /// Replace the failure policy and reset the counters
    pub fn set_policy(&mut self, policy: FailurePolicy) {
        self.policy = policy;
        self.write_count = 0;
        self.block_write_counts.clear();
    }
}

impl<D: BlockDevice> BlockDevice for FailingBlockDevice<D> {
    fn block_count(&self) -> u64 {
        self.inner.block_count()
    }

    fn block_size(&self) -> usize {
        self.inner.block_size()
    }

    fn read_block(&mut self, block_idx: u64, buffer: &mut [u8]) -> Result<(), BlockError> {
        if self.read_should_fail(block_idx) {
            return Err(BlockError::IoError);
        }
        self.inner.read_block(block_idx, buffer)
    }

    fn write_block(&mut self, block_idx: u64, buffer: &[u8]) -> Result<(), BlockError> {
        if self.write_should_fail(block_idx) {
            return Err(BlockError::IoError);
        }

        self.write_count += 1;
        *self.block_write_counts.entry(block_idx).or_insert(0) += 1;
        self.inner.write_block(block_idx, buffer)
    }

    fn flush(&mut self) -> Result<(), BlockError> {
        if matches!(self.policy, FailurePolicy::AfterWrites(n) if self.write_count >= n) {
            return Err(BlockError::IoError);
        }
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::RamDisk;

    const BLOCK: usize = 512;

    fn disk() -> RamDisk {
        RamDisk::with_block_size(10, BLOCK)
    }

    #[test]
    fn test_failing_device_never() {
        let mut failing = FailingBlockDevice::new(disk(), FailurePolicy::Never);

        let data = [0x42u8; BLOCK];
        assert!(failing.write_block(0, &data).is_ok());
        assert!(failing.write_block(1, &data).is_ok());
        assert_eq!(failing.block_size(), BLOCK);
    }

    #[test]
    fn test_failing_device_after_writes() {
        let mut failing = FailingBlockDevice::new(disk(), FailurePolicy::AfterWrites(2));

        let data = [0x42u8; BLOCK];
        assert!(failing.write_block(0, &data).is_ok());
        assert!(failing.write_block(1, &data).is_ok());
        assert_eq!(failing.write_block(2, &data), Err(BlockError::IoError));
        assert_eq!(failing.flush(), Err(BlockError::IoError));
    }

    #[test]
    fn test_failing_device_on_blocks() {
        let mut failing = FailingBlockDevice::new(disk(), FailurePolicy::OnBlocks(vec![2, 5]));

        let data = [0x42u8; BLOCK];
        assert!(failing.write_block(1, &data).is_ok());
        assert_eq!(failing.write_block(2, &data), Err(BlockError::IoError));
        assert!(failing.write_block(3, &data).is_ok());
        assert_eq!(failing.write_block(5, &data), Err(BlockError::IoError));
    }

    #[test]
    fn test_failing_device_after_writes_to_blocks() {
        let mut failing = FailingBlockDevice::new(
            disk(),
            FailurePolicy::AfterWritesToBlocks {
                count: 2,
                blocks: vec![3],
            },
        );

        let data = [0x42u8; BLOCK];
        assert!(failing.write_block(3, &data).is_ok());
        assert!(failing.write_block(3, &data).is_ok());
        assert_eq!(failing.write_block(3, &data), Err(BlockError::IoError));
        assert!(failing.write_block(4, &data).is_ok());
    }

    #[test]
    fn test_failing_device_reads() {
        let mut failing = FailingBlockDevice::new(disk(), FailurePolicy::ReadsOfBlocks(vec![4]));

        let mut buffer = [0u8; BLOCK];
        assert!(failing.read_block(3, &mut buffer).is_ok());
        assert_eq!(failing.read_block(4, &mut buffer), Err(BlockError::IoError));
    }

    #[test]
    fn test_failing_device_reads_after_writes() {
        let mut failing = FailingBlockDevice::new(
            disk(),
            FailurePolicy::ReadsAfterWritesTo { block: 6, writes: 1 },
        );

        let mut buffer = [0u8; BLOCK];
        assert!(failing.read_block(6, &mut buffer).is_ok());
        failing.write_block(6, &buffer).unwrap();
        assert_eq!(failing.read_block(6, &mut buffer), Err(BlockError::IoError));
        assert!(failing.read_block(7, &mut buffer).is_ok());
    }

    #[test]
    fn test_failing_device_set_policy_resets_counts() {
        let mut failing = FailingBlockDevice::new(disk(), FailurePolicy::Never);

        let data = [0x42u8; BLOCK];
        failing.write_block(0, &data).unwrap();
        assert_eq!(failing.write_count(), 1);

        failing.set_policy(FailurePolicy::AfterWrites(0));
        assert_eq!(failing.write_count(), 0);
        assert_eq!(failing.write_block(1, &data), Err(BlockError::IoError));
    }
}
