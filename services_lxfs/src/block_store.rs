//! # Block Store
//!
//! A mounted [`Volume`]: block I/O, the chain map and the allocator.
//!
//! Every block belongs to at most one chain. The chain map records the
//! successor of each block, `Eof` for the last block of a chain and
//! `Free` for unallocated blocks. The allocator is a first-fit scan of
//! the chain map.
//!
//! I/O failures are returned to the caller, never retried.

use core_types::MountId;
use hal::BlockDevice;
use log::{debug, info, warn};

use crate::bytes::{get_u64, put_u64};
use crate::error::{FsError, FsResult};
use crate::layout::{ChainLink, Identification};

/// Default bound on symbolic-link expansions per lookup
pub const DEFAULT_SYMLINK_HOPS: u32 = 40;

/// Staging buffer of two consecutive blocks
///
/// Owned by one request and handed to every engine call that needs to
/// touch an entry straddling a block boundary.
#[derive(Debug, Clone)]
pub struct Scratch {
    buf: Vec<u8>,
    block_size: usize,
}

impl Scratch {
    pub fn new(block_size: usize) -> Self {
        Self {
            buf: vec![0u8; block_size * 2],
            block_size,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The first block-sized half
    pub fn block(&mut self) -> &mut [u8] {
        &mut self.buf[..self.block_size]
    }

    /// Both halves as one contiguous span
    pub fn pair(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn halves(&mut self) -> (&mut [u8], &mut [u8]) {
        self.buf.split_at_mut(self.block_size)
    }
}

/// One mounted lxfs volume
pub struct Volume<D: BlockDevice> {
    device: D,
    ident: Identification,
    mount_id: MountId,
    symlink_hops: u32,
}

impl<D: BlockDevice> Volume<D> {
    /// Validates the identification block and takes ownership of `device`
    pub fn mount(mut device: D) -> FsResult<Self> {
        let block_size = device.block_size();
        let mut buf = vec![0u8; block_size];
        device.read_block(0, &mut buf)?;
        let ident = Identification::decode(&buf)?;

        if ident.block_size as usize != block_size {
            return Err(FsError::Corrupted(format!(
                "volume block size {} on a device with {}-byte blocks",
                ident.block_size, block_size
            )));
        }
        if ident.volume_size > device.block_count() {
            return Err(FsError::Corrupted(format!(
                "volume of {} blocks on a device of {}",
                ident.volume_size,
                device.block_count()
            )));
        }

        let mount_id = MountId::new();
        info!(
            "mounted '{}' as {}: {} blocks of {} bytes",
            ident.label, mount_id, ident.volume_size, block_size
        );
        Ok(Self {
            device,
            ident,
            mount_id,
            symlink_hops: DEFAULT_SYMLINK_HOPS,
        })
    }

    pub fn with_symlink_hops(mut self, hops: u32) -> Self {
        self.symlink_hops = hops;
        self
    }

    pub fn symlink_hops(&self) -> u32 {
        self.symlink_hops
    }

    pub fn identification(&self) -> &Identification {
        &self.ident
    }

    pub fn mount_id(&self) -> MountId {
        self.mount_id
    }

    pub fn block_size(&self) -> usize {
        self.ident.block_size as usize
    }

    pub fn volume_size(&self) -> u64 {
        self.ident.volume_size
    }

    pub fn root_block(&self) -> u64 {
        self.ident.root_block
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    pub fn scratch(&self) -> Scratch {
        Scratch::new(self.block_size())
    }

    fn check_index(&self, index: u64) -> FsResult<()> {
        if index >= self.ident.volume_size {
            return Err(FsError::Io(hal::BlockError::OutOfBounds));
        }
        Ok(())
    }

    pub fn read_block(&mut self, index: u64, buf: &mut [u8]) -> FsResult<()> {
        self.check_index(index)?;
        self.device.read_block(index, buf)?;
        Ok(())
    }

    pub fn write_block(&mut self, index: u64, buf: &[u8]) -> FsResult<()> {
        self.check_index(index)?;
        self.device.write_block(index, buf)?;
        Ok(())
    }

    /// Forces `index` to durable storage
    pub fn flush(&mut self, index: u64) -> FsResult<()> {
        self.device.flush_block(index)?;
        Ok(())
    }

    pub fn flush_all(&mut self) -> FsResult<()> {
        self.device.flush()?;
        Ok(())
    }

    /// Rewrites block 0 after a change to the root directory's attributes
    pub fn update_identification(
        &mut self,
        update: impl FnOnce(&mut Identification),
    ) -> FsResult<()> {
        let mut ident = self.ident.clone();
        update(&mut ident);
        let mut buf = vec![0u8; self.block_size()];
        self.device.read_block(0, &mut buf)?;
        ident.encode(&mut buf);
        self.device.write_block(0, &buf)?;
        self.device.flush_block(0)?;
        self.ident = ident;
        Ok(())
    }

    fn table_position(&self, index: u64) -> (u64, usize) {
        let per_block = (self.block_size() / 8) as u64;
        (
            self.ident.table_start + index / per_block,
            ((index % per_block) * 8) as usize,
        )
    }

    pub fn next_block(&mut self, index: u64) -> FsResult<ChainLink> {
        self.check_index(index)?;
        let (table_block, offset) = self.table_position(index);
        let mut buf = vec![0u8; self.block_size()];
        self.device.read_block(table_block, &mut buf)?;
        ChainLink::from_raw(get_u64(&buf, offset), self.ident.volume_size)
    }

    /// Read-modify-write of the chain-map entry of `index`
    pub fn set_next_block(&mut self, index: u64, link: ChainLink) -> FsResult<()> {
        self.check_index(index)?;
        if let ChainLink::Next(next) = link {
            self.check_index(next)?;
        }
        let (table_block, offset) = self.table_position(index);
        let mut buf = vec![0u8; self.block_size()];
        self.device.read_block(table_block, &mut buf)?;
        put_u64(&mut buf, offset, link.to_raw());
        self.device.write_block(table_block, &buf)?;
        debug!("chain[{}] = {:?}", index, link);
        Ok(())
    }

    /// First free block at or after `hint`, wrapping around to the first
    /// data block. A `hint` of 0 means no preference.
    pub fn find_free_block(&mut self, hint: u64) -> FsResult<u64> {
        let first = self.ident.first_data_block();
        let end = self.ident.volume_size;
        let start = if hint < first || hint >= end { first } else { hint };

        if let Some(block) = self.scan_free(start, end)? {
            return Ok(block);
        }
        if let Some(block) = self.scan_free(first, start)? {
            return Ok(block);
        }
        Err(FsError::NoSpace)
    }

    fn scan_free(&mut self, from: u64, to: u64) -> FsResult<Option<u64>> {
        let mut buf = vec![0u8; self.block_size()];
        let mut loaded = None;
        for index in from..to {
            let (table_block, offset) = self.table_position(index);
            if loaded != Some(table_block) {
                self.device.read_block(table_block, &mut buf)?;
                loaded = Some(table_block);
            }
            if get_u64(&buf, offset) == crate::layout::CHAIN_FREE {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Scoped allocation: reserves a free block as a one-block chain and
    /// runs `f` with it. If `f` fails the block is returned to the free
    /// pool before the error is passed on.
    pub fn with_reserved_block<T>(
        &mut self,
        hint: u64,
        f: impl FnOnce(&mut Self, u64) -> FsResult<T>,
    ) -> FsResult<T> {
        let block = self.find_free_block(hint)?;
        self.set_next_block(block, ChainLink::Eof)?;
        debug!("reserved block {}", block);

        match f(self, block) {
            Ok(value) => Ok(value),
            Err(err) => {
                if let Err(release) = self.set_next_block(block, ChainLink::Free) {
                    warn!("failed to release block {} after error: {}", block, release);
                }
                Err(err)
            }
        }
    }

    /// Every block of the chain starting at `first`, in order
    pub fn chain_blocks(&mut self, first: u64) -> FsResult<Vec<u64>> {
        let mut blocks = vec![first];
        let mut current = first;
        loop {
            match self.next_block(current)? {
                ChainLink::Eof => return Ok(blocks),
                ChainLink::Next(next) => {
                    if blocks.len() as u64 >= self.ident.volume_size {
                        return Err(FsError::Corrupted(format!(
                            "chain from block {} does not terminate",
                            first
                        )));
                    }
                    blocks.push(next);
                    current = next;
                }
                link => {
                    return Err(FsError::Corrupted(format!(
                        "block {} of chain {} is {:?}",
                        current, first, link
                    )))
                }
            }
        }
    }

    /// Releases every block of a chain
    pub fn free_chain(&mut self, first: u64) -> FsResult<()> {
        for block in self.chain_blocks(first)? {
            self.set_next_block(block, ChainLink::Free)?;
        }
        debug!("freed chain {}", first);
        Ok(())
    }

    /// Cuts a chain back to its first block
    pub fn truncate_chain(&mut self, first: u64) -> FsResult<()> {
        let blocks = self.chain_blocks(first)?;
        self.set_next_block(first, ChainLink::Eof)?;
        for block in blocks.into_iter().skip(1) {
            self.set_next_block(block, ChainLink::Free)?;
        }
        Ok(())
    }

    /// Cuts `chain` back to its first `keep` blocks, freeing the rest
    pub fn release_tail(&mut self, chain: &[u64], keep: usize) -> FsResult<()> {
        if keep == 0 || keep >= chain.len() {
            return Ok(());
        }
        self.set_next_block(chain[keep - 1], ChainLink::Eof)?;
        for &block in &chain[keep..] {
            self.set_next_block(block, ChainLink::Free)?;
        }
        debug!("released {} blocks from chain {}", chain.len() - keep, chain[0]);
        Ok(())
    }

    /// Appends a zeroed block to the chain ending at `last`
    pub fn extend_chain(&mut self, last: u64) -> FsResult<u64> {
        let zeros = vec![0u8; self.block_size()];
        self.with_reserved_block(last, |vol, block| {
            vol.write_block(block, &zeros)?;
            vol.set_next_block(last, ChainLink::Next(block))?;
            Ok(block)
        })
    }

    /// Number of free blocks, for stat-style reporting
    pub fn free_blocks(&mut self) -> FsResult<u64> {
        let first = self.ident.first_data_block();
        let mut count = 0;
        let mut buf = vec![0u8; self.block_size()];
        let mut loaded = None;
        for index in first..self.ident.volume_size {
            let (table_block, offset) = self.table_position(index);
            if loaded != Some(table_block) {
                self.device.read_block(table_block, &mut buf)?;
                loaded = Some(table_block);
            }
            if get_u64(&buf, offset) == crate::layout::CHAIN_FREE {
                count += 1;
            }
        }
        Ok(count)
    }
}
