//! Directory contents
//!
//! A directory's first block starts with a [`DirHeader`]; its entries
//! follow packed back to back across the chain. A record may straddle
//! two consecutive blocks, so reads and writes go through the two-block
//! [`Scratch`] window.

use hal::BlockDevice;
use log::{debug, warn};

use crate::block_store::{Scratch, Volume};
use crate::dirent::{DirEntry, DirHeader, SlotHeader, DIR_HEADER_SIZE, ENTRY_HEADER_SIZE};
use crate::error::{FsError, FsResult};
use crate::layout::ChainLink;

/// Where an entry is stored: the first block of its directory and the
/// byte offset of the record from the start of that directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLocation {
    pub dir_block: u64,
    pub offset: u64,
}

/// One position in a directory's packed list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// A stored record, live or freed
    Record { offset: u64, entry: DirEntry },
    /// Unused tail space; nothing follows
    Virgin { offset: u64 },
    /// The packed list ends exactly at the end of the chain
    End { offset: u64 },
}

/// Forward cursor over the records of one directory
#[derive(Debug)]
pub struct DirStream {
    chain: Vec<u64>,
    block_size: usize,
    window: Option<usize>,
    offset: u64,
}

impl DirStream {
    pub fn open<D: BlockDevice>(vol: &mut Volume<D>, first_block: u64) -> FsResult<Self> {
        Ok(Self {
            chain: vol.chain_blocks(first_block)?,
            block_size: vol.block_size(),
            window: None,
            offset: DIR_HEADER_SIZE as u64,
        })
    }

    pub fn chain(&self) -> &[u64] {
        &self.chain
    }

    pub fn into_chain(self) -> Vec<u64> {
        self.chain
    }

    fn total_len(&self) -> u64 {
        (self.chain.len() * self.block_size) as u64
    }

    /// Loads chain block `k` and its successor, if any, into `scratch`
    fn load_window<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        scratch: &mut Scratch,
        k: usize,
    ) -> FsResult<()> {
        if self.window == Some(k) {
            return Ok(());
        }
        self.window = None;
        let (first, second) = scratch.halves();
        vol.read_block(self.chain[k], first)?;
        match self.chain.get(k + 1) {
            Some(next) => vol.read_block(*next, second)?,
            None => second.fill(0),
        }
        self.window = Some(k);
        Ok(())
    }

    /// Returns the slot at the cursor and advances past it
    ///
    /// `Virgin` and `End` are terminal: the cursor stays put.
    pub fn next_slot<D: BlockDevice>(
        &mut self,
        vol: &mut Volume<D>,
        scratch: &mut Scratch,
    ) -> FsResult<Slot> {
        let offset = self.offset;
        let total = self.total_len();
        if offset >= total {
            return Ok(Slot::End { offset });
        }
        let remaining = total - offset;
        if remaining < ENTRY_HEADER_SIZE as u64 {
            return Ok(Slot::Virgin { offset });
        }

        let k = (offset / self.block_size as u64) as usize;
        let within = (offset % self.block_size as u64) as usize;
        self.load_window(vol, scratch, k)?;
        let window = &scratch.pair()[within..];

        let header = SlotHeader::peek(window);
        if header.is_virgin() {
            return Ok(Slot::Virgin { offset });
        }
        if header.stored_len <= ENTRY_HEADER_SIZE
            || header.stored_len as u64 > remaining
            || header.stored_len > window.len()
        {
            return Err(FsError::Corrupted(format!(
                "record of {} bytes at offset {} of directory {}",
                header.stored_len, offset, self.chain[0]
            )));
        }

        let entry = DirEntry::decode(&window[..header.stored_len])?;
        self.offset += header.stored_len as u64;
        Ok(Slot::Record { offset, entry })
    }
}

/// Writes `record` at byte `offset` of the directory whose chain is
/// `chain`
///
/// A record that runs past the last block links a fresh block onto the
/// chain; the new block is released again if any write fails.
pub fn write_record<D: BlockDevice>(
    vol: &mut Volume<D>,
    scratch: &mut Scratch,
    chain: &mut Vec<u64>,
    offset: u64,
    record: &[u8],
) -> FsResult<()> {
    let block_size = vol.block_size();
    let k = (offset / block_size as u64) as usize;
    let within = (offset % block_size as u64) as usize;
    let end = within + record.len();
    if k >= chain.len() || record.len() > block_size {
        return Err(FsError::NotImplemented("directory records past the end of the chain"));
    }

    let current = chain[k];
    if end <= block_size {
        vol.read_block(current, scratch.block())?;
        scratch.block()[within..end].copy_from_slice(record);
        vol.write_block(current, scratch.block())?;
        vol.flush(current)?;
        return Ok(());
    }

    if let Some(&next) = chain.get(k + 1) {
        {
            let (first, second) = scratch.halves();
            vol.read_block(current, first)?;
            vol.read_block(next, second)?;
        }
        scratch.pair()[within..end].copy_from_slice(record);
        let (first, second) = scratch.halves();
        vol.write_block(next, second)?;
        vol.write_block(current, first)?;
        vol.flush(next)?;
        vol.flush(current)?;
        return Ok(());
    }

    let next = vol.with_reserved_block(current, |vol, next| {
        vol.read_block(current, scratch.block())?;
        let pair = scratch.pair();
        pair[block_size..].fill(0);
        pair[within..end].copy_from_slice(record);

        let (first, second) = scratch.halves();
        vol.write_block(next, second)?;
        vol.set_next_block(current, ChainLink::Next(next))?;
        if let Err(err) = vol.write_block(current, first) {
            if let Err(unlink) = vol.set_next_block(current, ChainLink::Eof) {
                warn!("failed to unlink block {} from {}: {}", next, current, unlink);
            }
            return Err(err);
        }
        Ok(next)
    })?;
    vol.flush(next)?;
    vol.flush(current)?;
    chain.push(next);
    debug!("directory {} grew: block {} linked after {}", chain[0], next, current);
    Ok(())
}

/// Finds the live entry called `name` in the directory starting at
/// `dir_block`
pub fn lookup<D: BlockDevice>(
    vol: &mut Volume<D>,
    scratch: &mut Scratch,
    dir_block: u64,
    name: &str,
) -> FsResult<Option<(DirEntry, EntryLocation)>> {
    let mut stream = DirStream::open(vol, dir_block)?;
    loop {
        match stream.next_slot(vol, scratch)? {
            Slot::Record { offset, entry } if entry.valid && entry.name == name => {
                return Ok(Some((entry, EntryLocation { dir_block, offset })));
            }
            Slot::Record { .. } => continue,
            Slot::Virgin { .. } | Slot::End { .. } => return Ok(None),
        }
    }
}

/// The `index`-th live entry of a directory, in on-disk order
pub fn nth_entry<D: BlockDevice>(
    vol: &mut Volume<D>,
    scratch: &mut Scratch,
    dir_block: u64,
    index: u64,
) -> FsResult<Option<DirEntry>> {
    let mut stream = DirStream::open(vol, dir_block)?;
    let mut seen = 0;
    loop {
        match stream.next_slot(vol, scratch)? {
            Slot::Record { entry, .. } if entry.valid => {
                if seen == index {
                    return Ok(Some(entry));
                }
                seen += 1;
            }
            Slot::Record { .. } => continue,
            Slot::Virgin { .. } | Slot::End { .. } => return Ok(None),
        }
    }
}

/// Rewrites an existing entry in place
pub fn rewrite_entry<D: BlockDevice>(
    vol: &mut Volume<D>,
    scratch: &mut Scratch,
    location: EntryLocation,
    entry: &DirEntry,
) -> FsResult<()> {
    let mut chain = vol.chain_blocks(location.dir_block)?;
    let chain_len = chain.len();
    write_record(vol, scratch, &mut chain, location.offset, &entry.encode())?;
    if chain.len() != chain_len {
        return Err(FsError::Corrupted(format!(
            "entry at offset {} of directory {} ran past the chain",
            location.offset, location.dir_block
        )));
    }
    Ok(())
}

pub fn read_header<D: BlockDevice>(
    vol: &mut Volume<D>,
    scratch: &mut Scratch,
    dir_block: u64,
) -> FsResult<DirHeader> {
    vol.read_block(dir_block, scratch.block())?;
    Ok(DirHeader::read(scratch.block()))
}

/// Read-modify-write of a directory header, flushed
pub fn update_header<D: BlockDevice>(
    vol: &mut Volume<D>,
    scratch: &mut Scratch,
    dir_block: u64,
    update: impl FnOnce(&mut DirHeader),
) -> FsResult<()> {
    vol.read_block(dir_block, scratch.block())?;
    let mut header = DirHeader::read(scratch.block());
    update(&mut header);
    header.write(scratch.block());
    vol.write_block(dir_block, scratch.block())?;
    vol.flush(dir_block)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirent::EntryKind;
    use crate::layout::{format, FormatOptions};
    use crate::permissions::Permissions;
    use core_types::Credentials;
    use hal::RamDisk;

    fn volume() -> Volume<RamDisk> {
        let mut disk = RamDisk::with_block_size(64, 512);
        format(&mut disk, &FormatOptions::default(), 0).unwrap();
        Volume::mount(disk).unwrap()
    }

    fn entry(name: &str, block: u64) -> DirEntry {
        let mut entry = DirEntry::new(
            name,
            EntryKind::File,
            Permissions::from_mode(0o644),
            Credentials::new(1, 1),
            5,
        );
        entry.block = block;
        entry
    }

    #[test]
    fn test_empty_directory_is_virgin() {
        let mut vol = volume();
        let mut scratch = vol.scratch();
        let mut stream = DirStream::open(&mut vol, 2).unwrap();
        assert_eq!(
            stream.next_slot(&mut vol, &mut scratch).unwrap(),
            Slot::Virgin { offset: 48 }
        );
    }

    #[test]
    fn test_records_walk_in_order() {
        let mut vol = volume();
        let mut scratch = vol.scratch();
        let mut chain = vec![2];
        let first = entry("first", 10);
        let second = entry("second", 11);
        write_record(&mut vol, &mut scratch, &mut chain, 48, &first.encode()).unwrap();
        let next = 48 + first.record_len() as u64;
        write_record(&mut vol, &mut scratch, &mut chain, next, &second.encode()).unwrap();

        let mut stream = DirStream::open(&mut vol, 2).unwrap();
        assert_eq!(
            stream.next_slot(&mut vol, &mut scratch).unwrap(),
            Slot::Record {
                offset: 48,
                entry: first
            }
        );
        assert!(matches!(
            stream.next_slot(&mut vol, &mut scratch).unwrap(),
            Slot::Record { entry, .. } if entry.name == "second"
        ));
        assert!(matches!(
            stream.next_slot(&mut vol, &mut scratch).unwrap(),
            Slot::Virgin { .. }
        ));
    }

    #[test]
    fn test_straddling_record_extends_chain() {
        let mut vol = volume();
        let mut scratch = vol.scratch();
        let mut chain = vec![2];
        let record = entry("straddler", 20);
        write_record(&mut vol, &mut scratch, &mut chain, 480, &record.encode()).unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(vol.next_block(2).unwrap(), ChainLink::Next(chain[1]));
        assert_eq!(vol.next_block(chain[1]).unwrap(), ChainLink::Eof);

        let mut stream = DirStream::open(&mut vol, 2).unwrap();
        stream.offset = 480;
        assert_eq!(
            stream.next_slot(&mut vol, &mut scratch).unwrap(),
            Slot::Record {
                offset: 480,
                entry: record
            }
        );
    }

    #[test]
    fn test_lookup_skips_freed_records() {
        let mut vol = volume();
        let mut scratch = vol.scratch();
        let mut chain = vec![2];
        let mut freed = entry("name", 10);
        freed.valid = false;
        let live = entry("name", 11);
        write_record(&mut vol, &mut scratch, &mut chain, 48, &freed.encode()).unwrap();
        let next = 48 + freed.record_len() as u64;
        write_record(&mut vol, &mut scratch, &mut chain, next, &live.encode()).unwrap();

        let (found, location) = lookup(&mut vol, &mut scratch, 2, "name").unwrap().unwrap();
        assert_eq!(found.block, 11);
        assert_eq!(location, EntryLocation { dir_block: 2, offset: next });
        assert!(lookup(&mut vol, &mut scratch, 2, "Name").unwrap().is_none());

        assert_eq!(nth_entry(&mut vol, &mut scratch, 2, 0).unwrap().unwrap().block, 11);
        assert!(nth_entry(&mut vol, &mut scratch, 2, 1).unwrap().is_none());
    }

    #[test]
    fn test_corrupted_record_length() {
        let mut vol = volume();
        let mut scratch = vol.scratch();
        let mut block = vec![0u8; 512];
        vol.read_block(2, &mut block).unwrap();
        block[48] = 1;
        block[60] = 10;
        vol.write_block(2, &block).unwrap();

        let mut stream = DirStream::open(&mut vol, 2).unwrap();
        assert!(matches!(
            stream.next_slot(&mut vol, &mut scratch),
            Err(FsError::Corrupted(_))
        ));
    }

    #[test]
    fn test_update_header() {
        let mut vol = volume();
        let mut scratch = vol.scratch();
        update_header(&mut vol, &mut scratch, 2, |h| h.entries = 3).unwrap();
        assert_eq!(read_header(&mut vol, &mut scratch, 2).unwrap().entries, 3);
    }
}
