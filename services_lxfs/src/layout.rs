//! Volume layout: the identification block, chain-map encoding and
//! formatting.
//!
//! ```text
//! block 0                    identification block
//! blocks 1..=table_blocks    chain map, one u64 per volume block
//! next block                 root directory
//! remaining blocks           data
//! ```

use core_types::{Credentials, Gid, Uid};
use hal::{BlockDevice, MIN_BLOCK_SIZE};
use log::info;
use serde::{Deserialize, Serialize};

use crate::bytes::{get_u16, get_u32, get_u64, put_u16, put_u32, put_u64};
use crate::dirent::DirHeader;
use crate::error::{FsError, FsResult};
use crate::permissions::Permissions;

pub const MAGIC: &[u8; 4] = b"LXFS";
pub const FORMAT_VERSION: u8 = 1;
pub const LABEL_LEN: usize = 16;

const CHECKSUM_OFFSET: usize = 72;
const IDENT_LEN: usize = CHECKSUM_OFFSET + 4;

/// Raw chain-map values
pub const CHAIN_FREE: u64 = 0;
pub const CHAIN_EOF: u64 = u64::MAX;
pub const CHAIN_TABLE: u64 = u64::MAX - 1;
pub const CHAIN_IDENT: u64 = u64::MAX - 3;

/// Decoded chain-map entry of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainLink {
    Free,
    /// Last block of its chain
    Eof,
    Next(u64),
    /// Holds the identification block or the chain map
    Reserved,
}

impl ChainLink {
    /// Decodes a raw value; successors outside the volume are corruption
    pub fn from_raw(raw: u64, volume_size: u64) -> FsResult<Self> {
        match raw {
            CHAIN_FREE => Ok(ChainLink::Free),
            CHAIN_EOF => Ok(ChainLink::Eof),
            CHAIN_TABLE | CHAIN_IDENT => Ok(ChainLink::Reserved),
            next if next < volume_size => Ok(ChainLink::Next(next)),
            other => Err(FsError::Corrupted(format!(
                "chain map value {:#x} outside a volume of {} blocks",
                other, volume_size
            ))),
        }
    }

    pub fn to_raw(self) -> u64 {
        match self {
            ChainLink::Free => CHAIN_FREE,
            ChainLink::Eof => CHAIN_EOF,
            ChainLink::Next(next) => next,
            ChainLink::Reserved => CHAIN_TABLE,
        }
    }
}

/// Number of chain-map blocks needed for `volume_size` blocks
pub fn table_blocks_for(volume_size: u64, block_size: usize) -> u64 {
    (volume_size * 8).div_ceil(block_size as u64)
}

/// Contents of block 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub volume_size: u64,
    pub root_block: u64,
    pub block_size: u32,
    pub version: u8,
    pub flags: u8,
    pub root_permissions: Permissions,
    pub table_start: u64,
    pub table_blocks: u64,
    pub root_owner: Uid,
    pub root_group: Gid,
    pub label: String,
}

impl Identification {
    /// First block the allocator may hand out
    pub fn first_data_block(&self) -> u64 {
        self.table_start + self.table_blocks
    }

    pub fn encode(&self, block: &mut [u8]) {
        block[..IDENT_LEN].fill(0);
        block[4..8].copy_from_slice(MAGIC);
        put_u64(block, 8, self.volume_size);
        put_u64(block, 16, self.root_block);
        put_u32(block, 24, self.block_size);
        block[28] = self.version;
        block[29] = self.flags;
        put_u16(block, 30, self.root_permissions.bits());
        put_u64(block, 32, self.table_start);
        put_u64(block, 40, self.table_blocks);
        put_u32(block, 48, self.root_owner);
        put_u32(block, 52, self.root_group);
        let label = self.label.as_bytes();
        let len = label.len().min(LABEL_LEN - 1);
        block[56..56 + len].copy_from_slice(&label[..len]);
        let checksum = crc32fast::hash(&block[..CHECKSUM_OFFSET]);
        put_u32(block, CHECKSUM_OFFSET, checksum);
    }

    pub fn decode(block: &[u8]) -> FsResult<Self> {
        if block.len() < IDENT_LEN {
            return Err(FsError::Corrupted("identification block too short".to_string()));
        }
        if &block[4..8] != MAGIC {
            return Err(FsError::Corrupted("missing LXFS signature".to_string()));
        }
        let stored = get_u32(block, CHECKSUM_OFFSET);
        let computed = crc32fast::hash(&block[..CHECKSUM_OFFSET]);
        if stored != computed {
            return Err(FsError::Corrupted(format!(
                "identification checksum {:#010x}, expected {:#010x}",
                stored, computed
            )));
        }
        let version = block[28];
        if version != FORMAT_VERSION {
            return Err(FsError::Corrupted(format!(
                "unsupported format version {}",
                version
            )));
        }
        let block_size = get_u32(block, 24);
        if (block_size as usize) < MIN_BLOCK_SIZE || !block_size.is_power_of_two() {
            return Err(FsError::Corrupted(format!("invalid block size {}", block_size)));
        }

        let label_bytes = &block[56..56 + LABEL_LEN];
        let label_len = label_bytes.iter().position(|b| *b == 0).unwrap_or(LABEL_LEN);
        let label = String::from_utf8_lossy(&label_bytes[..label_len]).into_owned();

        let ident = Self {
            volume_size: get_u64(block, 8),
            root_block: get_u64(block, 16),
            block_size,
            version,
            flags: block[29],
            root_permissions: Permissions::from_bits_truncate(get_u16(block, 30)),
            table_start: get_u64(block, 32),
            table_blocks: get_u64(block, 40),
            root_owner: get_u32(block, 48),
            root_group: get_u32(block, 52),
            label,
        };

        if ident.table_blocks < table_blocks_for(ident.volume_size, block_size as usize)
            || ident.root_block < ident.first_data_block()
            || ident.root_block >= ident.volume_size
        {
            return Err(FsError::Corrupted("inconsistent volume geometry".to_string()));
        }
        Ok(ident)
    }
}

/// Parameters of a freshly formatted volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatOptions {
    pub label: String,
    /// POSIX permission bits of the root directory
    pub root_mode: u32,
    pub root_uid: Uid,
    pub root_gid: Gid,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            label: "lxfs".to_string(),
            root_mode: 0o755,
            root_uid: 0,
            root_gid: 0,
        }
    }
}

impl FormatOptions {
    pub fn with_root_owner(mut self, owner: Credentials) -> Self {
        self.root_uid = owner.uid;
        self.root_gid = owner.gid;
        self
    }

    pub fn with_root_mode(mut self, mode: u32) -> Self {
        self.root_mode = mode;
        self
    }
}

/// Writes an empty lxfs volume covering the whole device
pub fn format<D: BlockDevice + ?Sized>(
    device: &mut D,
    options: &FormatOptions,
    now: u64,
) -> FsResult<Identification> {
    let block_size = device.block_size();
    if block_size < MIN_BLOCK_SIZE || !block_size.is_power_of_two() {
        return Err(FsError::InvalidArgument(format!(
            "block size {} is not a power of two of at least {}",
            block_size, MIN_BLOCK_SIZE
        )));
    }
    if options.label.len() >= LABEL_LEN {
        return Err(FsError::InvalidArgument(format!(
            "label '{}' longer than {} bytes",
            options.label,
            LABEL_LEN - 1
        )));
    }

    let volume_size = device.block_count();
    let table_blocks = table_blocks_for(volume_size, block_size);
    let root_block = 1 + table_blocks;
    if root_block >= volume_size {
        return Err(FsError::InvalidArgument(format!(
            "{} blocks cannot hold a chain map and a root directory",
            volume_size
        )));
    }

    let per_block = (block_size / 8) as u64;
    let mut buf = vec![0u8; block_size];
    for table_index in 0..table_blocks {
        buf.fill(0);
        for slot in 0..per_block {
            let block = table_index * per_block + slot;
            if block >= volume_size {
                break;
            }
            let value = if block == 0 {
                CHAIN_IDENT
            } else if block <= table_blocks {
                CHAIN_TABLE
            } else if block == root_block {
                CHAIN_EOF
            } else {
                CHAIN_FREE
            };
            put_u64(&mut buf, (slot * 8) as usize, value);
        }
        device.write_block(1 + table_index, &buf)?;
    }

    buf.fill(0);
    DirHeader::new(now).write(&mut buf);
    device.write_block(root_block, &buf)?;

    let ident = Identification {
        volume_size,
        root_block,
        block_size: block_size as u32,
        version: FORMAT_VERSION,
        flags: 0,
        root_permissions: Permissions::from_mode(options.root_mode),
        table_start: 1,
        table_blocks,
        root_owner: options.root_uid,
        root_group: options.root_gid,
        label: options.label.clone(),
    };
    buf.fill(0);
    ident.encode(&mut buf);
    device.write_block(0, &buf)?;
    device.flush()?;

    info!(
        "formatted lxfs volume '{}': {} blocks of {} bytes, root at block {}",
        ident.label, volume_size, block_size, root_block
    );
    Ok(ident)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::RamDisk;

    #[test]
    fn test_format_layout() {
        let mut disk = RamDisk::with_block_size(64, 512);
        let ident = format(&mut disk, &FormatOptions::default(), 100).unwrap();

        assert_eq!(ident.table_blocks, 1);
        assert_eq!(ident.root_block, 2);
        assert_eq!(ident.first_data_block(), 2);

        let table = disk.block(1).unwrap();
        assert_eq!(get_u64(table, 0), CHAIN_IDENT);
        assert_eq!(get_u64(table, 8), CHAIN_TABLE);
        assert_eq!(get_u64(table, 16), CHAIN_EOF);
        assert_eq!(get_u64(table, 24), CHAIN_FREE);

        let root = DirHeader::read(disk.block(2).unwrap());
        assert_eq!(root, DirHeader::new(100));
    }

    #[test]
    fn test_identification_decode() {
        let mut disk = RamDisk::with_block_size(300, 512);
        let options = FormatOptions::default()
            .with_root_owner(Credentials::new(5, 6))
            .with_root_mode(0o750);
        let written = format(&mut disk, &options, 0).unwrap();

        let decoded = Identification::decode(disk.block(0).unwrap()).unwrap();
        assert_eq!(decoded, written);
        assert_eq!(decoded.table_blocks, 5);
        assert_eq!(decoded.root_permissions.to_mode(), 0o750);
        assert_eq!(decoded.root_owner, 5);
        assert_eq!(decoded.label, "lxfs");
    }

    #[test]
    fn test_checksum_detects_damage() {
        let mut disk = RamDisk::with_block_size(64, 512);
        format(&mut disk, &FormatOptions::default(), 0).unwrap();

        let mut block = disk.block(0).unwrap().to_vec();
        block[8] ^= 0xFF;
        assert!(matches!(
            Identification::decode(&block),
            Err(FsError::Corrupted(_))
        ));
    }

    #[test]
    fn test_unformatted_device() {
        let block = vec![0u8; 512];
        assert!(matches!(
            Identification::decode(&block),
            Err(FsError::Corrupted(_))
        ));
    }

    #[test]
    fn test_format_rejects_tiny_device() {
        let mut disk = RamDisk::with_block_size(2, 512);
        assert!(matches!(
            format(&mut disk, &FormatOptions::default(), 0),
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_format_rejects_long_label() {
        let mut disk = RamDisk::with_block_size(64, 512);
        let options = FormatOptions {
            label: "a-very-long-volume-label".to_string(),
            ..FormatOptions::default()
        };
        assert!(matches!(
            format(&mut disk, &options, 0),
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_chain_link_decoding() {
        assert_eq!(ChainLink::from_raw(0, 10).unwrap(), ChainLink::Free);
        assert_eq!(ChainLink::from_raw(u64::MAX, 10).unwrap(), ChainLink::Eof);
        assert_eq!(ChainLink::from_raw(7, 10).unwrap(), ChainLink::Next(7));
        assert_eq!(
            ChainLink::from_raw(CHAIN_IDENT, 10).unwrap(),
            ChainLink::Reserved
        );
        assert!(ChainLink::from_raw(10, 10).is_err());
    }
}
