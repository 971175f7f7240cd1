//! On-disk record layouts: directory entries and the headers stored at
//! the start of every file and directory.

use core_types::{Credentials, Gid, Uid};
use ipc::flags::mode;

use crate::bytes::{get_u16, get_u32, get_u64, put_u16, put_u32, put_u64};
use crate::error::{FsError, FsResult};
use crate::permissions::Permissions;

/// Fixed part of a directory entry, before the name
pub const ENTRY_HEADER_SIZE: usize = 64;

/// Longest name an entry can hold (the NUL terminator is extra)
pub const MAX_NAME_LEN: usize = 511;

/// Header at the start of a regular file's first block
pub const FILE_HEADER_SIZE: usize = 16;

/// Header at the start of a directory's first block
pub const DIR_HEADER_SIZE: usize = 48;

const FLAG_VALID: u16 = 0x0001;
const TYPE_SHIFT: u16 = 1;
const TYPE_MASK: u16 = 0x0003;

/// Object type of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
    SoftLink,
    HardLink,
}

impl EntryKind {
    fn from_flags(flags: u16) -> Self {
        match (flags >> TYPE_SHIFT) & TYPE_MASK {
            0 => EntryKind::File,
            1 => EntryKind::Directory,
            2 => EntryKind::SoftLink,
            _ => EntryKind::HardLink,
        }
    }

    fn flag_bits(self) -> u16 {
        let tag = match self {
            EntryKind::File => 0,
            EntryKind::Directory => 1,
            EntryKind::SoftLink => 2,
            EntryKind::HardLink => 3,
        };
        tag << TYPE_SHIFT
    }

    /// POSIX file type bits; hard links report as regular files
    pub fn mode_bits(self) -> u32 {
        match self {
            EntryKind::File | EntryKind::HardLink => mode::S_IFREG,
            EntryKind::Directory => mode::S_IFDIR,
            EntryKind::SoftLink => mode::S_IFLNK,
        }
    }

    /// Whether the entry's first block starts with a [`FileHeader`]
    pub fn has_file_header(self) -> bool {
        matches!(self, EntryKind::File | EntryKind::HardLink)
    }
}

/// Byte length of the record for `name`: header, name and NUL
pub fn entry_size(name: &str) -> usize {
    ENTRY_HEADER_SIZE + name.len() + 1
}

/// Checks that `name` can be stored as one entry on a volume with
/// `block_size`-byte blocks. A record never spans more than two blocks.
pub fn validate_name(name: &str, block_size: usize) -> FsResult<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(FsError::InvalidPath(format!("'{}' is not a valid name", name)));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(FsError::InvalidPath(format!(
            "name contains a reserved character: {:?}",
            name
        )));
    }
    if name.len() > MAX_NAME_LEN || entry_size(name) > block_size {
        return Err(FsError::NameTooLong(name.to_string()));
    }
    Ok(())
}

/// The two fields needed to step over a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHeader {
    pub valid: bool,
    /// Stored record length; 0 marks unused tail space
    pub stored_len: usize,
}

impl SlotHeader {
    /// Reads the slot fields from the start of a record (at least 14 bytes)
    pub fn peek(buf: &[u8]) -> Self {
        Self {
            valid: get_u16(buf, 0) & FLAG_VALID != 0,
            stored_len: get_u16(buf, 12) as usize,
        }
    }

    pub fn is_virgin(&self) -> bool {
        !self.valid && self.stored_len == 0
    }

    /// A slot a new record of `candidate_len` bytes may occupy
    ///
    /// Lookup skips exactly the slots this accepts, and insertion reuses
    /// the first one.
    pub fn is_free_and_fits(&self, candidate_len: usize) -> bool {
        !self.valid && (self.stored_len == 0 || self.stored_len >= candidate_len)
    }
}

/// A decoded directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub valid: bool,
    pub kind: EntryKind,
    pub permissions: Permissions,
    pub owner: Uid,
    pub group: Gid,
    /// Stored record length; larger than [`DirEntry::record_len`] when the
    /// entry reuses a longer freed slot
    pub entry_size: u16,
    pub size: u64,
    pub ctime: u64,
    pub mtime: u64,
    pub atime: u64,
    /// First block of the object
    pub block: u64,
    pub name: String,
}

impl DirEntry {
    /// A fresh valid entry with all three timestamps set to `now`
    ///
    /// `name` must have passed [`validate_name`].
    pub fn new(
        name: &str,
        kind: EntryKind,
        permissions: Permissions,
        owner: Credentials,
        now: u64,
    ) -> Self {
        Self {
            valid: true,
            kind,
            permissions,
            owner: owner.uid,
            group: owner.gid,
            entry_size: entry_size(name) as u16,
            size: 0,
            ctime: now,
            mtime: now,
            atime: now,
            block: 0,
            name: name.to_string(),
        }
    }

    /// Bytes this entry occupies when encoded
    pub fn record_len(&self) -> usize {
        entry_size(&self.name)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// POSIX mode: type bits plus permission bits
    pub fn mode(&self) -> u32 {
        self.kind.mode_bits() | self.permissions.to_mode()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.record_len()];
        let mut flags = self.kind.flag_bits();
        if self.valid {
            flags |= FLAG_VALID;
        }
        put_u16(&mut buf, 0, flags);
        put_u16(&mut buf, 2, self.permissions.bits());
        put_u32(&mut buf, 4, self.owner);
        put_u32(&mut buf, 8, self.group);
        put_u16(&mut buf, 12, self.entry_size);
        put_u64(&mut buf, 16, self.size);
        put_u64(&mut buf, 24, self.ctime);
        put_u64(&mut buf, 32, self.mtime);
        put_u64(&mut buf, 40, self.atime);
        put_u64(&mut buf, 48, self.block);
        buf[ENTRY_HEADER_SIZE..ENTRY_HEADER_SIZE + self.name.len()]
            .copy_from_slice(self.name.as_bytes());
        buf
    }

    /// Decodes a stored record; `buf` holds exactly its stored length
    pub fn decode(buf: &[u8]) -> FsResult<Self> {
        if buf.len() <= ENTRY_HEADER_SIZE {
            return Err(FsError::Corrupted(format!(
                "directory record of {} bytes",
                buf.len()
            )));
        }
        let flags = get_u16(buf, 0);
        let name_bytes = &buf[ENTRY_HEADER_SIZE..];
        let name_len = name_bytes
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| FsError::Corrupted("unterminated entry name".to_string()))?;
        let name = core::str::from_utf8(&name_bytes[..name_len])
            .map_err(|_| FsError::Corrupted("entry name is not UTF-8".to_string()))?;

        Ok(Self {
            valid: flags & FLAG_VALID != 0,
            kind: EntryKind::from_flags(flags),
            permissions: Permissions::from_bits_truncate(get_u16(buf, 2)),
            owner: get_u32(buf, 4),
            group: get_u32(buf, 8),
            entry_size: get_u16(buf, 12),
            size: get_u64(buf, 16),
            ctime: get_u64(buf, 24),
            mtime: get_u64(buf, 32),
            atime: get_u64(buf, 40),
            block: get_u64(buf, 48),
            name: name.to_string(),
        })
    }
}

/// Header of a regular file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileHeader {
    pub size: u64,
    /// Number of directory entries naming this file
    pub refcount: u64,
}

impl FileHeader {
    pub fn new() -> Self {
        Self {
            size: 0,
            refcount: 1,
        }
    }

    pub fn read(block: &[u8]) -> Self {
        Self {
            size: get_u64(block, 0),
            refcount: get_u64(block, 8),
        }
    }

    pub fn write(&self, block: &mut [u8]) {
        put_u64(block, 0, self.size);
        put_u64(block, 8, self.refcount);
    }
}

/// Header of a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirHeader {
    pub atime: u64,
    pub ctime: u64,
    pub mtime: u64,
    pub entries: u64,
    /// Header size plus the stored length of every live entry
    pub size_bytes: u64,
}

impl DirHeader {
    pub fn new(now: u64) -> Self {
        Self {
            atime: now,
            ctime: now,
            mtime: now,
            entries: 0,
            size_bytes: DIR_HEADER_SIZE as u64,
        }
    }

    pub fn read(block: &[u8]) -> Self {
        Self {
            atime: get_u64(block, 0),
            ctime: get_u64(block, 8),
            mtime: get_u64(block, 16),
            entries: get_u64(block, 32),
            size_bytes: get_u64(block, 40),
        }
    }

    pub fn write(&self, block: &mut [u8]) {
        put_u64(block, 0, self.atime);
        put_u64(block, 8, self.ctime);
        put_u64(block, 16, self.mtime);
        put_u64(block, 24, 0);
        put_u64(block, 32, self.entries);
        put_u64(block, 40, self.size_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str) -> DirEntry {
        let mut entry = DirEntry::new(
            name,
            EntryKind::File,
            Permissions::from_mode(0o644),
            Credentials::new(1, 2),
            1_700_000_000,
        );
        entry.block = 42;
        entry.size = 1234;
        entry
    }

    #[test]
    fn test_entry_size() {
        assert_eq!(entry_size("a"), 66);
        assert_eq!(entry_size(&"x".repeat(51)), 116);
        assert_eq!(sample("hello").record_len(), 70);
    }

    #[test]
    fn test_encoded_layout() {
        let bytes = sample("ab").encode();
        assert_eq!(bytes.len(), 67);
        assert_eq!(get_u16(&bytes, 0), 0x0001);
        assert_eq!(get_u16(&bytes, 2), 0x004B);
        assert_eq!(get_u32(&bytes, 4), 1);
        assert_eq!(get_u32(&bytes, 8), 2);
        assert_eq!(get_u16(&bytes, 12), 67);
        assert_eq!(get_u64(&bytes, 48), 42);
        assert_eq!(&bytes[64..], b"ab\0");
    }

    #[test]
    fn test_type_tags() {
        for (kind, tag) in [
            (EntryKind::File, 0u16),
            (EntryKind::Directory, 1),
            (EntryKind::SoftLink, 2),
            (EntryKind::HardLink, 3),
        ] {
            let mut entry = sample("t");
            entry.kind = kind;
            let bytes = entry.encode();
            assert_eq!((get_u16(&bytes, 0) >> 1) & 0x3, tag);
            assert_eq!(DirEntry::decode(&bytes).unwrap().kind, kind);
        }
    }

    #[test]
    fn test_decode_inside_longer_slot() {
        let mut entry = sample("short");
        entry.entry_size = 200;
        let mut slot = vec![0xAAu8; 200];
        let bytes = entry.encode();
        slot[..bytes.len()].copy_from_slice(&bytes);

        let decoded = DirEntry::decode(&slot).unwrap();
        assert_eq!(decoded.name, "short");
        assert_eq!(decoded.entry_size, 200);
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_decode_rejects_unterminated_name() {
        let mut bytes = sample("abc").encode();
        let last = bytes.len() - 1;
        bytes[last] = b'd';
        assert!(matches!(
            DirEntry::decode(&bytes),
            Err(FsError::Corrupted(_))
        ));
    }

    #[test]
    fn test_free_and_fits() {
        let virgin = SlotHeader {
            valid: false,
            stored_len: 0,
        };
        let freed = SlotHeader {
            valid: false,
            stored_len: 100,
        };
        let live = SlotHeader {
            valid: true,
            stored_len: 100,
        };
        assert!(virgin.is_free_and_fits(500));
        assert!(freed.is_free_and_fits(100));
        assert!(freed.is_free_and_fits(66));
        assert!(!freed.is_free_and_fits(101));
        assert!(!live.is_free_and_fits(66));
    }

    #[test]
    fn test_slot_peek_after_invalidation() {
        let mut entry = sample("gone");
        entry.valid = false;
        let slot = SlotHeader::peek(&entry.encode());
        assert!(!slot.valid);
        assert_eq!(slot.stored_len, entry_size("gone"));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("notes.txt", 512).is_ok());
        assert!(matches!(validate_name("", 512), Err(FsError::InvalidPath(_))));
        assert!(matches!(validate_name("..", 512), Err(FsError::InvalidPath(_))));
        assert!(matches!(validate_name("a/b", 512), Err(FsError::InvalidPath(_))));
        assert!(matches!(
            validate_name(&"n".repeat(448), 512),
            Err(FsError::NameTooLong(_))
        ));
        assert!(validate_name(&"n".repeat(447), 512).is_ok());
        assert!(matches!(
            validate_name(&"n".repeat(512), 4096),
            Err(FsError::NameTooLong(_))
        ));
    }

    #[test]
    fn test_headers() {
        let mut block = vec![0u8; 512];
        FileHeader {
            size: 99,
            refcount: 3,
        }
        .write(&mut block);
        assert_eq!(FileHeader::read(&block).refcount, 3);

        let mut dir = DirHeader::new(7);
        dir.entries = 2;
        dir.size_bytes += 140;
        dir.write(&mut block);
        let read = DirHeader::read(&block);
        assert_eq!(read, dir);
        assert_eq!(get_u64(&block, 40), 188);
    }

    #[test]
    fn test_mode_bits() {
        let entry = sample("m");
        assert_eq!(entry.mode(), mode::S_IFREG | 0o644);
        assert_eq!(EntryKind::SoftLink.mode_bits(), mode::S_IFLNK);
    }
}
