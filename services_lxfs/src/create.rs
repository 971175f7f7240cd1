//! # Entry Creation
//!
//! Every kind of entry goes through [`create`]: validate the name, find
//! the parent, allocate and initialize the object's first block, insert
//! the record, then bump the parent's counters.
//!
//! Block allocation is wrapped in [`Volume::with_reserved_block`], so a
//! failure anywhere after the block is reserved hands it back to the
//! free pool.

use hal::BlockDevice;
use log::{debug, info, warn};

use crate::block_store::{Scratch, Volume};
use crate::context::OpContext;
use crate::directory::{self, DirStream, EntryLocation, Slot};
use crate::dirent::{validate_name, DirEntry, DirHeader, EntryKind, FileHeader, SlotHeader};
use crate::error::{FsError, FsResult};
use crate::layout::ChainLink;
use crate::path::{depth, split_parent};
use crate::permissions::{check_access, Access, Permissions};
use crate::resolver;

/// What to create, with the data each kind needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateKind {
    File,
    Directory,
    SymLink { target: String },
    /// A second name for the file whose first block is `source_block`
    HardLink { source_block: u64 },
}

impl CreateKind {
    pub fn entry_kind(&self) -> EntryKind {
        match self {
            CreateKind::File => EntryKind::File,
            CreateKind::Directory => EntryKind::Directory,
            CreateKind::SymLink { .. } => EntryKind::SoftLink,
            CreateKind::HardLink { .. } => EntryKind::HardLink,
        }
    }
}

/// Creates a new entry at `path`
///
/// The caller needs write permission on the parent directory. Returns
/// the stored entry and where its record lives.
pub fn create<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    path: &str,
    kind: CreateKind,
    mode: u32,
) -> FsResult<(DirEntry, EntryLocation)> {
    let (parent_path, name) = split_parent(path)?;
    validate_name(name, vol.block_size())?;

    let parent = if depth(path) <= 1 {
        resolver::root_entry(vol)
    } else {
        resolver::find_following(vol, ctx, &parent_path)?.entry
    };
    if !parent.is_dir() {
        return Err(FsError::NotADirectory(parent_path));
    }
    check_access(
        parent.permissions,
        parent.owner,
        parent.group,
        ctx.creds,
        Access::WRITE,
        &format!("directory /{}", parent_path),
    )?;
    if directory::lookup(vol, &mut ctx.scratch, parent.block, name)?.is_some() {
        return Err(FsError::AlreadyExists(path.to_string()));
    }

    let now = ctx.now;
    let mut entry = DirEntry::new(
        name,
        kind.entry_kind(),
        Permissions::from_mode(mode),
        ctx.creds,
        now,
    );
    let scratch = &mut ctx.scratch;

    let location = match &kind {
        CreateKind::HardLink { source_block } => {
            link_existing(vol, scratch, &parent, &mut entry, *source_block)?
        }
        object => {
            if let CreateKind::SymLink { target } = object {
                if target.is_empty() {
                    return Err(FsError::InvalidArgument(format!(
                        "empty link target for {}",
                        path
                    )));
                }
                if target.len() > vol.block_size() {
                    return Err(FsError::NameTooLong(format!("link target for {}", path)));
                }
                entry.size = target.len() as u64;
            }
            vol.with_reserved_block(parent.block, |vol, block| {
                initialize_object(vol, scratch, object, block, now)?;
                entry.block = block;
                insert_entry(vol, scratch, &parent, &mut entry)
            })?
        }
    };

    record_insertion(vol, scratch, parent.block, entry.entry_size, now);
    info!(
        "created {:?} /{} at block {} (owner {})",
        entry.kind, path, entry.block, entry.owner
    );
    Ok((entry, location))
}

/// Writes the first block of a fresh object
fn initialize_object<D: BlockDevice>(
    vol: &mut Volume<D>,
    scratch: &mut Scratch,
    kind: &CreateKind,
    block: u64,
    now: u64,
) -> FsResult<()> {
    let buf = scratch.block();
    buf.fill(0);
    match kind {
        CreateKind::File => FileHeader::new().write(buf),
        CreateKind::Directory => DirHeader::new(now).write(buf),
        CreateKind::SymLink { target } => buf[..target.len()].copy_from_slice(target.as_bytes()),
        CreateKind::HardLink { .. } => {
            return Err(FsError::InvalidArgument(
                "hard links share an existing block".to_string(),
            ))
        }
    }
    vol.write_block(block, scratch.block())?;
    vol.flush(block)
}

/// Takes a reference on an existing file and inserts `entry` for it
fn link_existing<D: BlockDevice>(
    vol: &mut Volume<D>,
    scratch: &mut Scratch,
    parent: &DirEntry,
    entry: &mut DirEntry,
    source_block: u64,
) -> FsResult<EntryLocation> {
    match vol.next_block(source_block)? {
        ChainLink::Eof | ChainLink::Next(_) => {}
        other => {
            return Err(FsError::Corrupted(format!(
                "link source block {} is {:?}",
                source_block, other
            )))
        }
    }

    let header = adjust_refcount(vol, scratch, source_block, 1)?;
    entry.block = source_block;
    entry.size = header.size;

    match insert_entry(vol, scratch, parent, entry) {
        Ok(location) => Ok(location),
        Err(err) => {
            if let Err(restore) = adjust_refcount(vol, scratch, source_block, -1) {
                warn!(
                    "refcount of block {} left raised after failed link: {}",
                    source_block, restore
                );
            }
            Err(err)
        }
    }
}

/// Adds `delta` to a file's reference count, returning the new header
pub(crate) fn adjust_refcount<D: BlockDevice>(
    vol: &mut Volume<D>,
    scratch: &mut Scratch,
    block: u64,
    delta: i64,
) -> FsResult<FileHeader> {
    vol.read_block(block, scratch.block())?;
    let mut header = FileHeader::read(scratch.block());
    header.refcount = header.refcount.saturating_add_signed(delta);
    header.write(scratch.block());
    vol.write_block(block, scratch.block())?;
    vol.flush(block)?;
    Ok(header)
}

/// Places `entry` in the first usable slot of `parent`
///
/// A freed slot is reused when its stored length can hold the record;
/// the entry then keeps that stored length. Otherwise the record goes
/// into the unused space after the last entry.
fn insert_entry<D: BlockDevice>(
    vol: &mut Volume<D>,
    scratch: &mut Scratch,
    parent: &DirEntry,
    entry: &mut DirEntry,
) -> FsResult<EntryLocation> {
    let needed = entry.record_len();
    let mut stream = DirStream::open(vol, parent.block)?;
    let offset = loop {
        match stream.next_slot(vol, scratch)? {
            Slot::Record {
                offset,
                entry: stored,
            } => {
                let slot = SlotHeader {
                    valid: stored.valid,
                    stored_len: stored.entry_size as usize,
                };
                if slot.is_free_and_fits(needed) {
                    debug!("reusing freed slot at offset {} for {}", offset, entry.name);
                    entry.entry_size = stored.entry_size;
                    break offset;
                }
            }
            Slot::Virgin { offset } => break offset,
            Slot::End { .. } => {
                return Err(FsError::NotImplemented(
                    "directory growth at an exact block boundary",
                ))
            }
        }
    };

    let mut chain = stream.into_chain();
    directory::write_record(vol, scratch, &mut chain, offset, &entry.encode())?;
    Ok(EntryLocation {
        dir_block: parent.block,
        offset,
    })
}

/// Bumps the parent's entry count, size and times after an insertion
///
/// The entry is already durable at this point, so a failure here only
/// leaves the parent's counters stale. It is logged and swallowed.
fn record_insertion<D: BlockDevice>(
    vol: &mut Volume<D>,
    scratch: &mut Scratch,
    parent_block: u64,
    stored_len: u16,
    now: u64,
) {
    if let Err(err) = vol.read_block(parent_block, scratch.block()) {
        warn!(
            "directory {} header not updated after insertion: {}",
            parent_block, err
        );
        return;
    }
    let mut header = DirHeader::read(scratch.block());
    header.entries += 1;
    header.size_bytes += stored_len as u64;
    header.atime = now;
    header.mtime = now;
    header.write(scratch.block());

    let written = vol
        .write_block(parent_block, scratch.block())
        .and_then(|_| vol.flush(parent_block));
    if let Err(err) = written {
        warn!(
            "directory {} header write failed after insertion: {}",
            parent_block, err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{format, FormatOptions};
    use core_types::Credentials;
    use hal::RamDisk;

    fn volume() -> Volume<RamDisk> {
        let mut disk = RamDisk::with_block_size(64, 512);
        format(&mut disk, &FormatOptions::default(), 0).unwrap();
        Volume::mount(disk).unwrap()
    }

    fn root_ctx(vol: &Volume<RamDisk>) -> OpContext {
        OpContext::new(vol, Credentials::root(), 100)
    }

    #[test]
    fn test_create_file_updates_parent() {
        let mut vol = volume();
        let mut ctx = root_ctx(&vol);
        let (entry, location) = create(&mut vol, &mut ctx, "/a", CreateKind::File, 0o644).unwrap();

        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(location.offset, 48);
        assert_eq!(entry.ctime, 100);

        let root = vol.root_block();
        let header = directory::read_header(&mut vol, &mut ctx.scratch, root).unwrap();
        assert_eq!(header.entries, 1);
        assert_eq!(header.size_bytes, 48 + entry.entry_size as u64);
        assert_eq!(header.mtime, 100);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut vol = volume();
        let mut ctx = root_ctx(&vol);
        create(&mut vol, &mut ctx, "/a", CreateKind::File, 0o644).unwrap();
        let err = create(&mut vol, &mut ctx, "/a", CreateKind::Directory, 0o755).unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists(_)));
    }

    #[test]
    fn test_create_under_file_fails() {
        let mut vol = volume();
        let mut ctx = root_ctx(&vol);
        create(&mut vol, &mut ctx, "/a", CreateKind::File, 0o644).unwrap();
        let err = create(&mut vol, &mut ctx, "/a/b", CreateKind::File, 0o644).unwrap_err();
        assert!(matches!(err, FsError::NotADirectory(_)));
    }

    #[test]
    fn test_nested_directory() {
        let mut vol = volume();
        let mut ctx = root_ctx(&vol);
        let (dir, _) = create(&mut vol, &mut ctx, "/d", CreateKind::Directory, 0o755).unwrap();
        let (file, location) =
            create(&mut vol, &mut ctx, "/d/f", CreateKind::File, 0o600).unwrap();
        assert_eq!(location.dir_block, dir.block);
        assert_ne!(file.block, dir.block);
    }

    #[test]
    fn test_unprivileged_create_denied() {
        let mut vol = volume();
        let free_before = vol.free_blocks().unwrap();
        let mut ctx = OpContext::new(&vol, Credentials::new(7, 7), 100);
        let err = create(&mut vol, &mut ctx, "/a", CreateKind::File, 0o644).unwrap_err();
        assert!(matches!(err, FsError::AccessDenied(_)));
        assert_eq!(vol.free_blocks().unwrap(), free_before);
    }

    #[test]
    fn test_failed_insertion_releases_block() {
        let mut vol = volume();
        let mut ctx = root_ctx(&vol);
        // four 116-byte records fill the root block exactly
        for i in 0..4 {
            let name = format!("{:0>51}", i);
            create(&mut vol, &mut ctx, &name, CreateKind::File, 0o644).unwrap();
        }
        let free_before = vol.free_blocks().unwrap();
        let err = create(&mut vol, &mut ctx, "/late", CreateKind::File, 0o644).unwrap_err();
        assert!(matches!(err, FsError::NotImplemented(_)));
        assert_eq!(vol.free_blocks().unwrap(), free_before);
    }

    #[test]
    fn test_symlink_target_stored() {
        let mut vol = volume();
        let mut ctx = root_ctx(&vol);
        let (link, _) = create(
            &mut vol,
            &mut ctx,
            "/l",
            CreateKind::SymLink {
                target: "a/b".to_string(),
            },
            0o777,
        )
        .unwrap();
        assert_eq!(link.size, 3);
        let target = resolver::read_link_target(&mut vol, &mut ctx.scratch, &link).unwrap();
        assert_eq!(target, "a/b");
    }

    #[test]
    fn test_hard_link_raises_refcount() {
        let mut vol = volume();
        let mut ctx = root_ctx(&vol);
        let (file, _) = create(&mut vol, &mut ctx, "/a", CreateKind::File, 0o644).unwrap();
        let (link, _) = create(
            &mut vol,
            &mut ctx,
            "/b",
            CreateKind::HardLink {
                source_block: file.block,
            },
            0o644,
        )
        .unwrap();
        assert_eq!(link.block, file.block);

        vol.read_block(file.block, ctx.scratch.block()).unwrap();
        assert_eq!(FileHeader::read(ctx.scratch.block()).refcount, 2);
    }
}
