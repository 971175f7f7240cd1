//! # File Operations
//!
//! The remaining driver operations, built on the resolver and the
//! create engine. Each takes the mounted [`Volume`] and the request's
//! [`OpContext`].

use hal::BlockDevice;
use ipc::flags::mode::{S_IFDIR, S_IFREG};
use log::{debug, info, warn};

use crate::block_store::Volume;
use crate::context::OpContext;
use crate::create::{adjust_refcount, create, CreateKind};
use crate::directory;
use crate::dirent::{DirEntry, EntryKind, FileHeader, DIR_HEADER_SIZE, FILE_HEADER_SIZE};
use crate::error::{FsError, FsResult};
use crate::permissions::{allows, check_access, Access, Permissions};
use crate::resolver::{self, Lookup};

/// What `stat()` reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    /// First block of the object
    pub ino: u64,
    pub kind: EntryKind,
    /// Type and permission bits
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub block_size: u64,
    /// Blocks in the object's chain
    pub blocks: u64,
}

pub fn stat<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    path: &str,
) -> FsResult<Metadata> {
    let entry = resolver::find_following(vol, ctx, path)?.entry;
    let blocks = vol.chain_blocks(entry.block)?.len() as u64;

    let (size, nlink, atime, mtime, ctime) = match entry.kind {
        EntryKind::Directory => {
            let header = directory::read_header(vol, &mut ctx.scratch, entry.block)?;
            (header.size_bytes, 1, header.atime, header.mtime, header.ctime)
        }
        EntryKind::File | EntryKind::HardLink => {
            vol.read_block(entry.block, ctx.scratch.block())?;
            let header = FileHeader::read(ctx.scratch.block());
            (header.size, header.refcount, entry.atime, entry.mtime, entry.ctime)
        }
        EntryKind::SoftLink => (entry.size, 1, entry.atime, entry.mtime, entry.ctime),
    };

    Ok(Metadata {
        ino: entry.block,
        kind: entry.kind,
        mode: entry.mode(),
        nlink,
        uid: entry.owner,
        gid: entry.group,
        size,
        atime,
        mtime,
        ctime,
        block_size: vol.block_size() as u64,
        blocks,
    })
}

/// Resolves a regular file for data access and checks `access` on it
fn open_data<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    path: &str,
    access: Access,
) -> FsResult<(Lookup, FileHeader)> {
    let lookup = resolver::find_following(vol, ctx, path)?;
    if lookup.entry.is_dir() {
        return Err(FsError::IsADirectory(path.to_string()));
    }
    check_access(
        lookup.entry.permissions,
        lookup.entry.owner,
        lookup.entry.group,
        ctx.creds,
        access,
        path,
    )?;
    vol.read_block(lookup.entry.block, ctx.scratch.block())?;
    let header = FileHeader::read(ctx.scratch.block());
    Ok((lookup, header))
}

/// Reads up to `len` bytes at `offset`; short at end of file
pub fn read<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    path: &str,
    offset: u64,
    len: usize,
) -> FsResult<Vec<u8>> {
    let (lookup, header) = open_data(vol, ctx, path, Access::READ)?;
    if offset >= header.size {
        return Ok(Vec::new());
    }
    let len = len.min((header.size - offset) as usize);
    let chain = vol.chain_blocks(lookup.entry.block)?;
    let block_size = vol.block_size() as u64;

    let mut out = Vec::with_capacity(len);
    let mut pos = FILE_HEADER_SIZE as u64 + offset;
    while out.len() < len {
        let block = *chain.get((pos / block_size) as usize).ok_or_else(|| {
            FsError::Corrupted(format!("{} is shorter than its recorded size", path))
        })?;
        let within = (pos % block_size) as usize;
        let take = (block_size as usize - within).min(len - out.len());
        vol.read_block(block, ctx.scratch.block())?;
        out.extend_from_slice(&ctx.scratch.block()[within..within + take]);
        pos += take as u64;
    }
    Ok(out)
}

/// Writes `data` at `offset`, or at end of file when `append` is set
///
/// The chain grows as needed. Returns the number of bytes written.
pub fn write<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    path: &str,
    offset: u64,
    data: &[u8],
    append: bool,
) -> FsResult<usize> {
    let (lookup, header) = open_data(vol, ctx, path, Access::WRITE)?;
    if data.is_empty() {
        return Ok(0);
    }
    let offset = if append { header.size } else { offset };
    let first = lookup.entry.block;
    let block_size = vol.block_size() as u64;

    let start = FILE_HEADER_SIZE as u64 + offset;
    let end = start
        .checked_add(data.len() as u64)
        .ok_or_else(|| FsError::InvalidArgument(format!("offset {} is out of range", offset)))?;
    let needed = end.div_ceil(block_size);
    let mut chain = vol.chain_blocks(first)?;
    let kept = chain.len();
    if needed.saturating_sub(kept as u64) > vol.free_blocks()? {
        return Err(FsError::NoSpace);
    }
    while (chain.len() as u64) < needed {
        let last = chain[chain.len() - 1];
        match vol.extend_chain(last) {
            Ok(block) => chain.push(block),
            Err(err) => {
                if let Err(release) = vol.release_tail(&chain, kept) {
                    warn!("failed to release blocks added to {}: {}", path, release);
                }
                return Err(err);
            }
        }
    }

    // Bytes between the old end of file and `start` may hold stale data;
    // blocks added above are already zeroed
    let mut pos = FILE_HEADER_SIZE as u64 + header.size;
    while pos < start {
        let index = (pos / block_size) as usize;
        if index >= kept {
            break;
        }
        let block = chain[index];
        let within = (pos % block_size) as usize;
        let take = (block_size - within as u64).min(start - pos) as usize;
        vol.read_block(block, ctx.scratch.block())?;
        ctx.scratch.block()[within..within + take].fill(0);
        vol.write_block(block, ctx.scratch.block())?;
        pos += take as u64;
    }

    let mut pos = start;
    let mut written = 0;
    while written < data.len() {
        let block = chain[(pos / block_size) as usize];
        let within = (pos % block_size) as usize;
        let take = (block_size as usize - within).min(data.len() - written);
        vol.read_block(block, ctx.scratch.block())?;
        ctx.scratch.block()[within..within + take].copy_from_slice(&data[written..written + take]);
        vol.write_block(block, ctx.scratch.block())?;
        written += take;
        pos += take as u64;
    }

    vol.read_block(first, ctx.scratch.block())?;
    let mut header = FileHeader::read(ctx.scratch.block());
    header.size = header.size.max(offset + data.len() as u64);
    header.write(ctx.scratch.block());
    vol.write_block(first, ctx.scratch.block())?;
    vol.flush(first)?;

    let mut entry = lookup.entry;
    entry.size = header.size;
    entry.mtime = ctx.now;
    if let Some(location) = lookup.location {
        directory::rewrite_entry(vol, &mut ctx.scratch, location, &entry)?;
    }
    debug!("wrote {} bytes to {} at {}", written, path, offset);
    Ok(written)
}

pub fn mkdir<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    path: &str,
    mode: u32,
    umask: u32,
) -> FsResult<DirEntry> {
    let mode = (mode & !umask) | S_IFDIR;
    create(vol, ctx, path, CreateKind::Directory, mode).map(|(entry, _)| entry)
}

/// Gives the regular file at `old_path` a second name
pub fn link<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    old_path: &str,
    new_path: &str,
) -> FsResult<DirEntry> {
    let source = resolver::find(vol, ctx, old_path)?.entry;
    if !source.kind.has_file_header() {
        return Err(FsError::AccessDenied(format!(
            "{} is not a regular file",
            old_path
        )));
    }
    let kind = CreateKind::HardLink {
        source_block: source.block,
    };
    let mode = source.permissions.to_mode() | S_IFREG;
    create(vol, ctx, new_path, kind, mode).map(|(entry, _)| entry)
}

pub fn symlink<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    target: &str,
    link_path: &str,
) -> FsResult<DirEntry> {
    let kind = CreateKind::SymLink {
        target: target.to_string(),
    };
    create(vol, ctx, link_path, kind, 0o777).map(|(entry, _)| entry)
}

/// Removes a name; the object goes when its last name does
pub fn unlink<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    path: &str,
) -> FsResult<()> {
    let lookup = resolver::find(vol, ctx, path)?;
    let location = match lookup.location {
        Some(location) if !lookup.entry.is_dir() => location,
        _ => return Err(FsError::IsADirectory(path.to_string())),
    };
    let parent = &lookup.parent;
    check_access(
        parent.permissions,
        parent.owner,
        parent.group,
        ctx.creds,
        Access::WRITE,
        &format!("parent of {}", path),
    )?;

    let mut entry = lookup.entry.clone();
    entry.valid = false;
    directory::rewrite_entry(vol, &mut ctx.scratch, location, &entry)?;

    let now = ctx.now;
    directory::update_header(vol, &mut ctx.scratch, parent.block, |header| {
        header.entries = header.entries.saturating_sub(1);
        header.size_bytes = header
            .size_bytes
            .saturating_sub(entry.entry_size as u64)
            .max(DIR_HEADER_SIZE as u64);
        header.atime = now;
        header.mtime = now;
    })?;

    match entry.kind {
        EntryKind::File | EntryKind::HardLink => {
            let header = adjust_refcount(vol, &mut ctx.scratch, entry.block, -1)?;
            if header.refcount == 0 {
                vol.free_chain(entry.block)?;
            }
        }
        EntryKind::SoftLink => vol.free_chain(entry.block)?,
        EntryKind::Directory => {}
    }
    info!("unlinked {}", path);
    Ok(())
}

pub fn readlink<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    path: &str,
) -> FsResult<String> {
    let entry = resolver::find(vol, ctx, path)?.entry;
    resolver::read_link_target(vol, &mut ctx.scratch, &entry)
}

/// Persists changed attributes of a resolved entry
///
/// The root has no stored entry; its attributes live in the
/// identification block.
fn store_attributes<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    lookup: &Lookup,
    entry: &DirEntry,
) -> FsResult<()> {
    match lookup.location {
        Some(location) => directory::rewrite_entry(vol, &mut ctx.scratch, location, entry),
        None => vol.update_identification(|ident| {
            ident.root_permissions = entry.permissions;
            ident.root_owner = entry.owner;
            ident.root_group = entry.group;
        }),
    }
}

pub fn chmod<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    path: &str,
    mode: u32,
) -> FsResult<()> {
    let lookup = resolver::find_following(vol, ctx, path)?;
    if !ctx.creds.is_root() && ctx.creds.uid != lookup.entry.owner {
        return Err(FsError::AccessDenied(format!("chmod on {}", path)));
    }
    let mut entry = lookup.entry.clone();
    entry.permissions = Permissions::from_mode(mode);
    entry.ctime = ctx.now;
    store_attributes(vol, ctx, &lookup, &entry)
}

pub fn chown<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    path: &str,
    uid: u32,
    gid: u32,
) -> FsResult<()> {
    if !ctx.creds.is_root() {
        return Err(FsError::AccessDenied(format!("chown on {}", path)));
    }
    let lookup = resolver::find_following(vol, ctx, path)?;
    let mut entry = lookup.entry.clone();
    entry.owner = uid;
    entry.group = gid;
    entry.ctime = ctx.now;
    store_attributes(vol, ctx, &lookup, &entry)
}

pub fn utime<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    path: &str,
    access_time: u64,
    modified_time: u64,
) -> FsResult<()> {
    let lookup = resolver::find_following(vol, ctx, path)?;
    let entry = &lookup.entry;
    let permitted = ctx.creds.is_root()
        || ctx.creds.uid == entry.owner
        || allows(entry.permissions, entry.owner, entry.group, ctx.creds, Access::WRITE);
    if !permitted {
        return Err(FsError::AccessDenied(format!("utime on {}", path)));
    }

    if entry.is_dir() {
        directory::update_header(vol, &mut ctx.scratch, entry.block, |header| {
            header.atime = access_time;
            header.mtime = modified_time;
        })?;
    }
    let mut updated = entry.clone();
    updated.atime = access_time;
    updated.mtime = modified_time;
    if let Some(location) = lookup.location {
        directory::rewrite_entry(vol, &mut ctx.scratch, location, &updated)?;
    }
    Ok(())
}

/// Checks that `path` is a readable directory
pub fn opendir<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    path: &str,
) -> FsResult<DirEntry> {
    let entry = resolver::find_following(vol, ctx, path)?.entry;
    if !entry.is_dir() {
        return Err(FsError::NotADirectory(path.to_string()));
    }
    check_access(
        entry.permissions,
        entry.owner,
        entry.group,
        ctx.creds,
        Access::READ,
        path,
    )?;
    Ok(entry)
}

/// The `position`-th live entry of a directory, `None` past the end
pub fn readdir<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    path: &str,
    position: u64,
) -> FsResult<Option<DirEntry>> {
    let dir = opendir(vol, ctx, path)?;
    directory::nth_entry(vol, &mut ctx.scratch, dir.block, position)
}

pub fn fsync<D: BlockDevice>(vol: &mut Volume<D>) -> FsResult<()> {
    vol.flush_all()
}
