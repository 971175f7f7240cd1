//! # Open
//!
//! Resolves a path for `open()`, creating regular files on `O_CREAT` and
//! truncating on `O_TRUNC`. A symbolic link in the final component is
//! followed by rewriting the path and resolving again, bounded by the
//! volume's hop limit.

use hal::BlockDevice;
use ipc::flags::mode::{S_IFREG, S_IRUSR, S_IWUSR};
use ipc::OpenFlags;
use log::{debug, info};

use crate::block_store::Volume;
use crate::context::OpContext;
use crate::create::{create, CreateKind};
use crate::directory;
use crate::dirent::{DirEntry, EntryKind, FileHeader, FILE_HEADER_SIZE};
use crate::error::{FsError, FsResult};
use crate::path::{absolute, redirect};
use crate::permissions::{check_access, Access};
use crate::resolver::{self, Lookup};

/// Arguments of one `open()` call
#[derive(Debug, Clone, Copy)]
pub struct OpenRequest<'a> {
    pub path: &'a str,
    pub flags: OpenFlags,
    /// Mode for a newly created file, before `umask`
    pub mode: u32,
    pub umask: u32,
}

impl<'a> OpenRequest<'a> {
    pub fn new(path: &'a str, flags: OpenFlags) -> Self {
        Self {
            path,
            flags,
            mode: 0o644,
            umask: 0,
        }
    }

    pub fn with_mode(mut self, mode: u32, umask: u32) -> Self {
        self.mode = mode;
        self.umask = umask;
        self
    }
}

/// Result of a successful open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened { entry: DirEntry, path: String },
    Created { entry: DirEntry, path: String },
}

impl OpenOutcome {
    pub fn entry(&self) -> &DirEntry {
        match self {
            OpenOutcome::Opened { entry, .. } | OpenOutcome::Created { entry, .. } => entry,
        }
    }

    /// Absolute path of the file reached, after any links
    pub fn path(&self) -> &str {
        match self {
            OpenOutcome::Opened { path, .. } | OpenOutcome::Created { path, .. } => path,
        }
    }

    pub fn created(&self) -> bool {
        matches!(self, OpenOutcome::Created { .. })
    }
}

pub fn open<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    request: &OpenRequest<'_>,
) -> FsResult<OpenOutcome> {
    let flags = request.flags;
    let mut path = absolute(request.path);
    let mut hops = 0u32;

    loop {
        let lookup = match resolver::find(vol, ctx, &path) {
            Ok(lookup) => lookup,
            Err(FsError::NotFound(_)) if flags.contains(OpenFlags::O_CREAT) => {
                return create_regular(vol, ctx, path, request);
            }
            Err(err) => return Err(err),
        };

        match lookup.entry.kind {
            EntryKind::Directory => return Err(FsError::IsADirectory(path)),
            _ if flags.contains(OpenFlags::O_CREAT | OpenFlags::O_EXCL) => {
                return Err(FsError::AlreadyExists(path));
            }
            EntryKind::SoftLink => {
                hops += 1;
                if hops > vol.symlink_hops() {
                    return Err(FsError::TooManyLinks(request.path.to_string()));
                }
                let target = resolver::read_link_target(vol, &mut ctx.scratch, &lookup.entry)?;
                let next = redirect(&path, &target);
                debug!("open: {} -> {}", path, next);
                path = next;
            }
            EntryKind::File | EntryKind::HardLink => {
                let truncate = flags.contains(OpenFlags::O_TRUNC);
                let access = Access::new(flags.wants_read(), flags.wants_write() || truncate);
                check_access(
                    lookup.entry.permissions,
                    lookup.entry.owner,
                    lookup.entry.group,
                    ctx.creds,
                    access,
                    &path,
                )?;
                let entry = if truncate {
                    truncate_file(vol, ctx, &lookup)?
                } else {
                    lookup.entry
                };
                return Ok(OpenOutcome::Opened { entry, path });
            }
        }
    }
}

fn create_regular<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    path: String,
    request: &OpenRequest<'_>,
) -> FsResult<OpenOutcome> {
    let mode = (request.mode & !request.umask) | S_IFREG;
    // the creator must be able to use the descriptor it asked for
    if (request.flags.wants_read() && mode & S_IRUSR == 0)
        || (request.flags.wants_write() && mode & S_IWUSR == 0)
    {
        return Err(FsError::AccessDenied(format!(
            "{} would be created with mode {:o}",
            path, mode
        )));
    }
    let (entry, _) = create(vol, ctx, &path, CreateKind::File, mode)?;
    Ok(OpenOutcome::Created { entry, path })
}

/// Drops a file's contents down to its first block
fn truncate_file<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    lookup: &Lookup,
) -> FsResult<DirEntry> {
    let block = lookup.entry.block;
    vol.read_block(block, ctx.scratch.block())?;
    let mut header = FileHeader::read(ctx.scratch.block());
    header.size = 0;
    header.write(ctx.scratch.block());
    ctx.scratch.block()[FILE_HEADER_SIZE..].fill(0);
    vol.write_block(block, ctx.scratch.block())?;
    vol.flush(block)?;
    vol.truncate_chain(block)?;

    let mut entry = lookup.entry.clone();
    entry.size = 0;
    entry.mtime = ctx.now;
    if let Some(location) = lookup.location {
        directory::rewrite_entry(vol, &mut ctx.scratch, location, &entry)?;
    }
    info!("truncated {} (block {})", entry.name, block);
    Ok(entry)
}
