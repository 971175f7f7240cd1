//! # Path Resolver
//!
//! Walks a path from the root directory one component at a time.
//! Intermediate symbolic links are expanded in place: absolute targets
//! restart from the root, relative targets continue from the directory
//! holding the link. The number of expansions per lookup is bounded by
//! the volume's hop limit.

use std::collections::VecDeque;

use hal::BlockDevice;
use log::debug;

use crate::block_store::{Scratch, Volume};
use crate::context::OpContext;
use crate::directory::{self, EntryLocation};
use crate::dirent::{DirEntry, EntryKind, FileHeader};
use crate::error::{FsError, FsResult};
use crate::path::split_path;

/// A resolved path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub entry: DirEntry,
    /// `None` for the root directory, which has no stored entry
    pub location: Option<EntryLocation>,
    /// Directory holding the entry; the root is its own parent
    pub parent: DirEntry,
}

impl Lookup {
    pub fn is_root(&self) -> bool {
        self.location.is_none()
    }
}

/// The root directory's entry, synthesized from the identification block
pub fn root_entry<D: BlockDevice>(vol: &Volume<D>) -> DirEntry {
    let ident = vol.identification();
    DirEntry {
        valid: true,
        kind: EntryKind::Directory,
        permissions: ident.root_permissions,
        owner: ident.root_owner,
        group: ident.root_group,
        entry_size: 0,
        size: 0,
        ctime: 0,
        mtime: 0,
        atime: 0,
        block: ident.root_block,
        name: String::new(),
    }
}

/// Resolves `path` without following a symbolic link in the last
/// component
pub fn find<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    path: &str,
) -> FsResult<Lookup> {
    resolve(vol, &mut ctx.scratch, path, false)
}

/// Resolves `path`, following symbolic links in every component
pub fn find_following<D: BlockDevice>(
    vol: &mut Volume<D>,
    ctx: &mut OpContext,
    path: &str,
) -> FsResult<Lookup> {
    resolve(vol, &mut ctx.scratch, path, true)
}

/// Reads the target text of a symbolic link
pub fn read_link_target<D: BlockDevice>(
    vol: &mut Volume<D>,
    scratch: &mut Scratch,
    link: &DirEntry,
) -> FsResult<String> {
    if link.kind != EntryKind::SoftLink {
        return Err(FsError::InvalidArgument(format!(
            "{} is not a symbolic link",
            link.name
        )));
    }
    let len = link.size as usize;
    if len > vol.block_size() {
        return Err(FsError::Corrupted(format!(
            "link {} claims a {}-byte target",
            link.name, len
        )));
    }
    vol.read_block(link.block, scratch.block())?;
    String::from_utf8(scratch.block()[..len].to_vec())
        .map_err(|_| FsError::Corrupted(format!("link {} target is not UTF-8", link.name)))
}

#[derive(Debug, Clone)]
struct Node {
    entry: DirEntry,
    location: Option<EntryLocation>,
}

fn resolve<D: BlockDevice>(
    vol: &mut Volume<D>,
    scratch: &mut Scratch,
    path: &str,
    follow_final: bool,
) -> FsResult<Lookup> {
    let root = Node {
        entry: root_entry(vol),
        location: None,
    };
    let mut pending: VecDeque<String> = split_path(path)?
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut ancestors: Vec<Node> = Vec::new();
    let mut current = root.clone();
    let mut hops = 0u32;

    while let Some(name) = pending.pop_front() {
        if !current.entry.is_dir() {
            return Err(FsError::NotADirectory(format!(
                "{} in {}",
                current.entry.name, path
            )));
        }
        match name.as_str() {
            "." => continue,
            ".." => {
                if let Some(parent) = ancestors.pop() {
                    current = parent;
                }
                continue;
            }
            _ => {}
        }

        let (entry, location) = directory::lookup(vol, scratch, current.entry.block, &name)?
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;

        let last = pending.is_empty();
        if entry.kind == EntryKind::SoftLink && (!last || follow_final) {
            hops += 1;
            if hops > vol.symlink_hops() {
                return Err(FsError::TooManyLinks(path.to_string()));
            }
            let target = read_link_target(vol, scratch, &entry)?;
            debug!("{}: following link {} -> {}", path, entry.name, target);
            if target.starts_with('/') {
                ancestors.clear();
                current = root.clone();
            }
            for component in split_path(&target)?.into_iter().rev() {
                pending.push_front(component.to_string());
            }
            continue;
        }

        ancestors.push(current);
        current = Node {
            entry,
            location: Some(location),
        };
    }

    let parent = ancestors
        .last()
        .map(|node| node.entry.clone())
        .unwrap_or_else(|| root.entry.clone());
    let mut entry = current.entry;
    if matches!(entry.kind, EntryKind::File | EntryKind::HardLink) {
        // Hard links share one header; a name's stored size can lag behind it
        vol.read_block(entry.block, scratch.block())?;
        entry.size = FileHeader::read(scratch.block()).size;
    }
    Ok(Lookup {
        entry,
        location: current.location,
        parent,
    })
}
