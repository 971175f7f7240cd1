//! # lxfs
//!
//! The luxOS on-disk filesystem driver.
//!
//! ## On-disk model
//!
//! - Block 0 holds the identification block (magic, geometry, root
//!   attributes, CRC).
//! - The chain map follows: one `u64` per block naming its successor, so
//!   every file and directory is a singly linked chain of blocks.
//! - Directories hold a header followed by variable-length entries packed
//!   back to back; an entry may straddle two blocks.
//!
//! ## Layers
//!
//! - [`block_store::Volume`]: block I/O, the chain map and the allocator
//! - [`directory`]: walking and writing packed directory entries
//! - [`resolver`]: path lookup with symbolic-link expansion
//! - [`create`], [`open`], [`ops`]: the filesystem operations
//! - [`server::LxfsServer`]: the request loop speaking the luxOS protocol
//!
//! Every operation runs with an [`OpContext`] that carries the caller's
//! credentials, the request time and the request's own scratch buffer.

pub mod block_store;
mod bytes;
pub mod config;
pub mod context;
pub mod create;
pub mod directory;
pub mod dirent;
pub mod error;
pub mod failing_device;
pub mod layout;
pub mod mount;
pub mod open;
pub mod ops;
pub mod path;
pub mod permissions;
pub mod resolver;
pub mod server;

pub use block_store::{Scratch, Volume, DEFAULT_SYMLINK_HOPS};
pub use config::{ConfigError, DriverConfig, MountConfig};
pub use context::OpContext;
pub use create::{create, CreateKind};
pub use directory::EntryLocation;
pub use dirent::{DirEntry, DirHeader, EntryKind, FileHeader};
pub use error::{FsError, FsResult};
pub use failing_device::{FailingBlockDevice, FailurePolicy};
pub use layout::{format, FormatOptions, Identification};
pub use mount::MountTable;
pub use open::{open, OpenOutcome, OpenRequest};
pub use ops::Metadata;
pub use permissions::{Access, Permissions};
pub use resolver::{find, find_following, Lookup};
pub use server::{LxfsServer, ServerError};
