//! # Inter-Process Communication (IPC)
//!
//! This crate defines the luxOS message protocol spoken between the
//! kernel, the VFS and filesystem drivers.
//!
//! ## Philosophy
//!
//! - **Fixed layouts**: every message is a header followed by fixed-width fields
//! - **One record per exchange**: a response is the request with its status filled in
//! - **Errors are values**: statuses carry negated errno codes, never panics
//!
//! ## Architecture
//!
//! Every frame starts with a [`MessageHeader`]. Syscall-style commands
//! extend it with a [`SyscallHeader`] carrying the request id, followed
//! by a command-specific record from [`commands`].

pub mod commands;
pub mod flags;
pub mod message;
pub mod status;
pub mod wire;

pub use commands::{
    error_reply, ChmodCommand, ChownCommand, FsyncCommand, LinkCommand, MkdirCommand,
    OpenCommand, OpendirCommand, ReaddirCommand, ReadlinkCommand, Request, RwCommand,
    StatBuffer, StatCommand, SyscallMessage, UnlinkCommand, UtimeCommand, MAX_NAME_FIELD,
};
pub use flags::OpenFlags;
pub use message::{CommandCode, MessageHeader, SyscallHeader, MAX_FILE_PATH, SERVER_MAX_SIZE};
pub use wire::{WireError, WireReader, WireWriter};
