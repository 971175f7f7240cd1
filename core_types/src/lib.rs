//! # Core Types
//!
//! Identifiers and caller credentials shared by the lxfs crates.
//!
//! ## Key Types
//!
//! - [`MountId`]: Unique identifier for one mounted volume
//! - [`Credentials`]: The uid/gid pair a request is evaluated against
//! - [`Uid`], [`Gid`], [`Pid`]: POSIX-style numeric ids as carried on the wire

pub mod credentials;
pub mod ids;

pub use credentials::{Credentials, Gid, Pid, Uid, ROOT_UID};
pub use ids::MountId;
