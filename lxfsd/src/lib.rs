//! # lxfs Daemon
//!
//! Hosts the lxfs server as a process: loads the configuration, opens the
//! volume images, installs the logger and serves frames over stdio.
//!
//! ## Responsibilities
//!
//! The daemon:
//! - Opens (and on request creates and formats) each configured image
//! - Mounts every image under its device name
//! - Announces readiness and runs the request loop until stdin closes
//!
//! ## Non-Responsibilities
//!
//! The daemon does NOT:
//! - Interpret requests itself (that is `services_lxfs`)
//! - Retry failed I/O
//! - Reformat an image that already exists

pub mod daemon;
pub mod logger;

pub use daemon::{build_server, mount_all, open_image, serve_stdio, DaemonError};
pub use logger::StderrLogger;
