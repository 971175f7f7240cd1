//! # Kernel API
//!
//! This crate defines the interface between a user-space server and the
//! kernel: how frames are moved and where time comes from.
//!
//! ## Philosophy
//!
//! The kernel provides **mechanisms**, not policies:
//! - Message passing (not shared memory)
//! - Time management (explicit, not ambient)
//!
//! ## Design Goals
//!
//! 1. **Testability**: transports and clocks can be replaced in tests
//! 2. **Explicitness**: no hidden state
//! 3. **Simplicity**: minimal surface area

pub mod error;
pub mod time;
pub mod transport;

pub use error::KernelError;
pub use time::{Clock, Duration, Instant, ManualClock, SystemClock};
pub use transport::{LoopbackTransport, MessageTransport, StreamTransport, DEFAULT_MAX_FRAME};
