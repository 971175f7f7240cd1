//! Kernel error types

use thiserror::Error;

/// Errors that can occur when exchanging messages with the kernel
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KernelError {
    /// Message send failed
    #[error("Failed to send message: {0}")]
    SendFailed(String),

    /// Message receive failed
    #[error("Failed to receive message: {0}")]
    ReceiveFailed(String),

    /// The peer closed the connection between messages
    #[error("Transport disconnected")]
    Disconnected,

    /// A frame header announced an impossible length
    #[error("Invalid frame length {length} (limit {limit})")]
    InvalidFrameLength { length: u64, limit: usize },
}
