//! Filesystem error types

use hal::BlockError;
use ipc::status;
use thiserror::Error;

/// Errors returned by filesystem operations
///
/// Every variant maps onto the negated errno carried in a response
/// header, see [`FsError::errno`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FsError {
    /// Block read, write or flush failed
    #[error("Block I/O failed: {0}")]
    Io(#[from] BlockError),

    /// No free block left on the volume
    #[error("No free blocks on volume")]
    NoSpace,

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Operation the on-disk format cannot express yet
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    /// Symbolic link expansion exceeded the hop limit
    #[error("Too many levels of symbolic links: {0}")]
    TooManyLinks(String),

    #[error("Name too long: {0}")]
    NameTooLong(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// On-disk structures are inconsistent
    #[error("Corrupted volume: {0}")]
    Corrupted(String),

    /// No volume is mounted under this device name
    #[error("Unknown device: {0}")]
    UnknownDevice(String),
}

impl FsError {
    /// Negated errno reported in a response status
    pub fn errno(&self) -> i64 {
        -match self {
            FsError::Io(_) => status::EIO,
            FsError::NoSpace => status::ENOSPC,
            FsError::NotADirectory(_) => status::ENOTDIR,
            FsError::IsADirectory(_) => status::EISDIR,
            FsError::AccessDenied(_) => status::EACCES,
            FsError::NotFound(_) => status::ENOENT,
            FsError::AlreadyExists(_) => status::EEXIST,
            FsError::NotImplemented(_) => status::ENOSYS,
            FsError::TooManyLinks(_) => status::ELOOP,
            FsError::NameTooLong(_) => status::ENAMETOOLONG,
            FsError::InvalidPath(_) | FsError::InvalidArgument(_) => status::EINVAL,
            FsError::Corrupted(_) | FsError::UnknownDevice(_) => status::EIO,
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;
