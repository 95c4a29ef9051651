//! Error types for the abstract I/O interface

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Operation;

/// Result type alias using the AIORI Error
pub type Result<T> = std::result::Result<T, Error>;

/// Positive POSIX-style error code reported by a backend client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Errno(pub i32);

impl Errno {
    pub const EPERM: Errno = Errno(1);
    pub const ENOENT: Errno = Errno(2);
    pub const EIO: Errno = Errno(5);
    pub const EBADF: Errno = Errno(9);
    pub const EACCES: Errno = Errno(13);
    pub const EEXIST: Errno = Errno(17);
    pub const ENOTDIR: Errno = Errno(20);
    pub const EISDIR: Errno = Errno(21);
    pub const EINVAL: Errno = Errno(22);
    pub const ENOSYS: Errno = Errno(38);
    pub const ENOTEMPTY: Errno = Errno(39);
    pub const ENOTCONN: Errno = Errno(107);

    /// Adapt a C-style return value where negative means `-errno`
    pub fn check(ret: i64) -> std::result::Result<i64, Errno> {
        if ret < 0 {
            Err(Errno((-ret) as i32))
        } else {
            Ok(ret)
        }
    }

    /// Map an I/O error onto its OS error code, falling back to EIO
    pub fn from_io(err: &std::io::Error) -> Errno {
        if let Some(code) = err.raw_os_error() {
            return Errno(code);
        }
        match err.kind() {
            std::io::ErrorKind::NotFound => Errno::ENOENT,
            std::io::ErrorKind::PermissionDenied => Errno::EACCES,
            std::io::ErrorKind::AlreadyExists => Errno::EEXIST,
            std::io::ErrorKind::InvalidInput => Errno::EINVAL,
            std::io::ErrorKind::Unsupported => Errno::ENOSYS,
            _ => Errno::EIO,
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Errno::EPERM => "EPERM",
            Errno::ENOENT => "ENOENT",
            Errno::EIO => "EIO",
            Errno::EBADF => "EBADF",
            Errno::EACCES => "EACCES",
            Errno::EEXIST => "EEXIST",
            Errno::ENOTDIR => "ENOTDIR",
            Errno::EISDIR => "EISDIR",
            Errno::EINVAL => "EINVAL",
            Errno::ENOSYS => "ENOSYS",
            Errno::ENOTEMPTY => "ENOTEMPTY",
            Errno::ENOTCONN => "ENOTCONN",
            _ => return write!(f, "errno {}", self.0),
        };
        write!(f, "{} ({})", name, self.0)
    }
}

/// How loudly a failure is surfaced to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Best-effort operation failed or capability missing; the run continues
    Warning,

    /// Operation failed; the caller decides what to do
    Error,

    /// The run cannot meaningfully continue
    Fatal,
}

/// Core error type for the abstract I/O interface
#[derive(Error, Debug)]
pub enum Error {
    // Option errors
    #[error("Required option not set: {option}")]
    MissingOption { option: String },

    #[error("Invalid value for option {option}: {message}")]
    InvalidOption { option: String, message: String },

    #[error("Unknown option: {option}")]
    UnknownOption { option: String },

    // Lifecycle errors
    #[error("{operation} called before the backend was initialized")]
    NotInitialized { operation: Operation },

    // Backend errors
    #[error("{backend} {operation} failed: {errno}")]
    Backend {
        backend: String,
        operation: Operation,
        errno: Errno,
    },

    #[error("{backend} does not support {operation}")]
    Unsupported {
        backend: String,
        operation: Operation,
    },

    #[error("{backend} does not implement open flag(s) {flags}")]
    UnsupportedFlags { backend: String, flags: String },

    // Handle misuse
    #[error("File handle belongs to backend {owner}, not {backend}")]
    ForeignHandle { owner: String, backend: String },

    #[error("File handle for {path} outlived the mount session it was opened in")]
    StaleHandle { path: String },

    // Registry errors
    #[error("Backend not found: {name}")]
    UnknownBackend { name: String },

    #[error("Backend already registered: {name}")]
    DuplicateBackend { name: String },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Severity class of this error
    pub fn severity(&self) -> Severity {
        match self {
            Error::MissingOption { .. } | Error::Unsupported { .. } => Severity::Warning,
            Error::Backend { operation, .. } => operation.failure_policy(),
            Error::NotInitialized { .. }
            | Error::ForeignHandle { .. }
            | Error::StaleHandle { .. }
            | Error::InvalidConfig { .. }
            | Error::Internal { .. } => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Returns true if this error indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Returns true if the backend deliberately does not provide the capability
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported { .. })
    }

    /// Backend error code, if this error came from a client call
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::Backend { errno, .. } => Some(*errno),
            Error::UnsupportedFlags { .. } => Some(Errno::EINVAL),
            Error::Unsupported { .. } => Some(Errno::ENOSYS),
            Error::Io(e) => Some(Errno::from_io(e)),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
