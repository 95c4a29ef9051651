//! Core type definitions for the abstract I/O interface

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Severity;

/// Backend-native descriptor returned by a client open
pub type Descriptor = i64;

/// Mount session identifier; a new one is minted on every successful initialize
pub type SessionId = Uuid;

/// Named operations of the dispatch table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Initialize,
    Finalize,
    Create,
    Open,
    Xfer,
    Close,
    Remove,
    Mkdir,
    Rmdir,
    Stat,
    Access,
    Rename,
    Sync,
    Fsync,
    StatFs,
    GetFileSize,
    LazyIo,
}

impl Operation {
    /// Every operation, in dispatch-table order
    pub const ALL: [Operation; 17] = [
        Operation::Initialize,
        Operation::Finalize,
        Operation::Create,
        Operation::Open,
        Operation::Xfer,
        Operation::Close,
        Operation::Remove,
        Operation::Mkdir,
        Operation::Rmdir,
        Operation::Stat,
        Operation::Access,
        Operation::Rename,
        Operation::Sync,
        Operation::Fsync,
        Operation::StatFs,
        Operation::GetFileSize,
        Operation::LazyIo,
    ];

    /// Name of the operation's slot
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Initialize => "initialize",
            Operation::Finalize => "finalize",
            Operation::Create => "create",
            Operation::Open => "open",
            Operation::Xfer => "xfer",
            Operation::Close => "close",
            Operation::Remove => "remove",
            Operation::Mkdir => "mkdir",
            Operation::Rmdir => "rmdir",
            Operation::Stat => "stat",
            Operation::Access => "access",
            Operation::Rename => "rename",
            Operation::Sync => "sync",
            Operation::Fsync => "fsync",
            Operation::StatFs => "statfs",
            Operation::GetFileSize => "get_file_size",
            Operation::LazyIo => "lazy_io",
        }
    }

    /// Severity with which a client failure in this operation is reported
    pub fn failure_policy(&self) -> Severity {
        match self {
            Operation::Initialize
            | Operation::Finalize
            | Operation::Create
            | Operation::Open
            | Operation::Xfer
            | Operation::Close
            | Operation::Remove
            | Operation::Sync
            | Operation::Fsync => Severity::Fatal,
            Operation::LazyIo | Operation::StatFs => Severity::Warning,
            Operation::Mkdir
            | Operation::Rmdir
            | Operation::Stat
            | Operation::Access
            | Operation::Rename
            | Operation::GetFileSize => Severity::Error,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flags for opening files, as requested by the driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFlags {
    /// Open for reading only
    pub read_only: bool,

    /// Open for writing only
    pub write_only: bool,

    /// Open for reading and writing
    pub read_write: bool,

    /// Create the file if it doesn't exist
    pub create: bool,

    /// Fail if the file already exists (with `create`)
    pub exclusive: bool,

    /// Truncate on open
    pub truncate: bool,

    /// Append mode
    pub append: bool,

    /// Bypass caches
    pub direct: bool,
}

impl OpenFlags {
    /// Flags for reading an existing file
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// Flags for writing an existing file
    pub fn write_only() -> Self {
        Self {
            write_only: true,
            ..Self::default()
        }
    }

    /// Flags for reading and writing an existing file
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Self::default()
        }
    }

    /// Same flags with `create` set
    pub fn with_create(mut self) -> Self {
        self.create = true;
        self
    }

    /// Same flags with `truncate` set
    pub fn with_truncate(mut self) -> Self {
        self.truncate = true;
        self
    }

    /// Same flags with `exclusive` set
    pub fn with_exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Names of the set flags, for diagnostics
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let table = [
            (self.read_only, "RDONLY"),
            (self.write_only, "WRONLY"),
            (self.read_write, "RDWR"),
            (self.create, "CREAT"),
            (self.exclusive, "EXCL"),
            (self.truncate, "TRUNC"),
            (self.append, "APPEND"),
            (self.direct, "DIRECT"),
        ];
        for (set, name) in table {
            if set {
                names.push(name);
            }
        }
        names
    }
}

impl fmt::Display for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.names();
        if names.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// Access check requested by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    /// Existence only
    Exists,
    Read,
    Write,
    Execute,
}

/// Direction and buffer of a single transfer
#[derive(Debug)]
pub enum Xfer<'a> {
    /// Read into the buffer
    Read(&'a mut [u8]),

    /// Write the buffer out
    Write(&'a [u8]),
}

impl Xfer<'_> {
    /// Number of bytes requested
    pub fn len(&self) -> usize {
        match self {
            Xfer::Read(buf) => buf.len(),
            Xfer::Write(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Xfer::Write(_))
    }
}

/// Metadata for a path
///
/// Fields a backend cannot supply are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    /// File type and permission bits
    pub mode: u32,

    /// Size in bytes
    pub size: u64,

    /// Hard link count
    pub nlink: Option<u64>,

    /// Owner
    pub uid: Option<u32>,

    /// Group
    pub gid: Option<u32>,

    /// Preferred I/O block size
    pub block_size: Option<u64>,

    /// Last access time
    pub accessed: Option<DateTime<Utc>>,

    /// Last modification time
    pub modified: Option<DateTime<Utc>>,

    /// Last status change time
    pub changed: Option<DateTime<Utc>>,
}

impl StatRecord {
    pub const S_IFMT: u32 = 0o170000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFREG: u32 = 0o100000;

    pub fn is_dir(&self) -> bool {
        self.mode & Self::S_IFMT == Self::S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        self.mode & Self::S_IFMT == Self::S_IFREG
    }

    /// Permission bits only
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// Filesystem-level capacity and usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatFsRecord {
    /// Fundamental block size
    pub block_size: u64,

    /// Total data blocks
    pub total_blocks: u64,

    /// Free blocks
    pub free_blocks: u64,

    /// Total file nodes
    pub total_files: u64,

    /// Free file nodes
    pub free_files: u64,
}

impl StatFsRecord {
    pub fn total_bytes(&self) -> u64 {
        self.block_size.saturating_mul(self.total_blocks)
    }

    pub fn free_bytes(&self) -> u64 {
        self.block_size.saturating_mul(self.free_blocks)
    }
}

/// Token for an open file, returned by create/open and consumed by close
///
/// Not `Clone`: exactly one close retires it.
#[derive(Debug, PartialEq, Eq)]
pub struct FileHandle {
    backend: &'static str,
    session: SessionId,
    descriptor: Descriptor,
    path: String,
    flags: OpenFlags,
}

impl FileHandle {
    /// Wrap a descriptor opened by `backend` in mount session `session`
    pub fn new(
        backend: &'static str,
        session: SessionId,
        descriptor: Descriptor,
        path: impl Into<String>,
        flags: OpenFlags,
    ) -> Self {
        Self {
            backend,
            session,
            descriptor,
            path: path.into(),
            flags,
        }
    }

    /// Backend that opened this handle
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Mount session the descriptor belongs to
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Backend-native descriptor
    pub fn descriptor(&self) -> Descriptor {
        self.descriptor
    }

    /// Normalized path the handle was opened with
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Flags the handle was opened with
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_flags_display() {
        let flags = OpenFlags::write_only().with_create().with_truncate();
        assert_eq!(flags.to_string(), "WRONLY|CREAT|TRUNC");
        assert_eq!(OpenFlags::default().to_string(), "NONE");
    }

    #[test]
    fn test_failure_policy() {
        assert_eq!(Operation::Initialize.failure_policy(), Severity::Fatal);
        assert_eq!(Operation::Close.failure_policy(), Severity::Fatal);
        assert_eq!(Operation::Remove.failure_policy(), Severity::Fatal);
        assert_eq!(Operation::LazyIo.failure_policy(), Severity::Warning);
        assert_eq!(Operation::StatFs.failure_policy(), Severity::Warning);
        assert_eq!(Operation::Mkdir.failure_policy(), Severity::Error);
    }

    #[test]
    fn test_operation_names_unique() {
        let mut names: Vec<_> = Operation::ALL.iter().map(|op| op.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Operation::ALL.len());
    }

    #[test]
    fn test_stat_mode_helpers() {
        let stat = StatRecord {
            mode: StatRecord::S_IFDIR | 0o755,
            ..Default::default()
        };
        assert!(stat.is_dir());
        assert!(!stat.is_file());
        assert_eq!(stat.permissions(), 0o755);
        assert!(stat.nlink.is_none());
    }

    #[test]
    fn test_xfer_len() {
        let mut buf = [0u8; 16];
        assert_eq!(Xfer::Read(&mut buf).len(), 16);
        assert!(Xfer::Write(&[]).is_empty());
        assert!(Xfer::Write(b"abc").is_write());
    }
}
