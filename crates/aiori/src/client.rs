//! Mount-client API consumed by the INFINIFS backend
//!
//! The client library is an external collaborator: it owns the wire protocol
//! and the cluster session. The backend only needs the calls below. Every call
//! fails with a positive [`Errno`]; C-style clients returning `-errno` can be
//! adapted with [`Errno::check`].

use std::path::Path;

use aiori_core::{AccessMode, Descriptor, Errno, StatFsRecord, StatRecord};

/// Result of a client call
pub type ClientResult<T> = std::result::Result<T, Errno>;

/// Open flag bits understood by the mount client
pub mod flags {
    pub const O_RDONLY: u32 = 0o0000_0000;
    pub const O_WRONLY: u32 = 0o0000_0001;
    pub const O_RDWR: u32 = 0o0000_0002;
    pub const O_CREAT: u32 = 0o0000_0100;
    pub const O_EXCL: u32 = 0o0000_0200;
    pub const O_TRUNC: u32 = 0o0000_1000;

    /// Mask selecting the access mode
    pub const O_ACCMODE: u32 = 0o0000_0003;
}

/// Creates unmounted clients
pub trait Connector: Send + Sync {
    type Client: MountClient;

    /// Create a client handle acting as `user`
    fn create(&self, user: &str) -> ClientResult<Self::Client>;
}

/// A client handle, from configuration through mount to release
pub trait MountClient: Send + Sync {
    /// Load client settings from a config file
    fn read_config(&mut self, path: &Path) -> ClientResult<()>;

    /// Mount the remote tree rooted at `root`
    fn mount(&mut self, root: &str) -> ClientResult<()>;

    /// Resolve the root inode of the mounted tree
    fn lookup_root(&self) -> ClientResult<()>;

    fn unmount(&mut self) -> ClientResult<()>;

    /// Release a cleanly unmounted client
    fn release(self) -> ClientResult<()>
    where
        Self: Sized;

    /// Tear down a client whatever state it is in
    fn shutdown(self)
    where
        Self: Sized;

    /// Open `path` with mount-client flag bits; returns a descriptor
    fn open(&self, path: &str, flags: u32, mode: u32) -> ClientResult<Descriptor>;

    fn close(&self, fd: Descriptor) -> ClientResult<()>;

    /// Positional read; returns bytes read, 0 at end of file
    fn read(&self, fd: Descriptor, buf: &mut [u8], offset: u64) -> ClientResult<usize>;

    /// Positional write; returns bytes written
    fn write(&self, fd: Descriptor, buf: &[u8], offset: u64) -> ClientResult<usize>;

    fn fsync(&self, fd: Descriptor) -> ClientResult<()>;

    /// Flush everything the client has buffered
    fn sync_fs(&self) -> ClientResult<()>;

    /// Enable or disable lazy I/O consistency on a descriptor
    fn lazy_io(&self, fd: Descriptor, enable: bool) -> ClientResult<()> {
        let _ = (fd, enable);
        Err(Errno::ENOSYS)
    }

    fn unlink(&self, path: &str) -> ClientResult<()>;

    fn mkdir(&self, path: &str, mode: u32) -> ClientResult<()>;

    fn rmdir(&self, path: &str) -> ClientResult<()>;

    fn stat(&self, path: &str) -> ClientResult<StatRecord>;

    fn rename(&self, from: &str, to: &str) -> ClientResult<()>;

    fn access(&self, path: &str, mode: AccessMode) -> ClientResult<()>;

    /// Filesystem capacity; `ENOSYS` when the client cannot report it
    fn statfs(&self, path: &str) -> ClientResult<StatFsRecord> {
        let _ = path;
        Err(Errno::ENOSYS)
    }
}
