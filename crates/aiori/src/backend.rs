//! Abstract I/O interface trait definition
//!
//! Defines the operation set every storage backend plugin implements. The
//! driver holds backends as `Arc<dyn Aiori>` and calls operations without
//! knowing the concrete type.

use std::sync::Arc;

use aiori_core::{
    AccessMode, FileHandle, OpenFlags, OptionSchema, OptionValues, Result, StatFsRecord,
    StatRecord, TransferHints, Xfer,
};

/// Trait for abstract I/O backends
///
/// Apart from `initialize` and `finalize`, every operation fails with
/// `Error::NotInitialized` until `initialize` has succeeded.
pub trait Aiori: Send + Sync {
    /// Unique backend name
    fn name(&self) -> &'static str;

    /// Older name the backend is still reachable under
    fn legacy_name(&self) -> Option<&'static str> {
        None
    }

    /// Backend version string
    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Whether the backend supports metadata-heavy (mdtest) workloads
    fn enable_mdtest(&self) -> bool;

    /// Options the driver may set for this backend
    fn options(&self) -> OptionSchema;

    /// Establish the client session
    ///
    /// Idempotent: a second call while initialized does nothing. A missing
    /// required option is reported as a warning and leaves the backend
    /// uninitialized.
    fn initialize(&self, options: &OptionValues) -> Result<()>;

    /// Tear the client session down; a no-op when not initialized
    fn finalize(&self) -> Result<()>;

    /// Publish transfer hints for subsequent `xfer` calls
    fn xfer_hints(&self, hints: Arc<TransferHints>);

    /// Open `path`, creating it if needed
    fn create(&self, path: &str, flags: OpenFlags) -> Result<FileHandle>;

    /// Open an existing `path`
    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle>;

    /// Transfer at `offset`; returns the bytes actually moved
    ///
    /// A short count is a normal outcome, not an error.
    fn xfer(&self, handle: &FileHandle, xfer: Xfer<'_>, offset: u64) -> Result<u64>;

    /// Close and retire a handle
    ///
    /// The handle is consumed even when the backend close fails.
    fn close(&self, handle: FileHandle) -> Result<()>;

    /// Delete the object at `path`
    fn remove(&self, path: &str) -> Result<()>;

    fn mkdir(&self, path: &str, mode: u32) -> Result<()>;

    fn rmdir(&self, path: &str) -> Result<()>;

    fn stat(&self, path: &str) -> Result<StatRecord>;

    /// Whether `path` is reachable
    fn access(&self, path: &str, mode: AccessMode) -> Result<bool>;

    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Flush the whole client
    fn sync(&self) -> Result<()>;

    /// Flush one open file
    fn fsync(&self, handle: &FileHandle) -> Result<()>;

    /// Filesystem capacity; `Error::Unsupported` when the backend cannot tell
    fn statfs(&self, path: &str) -> Result<StatFsRecord>;

    /// Size in bytes of the object at `path`
    fn get_file_size(&self, path: &str) -> Result<u64>;
}
