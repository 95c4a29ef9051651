//! INFINIFS backend
//!
//! Drives an INFINIFS mount client through the abstract I/O interface:
//! - Mount-prefix stripping before every client call
//! - Lazy I/O on open when requested
//! - Transfer hints honored by `xfer` (dry run, single attempt, fsync per write)

use std::path::PathBuf;
use std::sync::Arc;

use aiori_core::{
    AccessMode, Errno, Error, ErrorChannelHandle, FileHandle, HintSlot, MountPrefix, OpenFlags,
    Operation, OptionEntry, OptionKind, OptionSchema, OptionValues, Result, StatFsRecord,
    StatRecord, TransferHints, Xfer,
};
use tracing::{debug, instrument};

use crate::client::{flags, ClientResult, Connector, MountClient};
use crate::lifecycle::{Lifecycle, LifecycleState, MountParams, Mounted};
use crate::Aiori;

/// Registered backend name
pub const INFINIFS_NAME: &str = "INFINIFS";

/// Permission bits for newly created files
const FILE_MODE: u32 = 0o664;

/// Option names
pub mod option {
    pub const CONFIG_PATH: &str = "INFINIFS.config_path";
    pub const PREFIX: &str = "INFINIFS.prefix";
    pub const USER: &str = "INFINIFS.user";
    pub const REMOTE_PREFIX: &str = "INFINIFS.remote_prefix";
    pub const LAZY: &str = "INFINIFS.lazy";
}

/// Settings resolved from option values at initialize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfiniFsSettings {
    pub config_path: PathBuf,
    pub prefix: MountPrefix,
    pub user: String,
    pub remote_prefix: String,
    pub lazy: bool,
}

impl InfiniFsSettings {
    fn from_values(values: &OptionValues) -> Result<Self> {
        Ok(Self {
            config_path: PathBuf::from(values.require_str(option::CONFIG_PATH)?),
            prefix: MountPrefix::new(values.require_str(option::PREFIX)?),
            user: values.require_str(option::USER)?.to_string(),
            remote_prefix: values.require_str(option::REMOTE_PREFIX)?.to_string(),
            lazy: values.get_flag(option::LAZY),
        })
    }
}

/// INFINIFS backend over a mount-client connector
pub struct InfiniFs<K: Connector> {
    lifecycle: Lifecycle<K, InfiniFsSettings>,
    hints: HintSlot,
}

impl<K: Connector> InfiniFs<K> {
    /// Create an uninitialized backend reporting into `errors`
    pub fn new(connector: K, errors: ErrorChannelHandle) -> Self {
        Self {
            lifecycle: Lifecycle::new(INFINIFS_NAME, connector, errors),
            hints: HintSlot::new(),
        }
    }

    /// Option declarations
    pub fn schema() -> OptionSchema {
        OptionSchema::new(vec![
            OptionEntry::required(
                option::CONFIG_PATH,
                "Config path for the client",
                OptionKind::String,
            ),
            OptionEntry::required(option::PREFIX, "Mount prefix", OptionKind::String),
            OptionEntry::optional(
                option::USER,
                "User the client connects as",
                OptionKind::String,
                Some("admin"),
            ),
            OptionEntry::optional(
                option::REMOTE_PREFIX,
                "Remote directory to mount as the root",
                OptionKind::String,
                Some("/"),
            ),
            OptionEntry::optional(
                option::LAZY,
                "Enable lazy I/O consistency on opened files",
                OptionKind::Flag,
                None,
            ),
        ])
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn connector(&self) -> &K {
        self.lifecycle.connector()
    }

    /// Hints most recently published by the driver
    pub fn hints(&self) -> Option<Arc<TransferHints>> {
        self.hints.current()
    }

    /// Translate driver open flags into mount-client flag bits
    fn client_flags(&self, requested: OpenFlags) -> Result<u32> {
        let mut unsupported = Vec::new();
        let access = [
            (requested.read_only, "RDONLY"),
            (requested.write_only, "WRONLY"),
            (requested.read_write, "RDWR"),
        ];
        if access.iter().filter(|(set, _)| *set).count() > 1 {
            // Conflicting access modes cannot be expressed as one client mode
            unsupported.extend(access.iter().filter(|(set, _)| *set).map(|(_, name)| *name));
        }
        if requested.append {
            unsupported.push("APPEND");
        }
        if requested.direct {
            unsupported.push("DIRECT");
        }
        if !unsupported.is_empty() {
            return Err(Error::UnsupportedFlags {
                backend: INFINIFS_NAME.to_string(),
                flags: unsupported.join("|"),
            });
        }

        let mut bits = flags::O_RDONLY;
        if requested.write_only {
            bits |= flags::O_WRONLY;
        }
        if requested.read_write {
            bits |= flags::O_RDWR;
        }
        if requested.create {
            bits |= flags::O_CREAT;
        }
        if requested.exclusive {
            bits |= flags::O_EXCL;
        }
        if requested.truncate {
            bits |= flags::O_TRUNC;
        }
        Ok(bits)
    }

    /// Reject handles from another backend or an earlier mount session
    fn check_handle(
        &self,
        mounted: &Mounted<K::Client, InfiniFsSettings>,
        operation: Operation,
        handle: &FileHandle,
    ) -> Result<()> {
        let err = if handle.backend() != INFINIFS_NAME {
            Error::ForeignHandle {
                owner: handle.backend().to_string(),
                backend: INFINIFS_NAME.to_string(),
            }
        } else if handle.session() != mounted.session {
            Error::StaleHandle {
                path: handle.path().to_string(),
            }
        } else {
            return Ok(());
        };
        Err(self.lifecycle.errors().raise(INFINIFS_NAME, operation, err))
    }

    /// Map a client result, reporting failures with the operation's policy
    fn checked<T>(&self, operation: Operation, context: &str, result: ClientResult<T>) -> Result<T> {
        result.map_err(|e| self.lifecycle.client_error(operation, e, context))
    }

    fn open_as(&self, operation: Operation, path: &str, requested: OpenFlags) -> Result<FileHandle> {
        let bits = self
            .client_flags(requested)
            .map_err(|e| self.lifecycle.errors().raise(INFINIFS_NAME, operation, e))?;

        self.lifecycle.with_mounted(operation, |mounted| {
            let file = mounted.settings.prefix.normalize(path);
            let fd = self.checked(
                operation,
                &format!("open of {} failed", file),
                mounted.client.open(file, bits, FILE_MODE),
            )?;

            if mounted.settings.lazy {
                if let Err(e) = mounted.client.lazy_io(fd, true) {
                    // Best effort; the file stays open without lazy I/O
                    let _ = self
                        .lifecycle
                        .client_error(Operation::LazyIo, e, "error enabling lazy mode");
                }
            }

            debug!(path = file, fd, flags = %requested, "File opened");
            Ok(FileHandle::new(
                INFINIFS_NAME,
                mounted.session,
                fd,
                file,
                requested,
            ))
        })
    }

    fn transfer_write(
        &self,
        client: &K::Client,
        handle: &FileHandle,
        buf: &[u8],
        offset: u64,
        hints: &TransferHints,
    ) -> Result<u64> {
        let fd = handle.descriptor();
        let mut done = 0usize;
        while done < buf.len() {
            let n = self.checked(
                Operation::Xfer,
                &format!("write to {} failed", handle.path()),
                client.write(fd, &buf[done..], offset + done as u64),
            )?;
            done += n;
            if n == 0 || hints.single_xfer_attempt {
                break;
            }
        }

        if hints.fsync_per_write {
            self.checked(
                Operation::Fsync,
                &format!("fsync of {} failed", handle.path()),
                client.fsync(fd),
            )?;
        }
        Ok(done as u64)
    }

    fn transfer_read(
        &self,
        client: &K::Client,
        handle: &FileHandle,
        buf: &mut [u8],
        offset: u64,
        hints: &TransferHints,
    ) -> Result<u64> {
        let fd = handle.descriptor();
        let mut done = 0usize;
        while done < buf.len() {
            let n = self.checked(
                Operation::Xfer,
                &format!("read from {} failed", handle.path()),
                client.read(fd, &mut buf[done..], offset + done as u64),
            )?;
            done += n;
            // 0 means end of file
            if n == 0 || hints.single_xfer_attempt {
                break;
            }
        }
        Ok(done as u64)
    }
}

impl<K: Connector> Aiori for InfiniFs<K> {
    fn name(&self) -> &'static str {
        INFINIFS_NAME
    }

    fn enable_mdtest(&self) -> bool {
        true
    }

    fn options(&self) -> OptionSchema {
        Self::schema()
    }

    #[instrument(skip(self, options), fields(backend = "INFINIFS"))]
    fn initialize(&self, options: &OptionValues) -> Result<()> {
        let schema = Self::schema();
        if let Some(missing) = schema.missing(options).first() {
            return Err(self.lifecycle.errors().raise(
                INFINIFS_NAME,
                Operation::Initialize,
                Error::MissingOption {
                    option: missing.to_string(),
                },
            ));
        }

        let settings = schema
            .with_defaults(options)
            .and_then(|values| InfiniFsSettings::from_values(&values))
            .map_err(|e| {
                self.lifecycle
                    .errors()
                    .raise(INFINIFS_NAME, Operation::Initialize, e)
            })?;
        let config_path = settings.config_path.clone();
        let user = settings.user.clone();
        let remote_prefix = settings.remote_prefix.clone();

        self.lifecycle.mount(
            MountParams {
                user: &user,
                config_path: &config_path,
                remote_prefix: &remote_prefix,
            },
            settings,
        )?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "INFINIFS"))]
    fn finalize(&self) -> Result<()> {
        self.lifecycle.unmount()
    }

    fn xfer_hints(&self, hints: Arc<TransferHints>) {
        debug!(
            block_size = hints.block_size,
            transfer_size = hints.transfer_size,
            "Transfer hints published"
        );
        self.hints.publish(hints);
    }

    #[instrument(skip(self), fields(backend = "INFINIFS"))]
    fn create(&self, path: &str, flags: OpenFlags) -> Result<FileHandle> {
        self.open_as(Operation::Create, path, flags.with_create())
    }

    #[instrument(skip(self), fields(backend = "INFINIFS"))]
    fn open(&self, path: &str, flags: OpenFlags) -> Result<FileHandle> {
        self.open_as(Operation::Open, path, flags)
    }

    #[instrument(skip(self, handle, xfer), fields(backend = "INFINIFS", path = handle.path(), len = xfer.len()))]
    fn xfer(&self, handle: &FileHandle, xfer: Xfer<'_>, offset: u64) -> Result<u64> {
        self.lifecycle.with_mounted(Operation::Xfer, |mounted| {
            self.check_handle(mounted, Operation::Xfer, handle)?;

            let hints = self.hints.current_or_default();
            let requested = xfer.len() as u64;
            if hints.dry_run {
                return Ok(requested);
            }

            let done = match xfer {
                Xfer::Write(buf) => {
                    self.transfer_write(&mounted.client, handle, buf, offset, &hints)?
                }
                Xfer::Read(buf) => {
                    self.transfer_read(&mounted.client, handle, buf, offset, &hints)?
                }
            };

            if done < requested {
                debug!(requested, done, offset, "Short transfer");
            }
            Ok(done)
        })
    }

    #[instrument(skip(self, handle), fields(backend = "INFINIFS", path = handle.path()))]
    fn close(&self, handle: FileHandle) -> Result<()> {
        // `handle` is dropped when this returns, whatever the outcome
        self.lifecycle.with_mounted(Operation::Close, |mounted| {
            self.check_handle(mounted, Operation::Close, &handle)?;
            self.checked(
                Operation::Close,
                &format!("close of {} failed", handle.path()),
                mounted.client.close(handle.descriptor()),
            )?;
            debug!(fd = handle.descriptor(), "File closed");
            Ok(())
        })
    }

    #[instrument(skip(self), fields(backend = "INFINIFS"))]
    fn remove(&self, path: &str) -> Result<()> {
        self.lifecycle.with_mounted(Operation::Remove, |mounted| {
            let file = mounted.settings.prefix.normalize(path);
            self.checked(
                Operation::Remove,
                &format!("unlink of {} failed", file),
                mounted.client.unlink(file),
            )
        })
    }

    #[instrument(skip(self), fields(backend = "INFINIFS"))]
    fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
        self.lifecycle.with_mounted(Operation::Mkdir, |mounted| {
            let dir = mounted.settings.prefix.normalize(path);
            self.checked(
                Operation::Mkdir,
                &format!("mkdir of {} failed", dir),
                mounted.client.mkdir(dir, mode),
            )
        })
    }

    #[instrument(skip(self), fields(backend = "INFINIFS"))]
    fn rmdir(&self, path: &str) -> Result<()> {
        self.lifecycle.with_mounted(Operation::Rmdir, |mounted| {
            let dir = mounted.settings.prefix.normalize(path);
            self.checked(
                Operation::Rmdir,
                &format!("rmdir of {} failed", dir),
                mounted.client.rmdir(dir),
            )
        })
    }

    #[instrument(skip(self), fields(backend = "INFINIFS"))]
    fn stat(&self, path: &str) -> Result<StatRecord> {
        self.lifecycle.with_mounted(Operation::Stat, |mounted| {
            let file = mounted.settings.prefix.normalize(path);
            self.checked(
                Operation::Stat,
                &format!("stat of {} failed", file),
                mounted.client.stat(file),
            )
        })
    }

    #[instrument(skip(self), fields(backend = "INFINIFS"))]
    fn access(&self, path: &str, mode: AccessMode) -> Result<bool> {
        self.lifecycle.with_mounted(Operation::Access, |mounted| {
            let file = mounted.settings.prefix.normalize(path);
            if file.is_empty() {
                return Ok(true);
            }
            match mounted.client.access(file, mode) {
                Ok(()) => Ok(true),
                Err(Errno::ENOENT) => Ok(false),
                Err(e) => Err(self.lifecycle.client_error(
                    Operation::Access,
                    e,
                    &format!("access check of {} failed", file),
                )),
            }
        })
    }

    #[instrument(skip(self), fields(backend = "INFINIFS"))]
    fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.lifecycle.with_mounted(Operation::Rename, |mounted| {
            let old = mounted.settings.prefix.normalize(from);
            let new = mounted.settings.prefix.normalize(to);
            self.checked(
                Operation::Rename,
                &format!("rename of {} to {} failed", old, new),
                mounted.client.rename(old, new),
            )
        })
    }

    #[instrument(skip(self), fields(backend = "INFINIFS"))]
    fn sync(&self) -> Result<()> {
        self.lifecycle.with_mounted(Operation::Sync, |mounted| {
            self.checked(Operation::Sync, "sync failed", mounted.client.sync_fs())
        })
    }

    #[instrument(skip(self, handle), fields(backend = "INFINIFS", path = handle.path()))]
    fn fsync(&self, handle: &FileHandle) -> Result<()> {
        self.lifecycle.with_mounted(Operation::Fsync, |mounted| {
            self.check_handle(mounted, Operation::Fsync, handle)?;
            self.checked(
                Operation::Fsync,
                &format!("fsync of {} failed", handle.path()),
                mounted.client.fsync(handle.descriptor()),
            )
        })
    }

    #[instrument(skip(self), fields(backend = "INFINIFS"))]
    fn statfs(&self, path: &str) -> Result<StatFsRecord> {
        self.lifecycle.with_mounted(Operation::StatFs, |mounted| {
            let file = mounted.settings.prefix.normalize(path);
            match mounted.client.statfs(file) {
                Ok(record) => Ok(record),
                Err(Errno::ENOSYS) => Err(self.lifecycle.errors().raise(
                    INFINIFS_NAME,
                    Operation::StatFs,
                    Error::Unsupported {
                        backend: INFINIFS_NAME.to_string(),
                        operation: Operation::StatFs,
                    },
                )),
                Err(e) => Err(self
                    .lifecycle
                    .client_error(Operation::StatFs, e, "statfs failed")),
            }
        })
    }

    #[instrument(skip(self), fields(backend = "INFINIFS"))]
    fn get_file_size(&self, path: &str) -> Result<u64> {
        self.lifecycle.with_mounted(Operation::GetFileSize, |mounted| {
            let file = mounted.settings.prefix.normalize(path);
            let stat = self.checked(
                Operation::GetFileSize,
                &format!("stat of {} failed", file),
                mounted.client.stat(file),
            )?;
            Ok(stat.size)
        })
    }
}
