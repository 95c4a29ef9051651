//! Local-directory mount client
//!
//! Serves the INFINIFS client API from a directory tree on the local
//! filesystem:
//! - JSON client config naming the directory that stands in for the cluster
//! - Descriptor table of open files
//! - Positional reads and writes

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::os::unix::fs::{DirBuilderExt, FileExt, MetadataExt, OpenOptionsExt};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use aiori_core::{AccessMode, Descriptor, Errno, StatRecord};
use chrono::DateTime;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::client::{flags, ClientResult, Connector, MountClient};

/// First descriptor handed out; 0-2 look like stdio
const FIRST_DESCRIPTOR: Descriptor = 3;

/// Contents of the local client's config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalClientConfig {
    /// Directory acting as the cluster root
    pub root: PathBuf,
}

impl LocalClientConfig {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Write this config as JSON to `path`
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }
}

/// Creates local mount clients
#[derive(Debug, Clone, Default)]
pub struct LocalConnector;

impl LocalConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for LocalConnector {
    type Client = LocalMount;

    fn create(&self, user: &str) -> ClientResult<LocalMount> {
        if user.is_empty() {
            return Err(Errno::EINVAL);
        }
        Ok(LocalMount::new(user))
    }
}

/// Mount client backed by a local directory
#[derive(Debug)]
pub struct LocalMount {
    user: String,
    config: Option<LocalClientConfig>,
    /// Directory all paths resolve against once mounted
    mount_root: Option<PathBuf>,
    files: DashMap<Descriptor, File>,
    next_fd: AtomicI64,
}

impl LocalMount {
    fn new(user: &str) -> Self {
        Self {
            user: user.to_string(),
            config: None,
            mount_root: None,
            files: DashMap::new(),
            next_fd: AtomicI64::new(FIRST_DESCRIPTOR),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Mounted directory, if mounted
    pub fn mount_root(&self) -> Option<&Path> {
        self.mount_root.as_deref()
    }

    /// Number of descriptors currently open
    pub fn open_count(&self) -> usize {
        self.files.len()
    }

    /// Resolve a backend-relative path under the mount root
    fn resolve(&self, path: &str) -> ClientResult<PathBuf> {
        let root = self.mount_root.as_ref().ok_or(Errno::ENOTCONN)?;
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(Errno::EACCES);
        }
        Ok(root.join(relative))
    }

    fn with_file<T>(
        &self,
        fd: Descriptor,
        f: impl FnOnce(&File) -> std::io::Result<T>,
    ) -> ClientResult<T> {
        let file = self.files.get(&fd).ok_or(Errno::EBADF)?;
        f(file.value()).map_err(|e| Errno::from_io(&e))
    }
}

fn io_errno(e: std::io::Error) -> Errno {
    Errno::from_io(&e)
}

impl MountClient for LocalMount {
    fn read_config(&mut self, path: &Path) -> ClientResult<()> {
        let raw = fs::read_to_string(path).map_err(io_errno)?;
        let config: LocalClientConfig = serde_json::from_str(&raw).map_err(|e| {
            debug!(path = %path.display(), error = %e, "Malformed client config");
            Errno::EINVAL
        })?;
        self.config = Some(config);
        Ok(())
    }

    fn mount(&mut self, root: &str) -> ClientResult<()> {
        let config = self.config.as_ref().ok_or(Errno::EINVAL)?;
        let mount_root = config.root.join(root.trim_start_matches('/'));
        let metadata = fs::metadata(&mount_root).map_err(io_errno)?;
        if !metadata.is_dir() {
            return Err(Errno::ENOTDIR);
        }
        debug!(mount_root = %mount_root.display(), user = %self.user, "Local client mounted");
        self.mount_root = Some(mount_root);
        Ok(())
    }

    fn lookup_root(&self) -> ClientResult<()> {
        let root = self.mount_root.as_ref().ok_or(Errno::ENOTCONN)?;
        let metadata = fs::metadata(root).map_err(io_errno)?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(Errno::ENOTDIR)
        }
    }

    fn unmount(&mut self) -> ClientResult<()> {
        if self.mount_root.take().is_none() {
            return Err(Errno::ENOTCONN);
        }
        // Descriptors left open by the caller are closed here
        self.files.clear();
        Ok(())
    }

    fn release(self) -> ClientResult<()> {
        Ok(())
    }

    fn shutdown(self) {
        debug!(user = %self.user, open = self.files.len(), "Local client shut down");
    }

    #[instrument(skip(self), fields(client = "local"))]
    fn open(&self, path: &str, bits: u32, mode: u32) -> ClientResult<Descriptor> {
        let full_path = self.resolve(path)?;

        let (read, write) = match bits & flags::O_ACCMODE {
            flags::O_RDONLY => (true, false),
            flags::O_WRONLY => (false, true),
            flags::O_RDWR => (true, true),
            _ => return Err(Errno::EINVAL),
        };
        let create = bits & flags::O_CREAT != 0;
        let exclusive = create && bits & flags::O_EXCL != 0;
        let truncate = bits & flags::O_TRUNC != 0;

        let mut opts = OpenOptions::new();
        opts.read(read).mode(mode);
        if write {
            opts.write(true)
                .create(create && !exclusive)
                .create_new(exclusive)
                .truncate(truncate);
        } else if create || truncate {
            // OpenOptions refuses to create or truncate without write access
            OpenOptions::new()
                .write(true)
                .create(create && !exclusive)
                .create_new(exclusive)
                .truncate(truncate)
                .mode(mode)
                .open(&full_path)
                .map_err(io_errno)?;
        }

        let file = opts.open(&full_path).map_err(io_errno)?;
        let fd = self.next_fd.fetch_add(1, Ordering::SeqCst);
        self.files.insert(fd, file);
        debug!(?full_path, fd, "Opened");
        Ok(fd)
    }

    fn close(&self, fd: Descriptor) -> ClientResult<()> {
        self.files.remove(&fd).map(|_| ()).ok_or(Errno::EBADF)
    }

    fn read(&self, fd: Descriptor, buf: &mut [u8], offset: u64) -> ClientResult<usize> {
        self.with_file(fd, |file| file.read_at(buf, offset))
    }

    fn write(&self, fd: Descriptor, buf: &[u8], offset: u64) -> ClientResult<usize> {
        self.with_file(fd, |file| file.write_at(buf, offset))
    }

    fn fsync(&self, fd: Descriptor) -> ClientResult<()> {
        self.with_file(fd, |file| file.sync_all())
    }

    fn sync_fs(&self) -> ClientResult<()> {
        for entry in self.files.iter() {
            entry.value().sync_all().map_err(io_errno)?;
        }
        Ok(())
    }

    fn unlink(&self, path: &str) -> ClientResult<()> {
        fs::remove_file(self.resolve(path)?).map_err(io_errno)
    }

    fn mkdir(&self, path: &str, mode: u32) -> ClientResult<()> {
        DirBuilder::new()
            .mode(mode)
            .create(self.resolve(path)?)
            .map_err(io_errno)
    }

    fn rmdir(&self, path: &str) -> ClientResult<()> {
        fs::remove_dir(self.resolve(path)?).map_err(io_errno)
    }

    fn stat(&self, path: &str) -> ClientResult<StatRecord> {
        let metadata = fs::metadata(self.resolve(path)?).map_err(io_errno)?;
        Ok(StatRecord {
            mode: metadata.mode(),
            size: metadata.size(),
            nlink: Some(metadata.nlink()),
            uid: Some(metadata.uid()),
            gid: Some(metadata.gid()),
            block_size: Some(metadata.blksize()),
            accessed: DateTime::from_timestamp(metadata.atime(), metadata.atime_nsec() as u32),
            modified: DateTime::from_timestamp(metadata.mtime(), metadata.mtime_nsec() as u32),
            changed: DateTime::from_timestamp(metadata.ctime(), metadata.ctime_nsec() as u32),
        })
    }

    fn rename(&self, from: &str, to: &str) -> ClientResult<()> {
        fs::rename(self.resolve(from)?, self.resolve(to)?).map_err(io_errno)
    }

    fn access(&self, path: &str, mode: AccessMode) -> ClientResult<()> {
        let metadata = fs::metadata(self.resolve(path)?).map_err(io_errno)?;
        let perms = metadata.mode();
        let allowed = match mode {
            AccessMode::Exists => true,
            AccessMode::Read => perms & 0o444 != 0,
            AccessMode::Write => !metadata.permissions().readonly(),
            AccessMode::Execute => perms & 0o111 != 0,
        };
        if allowed {
            Ok(())
        } else {
            Err(Errno::EACCES)
        }
    }
}
