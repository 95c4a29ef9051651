use std::path::Path;
use std::sync::Arc;

use aiori::{default_registry, BackendHandle, LocalClientConfig};
use aiori_core::{
    AccessMode, Errno, Error, ErrorChannel, ErrorChannelHandle, OpenFlags, Operation,
    OptionValues, Severity, Xfer,
};
use anyhow::Result;
use tempfile::TempDir;

const PREFIX: &str = "/mnt/fs";

struct Harness {
    _temp_dir: TempDir,
    cluster: std::path::PathBuf,
    config_path: std::path::PathBuf,
    errors: ErrorChannelHandle,
    backend: BackendHandle,
}

impl Harness {
    fn options(&self) -> Result<OptionValues> {
        let config_path = self.config_path.to_string_lossy().into_owned();
        Ok(self.backend.options().parse([
            ("INFINIFS.config_path", config_path.as_str()),
            ("INFINIFS.prefix", PREFIX),
        ])?)
    }

    fn on_disk(&self, relative: &str) -> std::path::PathBuf {
        self.cluster.join(relative)
    }
}

// Build a local cluster directory plus client config and resolve INFINIFS
fn harness() -> Result<Harness> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let temp_dir = TempDir::new()?;
    let cluster = temp_dir.path().join("cluster");
    std::fs::create_dir(&cluster)?;
    let config_path = temp_dir.path().join("client.json");
    LocalClientConfig::new(&cluster).write_to(&config_path)?;

    let errors = Arc::new(ErrorChannel::new());
    let backend = default_registry(Arc::clone(&errors))?.get("INFINIFS")?;

    Ok(Harness {
        _temp_dir: temp_dir,
        cluster,
        config_path,
        errors,
        backend,
    })
}

fn initialized() -> Result<Harness> {
    let h = harness()?;
    h.backend.initialize(&h.options()?)?;
    Ok(h)
}

#[test]
fn test_create_write_stat_under_prefix() -> Result<()> {
    let h = initialized()?;

    // 1. Create through the mount prefix
    let handle = h
        .backend
        .create("/mnt/fs/testfile", OpenFlags::write_only())?;
    assert_eq!(handle.path(), "/testfile");

    // 2. Write one transfer
    let payload = vec![0x5Au8; 4096];
    assert_eq!(h.backend.xfer(&handle, Xfer::Write(&payload), 0)?, 4096);
    h.backend.fsync(&handle)?;
    h.backend.close(handle)?;

    // 3. The file exists at the prefix-relative location with mode 0664
    let stat = h.backend.stat("/mnt/fs/testfile")?;
    assert!(stat.is_file());
    assert_eq!(stat.size, 4096);
    assert!(stat.modified.is_some_and(|t| t <= chrono::Utc::now()));
    assert_eq!(std::fs::read(h.on_disk("testfile"))?, payload);
    assert_eq!(h.backend.get_file_size("/mnt/fs/testfile")?, 4096);

    h.backend.finalize()?;
    Ok(())
}

#[test]
fn test_read_back_after_reopen() -> Result<()> {
    let h = initialized()?;

    let handle = h.backend.create("/mnt/fs/data", OpenFlags::write_only())?;
    h.backend.xfer(&handle, Xfer::Write(b"abcdefgh"), 0)?;
    h.backend.xfer(&handle, Xfer::Write(b"ijkl"), 8)?;
    h.backend.close(handle)?;

    let handle = h.backend.open("/mnt/fs/data", OpenFlags::read_only())?;
    let mut buf = [0u8; 6];
    assert_eq!(h.backend.xfer(&handle, Xfer::Read(&mut buf), 4)?, 6);
    assert_eq!(&buf, b"efghij");

    // Reading across the end of file returns the short count
    let mut tail = [0u8; 16];
    assert_eq!(h.backend.xfer(&handle, Xfer::Read(&mut tail), 10)?, 2);
    assert_eq!(&tail[..2], b"kl");
    h.backend.close(handle)?;
    Ok(())
}

#[test]
fn test_missing_config_path_is_a_warning() -> Result<()> {
    let h = harness()?;
    let options = h.backend.options().parse([("INFINIFS.prefix", PREFIX)])?;

    let result = h.backend.initialize(&options);
    assert!(matches!(result, Err(Error::MissingOption { ref option }) if option == "INFINIFS.config_path"));
    assert_eq!(h.errors.warning_count(), 1);
    assert!(!h.errors.has_fatal());

    // Still uninitialized
    let result = h.backend.stat("/mnt/fs/anything");
    assert!(matches!(
        result,
        Err(Error::NotInitialized {
            operation: Operation::Stat
        })
    ));
    Ok(())
}

#[test]
fn test_unreadable_client_config_fails_initialize() -> Result<()> {
    let h = harness()?;
    let options = h.backend.options().parse([
        ("INFINIFS.config_path", "/nonexistent/client.json"),
        ("INFINIFS.prefix", PREFIX),
    ])?;

    let err = h.backend.initialize(&options).unwrap_err();
    assert!(matches!(
        err,
        Error::Backend {
            operation: Operation::Initialize,
            errno: Errno::ENOENT,
            ..
        }
    ));
    assert_eq!(err.severity(), Severity::Fatal);
    assert_eq!(h.errors.last_errno(), Some(Errno::ENOENT));

    // A later initialize with good options still works
    h.backend.initialize(&h.options()?)?;
    assert!(h.backend.access(PREFIX, AccessMode::Exists)?);
    Ok(())
}

#[test]
fn test_operations_require_initialize() -> Result<()> {
    let h = harness()?;

    assert!(matches!(
        h.backend.create("/mnt/fs/f", OpenFlags::write_only()),
        Err(Error::NotInitialized { .. })
    ));
    assert!(matches!(
        h.backend.access(PREFIX, AccessMode::Exists),
        Err(Error::NotInitialized { .. })
    ));
    assert!(matches!(h.backend.sync(), Err(Error::NotInitialized { .. })));
    assert_eq!(h.errors.fatal_count(), 3);
    Ok(())
}

#[test]
fn test_initialize_and_finalize_are_idempotent() -> Result<()> {
    let h = harness()?;

    // Finalize before initialize does nothing
    h.backend.finalize()?;

    h.backend.initialize(&h.options()?)?;
    h.backend.initialize(&h.options()?)?;
    h.backend.finalize()?;
    h.backend.finalize()?;

    assert!(matches!(
        h.backend.stat(PREFIX),
        Err(Error::NotInitialized { .. })
    ));
    assert_eq!(h.errors.error_count(), 0);
    Ok(())
}

#[test]
fn test_mkdir_rename_remove_rmdir() -> Result<()> {
    let h = initialized()?;

    h.backend.mkdir("/mnt/fs/dir", 0o755)?;
    assert!(h.backend.stat("/mnt/fs/dir")?.is_dir());

    let handle = h.backend.create("/mnt/fs/dir/a", OpenFlags::write_only())?;
    h.backend.close(handle)?;

    h.backend.rename("/mnt/fs/dir/a", "/mnt/fs/dir/b")?;
    assert!(!h.backend.access("/mnt/fs/dir/a", AccessMode::Exists)?);
    assert!(h.backend.access("/mnt/fs/dir/b", AccessMode::Exists)?);

    // Non-empty directory
    let err = h.backend.rmdir("/mnt/fs/dir").unwrap_err();
    assert_eq!(err.errno(), Some(Errno::ENOTEMPTY));
    assert_eq!(err.severity(), Severity::Error);

    h.backend.remove("/mnt/fs/dir/b")?;
    h.backend.rmdir("/mnt/fs/dir")?;
    assert!(!Path::new(&h.on_disk("dir")).exists());
    Ok(())
}

#[test]
fn test_remove_missing_file_is_fatal() -> Result<()> {
    let h = initialized()?;
    let err = h.backend.remove("/mnt/fs/missing").unwrap_err();
    assert_eq!(err.errno(), Some(Errno::ENOENT));
    assert!(err.is_fatal());
    assert!(h.errors.has_fatal());
    Ok(())
}

#[test]
fn test_root_access_and_statfs() -> Result<()> {
    let h = initialized()?;

    // The mount root is always reachable
    assert!(h.backend.access(PREFIX, AccessMode::Exists)?);
    assert!(h.backend.access("/mnt/fs", AccessMode::Write)?);

    // statfs is not provided by the client
    let err = h.backend.statfs(PREFIX).unwrap_err();
    assert!(err.is_unsupported());
    assert_eq!(err.severity(), Severity::Warning);
    assert_eq!(h.errors.warning_count(), 1);
    Ok(())
}

#[test]
fn test_append_and_direct_rejected() -> Result<()> {
    let h = initialized()?;

    let flags = OpenFlags {
        append: true,
        ..OpenFlags::write_only()
    };
    let err = h.backend.create("/mnt/fs/log", flags).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFlags { .. }));
    assert_eq!(err.errno(), Some(Errno::EINVAL));

    let flags = OpenFlags {
        direct: true,
        ..OpenFlags::read_only()
    };
    assert!(h.backend.open("/mnt/fs/log", flags).is_err());
    assert!(!h.on_disk("log").exists());
    Ok(())
}

#[test]
fn test_read_only_create() -> Result<()> {
    let h = initialized()?;

    let handle = h.backend.create("/mnt/fs/ro", OpenFlags::read_only())?;
    let mut buf = [0u8; 8];
    assert_eq!(h.backend.xfer(&handle, Xfer::Read(&mut buf), 0)?, 0);
    h.backend.close(handle)?;

    assert!(h.on_disk("ro").is_file());
    assert_eq!(h.backend.get_file_size("/mnt/fs/ro")?, 0);
    assert!(!h.errors.has_fatal());
    Ok(())
}

#[test]
fn test_conflicting_access_modes_rejected() -> Result<()> {
    let h = initialized()?;
    std::fs::write(h.on_disk("existing"), b"data")?;

    let flags = OpenFlags {
        read_write: true,
        ..OpenFlags::write_only()
    };
    let err = h.backend.open("/mnt/fs/existing", flags).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFlags { .. }));
    assert!(matches!(
        h.backend.create("/mnt/fs/new", flags),
        Err(Error::UnsupportedFlags { .. })
    ));

    assert!(!h.on_disk("new").exists());
    assert!(!h.errors.has_fatal());
    Ok(())
}

#[test]
fn test_handle_from_previous_session_rejected() -> Result<()> {
    let h = initialized()?;
    let stale = h.backend.create("/mnt/fs/f", OpenFlags::write_only())?;

    h.backend.finalize()?;
    h.backend.initialize(&h.options()?)?;

    let err = h
        .backend
        .xfer(&stale, Xfer::Write(b"late"), 0)
        .unwrap_err();
    assert!(matches!(err, Error::StaleHandle { .. }));
    assert!(h.backend.close(stale).is_err());
    assert_eq!(std::fs::metadata(h.on_disk("f"))?.len(), 0);
    Ok(())
}

#[test]
fn test_lazy_option_warns_without_failing_open() -> Result<()> {
    let h = harness()?;
    let config_path = h.config_path.to_string_lossy().into_owned();
    let options = h.backend.options().parse([
        ("INFINIFS.config_path", config_path.as_str()),
        ("INFINIFS.prefix", PREFIX),
        ("INFINIFS.lazy", "true"),
    ])?;
    h.backend.initialize(&options)?;

    let handle = h.backend.create("/mnt/fs/lazy", OpenFlags::write_only())?;
    assert_eq!(h.backend.xfer(&handle, Xfer::Write(b"x"), 0)?, 1);
    h.backend.close(handle)?;

    let reports = h.errors.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].operation, Operation::LazyIo);
    assert_eq!(reports[0].severity, Severity::Warning);
    Ok(())
}
