use std::sync::Arc;
use std::thread;

use aiori::{default_registry, Aiori, BackendHandle, LocalClientConfig};
use aiori_core::{ErrorChannel, HarnessConfig, OpenFlags, TransferHints, Xfer};
use anyhow::Result;
use tempfile::TempDir;
use tracing::info;

// Resolve and initialize the backend named by a harness config document
fn start_backend(config: &HarnessConfig) -> Result<(BackendHandle, Arc<ErrorChannel>)> {
    let errors = Arc::new(ErrorChannel::new());
    let backend = default_registry(Arc::clone(&errors))?.get(&config.backend)?;
    let options = backend.options().parse(config.option_pairs())?;
    backend.initialize(&options)?;
    backend.xfer_hints(Arc::new(config.hints.clone()));
    Ok((backend, errors))
}

fn harness_config(temp_dir: &TempDir, hints: serde_json::Value) -> Result<HarnessConfig> {
    let cluster = temp_dir.path().join("cluster");
    std::fs::create_dir_all(&cluster)?;
    let client_config = temp_dir.path().join("client.json");
    LocalClientConfig::new(&cluster).write_to(&client_config)?;

    let doc = serde_json::json!({
        "backend": "INFINIFS",
        "options": {
            "INFINIFS.config_path": client_config,
            "INFINIFS.prefix": "/ior",
        },
        "hints": hints,
    });
    Ok(HarnessConfig::from_json_str(&doc.to_string())?)
}

// One task's write phase: block_size bytes in transfer_size pieces
fn write_block(
    backend: &dyn Aiori,
    path: &str,
    flags: OpenFlags,
    hints: &TransferHints,
    base: u64,
    fill: u8,
) -> Result<u64> {
    let handle = backend.create(path, flags)?;
    let payload = vec![fill; hints.transfer_size as usize];
    let mut written = 0;
    while written < hints.block_size {
        written += backend.xfer(&handle, Xfer::Write(&payload), base + written)?;
    }
    backend.close(handle)?;
    Ok(written)
}

#[test]
fn test_file_per_process_write_and_verify() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let temp_dir = TempDir::new()?;
    let config = harness_config(
        &temp_dir,
        serde_json::json!({
            "file_per_proc": true,
            "num_tasks": 4,
            "block_size": 65536,
            "transfer_size": 16384,
        }),
    )?;
    let (backend, errors) = start_backend(&config)?;
    let run = uuid::Uuid::new_v4();
    let dir = format!("/ior/run-{}", run);
    backend.mkdir(&dir, 0o755)?;

    // 1. Every task writes its own file concurrently
    let hints = &config.hints;
    let totals: Vec<u64> = thread::scope(|s| {
        let workers: Vec<_> = (0..hints.num_tasks)
            .map(|rank| {
                let backend = Arc::clone(&backend);
                let path = format!("{}/testfile.{:08}", dir, rank);
                s.spawn(move || {
                    write_block(
                        backend.as_ref(),
                        &path,
                        OpenFlags::write_only(),
                        hints,
                        0,
                        rank as u8,
                    )
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().expect("worker panicked"))
            .collect::<Result<_>>()
    })?;
    assert!(totals.iter().all(|&t| t == hints.block_size));

    // 2. Read each file back and check its fill byte
    for rank in 0..hints.num_tasks {
        let path = format!("{}/testfile.{:08}", dir, rank);
        assert_eq!(backend.get_file_size(&path)?, hints.block_size);

        let handle = backend.open(&path, OpenFlags::read_only())?;
        let mut buf = vec![0u8; hints.block_size as usize];
        assert_eq!(backend.xfer(&handle, Xfer::Read(&mut buf), 0)?, hints.block_size);
        assert!(buf.iter().all(|&b| b == rank as u8));
        backend.close(handle)?;
        backend.remove(&path)?;
    }

    backend.rmdir(&dir)?;
    backend.finalize()?;
    assert_eq!(errors.reports().len(), 0);
    info!(%run, tasks = hints.num_tasks, "File-per-process pass verified");
    Ok(())
}

#[test]
fn test_shared_file_segments() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = harness_config(
        &temp_dir,
        serde_json::json!({
            "num_tasks": 3,
            "segment_count": 2,
            "block_size": 8192,
            "transfer_size": 4096,
            "fsync_per_write": true,
        }),
    )?;
    let (backend, _errors) = start_backend(&config)?;
    let hints = &config.hints;
    let path = "/ior/shared";

    // Create the shared file once before the tasks open it
    backend.close(backend.create(path, OpenFlags::write_only())?)?;

    thread::scope(|s| {
        let workers: Vec<_> = (0..hints.num_tasks as u64)
            .map(|rank| {
                let backend = Arc::clone(&backend);
                s.spawn(move || -> Result<()> {
                    for segment in 0..hints.segment_count {
                        let base =
                            (segment * hints.num_tasks as u64 + rank) * hints.block_size;
                        write_block(
                            backend.as_ref(),
                            path,
                            OpenFlags::write_only(),
                            hints,
                            base,
                            b'a' + rank as u8,
                        )?;
                    }
                    Ok(())
                })
            })
            .collect();
        workers
            .into_iter()
            .try_for_each(|w| w.join().expect("worker panicked"))
    })?;

    let expected = hints.segment_count * hints.num_tasks as u64 * hints.block_size;
    assert_eq!(backend.get_file_size(path)?, expected);

    // Second segment of rank 1
    let handle = backend.open(path, OpenFlags::read_only())?;
    let mut buf = vec![0u8; hints.block_size as usize];
    let offset = (hints.num_tasks as u64 + 1) * hints.block_size;
    backend.xfer(&handle, Xfer::Read(&mut buf), offset)?;
    assert!(buf.iter().all(|&b| b == b'b'));
    backend.close(handle)?;

    backend.finalize()?;
    Ok(())
}

#[test]
fn test_dry_run_touches_nothing() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = harness_config(
        &temp_dir,
        serde_json::json!({ "dry_run": true, "block_size": 4096, "transfer_size": 1024 }),
    )?;
    let (backend, _errors) = start_backend(&config)?;

    let written = write_block(
        backend.as_ref(),
        "/ior/dry",
        OpenFlags::write_only(),
        &config.hints,
        0,
        0xFF,
    )?;
    assert_eq!(written, 4096);

    // The file was created but no bytes reached it
    assert_eq!(backend.get_file_size("/ior/dry")?, 0);
    backend.finalize()?;
    Ok(())
}

#[test]
fn test_invalid_harness_config_rejected() {
    let doc = r#"{ "backend": "INFINIFS", "hints": { "block_size": 1000, "transfer_size": 300 } }"#;
    assert!(HarnessConfig::from_json_str(doc).is_err());

    let doc = r#"{ "backend": "NOPE" }"#;
    let config = HarnessConfig::from_json_str(doc).unwrap();
    let registry = default_registry(Arc::new(ErrorChannel::new())).unwrap();
    assert!(registry.get(&config.backend).is_err());
}
