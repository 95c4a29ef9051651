//! Smoke-test binary
//!
//! Loads a harness config, resolves the configured backend and drives one
//! pass over every operation of the interface.

use std::error::Error;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aiori::{default_registry, Aiori};
use aiori_core::{AccessMode, ErrorChannel, FileHandle, HarnessConfig, OpenFlags, Xfer};

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = match std::env::args().nth(1) {
        Some(path) => HarnessConfig::from_json_file(path)?,
        None => {
            eprintln!("usage: aiori-smoke <harness-config.json>");
            std::process::exit(2);
        }
    };

    let compact = config.logging.compact;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.clone().into()),
        )
        .with(compact.then(|| tracing_subscriber::fmt::layer().compact()))
        .with((!compact).then(tracing_subscriber::fmt::layer))
        .init();

    let errors = Arc::new(ErrorChannel::new());
    let registry = default_registry(Arc::clone(&errors))?;
    let backend = registry.get(&config.backend)?;
    tracing::info!(backend = backend.name(), version = backend.version(), "Backend resolved");

    let options = backend.options().parse(config.option_pairs())?;
    backend.initialize(&options)?;
    backend.xfer_hints(Arc::new(config.hints.clone()));

    let result = exercise(backend.as_ref(), &config);
    backend.finalize()?;
    result?;

    tracing::info!(
        warnings = errors.warning_count(),
        errors = errors.error_count(),
        fatals = errors.fatal_count(),
        "Smoke run complete"
    );
    Ok(())
}

/// Write `payload` repeatedly until `block_size` bytes landed or a write
/// makes no progress; returns the bytes written
fn write_block(
    backend: &dyn Aiori,
    handle: &FileHandle,
    payload: &[u8],
    block_size: u64,
) -> aiori_core::Result<u64> {
    let mut offset = 0u64;
    while offset < block_size {
        let written = backend.xfer(handle, Xfer::Write(payload), offset)?;
        if written == 0 {
            tracing::warn!(offset, "Write made no progress, stopping transfer pass");
            break;
        }
        offset += written;
    }
    Ok(offset)
}

/// One pass over every operation under `<prefix>/aiori-smoke`
fn exercise(
    backend: &dyn Aiori,
    config: &HarnessConfig,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let prefix = config
        .options
        .get("INFINIFS.prefix")
        .map(|p| p.trim_end_matches('/'))
        .unwrap_or("");
    let dir = format!("{}/aiori-smoke", prefix);
    let file = format!("{}/data", dir);
    let renamed = format!("{}/data.renamed", dir);

    backend.mkdir(&dir, 0o755)?;

    let payload = vec![0xA5u8; config.hints.transfer_size as usize];
    let handle = backend.create(&file, OpenFlags::write_only())?;
    let offset = write_block(backend, &handle, &payload, config.hints.block_size)?;
    backend.fsync(&handle)?;
    backend.close(handle)?;

    let handle = backend.open(&file, OpenFlags::read_only())?;
    let mut buf = vec![0u8; payload.len()];
    let read = backend.xfer(&handle, Xfer::Read(&mut buf), 0)?;
    backend.close(handle)?;
    tracing::info!(written = offset, read, "Transfer pass done");

    let stat = backend.stat(&file)?;
    tracing::info!(size = stat.size, mode = format!("{:o}", stat.mode), "Stat");

    backend.rename(&file, &renamed)?;
    let size = backend.get_file_size(&renamed)?;
    let visible = backend.access(&renamed, AccessMode::Read)?;
    tracing::info!(size, visible, "Renamed");

    backend.sync()?;
    if let Err(e) = backend.statfs(&dir) {
        tracing::warn!(error = %e, "statfs not available");
    }

    backend.remove(&renamed)?;
    backend.rmdir(&dir)?;
    Ok(())
}
