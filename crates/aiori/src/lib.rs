//! AIORI - Abstract I/O interface backends
//!
//! A benchmark driver talks to storage through the [`Aiori`] trait and never
//! sees the concrete backend. This crate provides:
//! - The trait and the registry the driver resolves backends from
//! - The INFINIFS backend, generic over its mount client
//! - A local-directory mount client (`local` feature)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use aiori::{default_registry, Aiori};
//! use aiori_core::{ErrorChannel, OpenFlags, Xfer};
//!
//! let errors = Arc::new(ErrorChannel::new());
//! let registry = default_registry(errors)?;
//! let backend = registry.get("INFINIFS")?;
//!
//! let options = backend.options().parse([
//!     ("INFINIFS.config_path", "/etc/infinifs/client.json"),
//!     ("INFINIFS.prefix", "/mnt/fs"),
//! ])?;
//! backend.initialize(&options)?;
//!
//! let handle = backend.create("/mnt/fs/testfile", OpenFlags::write_only())?;
//! backend.xfer(&handle, Xfer::Write(b"payload"), 0)?;
//! backend.close(handle)?;
//! backend.finalize()?;
//! # Ok::<(), aiori_core::Error>(())
//! ```

mod backend;
pub mod client;
pub mod infinifs;
pub mod lifecycle;
#[cfg(feature = "local")]
pub mod local;
pub mod registry;

pub use backend::Aiori;
pub use client::{ClientResult, Connector, MountClient};
pub use infinifs::{InfiniFs, InfiniFsSettings, INFINIFS_NAME};
pub use lifecycle::LifecycleState;
pub use registry::{BackendHandle, BackendRegistry, BackendRegistryBuilder};

#[cfg(feature = "local")]
pub use local::{LocalClientConfig, LocalConnector, LocalMount};

/// Registry holding every backend this build ships
#[cfg(feature = "local")]
pub fn default_registry(
    errors: aiori_core::ErrorChannelHandle,
) -> aiori_core::Result<BackendRegistry> {
    BackendRegistry::builder()
        .register(std::sync::Arc::new(InfiniFs::new(LocalConnector::new(), errors)))
        .build()
}
