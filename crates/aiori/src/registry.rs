//! Backend registry
//!
//! Built once at harness startup, immutable afterwards. Backends are looked up
//! by their name or legacy alias.

use std::collections::HashMap;
use std::sync::Arc;

use aiori_core::{Error, Result};
use tracing::info;

use crate::Aiori;

/// Shared handle to a registered backend
pub type BackendHandle = Arc<dyn Aiori>;

/// Immutable name → backend lookup table
pub struct BackendRegistry {
    /// Backends in registration order
    backends: Vec<BackendHandle>,

    /// Name and legacy alias → index into `backends`
    index: HashMap<&'static str, usize>,
}

impl BackendRegistry {
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::new()
    }

    /// Look a backend up by name or legacy alias
    pub fn get(&self, name: &str) -> Result<BackendHandle> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.backends[i]))
            .ok_or_else(|| Error::UnknownBackend {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Primary names in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Backends that support metadata-heavy workloads
    pub fn mdtest_capable(&self) -> Vec<&'static str> {
        self.backends
            .iter()
            .filter(|b| b.enable_mdtest())
            .map(|b| b.name())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Builder for BackendRegistry
#[derive(Default)]
pub struct BackendRegistryBuilder {
    backends: Vec<BackendHandle>,
}

impl BackendRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend
    pub fn register(mut self, backend: BackendHandle) -> Self {
        self.backends.push(backend);
        self
    }

    /// Build the registry, rejecting duplicate names and aliases
    pub fn build(self) -> Result<BackendRegistry> {
        let mut index = HashMap::new();
        for (i, backend) in self.backends.iter().enumerate() {
            let keys = std::iter::once(backend.name()).chain(backend.legacy_name());
            for key in keys {
                if index.insert(key, i).is_some() {
                    return Err(Error::DuplicateBackend {
                        name: key.to_string(),
                    });
                }
            }
            info!(
                backend = backend.name(),
                legacy = ?backend.legacy_name(),
                version = backend.version(),
                "Backend registered"
            );
        }

        Ok(BackendRegistry {
            backends: self.backends,
            index,
        })
    }
}
