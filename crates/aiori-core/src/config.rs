//! Harness configuration types

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, TransferHints};

/// Main harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Backend name (or legacy alias) to look up in the registry
    pub backend: String,

    /// Raw backend option pairs, parsed against the backend's schema
    pub options: BTreeMap<String, String>,

    /// Transfer hints published to the backend before I/O
    pub hints: TransferHints,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            backend: "INFINIFS".to_string(),
            options: BTreeMap::new(),
            hints: TransferHints::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: HarnessConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfig {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        Self::from_json_str(&raw)
    }

    /// Check settings that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.backend.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "backend name must not be empty".to_string(),
            });
        }
        if self.hints.transfer_size == 0 {
            return Err(Error::InvalidConfig {
                message: "hints.transfer_size must be non-zero".to_string(),
            });
        }
        if self.hints.block_size % self.hints.transfer_size != 0 {
            return Err(Error::InvalidConfig {
                message: format!(
                    "hints.block_size ({}) must be a multiple of hints.transfer_size ({})",
                    self.hints.block_size, self.hints.transfer_size
                ),
            });
        }
        Ok(())
    }

    /// Option pairs in the shape `OptionSchema::parse` takes
    pub fn option_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing-subscriber` env-filter directive used when RUST_LOG is unset
    pub filter: String,

    /// Use the compact single-line formatter
    pub compact: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "aiori=info,aiori_core=info".to_string(),
            compact: false,
        }
    }
}
