//! Mount-prefix stripping
//!
//! Callers hand backends absolute paths such as `/mnt/fs/data/file1`; the
//! backend client wants them relative to its own root (`data/file1`).

use serde::{Deserialize, Serialize};

/// Strip `prefix` from the front of `path`.
///
/// Returns the remainder when `path` starts with exactly `prefix`, otherwise
/// `path` unchanged. Compares at most `prefix.len()` bytes and never allocates.
pub fn strip_mount_prefix<'a>(prefix: &str, path: &'a str) -> &'a str {
    path.strip_prefix(prefix).unwrap_or(path)
}

/// Configured mount prefix
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPrefix(String);

impl MountPrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Backend-relative view of `path`
    pub fn normalize<'a>(&self, path: &'a str) -> &'a str {
        strip_mount_prefix(&self.0, path)
    }
}
