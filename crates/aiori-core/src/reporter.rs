//! Process error channel shared by the driver and every backend
//!
//! Backends push each client failure through [`ErrorChannel::report`]; the
//! driver reads the last errno, the per-severity counters and the recent
//! reports to decide whether to abort, skip or degrade.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::{Errno, Error, Operation, Severity};

/// Number of reports kept for inspection
const REPORT_HISTORY: usize = 256;

/// A single failure or warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub backend: String,
    pub operation: Operation,
    pub errno: Option<Errno>,
    pub severity: Severity,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Shared error/warning channel
#[derive(Debug, Default)]
pub struct ErrorChannel {
    /// Last reported errno; 0 when nothing has been reported
    last_errno: AtomicI32,
    warnings: AtomicU64,
    errors: AtomicU64,
    fatals: AtomicU64,
    history: Mutex<VecDeque<Report>>,
}

/// Thread-safe handle to the error channel
pub type ErrorChannelHandle = Arc<ErrorChannel>;

impl ErrorChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and emit it as a tracing event
    pub fn report(
        &self,
        backend: &str,
        operation: Operation,
        errno: Option<Errno>,
        severity: Severity,
        message: impl Into<String>,
    ) {
        let message = message.into();

        if let Some(errno) = errno {
            self.last_errno.store(errno.0, Ordering::SeqCst);
        }

        match severity {
            Severity::Warning => {
                self.warnings.fetch_add(1, Ordering::Relaxed);
                warn!(backend, %operation, errno = ?errno.map(|e| e.0), "{}", message);
            }
            Severity::Error => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                error!(backend, %operation, errno = ?errno.map(|e| e.0), "{}", message);
            }
            Severity::Fatal => {
                self.fatals.fetch_add(1, Ordering::Relaxed);
                error!(backend, %operation, errno = ?errno.map(|e| e.0), fatal = true, "{}", message);
            }
        }

        let mut history = self.history.lock();
        if history.len() == REPORT_HISTORY {
            history.pop_front();
        }
        history.push_back(Report {
            backend: backend.to_string(),
            operation,
            errno,
            severity,
            message,
            at: Utc::now(),
        });
    }

    /// Record `err` with its own severity and hand it back for propagation
    pub fn raise(&self, backend: &str, operation: Operation, err: Error) -> Error {
        self.report(backend, operation, err.errno(), err.severity(), err.to_string());
        err
    }

    /// Last reported errno, if any
    pub fn last_errno(&self) -> Option<Errno> {
        match self.last_errno.load(Ordering::SeqCst) {
            0 => None,
            code => Some(Errno(code)),
        }
    }

    pub fn warning_count(&self) -> u64 {
        self.warnings.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn fatal_count(&self) -> u64 {
        self.fatals.load(Ordering::Relaxed)
    }

    /// True once any fatal failure has been reported
    pub fn has_fatal(&self) -> bool {
        self.fatal_count() > 0
    }

    /// Copy of the recent reports, oldest first
    pub fn reports(&self) -> Vec<Report> {
        self.history.lock().iter().cloned().collect()
    }

    /// Take the recent reports, leaving the history empty
    pub fn drain(&self) -> Vec<Report> {
        self.history.lock().drain(..).collect()
    }
}
