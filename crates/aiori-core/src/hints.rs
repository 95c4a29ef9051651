//! Transfer hints published by the driver before transfers

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// I/O pattern description the driver publishes ahead of `xfer` calls
///
/// Backends only read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferHints {
    /// Skip the actual I/O and report full transfers
    pub dry_run: bool,

    /// Each task works on its own file
    pub file_per_proc: bool,

    /// Collective I/O requested
    pub collective: bool,

    /// Number of tasks in the job
    pub num_tasks: u32,

    /// Number of nodes in the job
    pub num_nodes: u32,

    /// Offsets are randomized rather than sequential
    pub random_offset: bool,

    /// Flush after every write transfer
    pub fsync_per_write: bool,

    /// Segments per file
    pub segment_count: u64,

    /// Bytes per task per segment
    pub block_size: u64,

    /// Bytes per transfer call
    pub transfer_size: u64,

    /// Expected aggregate file size
    pub expected_agg_file_size: u64,

    /// Do not retry the remainder of a short transfer
    pub single_xfer_attempt: bool,
}

impl Default for TransferHints {
    fn default() -> Self {
        Self {
            dry_run: false,
            file_per_proc: false,
            collective: false,
            num_tasks: 1,
            num_nodes: 1,
            random_offset: false,
            fsync_per_write: false,
            segment_count: 1,
            block_size: 1024 * 1024,   // 1MB
            transfer_size: 256 * 1024, // 256KB
            expected_agg_file_size: 0,
            single_xfer_attempt: false,
        }
    }
}

/// Slot a backend keeps the most recently published hints in
#[derive(Debug, Default)]
pub struct HintSlot {
    current: RwLock<Option<Arc<TransferHints>>>,
}

impl HintSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published hints
    pub fn publish(&self, hints: Arc<TransferHints>) {
        *self.current.write() = Some(hints);
    }

    /// Currently published hints, if the driver published any
    pub fn current(&self) -> Option<Arc<TransferHints>> {
        self.current.read().clone()
    }

    /// Published hints or the defaults
    pub fn current_or_default(&self) -> Arc<TransferHints> {
        self.current().unwrap_or_default()
    }
}
