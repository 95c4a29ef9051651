//! AIORI Core - Foundation for the abstract I/O interface
//!
//! Provides the types every backend plugin and the benchmark driver share:
//! option schemas, mount-prefix normalization, the process error channel,
//! transfer hints, typed file handles and harness configuration.

pub mod config;
pub mod error;
pub mod hints;
pub mod options;
pub mod path;
pub mod reporter;
pub mod types;

pub use config::{HarnessConfig, LoggingConfig};
pub use error::{Errno, Error, Result, Severity};
pub use hints::{HintSlot, TransferHints};
pub use options::{ArgRequirement, OptionEntry, OptionKind, OptionSchema, OptionValue, OptionValues};
pub use path::{strip_mount_prefix, MountPrefix};
pub use reporter::{ErrorChannel, ErrorChannelHandle, Report};
pub use types::*;
