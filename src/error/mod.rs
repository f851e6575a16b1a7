use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::extract::Field;

/// Failures that abort a sweep.
#[derive(Debug, Error)]
pub enum SweepError {
    /// The benchmark executable could not be started.
    #[error("failed to launch benchmark '{}': {source}", .executable.display())]
    Launch {
        executable: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A run finished without printing one of the required fields.
    #[error("run {index} did not report field \"{}\"", .field.label())]
    MissingField { index: u32, field: Field },

    /// A run did not close its output before the deadline.
    #[error("run {index} did not finish within {after:?}")]
    Timeout { index: u32, after: Duration },

    #[error("invalid sweep range {start}..{end}: {reason}")]
    InvalidRange { start: u32, end: u32, reason: &'static str },

    #[error("failed to pin to core {core_id}: {source}")]
    Affinity {
        core_id: usize,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to serialize results: {0}")]
    Json(#[from] serde_json::Error),
}
