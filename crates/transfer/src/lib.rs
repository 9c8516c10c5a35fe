//! Multi-part transfer reassembly.
//!
//! Chunks and confirmation records are staged per `(deviceId, transferId)`.
//! Once every part is staged the parts are decoded, concatenated into the
//! artifact, and the staging entries are removed. Entries that outlive the
//! retention window are moved to a quarantine directory.

mod cleanup;
mod completeness;
mod fs_store;
mod ingest;
mod memory;
mod reassembly;
mod store;
mod sweeper;

pub use cleanup::{CleanupReport, RetryPolicy, Sleeper, ThreadSleeper, cleanup_transfer};
pub use completeness::{Completeness, check_completeness};
pub use fs_store::FsStagingStore;
pub use ingest::{IngestConfig, Ingestor};
pub use memory::MemoryStagingStore;
pub use reassembly::{Artifact, ReassemblyJob, decode_part, reassemble};
pub use store::{EntryKind, StagingKey, StagingStore, TransferKey};
pub use sweeper::{DEFAULT_RETENTION_HOURS, SweepReport, sweep_dead_letters};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("staged entry not found: {0}")]
    NotFound(String),

    #[error("invalid completion record: {0}")]
    Record(#[from] serde_json::Error),

    #[error("part {part} is not valid base64: {source}")]
    Decode {
        part: u32,
        #[source]
        source: base64::DecodeError,
    },

    #[error("part {part} could not be inflated: {source}")]
    Inflate {
        part: u32,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    FileOps(#[from] partrelay_file_ops::FileOpsError),
}

impl TransferError {
    /// Returns `true` if the error means the entry does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
