//! Staging keys and the storage interface behind the transfer core.

use std::fmt;

use chrono::{DateTime, Utc};
use partrelay_protocol::CompletionRecord;

use crate::TransferError;

/// Entry-name suffix of a transfer's completion record.
pub const COMPLETION_SUFFIX: &str = "confirm";

/// Entry-name suffix of a transfer's reassembly lock.
pub const LOCK_SUFFIX: &str = "lock";

/// Identifies one transfer: `(deviceId, transferId)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferKey {
    device_id: String,
    transfer_id: String,
}

impl TransferKey {
    pub fn new(device_id: impl Into<String>, transfer_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            transfer_id: transfer_id.into(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }

    pub fn chunk(&self, part: u32) -> StagingKey {
        StagingKey {
            transfer: self.clone(),
            kind: EntryKind::Chunk(part),
        }
    }

    pub fn completion(&self) -> StagingKey {
        StagingKey {
            transfer: self.clone(),
            kind: EntryKind::Completion,
        }
    }

    pub fn lock(&self) -> StagingKey {
        StagingKey {
            transfer: self.clone(),
            kind: EntryKind::Lock,
        }
    }

    /// Returns the part number if `name` is a chunk entry of this transfer.
    pub fn part_of(&self, name: &str) -> Option<u32> {
        let suffix = name
            .strip_prefix(self.device_id.as_str())?
            .strip_prefix('.')?
            .strip_prefix(self.transfer_id.as_str())?
            .strip_prefix('.')?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        suffix.parse::<u32>().ok().filter(|part| *part > 0)
    }

    /// Counts the chunk entries of this transfer among `names`.
    pub(crate) fn count_chunks<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> u32 {
        names
            .into_iter()
            .filter(|name| self.part_of(name).is_some())
            .count() as u32
    }
}

impl fmt::Display for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_id, self.transfer_id)
    }
}

/// Kind of a staged entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Chunk(u32),
    Completion,
    Lock,
}

/// Address of one staged entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StagingKey {
    pub transfer: TransferKey,
    pub kind: EntryKind,
}

impl StagingKey {
    /// Entry name inside the staging area: `{deviceId}.{transferId}.{suffix}`.
    pub fn file_name(&self) -> String {
        let suffix = match self.kind {
            EntryKind::Chunk(part) => part.to_string(),
            EntryKind::Completion => COMPLETION_SUFFIX.to_string(),
            EntryKind::Lock => LOCK_SUFFIX.to_string(),
        };
        format!(
            "{}.{}.{}",
            self.transfer.device_id, self.transfer.transfer_id, suffix
        )
    }
}

impl fmt::Display for StagingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Durable staging of chunks and completion records.
///
/// Implementations hold no per-invocation state: every call goes straight
/// to the backing storage, which is the only thing shared between
/// concurrent invocations. Missing entries are reported as
/// [`TransferError::NotFound`].
pub trait StagingStore: Send + Sync {
    /// Creates whatever the backend needs before first use.
    fn prepare(&self) -> Result<(), TransferError> {
        Ok(())
    }

    /// Stores a chunk, replacing any earlier delivery of the same part.
    fn put_chunk(&self, transfer: &TransferKey, part: u32, data: &[u8])
    -> Result<(), TransferError>;

    fn read_chunk(&self, transfer: &TransferKey, part: u32) -> Result<Vec<u8>, TransferError>;

    /// Number of chunk entries currently staged for `transfer`.
    fn chunk_count(&self, transfer: &TransferKey) -> Result<u32, TransferError>;

    /// Stores the completion record, replacing an earlier one.
    fn put_completion_record(
        &self,
        transfer: &TransferKey,
        record: &CompletionRecord,
    ) -> Result<(), TransferError>;

    /// Returns `None` when the confirmation message has not arrived yet.
    fn read_completion_record(
        &self,
        transfer: &TransferKey,
    ) -> Result<Option<CompletionRecord>, TransferError>;

    /// Creates an empty entry only if none exists. Returns `false` when the
    /// entry was already present.
    fn try_create(&self, key: &StagingKey) -> Result<bool, TransferError>;

    fn remove(&self, key: &StagingKey) -> Result<(), TransferError>;

    /// Names of every entry in the staging area, of any transfer.
    fn list_entries(&self) -> Result<Vec<String>, TransferError>;

    fn created_at(&self, name: &str) -> Result<DateTime<Utc>, TransferError>;

    /// Moves an entry out of staging into quarantine under the same name.
    fn quarantine(&self, name: &str) -> Result<(), TransferError>;
}

pub(crate) fn encode_record(record: &CompletionRecord) -> Result<Vec<u8>, TransferError> {
    Ok(serde_json::to_vec(record)?)
}

pub(crate) fn decode_record(data: &[u8]) -> Result<CompletionRecord, TransferError> {
    Ok(serde_json::from_slice(data)?)
}
