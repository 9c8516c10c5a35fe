use std::collections::{BTreeMap, btree_map};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use partrelay_protocol::CompletionRecord;

use crate::TransferError;
use crate::store::{StagingKey, StagingStore, TransferKey, decode_record, encode_record};

#[derive(Debug, Clone)]
struct StagedBytes {
    data: Vec<u8>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    staged: BTreeMap<String, StagedBytes>,
    quarantined: BTreeMap<String, StagedBytes>,
}

/// In-memory staging store (thread-safe).
///
/// Uses the same entry names as [`FsStagingStore`](crate::FsStagingStore);
/// an overwritten entry keeps its original creation time.
#[derive(Debug, Default)]
pub struct MemoryStagingStore {
    inner: Mutex<Inner>,
}

impl MemoryStagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, name: String, data: Vec<u8>) {
        match self.lock().staged.entry(name) {
            btree_map::Entry::Occupied(mut staged) => staged.get_mut().data = data,
            btree_map::Entry::Vacant(slot) => {
                slot.insert(StagedBytes {
                    data,
                    created_at: Utc::now(),
                });
            }
        }
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, TransferError> {
        self.lock()
            .staged
            .get(name)
            .map(|e| e.data.clone())
            .ok_or_else(|| TransferError::NotFound(name.to_string()))
    }

    /// Overrides the creation time of a staged entry. Returns `false` if
    /// the entry does not exist.
    pub fn set_created_at(&self, name: &str, at: DateTime<Utc>) -> bool {
        match self.lock().staged.get_mut(name) {
            Some(entry) => {
                entry.created_at = at;
                true
            }
            None => false,
        }
    }

    /// Returns `true` if `name` is currently staged.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().staged.contains_key(name)
    }

    /// Names of quarantined entries, sorted.
    pub fn quarantined(&self) -> Vec<String> {
        self.lock().quarantined.keys().cloned().collect()
    }
}

impl StagingStore for MemoryStagingStore {
    fn put_chunk(
        &self,
        transfer: &TransferKey,
        part: u32,
        data: &[u8],
    ) -> Result<(), TransferError> {
        self.write(transfer.chunk(part).file_name(), data.to_vec());
        Ok(())
    }

    fn read_chunk(&self, transfer: &TransferKey, part: u32) -> Result<Vec<u8>, TransferError> {
        self.read(&transfer.chunk(part).file_name())
    }

    fn chunk_count(&self, transfer: &TransferKey) -> Result<u32, TransferError> {
        let inner = self.lock();
        Ok(transfer.count_chunks(inner.staged.keys().map(String::as_str)))
    }

    fn put_completion_record(
        &self,
        transfer: &TransferKey,
        record: &CompletionRecord,
    ) -> Result<(), TransferError> {
        self.write(transfer.completion().file_name(), encode_record(record)?);
        Ok(())
    }

    fn read_completion_record(
        &self,
        transfer: &TransferKey,
    ) -> Result<Option<CompletionRecord>, TransferError> {
        match self.read(&transfer.completion().file_name()) {
            Ok(data) => decode_record(&data).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn try_create(&self, key: &StagingKey) -> Result<bool, TransferError> {
        let mut inner = self.lock();
        let name = key.file_name();
        if inner.staged.contains_key(&name) {
            return Ok(false);
        }
        inner.staged.insert(
            name,
            StagedBytes {
                data: Vec::new(),
                created_at: Utc::now(),
            },
        );
        Ok(true)
    }

    fn remove(&self, key: &StagingKey) -> Result<(), TransferError> {
        let name = key.file_name();
        match self.lock().staged.remove(&name) {
            Some(_) => Ok(()),
            None => Err(TransferError::NotFound(name)),
        }
    }

    fn list_entries(&self) -> Result<Vec<String>, TransferError> {
        Ok(self.lock().staged.keys().cloned().collect())
    }

    fn created_at(&self, name: &str) -> Result<DateTime<Utc>, TransferError> {
        self.lock()
            .staged
            .get(name)
            .map(|e| e.created_at)
            .ok_or_else(|| TransferError::NotFound(name.to_string()))
    }

    fn quarantine(&self, name: &str) -> Result<(), TransferError> {
        let mut inner = self.lock();
        let entry = inner
            .staged
            .remove(name)
            .ok_or_else(|| TransferError::NotFound(name.to_string()))?;
        inner.quarantined.insert(name.to_string(), entry);
        Ok(())
    }
}
