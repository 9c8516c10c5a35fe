//! Staging store backed by a flat directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use partrelay_protocol::CompletionRecord;

use crate::TransferError;
use crate::store::{StagingKey, StagingStore, TransferKey, decode_record, encode_record};

/// Stages entries as files in `staging_dir`; quarantined entries are
/// renamed into `quarantine_dir`.
#[derive(Debug, Clone)]
pub struct FsStagingStore {
    staging_dir: PathBuf,
    quarantine_dir: PathBuf,
}

impl FsStagingStore {
    pub fn new(staging_dir: impl Into<PathBuf>, quarantine_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            quarantine_dir: quarantine_dir.into(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn quarantine_dir(&self) -> &Path {
        &self.quarantine_dir
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.staging_dir.join(name)
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, TransferError> {
        std::fs::read(self.path_of(name)).map_err(|e| not_found_or_io(e, name))
    }
}

impl StagingStore for FsStagingStore {
    fn prepare(&self) -> Result<(), TransferError> {
        partrelay_file_ops::ensure_dir(&self.staging_dir)?;
        partrelay_file_ops::ensure_dir(&self.quarantine_dir)?;
        Ok(())
    }

    fn put_chunk(
        &self,
        transfer: &TransferKey,
        part: u32,
        data: &[u8],
    ) -> Result<(), TransferError> {
        std::fs::write(self.path_of(&transfer.chunk(part).file_name()), data)?;
        Ok(())
    }

    fn read_chunk(&self, transfer: &TransferKey, part: u32) -> Result<Vec<u8>, TransferError> {
        self.read(&transfer.chunk(part).file_name())
    }

    fn chunk_count(&self, transfer: &TransferKey) -> Result<u32, TransferError> {
        let names = self.list_entries()?;
        Ok(transfer.count_chunks(names.iter().map(String::as_str)))
    }

    fn put_completion_record(
        &self,
        transfer: &TransferKey,
        record: &CompletionRecord,
    ) -> Result<(), TransferError> {
        let data = encode_record(record)?;
        std::fs::write(self.path_of(&transfer.completion().file_name()), data)?;
        Ok(())
    }

    fn read_completion_record(
        &self,
        transfer: &TransferKey,
    ) -> Result<Option<CompletionRecord>, TransferError> {
        match self.read(&transfer.completion().file_name()) {
            Ok(data) => {
                tracing::debug!(
                    transfer = %transfer,
                    record = %String::from_utf8_lossy(&data),
                    "completion record read"
                );
                decode_record(&data).map(Some)
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn try_create(&self, key: &StagingKey) -> Result<bool, TransferError> {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path_of(&key.file_name()))
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, key: &StagingKey) -> Result<(), TransferError> {
        let name = key.file_name();
        std::fs::remove_file(self.path_of(&name)).map_err(|e| not_found_or_io(e, &name))
    }

    fn list_entries(&self) -> Result<Vec<String>, TransferError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.staging_dir)? {
            // Entries can vanish between listing and inspection.
            let Ok(entry) = entry else { continue };
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn created_at(&self, name: &str) -> Result<DateTime<Utc>, TransferError> {
        let metadata = std::fs::metadata(self.path_of(name)).map_err(|e| not_found_or_io(e, name))?;
        // Not every filesystem records birth time.
        let time = metadata.created().or_else(|_| metadata.modified())?;
        Ok(DateTime::<Utc>::from(time))
    }

    fn quarantine(&self, name: &str) -> Result<(), TransferError> {
        std::fs::rename(self.path_of(name), self.quarantine_dir.join(name))
            .map_err(|e| not_found_or_io(e, name))
    }
}

fn not_found_or_io(err: std::io::Error, name: &str) -> TransferError {
    if err.kind() == ErrorKind::NotFound {
        TransferError::NotFound(name.to_string())
    } else {
        TransferError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use partrelay_protocol::Compression;
    use tempfile::TempDir;

    use super::*;

    fn store() -> (TempDir, FsStagingStore) {
        let dir = TempDir::new().unwrap();
        let store = FsStagingStore::new(dir.path().join("temp-uploads"), dir.path().join("dead-letter"));
        store.prepare().unwrap();
        (dir, store)
    }

    #[test]
    fn prepare_creates_directories() {
        let (_dir, store) = store();
        assert!(store.staging_dir().is_dir());
        assert!(store.quarantine_dir().is_dir());
    }

    #[test]
    fn chunk_write_read_and_overwrite() {
        let (_dir, store) = store();
        let t = TransferKey::new("D1", "T1");

        store.put_chunk(&t, 1, b"first").unwrap();
        store.put_chunk(&t, 1, b"second").unwrap();

        assert_eq!(store.read_chunk(&t, 1).unwrap(), b"second");
        assert_eq!(store.chunk_count(&t).unwrap(), 1);
        assert_eq!(
            std::fs::read(store.staging_dir().join("D1.T1.1")).unwrap(),
            b"second"
        );
    }

    #[test]
    fn missing_chunk_is_not_found() {
        let (_dir, store) = store();
        let t = TransferKey::new("D1", "T1");
        let err = store.read_chunk(&t, 4).unwrap_err();
        assert!(matches!(err, TransferError::NotFound(ref name) if name == "D1.T1.4"));
    }

    #[test]
    fn count_excludes_record_and_other_transfers() {
        let (_dir, store) = store();
        let t = TransferKey::new("D1", "T1");
        store.put_chunk(&t, 1, b"a").unwrap();
        store.put_chunk(&t, 2, b"b").unwrap();
        store.put_chunk(&TransferKey::new("D1", "T2"), 1, b"c").unwrap();
        store
            .put_completion_record(
                &t,
                &CompletionRecord {
                    max_part: 2,
                    compression: Compression::None,
                },
            )
            .unwrap();
        assert_eq!(store.chunk_count(&t).unwrap(), 2);
    }

    #[test]
    fn completion_record_roundtrip_and_absence() {
        let (_dir, store) = store();
        let t = TransferKey::new("D1", "T1");
        assert_eq!(store.read_completion_record(&t).unwrap(), None);

        let record = CompletionRecord {
            max_part: 3,
            compression: Compression::Deflate,
        };
        store.put_completion_record(&t, &record).unwrap();
        assert_eq!(store.read_completion_record(&t).unwrap(), Some(record));

        let raw = std::fs::read_to_string(store.staging_dir().join("D1.T1.confirm")).unwrap();
        assert_eq!(raw, r#"{"maxPart":3,"compression":"deflate"}"#);
    }

    #[test]
    fn corrupt_record_is_an_error() {
        let (_dir, store) = store();
        std::fs::write(store.staging_dir().join("D1.T1.confirm"), b"{not json").unwrap();
        let err = store
            .read_completion_record(&TransferKey::new("D1", "T1"))
            .unwrap_err();
        assert!(matches!(err, TransferError::Record(_)));
    }

    #[test]
    fn try_create_is_exclusive() {
        let (_dir, store) = store();
        let lock = TransferKey::new("D1", "T1").lock();
        assert!(store.try_create(&lock).unwrap());
        assert!(!store.try_create(&lock).unwrap());
        store.remove(&lock).unwrap();
        assert!(store.try_create(&lock).unwrap());
    }

    #[test]
    fn remove_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store
            .remove(&TransferKey::new("D1", "T1").chunk(1))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn quarantine_moves_entry() {
        let (_dir, store) = store();
        let t = TransferKey::new("D1", "T1");
        store.put_chunk(&t, 1, b"stale").unwrap();

        store.quarantine("D1.T1.1").unwrap();

        assert!(!store.staging_dir().join("D1.T1.1").exists());
        assert_eq!(
            std::fs::read(store.quarantine_dir().join("D1.T1.1")).unwrap(),
            b"stale"
        );
        assert!(store.quarantine("D1.T1.1").unwrap_err().is_not_found());
    }

    #[test]
    fn created_at_is_recent() {
        let (_dir, store) = store();
        store.put_chunk(&TransferKey::new("D1", "T1"), 1, b"x").unwrap();
        let created = store.created_at("D1.T1.1").unwrap();
        let age = Utc::now() - created;
        assert!(age < chrono::TimeDelta::minutes(5));
        assert!(store.created_at("missing").unwrap_err().is_not_found());
    }
}
