//! Per-message entry point: stage, detect completion, reassemble, clean up.

use std::path::PathBuf;

use chrono::{TimeDelta, Utc};
use partrelay_protocol::{CompletionRecord, ExportMessage, InboundMessage, MessageKind, Outcome};

use crate::TransferError;
use crate::cleanup::{RetryPolicy, Sleeper, ThreadSleeper, cleanup_transfer};
use crate::completeness::check_completeness;
use crate::reassembly::{ReassemblyJob, reassemble};
use crate::store::{StagingKey, StagingStore, TransferKey};
use crate::sweeper::{DEFAULT_RETENTION_HOURS, sweep_dead_letters};

/// Settings for [`Ingestor`].
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Root under which artifacts are written, by caller-relative path.
    pub upload_root: PathBuf,
    /// Age after which staged entries are quarantined.
    pub retention: TimeDelta,
    pub cleanup_retry: RetryPolicy,
    /// Take a per-transfer lock entry before reassembling.
    pub exclusive_reassembly: bool,
}

impl IngestConfig {
    pub fn new(upload_root: impl Into<PathBuf>) -> Self {
        Self {
            upload_root: upload_root.into(),
            retention: TimeDelta::hours(DEFAULT_RETENTION_HOURS),
            cleanup_retry: RetryPolicy::default(),
            exclusive_reassembly: false,
        }
    }
}

/// Handles inbound messages against a staging store.
///
/// Holds no per-transfer state; concurrent invocations only share the
/// store.
pub struct Ingestor<S> {
    store: S,
    config: IngestConfig,
    sleeper: Box<dyn Sleeper>,
}

impl<S: StagingStore> Ingestor<S> {
    pub fn new(store: S, config: IngestConfig) -> Self {
        Self::with_sleeper(store, config, Box::new(ThreadSleeper))
    }

    pub fn with_sleeper(store: S, config: IngestConfig, sleeper: Box<dyn Sleeper>) -> Self {
        Self {
            store,
            config,
            sleeper,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Extracts the message from an export document and handles it.
    pub fn handle_export(&self, export: ExportMessage) -> Outcome {
        match export.into_inbound() {
            Ok(msg) => self.handle(&msg),
            Err(e) => {
                tracing::warn!(error = %e, "rejected export message");
                Outcome::failure(e.to_string())
            }
        }
    }

    /// Handles one message and reports the outcome.
    ///
    /// A message that fails validation has no side effects. Otherwise the
    /// dead-letter sweep runs afterwards, whether dispatch succeeded or not.
    pub fn handle(&self, msg: &InboundMessage) -> Outcome {
        if let Err(e) = msg.validate() {
            tracing::warn!(error = %e, "rejected message");
            return Outcome::failure(e.to_string());
        }

        let transfer = TransferKey::new(msg.device_id.as_str(), msg.transfer_id.as_str());
        let span = tracing::info_span!("ingest", transfer = %transfer, part = msg.part);
        let _enter = span.enter();

        let result = self.prepare().and_then(|()| self.dispatch(&transfer, msg));

        let sweep = sweep_dead_letters(&self.store, self.config.retention, Utc::now());
        if !sweep.quarantined.is_empty() || sweep.errors > 0 {
            tracing::info!(
                quarantined = sweep.quarantined.len(),
                errors = sweep.errors,
                "dead-letter sweep finished"
            );
        }

        match result {
            Ok(()) => Outcome::success(),
            Err(e) => {
                tracing::error!(error = %e, "failed to handle message");
                Outcome::failure(e.to_string())
            }
        }
    }

    fn prepare(&self) -> Result<(), TransferError> {
        self.store.prepare()?;
        partrelay_file_ops::ensure_dir(&self.config.upload_root)?;
        Ok(())
    }

    fn dispatch(&self, transfer: &TransferKey, msg: &InboundMessage) -> Result<(), TransferError> {
        match &msg.kind {
            MessageKind::Chunk { payload } => {
                self.store.put_chunk(transfer, msg.part, payload.as_bytes())?;
                tracing::info!(bytes = payload.len(), "chunk staged");

                let Some(record) = self.store.read_completion_record(transfer)? else {
                    return Ok(());
                };
                let check = check_completeness(&self.store, transfer, record.max_part)?;
                if check.is_complete() {
                    self.finish(transfer, msg, record)?;
                } else {
                    tracing::debug!(
                        received = check.staged,
                        expected = check.expected,
                        "waiting for more parts"
                    );
                }
            }
            MessageKind::Completion {
                max_part,
                compression,
            } => {
                let record = CompletionRecord {
                    max_part: *max_part,
                    compression: *compression,
                };
                self.store.put_completion_record(transfer, &record)?;
                tracing::info!(max_part, %compression, "completion record staged");

                let check = check_completeness(&self.store, transfer, record.max_part)?;
                if check.is_complete() {
                    self.finish(transfer, msg, record)?;
                } else {
                    tracing::warn!(
                        received = check.staged,
                        expected = check.expected,
                        "missing message part"
                    );
                }
            }
        }
        Ok(())
    }

    fn finish(
        &self,
        transfer: &TransferKey,
        msg: &InboundMessage,
        record: CompletionRecord,
    ) -> Result<(), TransferError> {
        let _claim = if self.config.exclusive_reassembly {
            match ClaimGuard::acquire(&self.store, transfer)? {
                Some(claim) => Some(claim),
                None => {
                    tracing::info!("reassembly already claimed by another invocation");
                    return Ok(());
                }
            }
        } else {
            None
        };

        let destination_dir = self.config.upload_root.join(&msg.destination_dir);
        let artifact = reassemble(
            &self.store,
            &ReassemblyJob {
                transfer,
                record,
                destination_dir: &destination_dir,
                filename: &msg.destination_filename,
            },
        )?;

        let report = cleanup_transfer(
            &self.store,
            &self.config.cleanup_retry,
            self.sleeper.as_ref(),
            transfer,
            record.max_part,
        );
        if !report.is_clean() {
            tracing::warn!(
                left_behind = ?report.left_behind,
                "staged entries left for the dead-letter sweep"
            );
        }

        tracing::info!(
            path = %artifact.path.display(),
            size = artifact.size,
            "transfer complete"
        );
        Ok(())
    }
}

/// Exclusive reassembly claim, released on drop.
struct ClaimGuard<'a, S: StagingStore> {
    store: &'a S,
    key: StagingKey,
}

impl<'a, S: StagingStore> ClaimGuard<'a, S> {
    fn acquire(store: &'a S, transfer: &TransferKey) -> Result<Option<Self>, TransferError> {
        let key = transfer.lock();
        if store.try_create(&key)? {
            Ok(Some(Self { store, key }))
        } else {
            Ok(None)
        }
    }
}

impl<S: StagingStore> Drop for ClaimGuard<'_, S> {
    fn drop(&mut self) {
        match self.store.remove(&self.key) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::warn!(entry = %self.key, error = %e, "failed to release reassembly lock"),
        }
    }
}
