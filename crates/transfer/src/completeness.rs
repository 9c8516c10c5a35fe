use crate::TransferError;
use crate::store::{StagingStore, TransferKey};

/// Point-in-time comparison of staged chunks against the declared count.
///
/// Nothing stops another invocation from staging or removing parts right
/// after the count is taken, so two invocations can both observe a
/// complete transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completeness {
    pub staged: u32,
    pub expected: u32,
}

impl Completeness {
    pub fn is_complete(&self) -> bool {
        self.staged == self.expected
    }
}

/// Counts the staged chunks of `transfer` against `max_part`.
pub fn check_completeness<S: StagingStore + ?Sized>(
    store: &S,
    transfer: &TransferKey,
    max_part: u32,
) -> Result<Completeness, TransferError> {
    let staged = store.chunk_count(transfer)?;
    Ok(Completeness {
        staged,
        expected: max_part,
    })
}
