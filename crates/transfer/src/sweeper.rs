//! Dead-letter sweep of abandoned staging entries.

use chrono::{DateTime, TimeDelta, Utc};

use crate::store::StagingStore;

/// Age after which a staged entry is considered abandoned.
pub const DEFAULT_RETENTION_HOURS: i64 = 12;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub quarantined: Vec<String>,
    pub errors: usize,
}

/// Moves every staged entry created before `now - retention` into
/// quarantine, whatever transfer it belongs to.
///
/// Entries that vanish mid-sweep are skipped. Other failures are logged
/// and counted but never returned, so a sweep cannot fail the invocation
/// that triggered it.
pub fn sweep_dead_letters<S: StagingStore + ?Sized>(
    store: &S,
    retention: TimeDelta,
    now: DateTime<Utc>,
) -> SweepReport {
    let mut report = SweepReport::default();
    let cutoff = now - retention;

    let names = match store.list_entries() {
        Ok(names) => names,
        Err(e) => {
            tracing::error!(error = %e, "failed to list staging entries");
            report.errors += 1;
            return report;
        }
    };

    for name in names {
        let created = match store.created_at(&name) {
            Ok(created) => created,
            Err(e) if e.is_not_found() => continue,
            Err(e) => {
                tracing::warn!(entry = %name, error = %e, "failed to read entry age");
                report.errors += 1;
                continue;
            }
        };
        if created >= cutoff {
            continue;
        }
        match store.quarantine(&name) {
            Ok(()) => {
                tracing::info!(entry = %name, created = %created, "moved abandoned entry to dead letter");
                report.quarantined.push(name);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                tracing::warn!(entry = %name, error = %e, "failed to quarantine entry");
                report.errors += 1;
            }
        }
    }

    report
}
