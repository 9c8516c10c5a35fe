//! Revision-suffix naming for artifacts that would collide with an
//! existing file.
//!
//! `report.csv` becomes `report.<n>.csv`, where `n` is one more than the
//! number of files already matching `report.*.csv`. The count is taken
//! without any locking, so two concurrent writers can pick the same
//! starting number.

use std::path::Path;

use crate::FileOpsError;

/// Splits a file name into stem and extension (extension keeps its dot).
///
/// Only the last dot separates the extension, and a leading dot does not
/// count: `archive.tar.gz` → (`archive.tar`, `.gz`), `.env` → (`.env`, ``).
pub fn split_name(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => filename.split_at(idx),
        _ => (filename, ""),
    }
}

/// Counts entries in `dir` whose names match `stem.*ext`.
///
/// The wildcard must match at least one character, so the unsuffixed
/// `stem` + `ext` name is never counted.
pub fn count_revisions(dir: &Path, stem: &str, ext: &str) -> Result<usize, FileOpsError> {
    let entries = std::fs::read_dir(dir).map_err(|source| FileOpsError::ReadDir {
        path: dir.display().to_string(),
        source,
    })?;

    let prefix = format!("{stem}.");
    let count = entries
        .flatten()
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.len() > prefix.len() + ext.len()
                && name.starts_with(&prefix)
                && name.ends_with(ext)
        })
        .count();
    Ok(count)
}

/// Picks the file name to write an artifact to inside `dir`.
///
/// Returns `filename` unchanged when nothing of that name exists. Otherwise
/// returns a revision name that does not currently exist.
pub fn resolve_artifact_name(dir: &Path, filename: &str) -> Result<String, FileOpsError> {
    if filename.is_empty() || filename.contains(['/', '\\']) {
        return Err(FileOpsError::InvalidName(filename.to_string()));
    }

    if !dir.join(filename).exists() {
        return Ok(filename.to_string());
    }

    let (stem, ext) = split_name(filename);
    let mut revision = count_revisions(dir, stem, ext)? + 1;
    let mut candidate = format!("{stem}.{revision}{ext}");
    while dir.join(&candidate).exists() {
        revision += 1;
        candidate = format!("{stem}.{revision}{ext}");
    }

    tracing::warn!(
        existing = filename,
        revision = %candidate,
        "artifact exists, writing a revision"
    );
    Ok(candidate)
}
