//! Base directory resolution and preparation.

use std::path::{Path, PathBuf};

use crate::FileOpsError;

/// Resolves a configured directory against a base path.
///
/// Absolute and `~`-prefixed values are used as-is (after expansion);
/// anything else is joined onto `base`.
pub fn resolve_dir(base: &Path, configured: &str) -> PathBuf {
    let expanded = expand_home(configured);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

/// Ensures a directory exists, creating it and any missing parents.
pub fn ensure_dir(path: &Path) -> Result<(), FileOpsError> {
    if path.is_dir() {
        return Ok(());
    }

    std::fs::create_dir_all(path).map_err(|source| FileOpsError::CreateDir {
        path: path.display().to_string(),
        source,
    })?;

    tracing::debug!(path = %path.display(), "created directory");
    Ok(())
}

/// Expands `~` prefix to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        crate::home_dir().join(rest)
    } else if path == "~" {
        crate::home_dir()
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_relative_joins_base() {
        let path = resolve_dir(Path::new("/srv/files"), "temp-uploads");
        assert_eq!(path, PathBuf::from("/srv/files/temp-uploads"));
    }

    #[test]
    fn resolve_absolute_ignores_base() {
        let path = resolve_dir(Path::new("/srv/files"), "/var/quarantine");
        assert_eq!(path, PathBuf::from("/var/quarantine"));
    }

    #[test]
    fn expand_home_tilde() {
        // Absolute paths pass through unchanged.
        assert_eq!(
            expand_home("/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        let expanded = expand_home("~/partrelay");
        assert!(
            expanded.to_string_lossy().ends_with("/partrelay"),
            "expected path ending with /partrelay, got {expanded:?}"
        );
        assert!(!expand_home("~").to_string_lossy().contains('~'));
    }

    #[test]
    fn ensure_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("file-uploads").join("myDevice").join("video");
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());

        // Second call is a no-op.
        ensure_dir(&dir).unwrap();
    }

    #[test]
    fn ensure_dir_fails_over_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();
        let result = ensure_dir(&file.join("child"));
        assert!(matches!(result, Err(FileOpsError::CreateDir { .. })));
    }
}
