//! Directory layout and artifact naming for reassembled transfers.
//!
//! Provides home-relative path expansion, directory preparation, and the
//! revision-suffix scheme that keeps a new artifact from overwriting an
//! existing one.

mod dirs;
mod revision;

pub use dirs::{ensure_dir, expand_home, resolve_dir};
pub use revision::{count_revisions, resolve_artifact_name, split_name};

/// Default base directory name under `$HOME`.
pub const DEFAULT_BASE_DIR: &str = "partrelay/files";

/// Errors produced by filesystem layout operations.
#[derive(Debug, thiserror::Error)]
pub enum FileOpsError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid artifact name: {0}")]
    InvalidName(String),
}

/// Returns the user's home directory.
fn home_dir() -> std::path::PathBuf {
    std::env::var("HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("/tmp"))
}
