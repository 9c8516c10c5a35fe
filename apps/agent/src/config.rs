//! Agent configuration management.
//!
//! Configuration is stored as TOML, at `$PARTRELAY_CONFIG` when set, else:
//! - Linux: `~/.config/partrelay/agent.toml`
//! - Windows: `%APPDATA%/partrelay/agent.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use partrelay_transfer::{FsStagingStore, IngestConfig, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "PARTRELAY_CONFIG";

/// Agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Socket address of the HTTP trigger.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Root that relative directories below are resolved against.
    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    /// Where chunks and completion records are staged.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Where reassembled artifacts are written.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// Where abandoned staging entries are moved.
    #[serde(default = "default_quarantine_dir")]
    pub quarantine_dir: String,

    #[serde(default = "default_dead_letter_after_hours")]
    pub dead_letter_after_hours: u32,

    #[serde(default = "default_cleanup_max_attempts")]
    pub cleanup_max_attempts: u32,

    #[serde(default = "default_cleanup_retry_delay_ms")]
    pub cleanup_retry_delay_ms: u64,

    /// Serialize reassembly of a transfer through a lock entry.
    #[serde(default)]
    pub exclusive_reassembly: bool,
}

fn default_listen_addr() -> String {
    "0.0.0.0:7071".into()
}

fn default_base_dir() -> String {
    format!("~/{}", partrelay_file_ops::DEFAULT_BASE_DIR)
}

fn default_staging_dir() -> String {
    "temp-uploads".into()
}

fn default_upload_dir() -> String {
    "file-uploads".into()
}

fn default_quarantine_dir() -> String {
    "dead-letter".into()
}

fn default_dead_letter_after_hours() -> u32 {
    partrelay_transfer::DEFAULT_RETENTION_HOURS as u32
}

fn default_cleanup_max_attempts() -> u32 {
    2
}

fn default_cleanup_retry_delay_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            base_dir: default_base_dir(),
            staging_dir: default_staging_dir(),
            upload_dir: default_upload_dir(),
            quarantine_dir: default_quarantine_dir(),
            dead_letter_after_hours: default_dead_letter_after_hours(),
            cleanup_max_attempts: default_cleanup_max_attempts(),
            cleanup_retry_delay_ms: default_cleanup_retry_delay_ms(),
            exclusive_reassembly: false,
        }
    }
}

/// Resolved directory layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirs {
    pub staging: PathBuf,
    pub upload: PathBuf,
    pub quarantine: PathBuf,
}

impl Config {
    /// Loads configuration from `path`, writing the defaults there if the
    /// file does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            tracing::info!(path = %path.display(), "wrote default configuration");
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn dirs(&self) -> Dirs {
        let base = partrelay_file_ops::expand_home(&self.base_dir);
        Dirs {
            staging: partrelay_file_ops::resolve_dir(&base, &self.staging_dir),
            upload: partrelay_file_ops::resolve_dir(&base, &self.upload_dir),
            quarantine: partrelay_file_ops::resolve_dir(&base, &self.quarantine_dir),
        }
    }

    pub fn staging_store(&self) -> FsStagingStore {
        let dirs = self.dirs();
        FsStagingStore::new(dirs.staging, dirs.quarantine)
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            upload_root: self.dirs().upload,
            retention: TimeDelta::hours(i64::from(self.dead_letter_after_hours)),
            cleanup_retry: RetryPolicy {
                max_attempts: self.cleanup_max_attempts,
                backoff: Duration::from_millis(self.cleanup_retry_delay_ms),
            },
            exclusive_reassembly: self.exclusive_reassembly,
        }
    }
}

/// Returns the configuration file path.
pub fn config_path() -> PathBuf {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => default_config_path(),
    }
}

/// Returns the platform-specific configuration file path.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("partrelay").join("agent.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("partrelay")
            .join("agent.toml")
    }
}
