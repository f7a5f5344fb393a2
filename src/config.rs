// src/config.rs

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Format selector used when a download request names no explicit format.
/// The resolver walks the alternatives left to right.
pub const DEFAULT_FALLBACK_FORMAT: &str = "best[ext=mp4]/best[ext=webm]/best[ext=mkv]/best";

/// Runtime configuration for the service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory that downloaded media lands in.
    pub data_dir: PathBuf,
    /// SQLite file backing the download ledger.
    pub database_path: PathBuf,
    /// The `yt-dlp` executable. A bare name is looked up on `PATH`.
    pub ytdlp_path: PathBuf,
    pub fallback_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database_path: PathBuf::from("data").join("downloads.db"),
            ytdlp_path: PathBuf::from("yt-dlp"),
            fallback_format: DEFAULT_FALLBACK_FORMAT.to_string(),
        }
    }
}

impl Config {
    /// Defaults overridden by `CLIPVAULT_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Reads a JSON config file. Fields missing from the file keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("CLIPVAULT_DATA_DIR") {
            self.database_path = PathBuf::from(&dir).join("downloads.db");
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(db) = lookup("CLIPVAULT_DATABASE") {
            self.database_path = PathBuf::from(db);
        }
        if let Some(bin) = lookup("CLIPVAULT_YTDLP") {
            self.ytdlp_path = PathBuf::from(bin);
        }
        if let Some(format) = lookup("CLIPVAULT_FALLBACK_FORMAT") {
            self.fallback_format = format;
        }
        self
    }

    /// Creates the data directory and the database's parent directory.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        if let Some(parent) = self.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}
