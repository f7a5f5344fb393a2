// src/models.rs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One candidate encoding as reported by the media resolver.
/// Field names follow yt-dlp's JSON so the probe output deserializes directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormatDescriptor {
    #[serde(default)]
    pub format_id: String,
    #[serde(default)]
    pub ext: String,
    /// `"WxH"`, `"audio only"`, or absent.
    pub resolution: Option<String>,
    pub fps: Option<f64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    /// Reported size in bytes. Absent and zero both mean "unknown".
    pub filesize: Option<u64>,
    pub quality: Option<f64>,
    /// Total bitrate.
    pub tbr: Option<f64>,
    pub format_note: Option<String>,
}

/// A format that survived ranking, ready to be shown to a chooser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedFormat {
    pub format_id: String,
    pub ext: String,
    pub resolution: String,
    /// Reported size, or an estimate when the resolver gave none. Never zero.
    pub filesize: u64,
    pub fps: Option<f64>,
    pub vcodec: String,
    pub acodec: String,
    pub quality: f64,
    pub format_note: String,
    pub tbr: f64,
}

/// Metadata returned by a probe, with formats already ranked best-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub url: String,
    pub title: String,
    pub duration: f64,
    pub uploader: String,
    pub view_count: u64,
    /// `YYYY-MM-DD` when the resolver reported a compact date.
    pub upload_date: String,
    pub thumbnail: String,
    pub formats: Vec<RankedFormat>,
}

/// A completed download as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub id: i64,
    pub url: String,
    pub filename: String,
    /// Absolute path of the stored file.
    pub filepath: String,
    pub filesize: u64,
    pub resolution: String,
    pub duration: f64,
    pub created_at: NaiveDateTime,
    pub status: String,
}

/// The fields the caller supplies when appending to the ledger.
/// `id`, `created_at` and `status` are filled in by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDownloadRecord {
    pub url: String,
    pub filename: String,
    pub filepath: String,
    pub filesize: u64,
    pub resolution: String,
    pub duration: f64,
}

/// A progress report pushed by the resolver while bytes are moving.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressEvent {
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub total_bytes_estimate: Option<u64>,
}

impl ProgressEvent {
    /// The best known total: the exact size, else the estimate. Zero counts as unknown.
    pub fn known_total(&self) -> Option<u64> {
        self.total_bytes
            .filter(|t| *t > 0)
            .or(self.total_bytes_estimate.filter(|t| *t > 0))
    }
}

/// Lifecycle of the single download slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobPhase {
    Idle,
    Downloading,
    Completed,
    Failed(String),
}

/// Summary of the file produced by the last completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedFile {
    pub filename: String,
    pub filepath: String,
    pub filesize: u64,
}

/// What a status poll sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadStatus {
    pub is_downloading: bool,
    /// Percentage in `0.0..=100.0`, two decimals.
    pub progress: f64,
    pub status: String,
    pub current_download: Option<CompletedFile>,
}

/// Parameters of a download submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub filename: Option<String>,
    pub format_id: Option<String>,
}
