// src/service.rs

use crate::config::Config;
use crate::coordinator::{validate_url, DownloadCoordinator};
use crate::error::{AppError, Result};
use crate::files::{FileDownload, FileManager};
use crate::ledger::Ledger;
use crate::models::{DownloadRecord, DownloadRequest, DownloadStatus, VideoInfo};
use crate::ranker;
use crate::resolver::MediaResolver;
use crate::ytdlp::YtDlpResolver;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a front end needs: probe, download, and manage stored files.
/// Cheap to share behind an `Arc`; each handler gets the same coordinator.
pub struct MediaService {
    resolver: Arc<dyn MediaResolver>,
    ledger: Ledger,
    coordinator: DownloadCoordinator,
    files: FileManager,
}

impl MediaService {
    pub fn new(config: &Config, resolver: Arc<dyn MediaResolver>, ledger: Ledger) -> Self {
        let coordinator = DownloadCoordinator::new(
            resolver.clone(),
            ledger.clone(),
            config.data_dir.clone(),
            config.fallback_format.clone(),
        );
        Self {
            resolver,
            files: FileManager::new(ledger.clone()),
            ledger,
            coordinator,
        }
    }

    /// Opens the ledger and wires up the yt-dlp resolver described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.ensure_dirs().await?;
        let ledger = Ledger::open(&config.database_path).await?;
        let resolver = Arc::new(YtDlpResolver::new(config.ytdlp_path.clone()));
        info!(
            data_dir = %config.data_dir.display(),
            database = %config.database_path.display(),
            resolver = resolver.name(),
            "media service ready"
        );
        Ok(Self::new(config, resolver, ledger))
    }

    /// Metadata and ranked formats for `url`. Refused while a download runs.
    pub async fn probe_video(&self, url: &str) -> Result<VideoInfo> {
        let url = validate_url(url)?;
        if self.coordinator.is_downloading() {
            return Err(AppError::Conflict);
        }

        let probe = self.resolver.probe(&url).await.map_err(|e| {
            warn!(%url, "probe failed: {}", e);
            AppError::Resolution(e)
        })?;
        let duration = probe.duration.unwrap_or(0.0);
        let formats = ranker::rank(&probe.formats, duration);
        info!(%url, offered = probe.formats.len(), kept = formats.len(), "ranked formats");

        Ok(VideoInfo {
            url,
            title: probe.title.unwrap_or_else(|| "Unknown".to_string()),
            duration,
            uploader: probe.uploader.unwrap_or_else(|| "Unknown".to_string()),
            view_count: probe.view_count.unwrap_or(0),
            upload_date: format_upload_date(probe.upload_date.as_deref().unwrap_or_default()),
            thumbnail: probe.thumbnail.unwrap_or_default(),
            formats,
        })
    }

    pub fn start_download(&self, request: DownloadRequest) -> Result<()> {
        self.coordinator.start_download(request)
    }

    pub fn status(&self) -> DownloadStatus {
        self.coordinator.status()
    }

    pub async fn list_downloads(&self) -> Result<Vec<DownloadRecord>> {
        Ok(self.ledger.list().await?)
    }

    pub async fn fetch_file(&self, id: i64) -> Result<FileDownload> {
        self.files.open(id).await
    }

    pub async fn rename_file(&self, id: i64, new_name: &str) -> Result<DownloadRecord> {
        self.files.rename(id, new_name).await
    }

    pub async fn delete_file(&self, id: i64) -> Result<()> {
        self.files.delete(id).await
    }

    /// Waits for any running download to finish.
    pub async fn shutdown(&self) {
        self.coordinator.drain().await;
    }
}

/// `YYYYMMDD` becomes `YYYY-MM-DD`; anything else is returned unchanged.
fn format_upload_date(raw: &str) -> String {
    if raw.len() == 8 && raw.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..])
    } else {
        raw.to_string()
    }
}
