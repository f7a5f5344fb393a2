// src/coordinator.rs

use crate::error::{AppError, Result};
use crate::ledger::Ledger;
use crate::models::{
    CompletedFile, DownloadRequest, DownloadStatus, JobPhase, NewDownloadRecord, ProgressEvent,
};
use crate::resolver::{FetchRequest, MediaResolver, ProgressCallback};
use chrono::{DateTime, Local};
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{error, info, instrument, warn};

/// Extensions tried when the resolver's declared output file is not on disk.
const SIBLING_EXTENSIONS: [&str; 3] = ["mp4", "webm", "mkv"];

const DEFAULT_BASE_NAME: &str = "video";

/// The state shared between the background job and status polls.
#[derive(Debug)]
struct CoordinatorState {
    phase: JobPhase,
    progress: f64,
    current_download: Option<CompletedFile>,
}

impl CoordinatorState {
    fn idle() -> Self {
        Self {
            phase: JobPhase::Idle,
            progress: 0.0,
            current_download: None,
        }
    }

    fn begin(&mut self) {
        self.phase = JobPhase::Downloading;
        self.progress = 0.0;
        self.current_download = None;
    }

    /// Recomputes the percentage when a total is known, capped at 100.
    /// Revised estimates may move it backwards.
    fn apply_progress(&mut self, event: ProgressEvent) {
        if self.phase != JobPhase::Downloading {
            return;
        }
        if let Some(total) = event.known_total() {
            let percent = 100.0 * event.downloaded_bytes as f64 / total as f64;
            self.progress = round2(percent.min(100.0));
        }
    }

    fn complete(&mut self, file: CompletedFile) {
        self.phase = JobPhase::Completed;
        self.progress = 100.0;
        self.current_download = Some(file);
    }

    fn fail(&mut self, reason: String) {
        self.phase = JobPhase::Failed(reason);
        self.progress = 100.0;
    }

    fn status_label(&self) -> String {
        match &self.phase {
            JobPhase::Idle => "idle".to_string(),
            JobPhase::Downloading => "downloading".to_string(),
            JobPhase::Completed => "completed".to_string(),
            JobPhase::Failed(reason) => format!("error: {reason}"),
        }
    }

    /// Snapshot for a poller. A terminal snapshot is handed out once, then the
    /// slot drops back to idle.
    fn take_snapshot(&mut self) -> DownloadStatus {
        let snapshot = DownloadStatus {
            is_downloading: self.phase == JobPhase::Downloading,
            progress: self.progress,
            status: self.status_label(),
            current_download: self.current_download.clone(),
        };
        if matches!(self.phase, JobPhase::Completed | JobPhase::Failed(_)) {
            *self = Self::idle();
        }
        snapshot
    }
}

/// One accepted submission, as handed to the background task.
#[derive(Debug, Clone)]
struct DownloadJob {
    url: String,
    format_selector: String,
    output_template: PathBuf,
}

/// Runs at most one download at a time for the whole process.
pub struct DownloadCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
    resolver: Arc<dyn MediaResolver>,
    ledger: Ledger,
    data_dir: PathBuf,
    fallback_format: String,
    tracker: TaskTracker,
}

impl DownloadCoordinator {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        ledger: Ledger,
        data_dir: impl Into<PathBuf>,
        fallback_format: impl Into<String>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(CoordinatorState::idle())),
            resolver,
            ledger,
            data_dir: data_dir.into(),
            fallback_format: fallback_format.into(),
            tracker: TaskTracker::new(),
        }
    }

    /// Accepts a submission and starts the transfer in the background.
    ///
    /// Returns once the job is spawned. A transfer failure is only visible
    /// through [`status`](Self::status).
    pub fn start_download(&self, request: DownloadRequest) -> Result<()> {
        let url = validate_url(&request.url)?;
        let base_name = request
            .filename
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_BASE_NAME);
        let safe_name = sanitize_filename(base_name);
        if safe_name.is_empty() {
            return Err(AppError::Validation(format!(
                "filename {base_name:?} has no usable characters"
            )));
        }
        let format_selector = request
            .format_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| self.fallback_format.clone());

        {
            let mut state = self.state.lock();
            if state.phase == JobPhase::Downloading {
                return Err(AppError::Conflict);
            }
            state.begin();
        }

        let job = DownloadJob {
            url,
            format_selector,
            output_template: output_template(&self.data_dir, &safe_name, Local::now()),
        };
        info!(url = %job.url, template = %job.output_template.display(), "download accepted");

        let state = self.state.clone();
        let resolver = self.resolver.clone();
        let ledger = self.ledger.clone();
        self.tracker.spawn(Self::run_job(state, resolver, ledger, job));
        Ok(())
    }

    /// Current status. See [`DownloadStatus`]; terminal states are reported once.
    pub fn status(&self) -> DownloadStatus {
        self.state.lock().take_snapshot()
    }

    pub fn is_downloading(&self) -> bool {
        self.state.lock().phase == JobPhase::Downloading
    }

    /// Waits for the background job, if any, to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    #[instrument(skip_all, fields(url = %job.url))]
    async fn run_job(
        state: Arc<Mutex<CoordinatorState>>,
        resolver: Arc<dyn MediaResolver>,
        ledger: Ledger,
        job: DownloadJob,
    ) {
        let transfer = Self::transfer(&state, resolver.as_ref(), &ledger, &job);
        let result = AssertUnwindSafe(transfer).catch_unwind().await;

        let mut state = state.lock();
        match result {
            Ok(Ok(file)) => {
                info!(file = %file.filepath, size = file.filesize, "download completed");
                state.complete(file);
            }
            Ok(Err(e)) => {
                error!("download failed: {}", e);
                state.fail(e.to_string());
            }
            Err(_) => {
                error!("download task panicked");
                state.fail("download task panicked".to_string());
            }
        }
    }

    async fn transfer(
        state: &Arc<Mutex<CoordinatorState>>,
        resolver: &dyn MediaResolver,
        ledger: &Ledger,
        job: &DownloadJob,
    ) -> Result<CompletedFile> {
        let progress_state = state.clone();
        let on_progress: ProgressCallback =
            Box::new(move |event| progress_state.lock().apply_progress(event));

        let request = FetchRequest {
            url: job.url.clone(),
            format_selector: job.format_selector.clone(),
            output_template: job.output_template.clone(),
        };
        let outcome = resolver
            .fetch(request, on_progress)
            .await
            .map_err(|e| AppError::Transfer(e.to_string()))?;

        let path = resolve_output_path(&outcome.output_path)
            .await
            .ok_or_else(|| {
                AppError::Transfer(format!(
                    "downloaded file not found: {}",
                    outcome.output_path.display()
                ))
            })?;
        let path = tokio::fs::canonicalize(&path).await?;
        let filesize = tokio::fs::metadata(&path).await?.len();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let filepath = path.to_string_lossy().to_string();

        let id = ledger
            .insert(NewDownloadRecord {
                url: job.url.clone(),
                filename: filename.clone(),
                filepath: filepath.clone(),
                filesize,
                resolution: outcome.resolution.unwrap_or_else(|| "Unknown".to_string()),
                duration: outcome.duration.unwrap_or(0.0),
            })
            .await?;
        info!(id, %filename, "recorded download");

        Ok(CompletedFile {
            filename,
            filepath,
            filesize,
        })
    }
}

/// The declared path if it exists, else the first existing sibling with a
/// swapped container extension.
async fn resolve_output_path(declared: &Path) -> Option<PathBuf> {
    if path_exists(declared).await {
        return Some(declared.to_path_buf());
    }
    for ext in SIBLING_EXTENSIONS {
        let candidate = declared.with_extension(ext);
        if path_exists(&candidate).await {
            warn!(
                declared = %declared.display(),
                found = %candidate.display(),
                "resolver output had a different extension"
            );
            return Some(candidate);
        }
    }
    None
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

pub(crate) fn validate_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("URL is required".to_string()));
    }
    url::Url::parse(trimmed)
        .map_err(|e| AppError::Validation(format!("invalid URL {trimmed:?}: {e}")))?;
    Ok(trimmed.to_string())
}

/// Keeps letters, digits, spaces, hyphens and underscores, then trims the end.
pub fn sanitize_filename(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    kept.trim_end().to_string()
}

/// `<data_dir>/<name>_<YYYYMMDD_HHMMSS>.%(ext)s`
fn output_template(data_dir: &Path, safe_name: &str, now: DateTime<Local>) -> PathBuf {
    data_dir.join(format!(
        "{safe_name}_{}.%(ext)s",
        now.format("%Y%m%d_%H%M%S")
    ))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
