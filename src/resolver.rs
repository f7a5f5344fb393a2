// src/resolver.rs

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::{FormatDescriptor, ProgressEvent};

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("resolver i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Failed(String),
    #[error("unreadable resolver output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("resolver finished without reporting an output file")]
    MissingOutput,
}

/// What a URL offers, before any ranking.
#[derive(Debug, Clone, Default)]
pub struct ProbeResult {
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    /// Usually `YYYYMMDD` as reported upstream.
    pub upload_date: Option<String>,
    pub thumbnail: Option<String>,
    pub formats: Vec<FormatDescriptor>,
}

/// A single transfer to perform.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    /// Passed to the resolver untouched: an explicit format id or a
    /// `/`-separated preference list.
    pub format_selector: String,
    /// Output path whose extension is the placeholder `%(ext)s`.
    pub output_template: PathBuf,
}

/// What the resolver reports once the transfer is done.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// The path the resolver says it wrote. It may differ in extension from
    /// the file actually on disk when streams were merged.
    pub output_path: PathBuf,
    pub resolution: Option<String>,
    pub duration: Option<f64>,
}

/// Receives progress reports on the transfer's own task.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// The component that inspects URLs and moves the bytes.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Name of the resolver (for logging)
    fn name(&self) -> &'static str;

    async fn probe(&self, url: &str) -> Result<ProbeResult, ResolverError>;

    /// Runs the transfer to completion, calling `on_progress` as bytes arrive.
    async fn fetch(
        &self,
        request: FetchRequest,
        on_progress: ProgressCallback,
    ) -> Result<FetchOutcome, ResolverError>;
}
