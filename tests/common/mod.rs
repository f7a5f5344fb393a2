#![allow(dead_code)]

use async_trait::async_trait;
use clipvault::models::{NewDownloadRecord, ProgressEvent};
use clipvault::prelude::*;
use clipvault::resolver::{ProgressCallback, ResolverError};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// How the fake finishes a fetch.
#[derive(Debug, Clone)]
pub enum FetchBehavior {
    /// Writes `bytes` bytes with extension `written_ext` but reports `declared_ext`.
    Write {
        written_ext: &'static str,
        declared_ext: &'static str,
        bytes: usize,
    },
    Fail(String),
}

impl FetchBehavior {
    pub fn mp4(bytes: usize) -> Self {
        Self::Write {
            written_ext: "mp4",
            declared_ext: "mp4",
            bytes,
        }
    }
}

/// In-process stand-in for yt-dlp.
pub struct FakeResolver {
    pub probe: Option<ProbeResult>,
    pub behavior: FetchBehavior,
    pub events: Vec<ProgressEvent>,
    /// When set, a fetch parks after reporting progress until notified.
    pub gate: Option<Arc<Notify>>,
    pub fetch_calls: AtomicUsize,
    pub last_selector: Mutex<Option<String>>,
}

impl FakeResolver {
    pub fn new(behavior: FetchBehavior) -> Self {
        Self {
            probe: None,
            behavior,
            events: Vec::new(),
            gate: None,
            fetch_calls: AtomicUsize::new(0),
            last_selector: Mutex::new(None),
        }
    }

    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_events(mut self, events: Vec<ProgressEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn with_probe(mut self, probe: ProbeResult) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

fn fill_template(template: &Path, ext: &str) -> PathBuf {
    PathBuf::from(template.to_string_lossy().replace("%(ext)s", ext))
}

#[async_trait]
impl MediaResolver for FakeResolver {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn probe(&self, url: &str) -> Result<ProbeResult, ResolverError> {
        self.probe
            .clone()
            .ok_or_else(|| ResolverError::Failed(format!("ERROR: Unsupported URL: {url}")))
    }

    async fn fetch(
        &self,
        request: FetchRequest,
        on_progress: ProgressCallback,
    ) -> Result<FetchOutcome, ResolverError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_selector.lock() = Some(request.format_selector.clone());

        for event in &self.events {
            on_progress(*event);
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match &self.behavior {
            FetchBehavior::Fail(message) => Err(ResolverError::Failed(message.clone())),
            FetchBehavior::Write {
                written_ext,
                declared_ext,
                bytes,
            } => {
                let written = fill_template(&request.output_template, written_ext);
                tokio::fs::write(&written, vec![7u8; *bytes]).await?;
                Ok(FetchOutcome {
                    output_path: fill_template(&request.output_template, declared_ext),
                    resolution: Some("1280x720".to_string()),
                    duration: Some(12.5),
                })
            }
        }
    }
}

pub fn event(downloaded: u64, total: Option<u64>, estimate: Option<u64>) -> ProgressEvent {
    ProgressEvent {
        downloaded_bytes: downloaded,
        total_bytes: total,
        total_bytes_estimate: estimate,
    }
}

pub fn config_for(dir: &Path) -> Config {
    Config {
        data_dir: dir.to_path_buf(),
        database_path: dir.join("downloads.db"),
        ..Config::default()
    }
}

/// Polls `check` until it holds or a couple of seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Writes `contents` to `dir/name` and records it in the ledger.
pub async fn stored_file(ledger: &Ledger, dir: &Path, name: &str, contents: &[u8]) -> (i64, PathBuf) {
    let path = dir.join(name);
    tokio::fs::write(&path, contents).await.unwrap();
    let id = ledger
        .insert(NewDownloadRecord {
            url: "https://example.com/watch?v=1".to_string(),
            filename: name.to_string(),
            filepath: path.to_string_lossy().to_string(),
            filesize: contents.len() as u64,
            resolution: "1920x1080".to_string(),
            duration: 30.0,
        })
        .await
        .unwrap();
    (id, path)
}
