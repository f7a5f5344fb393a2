// src/ytdlp.rs
//
// MediaResolver backed by the yt-dlp command line tool. Probing parses
// `--dump-json`; fetching reads marker lines that yt-dlp prints through the
// progress and print templates we hand it.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::models::{FormatDescriptor, ProgressEvent};
use crate::resolver::{
    FetchOutcome, FetchRequest, MediaResolver, ProbeResult, ProgressCallback, ResolverError,
};

const PROGRESS_MARKER: &str = "[clipvault:progress]";
const DONE_MARKER: &str = "[clipvault:done]";

/// The raw shape of `yt-dlp --dump-json`, reduced to what we read.
#[derive(Debug, Deserialize)]
struct RawInfo {
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    view_count: Option<u64>,
    upload_date: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Vec<FormatDescriptor>,
}

/// Printed once after the final file is in place.
#[derive(Debug, Deserialize)]
struct RawDone {
    filepath: Option<PathBuf>,
    filename: Option<PathBuf>,
    resolution: Option<String>,
    duration: Option<f64>,
}

pub struct YtDlpResolver {
    binary: PathBuf,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    fn fetch_args(request: &FetchRequest) -> Vec<String> {
        vec![
            "-f".to_string(),
            request.format_selector.clone(),
            "-o".to_string(),
            request.output_template.to_string_lossy().to_string(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            // --print implies --quiet; keep the progress lines anyway
            "--progress".to_string(),
            "--progress-template".to_string(),
            format!(
                "download:{PROGRESS_MARKER} %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s"
            ),
            "--print".to_string(),
            format!("after_move:{DONE_MARKER} %(.{{filepath,filename,resolution,duration}})j"),
            request.url.clone(),
        ]
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(&self, url: &str) -> Result<ProbeResult, ResolverError> {
        debug!(binary = %self.binary.display(), url, "probing");
        let output = Command::new(&self.binary)
            .args(["--dump-json", "--no-playlist", "--no-warnings", url])
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolverError::Failed(failure_message(stderr.lines())));
        }
        parse_probe(&output.stdout)
    }

    async fn fetch(
        &self,
        request: FetchRequest,
        on_progress: ProgressCallback,
    ) -> Result<FetchOutcome, ResolverError> {
        info!(url = %request.url, format = %request.format_selector, "starting yt-dlp transfer");
        let mut child = Command::new(&self.binary)
            .args(Self::fetch_args(&request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ResolverError::Failed("yt-dlp stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ResolverError::Failed("yt-dlp stderr unavailable".to_string()))?;
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let (mut out_open, mut err_open) = (true, true);

        let mut outcome = None;
        let mut diagnostics: Vec<String> = Vec::new();

        // Both streams are drained here so progress reaches the callback on this task.
        while out_open || err_open {
            let line = tokio::select! {
                line = out_lines.next_line(), if out_open => match line? {
                    Some(line) => line,
                    None => { out_open = false; continue; }
                },
                line = err_lines.next_line(), if err_open => match line? {
                    Some(line) => line,
                    None => { err_open = false; continue; }
                },
            };

            if let Some(event) = parse_progress_line(&line) {
                on_progress(event);
            } else if let Some(done) = parse_done_line(&line) {
                outcome = Some(done?);
            } else if !line.trim().is_empty() {
                debug!(line = %line, "yt-dlp");
                diagnostics.push(line);
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            warn!(?status, "yt-dlp exited with failure");
            return Err(ResolverError::Failed(failure_message(
                diagnostics.iter().map(String::as_str),
            )));
        }
        outcome.ok_or(ResolverError::MissingOutput)
    }
}

fn parse_probe(stdout: &[u8]) -> Result<ProbeResult, ResolverError> {
    let raw: RawInfo = serde_json::from_slice(stdout)?;
    Ok(ProbeResult {
        title: raw.title,
        duration: raw.duration,
        uploader: raw.uploader,
        view_count: raw.view_count,
        upload_date: raw.upload_date,
        thumbnail: raw.thumbnail,
        formats: raw.formats,
    })
}

/// Parses `[clipvault:progress] <downloaded> <total> <estimate>`; yt-dlp
/// writes `NA` for fields it doesn't know.
fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let mut fields = rest.split_whitespace().map(parse_byte_count);
    let downloaded_bytes = fields.next().flatten()?;
    Some(ProgressEvent {
        downloaded_bytes,
        total_bytes: fields.next().flatten(),
        total_bytes_estimate: fields.next().flatten(),
    })
}

fn parse_byte_count(field: &str) -> Option<u64> {
    let value: f64 = field.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value as u64)
}

fn parse_done_line(line: &str) -> Option<Result<FetchOutcome, ResolverError>> {
    let json = line.trim().strip_prefix(DONE_MARKER)?.trim();
    let parsed = serde_json::from_str::<RawDone>(json)
        .map_err(ResolverError::from)
        .and_then(|raw| {
            let output_path = raw
                .filepath
                .or(raw.filename)
                .ok_or(ResolverError::MissingOutput)?;
            Ok(FetchOutcome {
                output_path,
                resolution: raw.resolution,
                duration: raw.duration,
            })
        });
    Some(parsed)
}

/// The most useful line of a failed run: the last `ERROR:` line, else the last line.
fn failure_message<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    let lines: Vec<&str> = lines.map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or(lines.last())
        .map(|l| l.to_string())
        .unwrap_or_else(|| "yt-dlp failed without output".to_string())
}
