// src/main.rs

use anyhow::{bail, Context, Result};
use clipvault::prelude::*;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage:
  clipvault probe <url>
  clipvault download <url> [name] [format_id]
  clipvault status        (this process only; downloads run inside `download`)
  clipvault list
  clipvault rename <id> <name>
  clipvault delete <id>
  clipvault export <id> <dest>";

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!("{USAGE}");
    };

    let config = match std::env::var_os("CLIPVAULT_CONFIG") {
        Some(path) => Config::load(&PathBuf::from(path)).context("loading config")?,
        None => Config::from_env(),
    };
    let service = MediaService::from_config(&config).await?;

    match (command.as_str(), &args[1..]) {
        ("probe", [url]) => {
            let info = service.probe_video(url).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        ("download", [url, rest @ ..]) if rest.len() <= 2 => {
            service.start_download(DownloadRequest {
                url: url.clone(),
                filename: rest.first().cloned(),
                format_id: rest.get(1).cloned(),
            })?;
            let status = wait_for_download(&service).await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            service.shutdown().await;
            if !status.status.starts_with("completed") {
                bail!("download did not complete: {}", status.status);
            }
        }
        ("status", []) => {
            println!("{}", serde_json::to_string_pretty(&service.status())?);
        }
        ("list", []) => {
            let downloads = service.list_downloads().await?;
            println!("{}", serde_json::to_string_pretty(&downloads)?);
        }
        ("rename", [id, name]) => {
            let record = service.rename_file(parse_id(id)?, name).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        ("delete", [id]) => {
            service.delete_file(parse_id(id)?).await?;
            println!("deleted {id}");
        }
        ("export", [id, dest]) => {
            let download = service.fetch_file(parse_id(id)?).await?;
            let written = export(download, Path::new(dest)).await?;
            println!("wrote {written} bytes to {dest}");
        }
        _ => bail!("{USAGE}"),
    }

    Ok(())
}

/// Polls until the terminal snapshot, printing progress along the way.
async fn wait_for_download(service: &MediaService) -> DownloadStatus {
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let status = service.status();
        if !status.is_downloading {
            return status;
        }
        info!("[PROGRESS] {:.2}%", status.progress);
    }
}

async fn export(download: FileDownload, dest: &Path) -> Result<u64> {
    info!(file = %download.filename, size = download.filesize, "exporting");
    let mut out = tokio::fs::File::create(dest)
        .await
        .with_context(|| format!("creating {}", dest.display()))?;
    let mut stream = download.stream;
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(written)
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.parse().with_context(|| format!("invalid download id {raw:?}"))
}
