// src/files.rs

use crate::error::{AppError, Result};
use crate::ledger::Ledger;
use crate::models::DownloadRecord;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

/// A stored file opened for streaming to a client.
#[derive(Debug)]
pub struct FileDownload {
    pub filename: String,
    pub filesize: u64,
    pub stream: ReaderStream<File>,
}

/// Rename and delete operations that keep the ledger and the disk in step.
#[derive(Clone)]
pub struct FileManager {
    ledger: Ledger,
}

impl FileManager {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    async fn record(&self, id: i64) -> Result<DownloadRecord> {
        self.ledger.get(id).await?.ok_or(AppError::NotFound(id))
    }

    /// Renames the stored file to `new_base_name` plus its current extension.
    ///
    /// Nothing is touched when the file is missing or the target exists. If
    /// the ledger update fails after the file moved, the two stay out of step.
    pub async fn rename(&self, id: i64, new_base_name: &str) -> Result<DownloadRecord> {
        let new_base_name = new_base_name.trim();
        if new_base_name.is_empty() {
            return Err(AppError::Validation("New filename is required".to_string()));
        }
        if new_base_name.contains(&['/', '\\'][..]) || new_base_name == "." || new_base_name == ".." {
            return Err(AppError::Validation(format!(
                "filename {new_base_name:?} must not contain a path"
            )));
        }

        let record = self.record(id).await?;
        let old_path = PathBuf::from(&record.filepath);
        if !exists(&old_path).await? {
            return Err(AppError::PhysicalFileMissing(old_path));
        }

        let new_filename = match Path::new(&record.filename).extension() {
            Some(ext) => format!("{new_base_name}.{}", ext.to_string_lossy()),
            None => new_base_name.to_string(),
        };
        let new_path = match old_path.parent() {
            Some(dir) => dir.join(&new_filename),
            None => PathBuf::from(&new_filename),
        };
        if exists(&new_path).await? {
            return Err(AppError::NameCollision(new_path));
        }

        tokio::fs::rename(&old_path, &new_path).await?;

        let new_filepath = new_path.to_string_lossy().to_string();
        let updated = match self
            .ledger
            .update_filename_and_path(id, &new_filename, &new_filepath)
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                error!(id, from = %old_path.display(), to = %new_path.display(),
                    "file renamed but ledger update failed: {}", e);
                return Err(e.into());
            }
        };
        if !updated {
            error!(id, to = %new_path.display(), "file renamed but ledger row vanished");
            return Err(AppError::NotFound(id));
        }
        info!(id, from = %record.filename, to = %new_filename, "renamed download");

        Ok(DownloadRecord {
            filename: new_filename,
            filepath: new_filepath,
            ..record
        })
    }

    /// Removes the stored file, if it is still there, and then the ledger row.
    /// A file that is already gone, or that cannot be removed, does not stop
    /// the row from being deleted.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let record = self.record(id).await?;
        let path = Path::new(&record.filepath);

        match tokio::fs::remove_file(path).await {
            Ok(()) => info!(id, path = %path.display(), "removed file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(id, path = %path.display(), "file already gone")
            }
            Err(e) => warn!(id, path = %path.display(), "could not remove file: {}", e),
        }

        if !self.ledger.delete(id).await? {
            return Err(AppError::NotFound(id));
        }
        Ok(())
    }

    /// Opens the stored file for streaming.
    pub async fn open(&self, id: i64) -> Result<FileDownload> {
        let record = self.record(id).await?;
        let path = PathBuf::from(&record.filepath);
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::PhysicalFileMissing(path))
            }
            Err(e) => return Err(e.into()),
        };
        let filesize = file.metadata().await?.len();
        Ok(FileDownload {
            filename: record.filename,
            filesize,
            stream: ReaderStream::new(file),
        })
    }
}

async fn exists(path: &Path) -> Result<bool> {
    Ok(tokio::fs::try_exists(path).await?)
}
