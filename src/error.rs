use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::resolver::ResolverError;

/// Errors surfaced by the download service.
///
/// Request validation and conflicts are returned synchronously. Failures of a
/// background transfer never come back through this type to the submitter;
/// they show up in the next status poll instead.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Another download is in progress")]
    Conflict,

    #[error("Failed to extract video info: {0}")]
    Resolution(#[source] ResolverError),

    #[error("{0}")]
    Transfer(String),

    #[error("download {0} not found")]
    NotFound(i64),

    #[error("Physical file not found: {}", .0.display())]
    PhysicalFileMissing(PathBuf),

    #[error("A file with this name already exists: {}", .0.display())]
    NameCollision(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

pub type Result<T> = std::result::Result<T, AppError>;
