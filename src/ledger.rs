// src/ledger.rs

use crate::models::{DownloadRecord, NewDownloadRecord};
use rusqlite::{params, OptionalExtension, Row};
use std::path::Path;
use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
}

const RECORD_COLUMNS: &str =
    "id, url, filename, filepath, filesize, resolution, duration, created_at, status";

/// Persistent table of completed downloads, backed by SQLite.
#[derive(Clone)]
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Opens (creating if needed) the ledger database at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(db_path).await?;
        let ledger = Self { conn };
        ledger.setup_database().await?;
        Ok(ledger)
    }

    /// A ledger that lives only as long as the process.
    pub async fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory().await?;
        let ledger = Self { conn };
        ledger.setup_database().await?;
        Ok(ledger)
    }

    /// Creates the `downloads` table if it doesn't already exist.
    /// AUTOINCREMENT keeps ids from being reused after a delete.
    async fn setup_database(&self) -> Result<(), LedgerError> {
        self.conn
            .call(|conn| {
                conn.execute(
                    "CREATE TABLE IF NOT EXISTS downloads (
                        id          INTEGER PRIMARY KEY AUTOINCREMENT,
                        url         TEXT NOT NULL,
                        filename    TEXT NOT NULL,
                        filepath    TEXT NOT NULL,
                        filesize    INTEGER,
                        resolution  TEXT,
                        duration    REAL,
                        created_at  TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                        status      TEXT DEFAULT 'completed'
                    )",
                    [],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Appends a record and returns the id the store assigned to it.
    pub async fn insert(&self, record: NewDownloadRecord) -> Result<i64, LedgerError> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO downloads (url, filename, filepath, filesize, resolution, duration)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        record.url,
                        record.filename,
                        record.filepath,
                        record.filesize as i64,
                        record.resolution,
                        record.duration
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<Option<DownloadRecord>, LedgerError> {
        let record = self
            .conn
            .call(move |conn| {
                let record = conn
                    .query_row(
                        &format!("SELECT {RECORD_COLUMNS} FROM downloads WHERE id = ?1"),
                        params![id],
                        record_from_row,
                    )
                    .optional()?;
                Ok(record)
            })
            .await?;
        Ok(record)
    }

    /// All records, newest first. Rows created within the same second are
    /// ordered by id so the listing is stable.
    pub async fn list(&self) -> Result<Vec<DownloadRecord>, LedgerError> {
        let records = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {RECORD_COLUMNS} FROM downloads ORDER BY created_at DESC, id DESC"
                ))?;
                let rows = stmt.query_map([], record_from_row)?;
                let records: Result<Vec<DownloadRecord>, rusqlite::Error> = rows.collect();
                Ok(records?)
            })
            .await?;
        Ok(records)
    }

    /// Points a record at a renamed file. Returns `false` if no such record exists.
    pub async fn update_filename_and_path(
        &self,
        id: i64,
        filename: &str,
        filepath: &str,
    ) -> Result<bool, LedgerError> {
        let filename = filename.to_string();
        let filepath = filepath.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE downloads SET filename = ?1, filepath = ?2 WHERE id = ?3",
                    params![filename, filepath, id],
                )?;
                Ok(changed)
            })
            .await?;
        Ok(changed > 0)
    }

    /// Removes a record. Returns `false` if no such record exists.
    pub async fn delete(&self, id: i64) -> Result<bool, LedgerError> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM downloads WHERE id = ?1", params![id])?;
                Ok(changed)
            })
            .await?;
        Ok(changed > 0)
    }
}

fn record_from_row(row: &Row<'_>) -> Result<DownloadRecord, rusqlite::Error> {
    let filesize: Option<i64> = row.get(4)?;
    Ok(DownloadRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        filename: row.get(2)?,
        filepath: row.get(3)?,
        filesize: filesize.unwrap_or(0).max(0) as u64,
        resolution: row.get::<_, Option<String>>(5)?.unwrap_or_else(|| "Unknown".to_string()),
        duration: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
        created_at: row.get(7)?,
        status: row.get::<_, Option<String>>(8)?.unwrap_or_else(|| "completed".to_string()),
    })
}
