//! SQLite-backed [`SectionStore`] implementation.
//!
//! The `sections` and `barcodes` tables are the source of truth. A record
//! belongs to the section row it was inserted under (`section_id`); the
//! section name is kept alongside for history and export, so records outlive
//! a deleted section without counting towards a new one of the same name.
//! After each mutation the current snapshot is re-read and written to the
//! [`SnapshotFile`] projection, if one is attached.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use scanbook_core::models::{
    format_timestamp, normalize_section_name, parse_timestamp, same_key,
};
use scanbook_core::store::SectionStore;
use scanbook_core::{BarcodeRecord, InsertOutcome, Snapshot, StoreError};

use crate::snapshot::SnapshotFile;

/// SQLite implementation of the [`SectionStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    snapshot: Option<SnapshotFile>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            snapshot: None,
        }
    }

    /// Keeps `file` in sync with the database after every mutation.
    pub fn with_snapshot_file(mut self, file: SnapshotFile) -> Self {
        self.snapshot = Some(file);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Rewrites the snapshot projection from the database.
    pub async fn write_snapshot(&self) -> Result<(), StoreError> {
        let Some(file) = &self.snapshot else {
            return Ok(());
        };
        let snapshot = self.snapshot().await?;
        file.write(&snapshot).map_err(|e| {
            warn!(path = %file.path().display(), error = %e, "Snapshot write failed");
            StoreError::Storage(e)
        })?;
        debug!(path = %file.path().display(), "Snapshot written");
        Ok(())
    }

    async fn section_id(&self, name: &str) -> Result<Option<i64>, StoreError> {
        sqlx::query_scalar("SELECT id FROM sections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)
    }
}

fn storage(err: sqlx::Error) -> StoreError {
    StoreError::Storage(err.into())
}

#[async_trait]
impl SectionStore for SqliteStore {
    async fn sections(&self) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar("SELECT name FROM sections ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)
    }

    async fn create_section(&self, name: &str) -> Result<String, StoreError> {
        let name = normalize_section_name(name)?;

        // SQLite's LOWER() only folds ASCII, so compare in Rust.
        if self
            .sections()
            .await?
            .iter()
            .any(|existing| same_key(existing, &name))
        {
            return Err(StoreError::DuplicateSection(name));
        }

        sqlx::query("INSERT INTO sections (name) VALUES (?)")
            .bind(&name)
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        self.write_snapshot().await?;
        Ok(name)
    }

    async fn delete_section(&self, name: &str) -> Result<(), StoreError> {
        // Records stay in the log; only the section row goes.
        let deleted = sqlx::query("DELETE FROM sections WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::SectionNotFound(name.to_string()));
        }
        self.write_snapshot().await
    }

    async fn insert_code(
        &self,
        section: &str,
        code: &str,
        timestamp: NaiveDateTime,
    ) -> Result<InsertOutcome, StoreError> {
        let Some(section_id) = self.section_id(section).await? else {
            return Err(StoreError::SectionNotFound(section.to_string()));
        };

        let existing: Vec<String> =
            sqlx::query_scalar("SELECT code FROM barcodes WHERE section_id = ?")
                .bind(section_id)
                .fetch_all(&self.pool)
                .await
                .map_err(storage)?;
        if existing.iter().any(|c| same_key(c, code)) {
            return Ok(InsertOutcome::AlreadyExists);
        }

        sqlx::query(
            "INSERT INTO barcodes (section_id, section, code, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(section_id)
        .bind(section)
        .bind(code)
        .bind(format_timestamp(&timestamp))
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        self.write_snapshot().await?;
        Ok(InsertOutcome::Inserted)
    }

    async fn delete_code(&self, section: &str, code: &str) -> Result<bool, StoreError> {
        Ok(self.bulk_delete(section, &[code.to_string()]).await? > 0)
    }

    async fn bulk_delete(&self, section: &str, codes: &[String]) -> Result<usize, StoreError> {
        if codes.is_empty() {
            return Ok(0);
        }
        let Some(section_id) = self.section_id(section).await? else {
            return Ok(0);
        };

        let mut tx = self.pool.begin().await.map_err(storage)?;
        let mut removed = 0u64;
        for code in codes {
            let result = sqlx::query("DELETE FROM barcodes WHERE section_id = ? AND code = ?")
                .bind(section_id)
                .bind(code)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
            removed += result.rows_affected();
        }
        tx.commit().await.map_err(storage)?;

        if removed > 0 {
            self.write_snapshot().await?;
        }
        Ok(removed as usize)
    }

    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let live: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM sections ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(storage)?;
        let mut grouped: Vec<(i64, String, Vec<String>)> = live
            .into_iter()
            .map(|(id, name)| (id, name, Vec::new()))
            .collect();

        let rows = sqlx::query(
            "SELECT section_id, code FROM barcodes WHERE section_id IS NOT NULL ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        for row in &rows {
            let section_id: i64 = row.get("section_id");
            if let Some((_, _, codes)) = grouped.iter_mut().find(|(id, _, _)| *id == section_id) {
                codes.push(row.get("code"));
            }
        }
        Ok(grouped
            .into_iter()
            .map(|(_, name, codes)| (name, codes))
            .collect())
    }

    async fn records(&self) -> Result<Vec<BarcodeRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT section, code, timestamp FROM barcodes ORDER BY timestamp DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(rows
            .iter()
            .map(|row| {
                let raw: Option<String> = row.try_get("timestamp").ok().flatten();
                BarcodeRecord {
                    section: row.get("section"),
                    code: row.get("code"),
                    timestamp: raw.as_deref().and_then(parse_timestamp),
                }
            })
            .collect())
    }
}
