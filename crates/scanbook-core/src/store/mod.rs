//! Storage abstraction for sections and their recorded codes.
//!
//! The [`SectionStore`] trait is the single source of truth for which
//! sections exist and which codes each one holds. Implementations must be
//! `Send + Sync`; callers serialize mutations themselves (see the
//! application's `Inventory`), so stores need no cross-call atomicity beyond
//! each individual method.

pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::StoreError;
use crate::models::{BarcodeRecord, History, InsertOutcome, Snapshot};

/// Abstract section store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`sections`](SectionStore::sections) | Section names in creation order |
/// | [`create_section`](SectionStore::create_section) | Add an empty section |
/// | [`delete_section`](SectionStore::delete_section) | Drop a section, keeping its records |
/// | [`insert_code`](SectionStore::insert_code) | Idempotent insert |
/// | [`delete_code`](SectionStore::delete_code) | Remove one code |
/// | [`bulk_delete`](SectionStore::bulk_delete) | Remove many codes |
/// | [`snapshot`](SectionStore::snapshot) | Section → codes, insertion order |
/// | [`records`](SectionStore::records) | Every record, most recent first |
#[async_trait]
pub trait SectionStore: Send + Sync {
    /// Section names in creation order.
    async fn sections(&self) -> Result<Vec<String>, StoreError>;

    /// Creates an empty section.
    ///
    /// Fails with [`StoreError::DuplicateSection`] when a section with the
    /// same name (ignoring case) exists. Returns the stored (trimmed) name.
    async fn create_section(&self, name: &str) -> Result<String, StoreError>;

    /// Removes a section. Its records stay in [`records`](SectionStore::records)
    /// but no longer count as membership, so a section re-created under the
    /// same name starts empty.
    async fn delete_section(&self, name: &str) -> Result<(), StoreError>;

    /// Appends `code` to `section` unless the section already holds it
    /// (compared ignoring case). No write happens on `AlreadyExists`.
    async fn insert_code(
        &self,
        section: &str,
        code: &str,
        timestamp: NaiveDateTime,
    ) -> Result<InsertOutcome, StoreError>;

    /// Removes `code` from `section`. Returns whether anything was removed;
    /// an unknown section is not an error.
    async fn delete_code(&self, section: &str, code: &str) -> Result<bool, StoreError>;

    /// Removes every listed code present in `section` and returns how many
    /// were removed. An unknown section removes nothing.
    async fn bulk_delete(&self, section: &str, codes: &[String]) -> Result<usize, StoreError>;

    /// Current section → codes view.
    async fn snapshot(&self) -> Result<Snapshot, StoreError>;

    /// Every record, including those of deleted sections, most recent first.
    async fn records(&self) -> Result<Vec<BarcodeRecord>, StoreError>;

    /// Section → `{code, timestamp}` view, most recent first.
    async fn history(&self) -> Result<History, StoreError> {
        Ok(History::from_records(self.records().await?))
    }

    async fn contains_section(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.sections().await?.iter().any(|s| s == name))
    }
}
