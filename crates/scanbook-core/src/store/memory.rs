//! In-memory [`SectionStore`] implementation for tests.
//!
//! Live sections and the record log are kept apart behind one
//! `std::sync::Mutex`, so deleting a section leaves its records in the log.
//! Counts every write so tests can assert that idempotent operations left
//! the store untouched.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::StoreError;
use crate::models::{normalize_section_name, same_key, BarcodeRecord, InsertOutcome, Snapshot};

use super::SectionStore;

struct StoredSection {
    id: u64,
    name: String,
}

struct StoredRecord {
    seq: u64,
    section_id: u64,
    section: String,
    code: String,
    timestamp: NaiveDateTime,
}

#[derive(Default)]
struct Tables {
    sections: Vec<StoredSection>,
    records: Vec<StoredRecord>,
    next_id: u64,
}

impl Tables {
    fn live(&self, name: &str) -> Option<u64> {
        self.sections.iter().find(|s| s.name == name).map(|s| s.id)
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory section store.
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of mutating writes performed so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SectionStore for InMemoryStore {
    async fn sections(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().sections.iter().map(|s| s.name.clone()).collect())
    }

    async fn create_section(&self, name: &str) -> Result<String, StoreError> {
        let name = normalize_section_name(name)?;
        let mut tables = self.lock();
        if tables.sections.iter().any(|s| same_key(&s.name, &name)) {
            return Err(StoreError::DuplicateSection(name));
        }
        let id = tables.next_id();
        tables.sections.push(StoredSection {
            id,
            name: name.clone(),
        });
        self.record_write();
        Ok(name)
    }

    async fn delete_section(&self, name: &str) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let pos = tables
            .sections
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| StoreError::SectionNotFound(name.to_string()))?;
        tables.sections.remove(pos);
        self.record_write();
        Ok(())
    }

    async fn insert_code(
        &self,
        section: &str,
        code: &str,
        timestamp: NaiveDateTime,
    ) -> Result<InsertOutcome, StoreError> {
        let mut tables = self.lock();
        let section_id = tables
            .live(section)
            .ok_or_else(|| StoreError::SectionNotFound(section.to_string()))?;
        if tables
            .records
            .iter()
            .any(|r| r.section_id == section_id && same_key(&r.code, code))
        {
            return Ok(InsertOutcome::AlreadyExists);
        }
        let seq = tables.next_id();
        tables.records.push(StoredRecord {
            seq,
            section_id,
            section: section.to_string(),
            code: code.to_string(),
            timestamp,
        });
        self.record_write();
        Ok(InsertOutcome::Inserted)
    }

    async fn delete_code(&self, section: &str, code: &str) -> Result<bool, StoreError> {
        Ok(self.bulk_delete(section, &[code.to_string()]).await? > 0)
    }

    async fn bulk_delete(&self, section: &str, codes: &[String]) -> Result<usize, StoreError> {
        let mut tables = self.lock();
        let Some(section_id) = tables.live(section) else {
            return Ok(0);
        };
        let before = tables.records.len();
        tables
            .records
            .retain(|r| r.section_id != section_id || !codes.contains(&r.code));
        let removed = before - tables.records.len();
        if removed > 0 {
            self.record_write();
        }
        Ok(removed)
    }

    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let tables = self.lock();
        Ok(tables
            .sections
            .iter()
            .map(|s| {
                let codes = tables
                    .records
                    .iter()
                    .filter(|r| r.section_id == s.id)
                    .map(|r| r.code.clone())
                    .collect();
                (s.name.clone(), codes)
            })
            .collect())
    }

    async fn records(&self) -> Result<Vec<BarcodeRecord>, StoreError> {
        let tables = self.lock();
        let mut rows: Vec<&StoredRecord> = tables.records.iter().collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.seq.cmp(&a.seq)));
        Ok(rows
            .into_iter()
            .map(|r| BarcodeRecord {
                section: r.section.clone(),
                code: r.code.clone(),
                timestamp: Some(r.timestamp),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(secs: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, 15)
            .unwrap()
            .and_hms_opt(21, 0, secs)
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_insert_is_idempotent_and_writes_nothing() {
        let store = InMemoryStore::new();
        store.create_section("Depo1").await.unwrap();

        let first = store.insert_code("Depo1", "ABC123", at(0)).await.unwrap();
        let writes = store.writes();
        let second = store.insert_code("Depo1", "ABC123", at(1)).await.unwrap();

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::AlreadyExists);
        assert_eq!(store.writes(), writes);
    }

    #[tokio::test]
    async fn test_insert_ignores_code_case() {
        let store = InMemoryStore::new();
        store.create_section("Depo1").await.unwrap();
        store.insert_code("Depo1", "abc123", at(0)).await.unwrap();
        assert_eq!(
            store.insert_code("Depo1", "ABC123", at(1)).await.unwrap(),
            InsertOutcome::AlreadyExists
        );
    }

    #[tokio::test]
    async fn test_same_code_in_two_sections() {
        let store = InMemoryStore::new();
        store.create_section("A").await.unwrap();
        store.create_section("B").await.unwrap();
        assert_eq!(
            store.insert_code("A", "X", at(0)).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert_code("B", "X", at(0)).await.unwrap(),
            InsertOutcome::Inserted
        );
    }

    #[tokio::test]
    async fn test_create_section_is_case_insensitive_unique() {
        let store = InMemoryStore::new();
        store.create_section("Produce").await.unwrap();
        let err = store.create_section("produce").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSection(_)));
    }

    #[tokio::test]
    async fn test_insert_into_unknown_section() {
        let store = InMemoryStore::new();
        let err = store.insert_code("nope", "X", at(0)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_bulk_delete_counts_only_present_codes() {
        let store = InMemoryStore::new();
        store.create_section("S").await.unwrap();
        store.insert_code("S", "c1", at(0)).await.unwrap();
        store.insert_code("S", "c3", at(1)).await.unwrap();

        let removed = store
            .bulk_delete("S", &["c1".to_string(), "c2".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.snapshot().await.unwrap().get("S").unwrap(), ["c3"]);
        assert_eq!(store.bulk_delete("missing", &["c3".into()]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_records_most_recent_first() {
        let store = InMemoryStore::new();
        store.create_section("S").await.unwrap();
        store.insert_code("S", "old", at(0)).await.unwrap();
        store.insert_code("S", "new", at(5)).await.unwrap();
        store.insert_code("S", "tie", at(5)).await.unwrap();

        let codes: Vec<String> = store
            .records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.code)
            .collect();
        assert_eq!(codes, vec!["tie", "new", "old"]);
    }

    #[tokio::test]
    async fn test_deleted_section_keeps_records_but_not_membership() {
        let store = InMemoryStore::new();
        store.create_section("Depo1").await.unwrap();
        store.insert_code("Depo1", "KEEP1", at(0)).await.unwrap();
        store.delete_section("Depo1").await.unwrap();

        let records = store.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].section, "Depo1");
        assert_eq!(records[0].code, "KEEP1");

        store.create_section("Depo1").await.unwrap();
        assert!(store.snapshot().await.unwrap().get("Depo1").unwrap().is_empty());
        assert_eq!(
            store.insert_code("Depo1", "KEEP1", at(1)).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(store.records().await.unwrap().len(), 2);
    }
}
