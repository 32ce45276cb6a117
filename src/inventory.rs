//! Application state shared by every request handler and the camera loop.
//!
//! [`Inventory`] owns the section store, the active-section pointer and the
//! repeated-scan window. All three are mutated under one async mutex so a
//! mobile `/scan` and a camera detection landing on the same section cannot
//! interleave their membership check and insert.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use scanbook_core::store::SectionStore;
use scanbook_core::{
    BarcodeRecord, DeduplicationWindow, History, InsertOutcome, Snapshot, StoreError,
};

struct Ledger {
    active: Option<String>,
    window: DeduplicationWindow,
}

pub struct Inventory {
    store: Arc<dyn SectionStore>,
    cooldown: Duration,
    ledger: Mutex<Ledger>,
}

impl Inventory {
    /// Wraps `store`, making its first section active.
    pub async fn open(store: Arc<dyn SectionStore>, cooldown: Duration) -> Result<Self, StoreError> {
        let active = store.sections().await?.into_iter().next();
        Ok(Self {
            store,
            cooldown,
            ledger: Mutex::new(Ledger {
                active,
                window: DeduplicationWindow::new(),
            }),
        })
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub async fn active_section(&self) -> Option<String> {
        self.ledger.lock().await.active.clone()
    }

    /// Creates a section and makes it active.
    pub async fn create_section(&self, name: &str) -> Result<String, StoreError> {
        let mut ledger = self.ledger.lock().await;
        let name = self.store.create_section(name).await?;
        info!(section = %name, "Section created");
        ledger.active = Some(name.clone());
        Ok(name)
    }

    /// Deletes a section. When it was active, the first remaining section
    /// (or none) becomes active. Returns the active section afterwards.
    pub async fn delete_section(&self, name: &str) -> Result<Option<String>, StoreError> {
        let mut ledger = self.ledger.lock().await;
        self.store.delete_section(name).await?;
        info!(section = %name, "Section deleted");
        if ledger.active.as_deref() == Some(name) {
            ledger.active = self.store.sections().await?.into_iter().next();
        }
        Ok(ledger.active.clone())
    }

    /// Inserts `code` into `section`, or into the active section when none
    /// is given, stamped with the current time.
    pub async fn insert(
        &self,
        section: Option<&str>,
        code: &str,
    ) -> Result<InsertOutcome, StoreError> {
        self.insert_at(section, code, Utc::now().naive_utc()).await
    }

    pub async fn insert_at(
        &self,
        section: Option<&str>,
        code: &str,
        timestamp: NaiveDateTime,
    ) -> Result<InsertOutcome, StoreError> {
        let ledger = self.ledger.lock().await;
        let target = resolve_target(section, ledger.active.as_deref())?;
        self.insert_locked(&target, code, timestamp).await
    }

    /// Inserts every code into the active section. Returns the codes that
    /// were new, in input order.
    pub async fn insert_into_active(&self, codes: &[String]) -> Result<Vec<String>, StoreError> {
        let ledger = self.ledger.lock().await;
        let target = resolve_target(None, ledger.active.as_deref())?;
        let timestamp = Utc::now().naive_utc();
        let mut added = Vec::new();
        for code in codes {
            if self.insert_locked(&target, code, timestamp).await? == InsertOutcome::Inserted {
                added.push(code.clone());
            }
        }
        Ok(added)
    }

    /// Camera path: passes `code` through the repeated-scan window, then
    /// inserts it into the active section. Returns `None` when the detection
    /// was suppressed by the window.
    pub async fn record_detection(
        &self,
        code: &str,
        now: Instant,
    ) -> Result<Option<InsertOutcome>, StoreError> {
        let mut ledger = self.ledger.lock().await;
        if !ledger.window.is_new(code, now, self.cooldown) {
            return Ok(None);
        }
        let target = resolve_target(None, ledger.active.as_deref())?;
        self.insert_locked(&target, code, Utc::now().naive_utc())
            .await
            .map(Some)
    }

    /// Removes one code. Unknown sections are reported as
    /// [`StoreError::SectionNotFound`].
    pub async fn delete_code(&self, section: &str, code: &str) -> Result<bool, StoreError> {
        let _ledger = self.ledger.lock().await;
        self.require_section(section).await?;
        let removed = self.store.delete_code(section, code).await?;
        if removed {
            info!(section = %section, code = %code, "Barcode deleted");
        }
        Ok(removed)
    }

    /// Removes every listed code present in `section`; returns the count.
    pub async fn bulk_delete(&self, section: &str, codes: &[String]) -> Result<usize, StoreError> {
        let _ledger = self.ledger.lock().await;
        self.require_section(section).await?;
        let removed = self.store.bulk_delete(section, codes).await?;
        info!(section = %section, removed, "Bulk delete");
        Ok(removed)
    }

    pub async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        self.store.snapshot().await
    }

    pub async fn history(&self) -> Result<History, StoreError> {
        self.store.history().await
    }

    pub async fn records(&self) -> Result<Vec<BarcodeRecord>, StoreError> {
        self.store.records().await
    }

    async fn require_section(&self, section: &str) -> Result<(), StoreError> {
        if self.store.contains_section(section).await? {
            Ok(())
        } else {
            Err(StoreError::SectionNotFound(section.to_string()))
        }
    }

    // Caller holds the ledger lock.
    async fn insert_locked(
        &self,
        section: &str,
        code: &str,
        timestamp: NaiveDateTime,
    ) -> Result<InsertOutcome, StoreError> {
        let outcome = self.store.insert_code(section, code, timestamp).await?;
        if outcome == InsertOutcome::Inserted {
            info!(section = %section, code = %code, "New barcode recorded");
        }
        Ok(outcome)
    }
}

fn resolve_target(explicit: Option<&str>, active: Option<&str>) -> Result<String, StoreError> {
    explicit
        .or(active)
        .map(str::to_string)
        .ok_or_else(|| StoreError::SectionNotFound(String::new()))
}
