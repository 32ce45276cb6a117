//! File projection of the section store.
//!
//! The database is authoritative; this file is rewritten from it after every
//! mutation so the current `{section: [codes]}` state stays readable with a
//! text editor. Writes go to a sibling temp file and are renamed into place.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use scanbook_core::Snapshot;

#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file, returning `None` when it does not exist.
    pub fn load(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read snapshot: {}", self.path.display()))?;
        let snapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot: {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    pub fn write(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write snapshot: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace snapshot: {}", self.path.display()))?;
        Ok(())
    }
}
