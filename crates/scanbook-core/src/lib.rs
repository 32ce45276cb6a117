//! # scanbook core
//!
//! Runtime-agnostic logic for scanbook: the repeated-scan suppression
//! window, section and record models, the [`store::SectionStore`] trait and
//! an in-memory store used by tests.
//!
//! This crate contains no tokio, sqlx, HTTP or image dependencies.

pub mod dedup;
pub mod error;
pub mod models;
pub mod store;

pub use dedup::DeduplicationWindow;
pub use error::StoreError;
pub use models::{
    BarcodeRecord, BoundingBox, DecodedBarcode, History, HistoryEntry, InsertOutcome, SectionMap,
    Snapshot,
};
