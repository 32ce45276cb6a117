//! Data types shared by the stores, the HTTP layer and the exporters.

use std::fmt;
use std::marker::PhantomData;

use chrono::NaiveDateTime;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::StoreError;

/// Format used for persisted and reported timestamps (`2025-07-15T21:03:45`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// One historical insert, as stored in the relational log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeRecord {
    pub section: String,
    pub code: String,
    /// `None` when the stored value could not be parsed.
    pub timestamp: Option<NaiveDateTime>,
}

/// A `{code, timestamp}` pair as reported by the history view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub code: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: Option<NaiveDateTime>,
}

fn serialize_timestamp<S: Serializer>(
    ts: &Option<NaiveDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match ts {
        Some(ts) => serializer.serialize_str(&format_timestamp(ts)),
        None => serializer.serialize_none(),
    }
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses the timestamp shapes the `barcodes` table may hold: ISO-8601 with
/// a `T` separator (optionally with fractional seconds) or SQLite's
/// `CURRENT_TIMESTAMP` layout.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw.trim(), fmt).ok())
}

/// Bounding box of a detected barcode, in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Smallest box containing every point. Negative coordinates clamp to 0.
    pub fn enclosing(points: &[(f32, f32)]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.0, first.1, first.0, first.1);
        for &(x, y) in rest {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        let x = min_x.max(0.0) as u32;
        let y = min_y.max(0.0) as u32;
        Some(Self {
            x,
            y,
            width: (max_x.max(0.0) as u32).saturating_sub(x),
            height: (max_y.max(0.0) as u32).saturating_sub(y),
        })
    }
}

/// A payload decoded from a still image together with where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBarcode {
    pub code: String,
    pub bounds: BoundingBox,
}

/// Ordered `section name → list` mapping.
///
/// Serializes as a JSON object whose keys keep insertion order, which a
/// plain `HashMap`/`BTreeMap` would not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionMap<T> {
    entries: Vec<(String, Vec<T>)>,
}

/// Current section → codes view, also the on-disk snapshot format.
pub type Snapshot = SectionMap<String>;

/// Section → `{code, timestamp}` view, most recent first.
pub type History = SectionMap<HistoryEntry>;

impl<T> SectionMap<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a section. A section already present is replaced in place.
    pub fn insert(&mut self, name: impl Into<String>, items: Vec<T>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = items,
            None => self.entries.push((name, items)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[T]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, items)| items.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[T])> {
        self.entries
            .iter()
            .map(|(n, items)| (n.as_str(), items.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<(String, Vec<T>)> {
        self.entries
    }
}

impl<T> Default for SectionMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<(String, Vec<T>)> for SectionMap<T> {
    fn from_iter<I: IntoIterator<Item = (String, Vec<T>)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, items) in iter {
            map.insert(name, items);
        }
        map
    }
}

impl History {
    /// Groups records that are already sorted most-recent first. Sections
    /// appear in the order of their most recent record.
    pub fn from_records(records: Vec<BarcodeRecord>) -> Self {
        let mut history = Self::new();
        for record in records {
            let entry = HistoryEntry {
                code: record.code,
                timestamp: record.timestamp,
            };
            match history
                .entries
                .iter_mut()
                .find(|(n, _)| *n == record.section)
            {
                Some((_, entries)) => entries.push(entry),
                None => history.entries.push((record.section, vec![entry])),
            }
        }
        history
    }
}

impl<T: Serialize> Serialize for SectionMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, items) in &self.entries {
            map.serialize_entry(name, items)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for SectionMap<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SectionMapVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for SectionMapVisitor<T> {
            type Value = SectionMap<T>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of section names to lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = SectionMap::new();
                while let Some((name, items)) = access.next_entry::<String, Vec<T>>()? {
                    map.insert(name, items);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(SectionMapVisitor(PhantomData))
    }
}

/// Trims a user-supplied section name, rejecting empty input.
pub fn normalize_section_name(raw: &str) -> Result<String, StoreError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(StoreError::InvalidSectionName);
    }
    Ok(name.to_string())
}

/// Case-insensitive comparison used for section-name uniqueness and
/// per-section code deduplication.
pub fn same_key(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}
