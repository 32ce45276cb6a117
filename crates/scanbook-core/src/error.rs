use thiserror::Error;

/// Failures reported by a [`SectionStore`](crate::store::SectionStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("section already exists: {0}")]
    DuplicateSection(String),

    #[error("section not found: {0}")]
    SectionNotFound(String),

    #[error("section name must not be empty")]
    InvalidSectionName,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::SectionNotFound(_))
    }
}
