//! Server-side persistence port for content records.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::content::{ContentRecord, ContentType};

pub use memory::MemoryContentRepository;
pub use postgres::PgContentRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{0} already exists")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub published_only: bool,
}

impl ListFilter {
    pub fn published() -> Self {
        Self { published_only: true }
    }

    pub fn admits(&self, record: &ContentRecord) -> bool {
        !self.published_only || record.is_published()
    }
}

/// Data persistence contract for the three content collections.
/// Listing order is newest first by creation time.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn list(
        &self,
        content_type: ContentType,
        filter: ListFilter,
    ) -> Result<Vec<ContentRecord>, RepositoryError>;

    async fn get(&self, content_type: ContentType, id: &str) -> Result<Option<ContentRecord>, RepositoryError>;

    /// Insert a new record; `Conflict` when the id is taken.
    async fn insert(&self, content_type: ContentType, record: ContentRecord) -> Result<ContentRecord, RepositoryError>;

    /// Replace an existing record; `None` when it does not exist.
    async fn update(
        &self,
        content_type: ContentType,
        record: ContentRecord,
    ) -> Result<Option<ContentRecord>, RepositoryError>;

    async fn delete(&self, content_type: ContentType, id: &str) -> Result<bool, RepositoryError>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> Result<(), RepositoryError>;
}
