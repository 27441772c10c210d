use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ContentRepository, ListFilter, RepositoryError};
use crate::content::{ContentRecord, ContentType};

/// Process-local repository. Used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryContentRepository {
    collections: RwLock<HashMap<ContentType, Vec<ContentRecord>>>,
}

impl MemoryContentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentRepository for MemoryContentRepository {
    async fn list(
        &self,
        content_type: ContentType,
        filter: ListFilter,
    ) -> Result<Vec<ContentRecord>, RepositoryError> {
        let collections = self.collections.read().await;
        let mut records: Vec<ContentRecord> = collections
            .get(&content_type)
            .map(|records| records.iter().filter(|r| filter.admits(r)).cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn get(&self, content_type: ContentType, id: &str) -> Result<Option<ContentRecord>, RepositoryError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&content_type)
            .and_then(|records| records.iter().find(|r| r.id == id).cloned()))
    }

    async fn insert(&self, content_type: ContentType, record: ContentRecord) -> Result<ContentRecord, RepositoryError> {
        let mut collections = self.collections.write().await;
        let records = collections.entry(content_type).or_default();
        if records.iter().any(|r| r.id == record.id) {
            return Err(RepositoryError::Conflict(format!("{content_type}/{}", record.id)));
        }
        records.push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        content_type: ContentType,
        record: ContentRecord,
    ) -> Result<Option<ContentRecord>, RepositoryError> {
        let mut collections = self.collections.write().await;
        let Some(slot) = collections
            .get_mut(&content_type)
            .and_then(|records| records.iter_mut().find(|r| r.id == record.id))
        else {
            return Ok(None);
        };
        *slot = record.clone();
        Ok(Some(record))
    }

    async fn delete(&self, content_type: ContentType, id: &str) -> Result<bool, RepositoryError> {
        let mut collections = self.collections.write().await;
        let Some(records) = collections.get_mut(&content_type) else {
            return Ok(false);
        };
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
