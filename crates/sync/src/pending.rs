//! Write-ahead log of mutations that only reached the local store.
//!
//! The log is kept under `pendingSync` so it survives reloads and is shared
//! by every tab. Entries are replayed in order by
//! [`DataService::replay_pending`](crate::DataService::replay_pending).

use chrono::{DateTime, Utc};
use church_core::{ContentType, Fields, SyncAction};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StorageError;
use crate::local::PENDING_KEY;
use crate::storage::TabStorage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWrite {
    pub content_type: ContentType,
    pub action: SyncAction,
    /// Id of the record in the local store at the time of the write.
    pub record_id: String,
    /// Create body or update patch; absent for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Fields>,
    pub queued_at: DateTime<Utc>,
}

impl PendingWrite {
    pub fn new(content_type: ContentType, action: SyncAction, record_id: impl Into<String>, fields: Option<Fields>) -> Self {
        Self {
            content_type,
            action,
            record_id: record_id.into(),
            fields,
            queued_at: Utc::now(),
        }
    }
}

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Accepted by the remote.
    pub applied: usize,
    /// Refused by the remote and discarded.
    pub dropped: usize,
    /// Still queued because the remote stopped answering.
    pub remaining: usize,
}

#[derive(Debug, Clone)]
pub struct PendingLog {
    storage: TabStorage,
}

impl PendingLog {
    pub fn new(storage: TabStorage) -> Self {
        Self { storage }
    }

    pub fn entries(&self) -> Vec<PendingWrite> {
        match self.storage.get(PENDING_KEY) {
            Ok(Some(text)) => serde_json::from_str(&text).unwrap_or_else(|err| {
                warn!(error = %err, "pending log unreadable, starting fresh");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "pending log read failed");
                Vec::new()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn append(&self, write: PendingWrite) -> Result<(), StorageError> {
        let mut entries = self.entries();
        entries.push(write);
        self.replace(&entries)
    }

    /// Drop every entry for the records in `ids` that were created locally
    /// and never reached the remote. Entries for remote records stay.
    /// Returns how many entries were removed.
    pub fn forget_local_only(&self, content_type: ContentType, ids: &[String]) -> Result<usize, StorageError> {
        let entries = self.entries();
        let local_only: Vec<&str> = entries
            .iter()
            .filter(|w| w.content_type == content_type && w.action == SyncAction::Create)
            .map(|w| w.record_id.as_str())
            .filter(|id| ids.iter().any(|trimmed| trimmed == id))
            .collect();
        if local_only.is_empty() {
            return Ok(0);
        }
        let kept: Vec<PendingWrite> = entries
            .iter()
            .filter(|w| !(w.content_type == content_type && local_only.contains(&w.record_id.as_str())))
            .cloned()
            .collect();
        self.replace(&kept)?;
        Ok(entries.len() - kept.len())
    }

    pub fn replace(&self, entries: &[PendingWrite]) -> Result<(), StorageError> {
        if entries.is_empty() {
            return self.storage.remove(PENDING_KEY);
        }
        self.storage.set(PENDING_KEY, &serde_json::to_string(entries)?)
    }
}
