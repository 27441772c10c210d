//! Typed access to the content collections in the local persistent store.

use chrono::{DateTime, Utc};
use church_core::{ContentRecord, ContentType, Fields, SyncSignal};
use tracing::{debug, info, warn};

use crate::config::MediaLimits;
use crate::error::StorageError;
use crate::media::shrink_inline_media;
use crate::pending::PendingLog;
use crate::storage::TabStorage;

/// Key holding the most recent sync signal.
pub const LAST_SYNC_KEY: &str = "lastSync";
/// Key holding the pending-write intent log.
pub const PENDING_KEY: &str = "pendingSync";

#[derive(Debug, Clone)]
pub struct LocalContentStore {
    storage: TabStorage,
    keep_per_type: usize,
    media: MediaLimits,
}

impl LocalContentStore {
    pub fn new(storage: TabStorage, keep_per_type: usize, media: MediaLimits) -> Self {
        Self {
            storage,
            keep_per_type: keep_per_type.max(1),
            media,
        }
    }

    pub fn storage(&self) -> &TabStorage {
        &self.storage
    }

    /// Read a collection. Missing or malformed data reads as empty.
    pub fn load(&self, content_type: ContentType) -> Vec<ContentRecord> {
        let key = content_type.storage_key();
        match self.storage.get(key) {
            Ok(Some(text)) => serde_json::from_str(&text).unwrap_or_else(|err| {
                warn!(key, error = %err, "malformed collection in local store, treating as empty");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(key, error = %err, "local store read failed");
                Vec::new()
            }
        }
    }

    /// Write a whole collection. On quota exhaustion every collection is cut
    /// to its most recently modified records and the write is retried once
    /// with this collection cut the same way. Queued writes for local-only
    /// records that were cut go with them. Returns the stored length.
    pub fn save(&self, content_type: ContentType, records: &[ContentRecord]) -> Result<usize, StorageError> {
        let key = content_type.storage_key();
        match self.storage.set(key, &serde_json::to_string(records)?) {
            Ok(()) => Ok(records.len()),
            Err(err) if err.is_quota() => {
                warn!(key, error = %err, "local store full, running cleanup");
                self.cleanup(Some(content_type));
                let kept = newest(records, self.keep_per_type);
                self.storage
                    .set(key, &serde_json::to_string(&kept)?)
                    .map_err(|err| match err {
                        StorageError::QuotaExceeded(detail) => StorageError::QuotaExceeded(format!(
                            "{key} still does not fit after cleanup: {detail}"
                        )),
                        other => other,
                    })?;
                info!(key, before = records.len(), after = kept.len(), "collection trimmed to fit");
                self.forget_trimmed(content_type, records, &kept);
                Ok(kept.len())
            }
            Err(err) => Err(err),
        }
    }

    /// Trim every collection except `skip` to `keep_per_type` records.
    pub fn cleanup(&self, skip: Option<ContentType>) {
        for content_type in ContentType::ALL {
            if Some(content_type) == skip {
                continue;
            }
            let records = self.load(content_type);
            if records.len() <= self.keep_per_type {
                continue;
            }
            let kept = newest(&records, self.keep_per_type);
            let result = serde_json::to_string(&kept)
                .map_err(StorageError::from)
                .and_then(|text| self.storage.set(content_type.storage_key(), &text));
            match result {
                Ok(()) => {
                    debug!(
                        key = content_type.storage_key(),
                        removed = records.len() - kept.len(),
                        "cleanup trimmed collection"
                    );
                    self.forget_trimmed(content_type, &records, &kept);
                }
                Err(err) => warn!(key = content_type.storage_key(), error = %err, "cleanup write failed"),
            }
        }
    }

    fn forget_trimmed(&self, content_type: ContentType, before: &[ContentRecord], kept: &[ContentRecord]) {
        let trimmed: Vec<String> = before
            .iter()
            .filter(|r| !kept.iter().any(|k| k.id == r.id))
            .map(|r| r.id.clone())
            .collect();
        if trimmed.is_empty() {
            return;
        }
        match PendingLog::new(self.storage.clone()).forget_local_only(content_type, &trimmed) {
            Ok(0) => {}
            Ok(dropped) => info!(%content_type, dropped, "dropped queued writes for trimmed local-only records"),
            Err(err) => warn!(%content_type, error = %err, "could not prune pending log after cleanup"),
        }
    }

    pub fn find(&self, content_type: ContentType, id: &str) -> Option<ContentRecord> {
        self.load(content_type).into_iter().find(|r| r.id == id)
    }

    /// Store `record`, replacing any record with the same id, after shrinking
    /// oversized inline media.
    pub fn upsert(&self, content_type: ContentType, mut record: ContentRecord) -> Result<ContentRecord, StorageError> {
        shrink_inline_media(&mut record, &self.media);
        let mut records = self.load(content_type);
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => *slot = record.clone(),
            None => records.push(record.clone()),
        }
        self.save(content_type, &records)?;
        Ok(record)
    }

    /// Merge `patch` over the record with `id`. `None` when absent.
    pub fn update(
        &self,
        content_type: ContentType,
        id: &str,
        patch: &Fields,
        now: DateTime<Utc>,
    ) -> Result<Option<ContentRecord>, StorageError> {
        let mut records = self.load(content_type);
        let Some(slot) = records.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        slot.apply_patch(patch, now)?;
        shrink_inline_media(slot, &self.media);
        let updated = slot.clone();
        self.save(content_type, &records)?;
        Ok(Some(updated))
    }

    /// Remove the record with `id`, returning it when it existed.
    pub fn remove(&self, content_type: ContentType, id: &str) -> Result<Option<ContentRecord>, StorageError> {
        let mut records = self.load(content_type);
        let Some(index) = records.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        let removed = records.remove(index);
        self.save(content_type, &records)?;
        Ok(Some(removed))
    }

    /// Swap the record stored under `old_id` for `record` (which may carry a
    /// different id). Inserts when `old_id` is absent.
    pub fn rekey(&self, content_type: ContentType, old_id: &str, record: ContentRecord) -> Result<(), StorageError> {
        let mut records = self.load(content_type);
        records.retain(|r| r.id != old_id && r.id != record.id);
        records.push(record);
        self.save(content_type, &records)?;
        Ok(())
    }

    pub fn last_sync(&self) -> Option<SyncSignal> {
        let text = self.storage.get(LAST_SYNC_KEY).ok().flatten()?;
        serde_json::from_str(&text).ok()
    }

    pub fn record_last_sync(&self, signal: &SyncSignal) -> Result<(), StorageError> {
        self.storage.set(LAST_SYNC_KEY, &serde_json::to_string(signal)?)
    }
}

/// The `keep` most recently modified records, in their original order.
/// Equal timestamps favour the later position.
fn newest(records: &[ContentRecord], keep: usize) -> Vec<ContentRecord> {
    if records.len() <= keep {
        return records.to_vec();
    }
    let mut by_recency: Vec<(usize, &ContentRecord)> = records.iter().enumerate().collect();
    by_recency.sort_by(|(ia, a), (ib, b)| (b.last_modified(), ib).cmp(&(a.last_modified(), ia)));
    let mut cutoff: Vec<usize> = by_recency.iter().take(keep).map(|(index, _)| *index).collect();
    cutoff.sort_unstable();
    cutoff.into_iter().map(|index| records[index].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryBackend, StorageArea};
    use chrono::Duration;
    use serde_json::json;
    use std::sync::Arc;

    fn record(id: &str, minutes_ago: i64) -> ContentRecord {
        ContentRecord::from_fields(
            id,
            json!({"title": format!("Item {id}"), "summary": "x".repeat(40)})
                .as_object()
                .cloned()
                .unwrap(),
            Utc::now() - Duration::minutes(minutes_ago),
        )
        .unwrap()
    }

    fn store_with(backend: MemoryBackend) -> LocalContentStore {
        let area = StorageArea::new(Arc::new(backend));
        LocalContentStore::new(area.open_tab(), 10, MediaLimits::default())
    }

    #[test]
    fn malformed_collection_reads_empty() {
        let store = store_with(MemoryBackend::new());
        store.storage().set("blogs", "{not json").unwrap();
        assert!(store.load(ContentType::Blogs).is_empty());
    }

    #[test]
    fn upsert_update_remove_by_id() {
        let store = store_with(MemoryBackend::new());
        store.upsert(ContentType::Events, record("a", 5)).unwrap();
        store.upsert(ContentType::Events, record("b", 1)).unwrap();
        store.upsert(ContentType::Events, record("a", 0)).unwrap();
        assert_eq!(store.load(ContentType::Events).len(), 2);

        let patch = json!({"title": "Renamed"}).as_object().cloned().unwrap();
        let updated = store
            .update(ContentType::Events, "b", &patch, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Renamed");
        assert!(store.update(ContentType::Events, "zzz", &patch, Utc::now()).unwrap().is_none());

        assert_eq!(store.remove(ContentType::Events, "a").unwrap().unwrap().id, "a");
        assert!(store.remove(ContentType::Events, "a").unwrap().is_none());
        assert!(store.find(ContentType::Events, "a").is_none());
    }

    #[test]
    fn quota_exceeded_trims_to_most_recent() {
        let store = store_with(MemoryBackend::new());
        let records: Vec<ContentRecord> = (0..25).map(|i| record(&format!("r{i}"), 100 - i)).collect();
        store.save(ContentType::Blogs, &records).unwrap();
        let full = serde_json::to_string(&records).unwrap().len();

        // Same data against a tight quota: cleanup must kick in.
        let tight = store_with(MemoryBackend::with_quota(full / 2 + 64));
        let stored = tight.save(ContentType::Blogs, &records).unwrap();
        assert_eq!(stored, 10);

        let kept = tight.load(ContentType::Blogs);
        assert_eq!(kept.len(), 10);
        let ids: Vec<&str> = kept.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.first(), Some(&"r15"));
        assert_eq!(ids.last(), Some(&"r24"));
    }

    #[test]
    fn cleanup_trims_other_collections_first() {
        let store = store_with(MemoryBackend::new());
        let sermons: Vec<ContentRecord> = (0..15).map(|i| record(&format!("s{i}"), 50 - i)).collect();
        store.save(ContentType::Sermons, &sermons).unwrap();
        store.cleanup(Some(ContentType::Blogs));
        assert_eq!(store.load(ContentType::Sermons).len(), 10);
    }

    #[test]
    fn still_too_large_surfaces_quota_error() {
        let store = store_with(MemoryBackend::with_quota(64));
        let err = store.upsert(ContentType::Blogs, record("big", 0)).unwrap_err();
        assert!(err.is_quota());
        assert!(err.to_string().contains("try a smaller file or clear data"));
    }

    #[test]
    fn trimmed_local_only_records_leave_the_pending_log() {
        let store = store_with(MemoryBackend::new());
        let log = PendingLog::new(store.storage().clone());
        let records: Vec<ContentRecord> = (0..12).map(|i| record(&format!("r{i}"), 100 - i)).collect();
        store.save(ContentType::Events, &records).unwrap();
        for r in &records {
            log.append(crate::pending::PendingWrite::new(
                ContentType::Events,
                church_core::SyncAction::Create,
                &r.id,
                Some(Fields::new()),
            ))
            .unwrap();
        }

        store.cleanup(None);
        let queued: Vec<String> = log.entries().into_iter().map(|w| w.record_id).collect();
        let stored: Vec<String> = store.load(ContentType::Events).into_iter().map(|r| r.id).collect();
        assert_eq!(queued, stored);
        assert_eq!(queued.first().map(String::as_str), Some("r2"));
    }

    #[test]
    fn equal_timestamps_keep_the_latest_inserted() {
        let at = Utc::now();
        let records: Vec<ContentRecord> = (0..12)
            .map(|i| {
                ContentRecord::from_fields(format!("t{i}"), json!({"title": "same"}).as_object().cloned().unwrap(), at)
                    .unwrap()
            })
            .collect();
        let ids: Vec<String> = newest(&records, 10).into_iter().map(|r| r.id).collect();
        assert_eq!(ids.first().map(String::as_str), Some("t2"));
        assert_eq!(ids.last().map(String::as_str), Some("t11"));
    }

    #[test]
    fn last_sync_round_trip() {
        let store = store_with(MemoryBackend::new());
        assert!(store.last_sync().is_none());
        let signal = SyncSignal::new(ContentType::Events, church_core::SyncAction::Create, json!({"id": "1"}));
        store.record_last_sync(&signal).unwrap();
        assert_eq!(store.last_sync(), Some(signal));
    }

    #[test]
    fn rekey_replaces_local_id() {
        let store = store_with(MemoryBackend::new());
        store.upsert(ContentType::Blogs, record("local-1", 0)).unwrap();
        store.rekey(ContentType::Blogs, "local-1", record("1700000000000", 0)).unwrap();
        let ids: Vec<String> = store.load(ContentType::Blogs).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["1700000000000"]);
    }
}
