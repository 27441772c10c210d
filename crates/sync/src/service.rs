//! The data service: one read/write surface over the remote content API and
//! the local persistent store.
//!
//! Reads try the remote first and fall back to the local store; they never
//! fail. Writes go to the remote, are mirrored locally when dual-write is on,
//! and land locally (queued for replay) when the remote is unavailable. Every
//! successful write raises exactly one sync signal.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use church_core::content::id::client_id;
use church_core::content::validate::validate_patch;
use church_core::{ContentRecord, ContentType, Fields, SyncAction};
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::bus::SyncBus;
use crate::config::ServiceConfig;
use crate::error::{RemoteError, ServiceError, StorageError};
use crate::local::LocalContentStore;
use crate::pending::{PendingLog, PendingWrite, ReplayReport};
use crate::remote::{ContentRemote, HttpRemote};
use crate::storage::TabStorage;

enum RemoteOutcome<T> {
    /// No remote configured.
    Skipped,
    Answered(T),
    Failed(RemoteError),
}

impl<T> RemoteOutcome<T> {
    fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteOutcome::Failed(RemoteError::Unauthorized))
    }

    fn failed(&self) -> bool {
        matches!(self, RemoteOutcome::Failed(_))
    }
}

pub struct DataService {
    config: ServiceConfig,
    remote: Option<Arc<dyn ContentRemote>>,
    local: LocalContentStore,
    bus: SyncBus,
    pending: PendingLog,
    login_required: watch::Sender<bool>,
}

impl DataService {
    pub fn new(config: ServiceConfig, remote: Option<Arc<dyn ContentRemote>>, storage: TabStorage) -> Self {
        let local = LocalContentStore::new(storage.clone(), config.keep_per_type, config.media.clone());
        let bus = SyncBus::new(local.clone(), config.signal_capacity);
        let (login_required, _) = watch::channel(false);
        Self {
            config,
            remote,
            local,
            bus,
            pending: PendingLog::new(storage),
            login_required,
        }
    }

    /// Build with an [`HttpRemote`] when the config names an API url.
    pub fn connect(config: ServiceConfig, storage: TabStorage) -> Result<Self, RemoteError> {
        let remote = HttpRemote::from_config(&config)?.map(|remote| Arc::new(remote) as Arc<dyn ContentRemote>);
        Ok(Self::new(config, remote, storage))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn bus(&self) -> &SyncBus {
        &self.bus
    }

    pub fn local(&self) -> &LocalContentStore {
        &self.local
    }

    pub fn pending(&self) -> Vec<PendingWrite> {
        self.pending.entries()
    }

    /// Flips to `true` when the remote rejects our credentials.
    pub fn login_required(&self) -> watch::Receiver<bool> {
        self.login_required.subscribe()
    }

    pub async fn get_all(&self, content_type: ContentType) -> Vec<ContentRecord> {
        self.list(content_type, false).await
    }

    /// Only `published` records, whichever sink answers.
    pub async fn get_published(&self, content_type: ContentType) -> Vec<ContentRecord> {
        self.list(content_type, true).await
    }

    pub async fn get_by_id(&self, content_type: ContentType, id: &str) -> Option<ContentRecord> {
        if let Some(remote) = &self.remote {
            match self.outcome(content_type, "get", remote.get(content_type, id).await) {
                // A record still waiting for its create to replay is only local.
                RemoteOutcome::Answered(None) if self.has_pending_create(content_type, id) => {}
                RemoteOutcome::Answered(found) => return found,
                _ if !self.config.local_fallback => return None,
                _ => {}
            }
        }
        self.local.find(content_type, id)
    }

    pub async fn create(&self, content_type: ContentType, fields: Fields) -> Result<ContentRecord, ServiceError> {
        let remote = match &self.remote {
            Some(remote) => self.outcome(content_type, "create", remote.create(content_type, &fields).await),
            None => RemoteOutcome::Skipped,
        };
        if remote.is_unauthorized() {
            return Err(ServiceError::Unauthorized);
        }
        let write_local = self.writes_locally(&remote);

        let record = match remote {
            RemoteOutcome::Answered(record) => {
                if write_local {
                    if let Err(err) = self.local.upsert(content_type, record.clone()) {
                        warn!(%content_type, id = %record.id, error = %err, "local mirror of create failed");
                    }
                }
                record
            }
            RemoteOutcome::Failed(err) if !write_local => return Err(ServiceError::RemoteOnly(err)),
            outcome => {
                let now = Utc::now();
                let record = ContentRecord::from_fields(client_id(now), fields.clone(), now)?;
                let record = self.local.upsert(content_type, record)?;
                if outcome.failed() {
                    let write = PendingWrite::new(content_type, SyncAction::Create, &record.id, Some(fields));
                    if let Err(err) = self.queue(write) {
                        // A local-only record without a log entry would never reach the remote.
                        if let Err(undo) = self.local.remove(content_type, &record.id) {
                            warn!(%content_type, id = %record.id, error = %undo, "could not undo unqueued create");
                        }
                        return Err(err.into());
                    }
                }
                record
            }
        };

        self.bus.trigger_sync(content_type, SyncAction::Create, item(&record));
        Ok(record)
    }

    /// Merge `fields` over the record with `id`. `Ok(None)` when no sink
    /// has it.
    pub async fn update(
        &self,
        content_type: ContentType,
        id: &str,
        fields: Fields,
    ) -> Result<Option<ContentRecord>, ServiceError> {
        validate_patch(&fields)?;
        let remote = match &self.remote {
            Some(remote) => self.outcome(content_type, "update", remote.update(content_type, id, &fields).await),
            None => RemoteOutcome::Skipped,
        };
        if remote.is_unauthorized() {
            return Err(ServiceError::Unauthorized);
        }
        let write_local = self.writes_locally(&remote);
        let now = Utc::now();

        let updated = match remote {
            RemoteOutcome::Answered(Some(record)) => {
                if write_local {
                    if let Err(err) = self.local.upsert(content_type, record.clone()) {
                        warn!(%content_type, %id, error = %err, "local mirror of update failed");
                    }
                }
                Some(record)
            }
            RemoteOutcome::Answered(None) => {
                // The remote has never seen it; it may be a local-only record
                // still waiting for its create to replay.
                let updated = if write_local {
                    self.local.update(content_type, id, &fields, now)?
                } else {
                    None
                };
                if updated.is_some() && self.has_pending_create(content_type, id) {
                    self.queue(PendingWrite::new(content_type, SyncAction::Update, id, Some(fields)))?;
                }
                updated
            }
            RemoteOutcome::Failed(err) if !write_local => return Err(ServiceError::RemoteOnly(err)),
            outcome => {
                let updated = self.local.update(content_type, id, &fields, now)?;
                if updated.is_some() && outcome.failed() {
                    self.queue(PendingWrite::new(content_type, SyncAction::Update, id, Some(fields)))?;
                }
                updated
            }
        };

        if let Some(record) = &updated {
            self.bus.trigger_sync(content_type, SyncAction::Update, item(record));
        }
        Ok(updated)
    }

    /// `true` when at least one sink removed the record.
    pub async fn delete(&self, content_type: ContentType, id: &str) -> Result<bool, ServiceError> {
        let remote = match &self.remote {
            Some(remote) => self.outcome(content_type, "delete", remote.delete(content_type, id).await),
            None => RemoteOutcome::Skipped,
        };
        if remote.is_unauthorized() {
            return Err(ServiceError::Unauthorized);
        }
        let write_local = self.writes_locally(&remote);

        let (removed, local_copy) = match remote {
            RemoteOutcome::Answered(remote_removed) => {
                let local_copy = if write_local {
                    match self.local.remove(content_type, id) {
                        Ok(copy) => copy,
                        Err(err) if remote_removed => {
                            warn!(%content_type, %id, error = %err, "local mirror of delete failed");
                            None
                        }
                        Err(err) => return Err(err.into()),
                    }
                } else {
                    None
                };
                if !remote_removed && local_copy.is_some() {
                    self.forget_local_only(content_type, id);
                }
                (remote_removed || local_copy.is_some(), local_copy)
            }
            RemoteOutcome::Failed(err) if !write_local => return Err(ServiceError::RemoteOnly(err)),
            outcome => {
                let local_copy = self.local.remove(content_type, id)?;
                if local_copy.is_some() && outcome.failed() {
                    if self.has_pending_create(content_type, id) {
                        self.forget_local_only(content_type, id);
                    } else {
                        self.queue(PendingWrite::new(content_type, SyncAction::Delete, id, None))?;
                    }
                }
                (local_copy.is_some(), local_copy)
            }
        };

        if removed {
            let payload = local_copy.as_ref().map(item).unwrap_or_else(|| json!({ "id": id }));
            self.bus.trigger_sync(content_type, SyncAction::Delete, payload);
        }
        Ok(removed)
    }

    /// Push queued local-only writes to the remote, in order.
    ///
    /// Stops at the first write the remote could not be reached for; writes
    /// it answers with a refusal are dropped. A replayed create adopts the
    /// remote-assigned id locally and raises an `update` signal.
    pub async fn replay_pending(&self) -> ReplayReport {
        let entries = self.pending.entries();
        let mut report = ReplayReport::default();
        let Some(remote) = &self.remote else {
            report.remaining = entries.len();
            return report;
        };

        let mut renamed: HashMap<(ContentType, String), String> = HashMap::new();
        let mut stopped_at = None;
        let empty = Fields::new();

        for (index, write) in entries.iter().enumerate() {
            let content_type = write.content_type;
            let id = renamed
                .get(&(content_type, write.record_id.clone()))
                .cloned()
                .unwrap_or_else(|| write.record_id.clone());
            let fields = write.fields.as_ref().unwrap_or(&empty);

            let result = match write.action {
                SyncAction::Create => remote.create(content_type, fields).await.map(|record| {
                    if record.id != id {
                        renamed.insert((content_type, write.record_id.clone()), record.id.clone());
                    }
                    if let Err(err) = self.local.rekey(content_type, &id, record.clone()) {
                        warn!(%content_type, %id, error = %err, "could not adopt remote id locally");
                    }
                    self.bus.trigger_sync(content_type, SyncAction::Update, item(&record));
                    true
                }),
                SyncAction::Update => remote.update(content_type, &id, fields).await.map(|found| match found {
                    Some(record) => {
                        if let Err(err) = self.local.upsert(content_type, record) {
                            warn!(%content_type, %id, error = %err, "could not refresh local copy");
                        }
                        true
                    }
                    None => false,
                }),
                SyncAction::Delete => remote.delete(content_type, &id).await.map(|_| true),
            };

            match result {
                Ok(true) => report.applied += 1,
                Ok(false) => {
                    warn!(%content_type, %id, action = ?write.action, "remote no longer has record, dropping pending write");
                    report.dropped += 1;
                }
                Err(err) if err.is_retryable() || matches!(err, RemoteError::Unauthorized) => {
                    self.note_remote_failure(content_type, "replay", &err);
                    stopped_at = Some(index);
                    break;
                }
                Err(err) => {
                    warn!(%content_type, %id, action = ?write.action, error = %err, "remote refused pending write, dropping");
                    report.dropped += 1;
                }
            }
        }

        let mut remaining: Vec<PendingWrite> = stopped_at
            .map(|index| entries[index..].to_vec())
            .unwrap_or_default();
        // Writes queued while we were replaying.
        let current = self.pending.entries();
        if current.len() > entries.len() {
            remaining.extend_from_slice(&current[entries.len()..]);
        }
        for write in &mut remaining {
            if let Some(new_id) = renamed.get(&(write.content_type, write.record_id.clone())) {
                write.record_id = new_id.clone();
            }
        }
        report.remaining = remaining.len();
        if let Err(err) = self.pending.replace(&remaining) {
            warn!(error = %err, "could not rewrite pending log");
        }
        info!(applied = report.applied, dropped = report.dropped, remaining = report.remaining, "pending replay finished");
        report
    }

    async fn list(&self, content_type: ContentType, published_only: bool) -> Vec<ContentRecord> {
        let from_remote = match &self.remote {
            Some(remote) => match self.outcome(content_type, "list", remote.list(content_type, published_only).await) {
                RemoteOutcome::Answered(records) => Some(records),
                _ if !self.config.local_fallback => Some(Vec::new()),
                _ => None,
            },
            None => None,
        };
        let mut records = match from_remote {
            Some(mut records) => {
                let waiting = self.pending_create_ids(content_type);
                if !waiting.is_empty() {
                    let local_only: Vec<ContentRecord> = self
                        .local
                        .load(content_type)
                        .into_iter()
                        .filter(|r| waiting.contains(&r.id) && !records.iter().any(|known| known.id == r.id))
                        .collect();
                    records.extend(local_only);
                }
                records
            }
            None => self.local.load(content_type),
        };
        if published_only {
            records.retain(ContentRecord::is_published);
        }
        records
    }

    fn outcome<T>(&self, content_type: ContentType, op: &'static str, result: Result<T, RemoteError>) -> RemoteOutcome<T> {
        match result {
            Ok(value) => {
                self.login_required.send_if_modified(|flag| std::mem::replace(flag, false));
                RemoteOutcome::Answered(value)
            }
            Err(err) => {
                self.note_remote_failure(content_type, op, &err);
                RemoteOutcome::Failed(err)
            }
        }
    }

    fn note_remote_failure(&self, content_type: ContentType, op: &'static str, err: &RemoteError) {
        if matches!(err, RemoteError::Unauthorized) {
            self.login_required.send_replace(true);
            warn!(%content_type, op, "remote rejected credentials, login required");
        } else {
            warn!(%content_type, op, error = %err, "remote unavailable, using local store");
        }
    }

    fn writes_locally<T>(&self, remote: &RemoteOutcome<T>) -> bool {
        match remote {
            RemoteOutcome::Skipped => true,
            RemoteOutcome::Answered(_) => self.config.dual_write,
            RemoteOutcome::Failed(_) => self.config.local_fallback,
        }
    }

    /// Append to the pending log, running a cleanup pass and retrying once
    /// when the store is full.
    fn queue(&self, write: PendingWrite) -> Result<(), StorageError> {
        if !self.config.record_pending {
            return Ok(());
        }
        match self.pending.append(write.clone()) {
            Err(err) if err.is_quota() => {
                warn!(error = %err, "pending log does not fit, running cleanup");
                self.local.cleanup(None);
                self.pending.append(write)
            }
            result => result,
        }
    }

    fn has_pending_create(&self, content_type: ContentType, id: &str) -> bool {
        self.pending
            .entries()
            .iter()
            .any(|w| w.content_type == content_type && w.record_id == id && w.action == SyncAction::Create)
    }

    fn pending_create_ids(&self, content_type: ContentType) -> Vec<String> {
        self.pending
            .entries()
            .into_iter()
            .filter(|w| w.content_type == content_type && w.action == SyncAction::Create)
            .map(|w| w.record_id)
            .collect()
    }

    /// Drop every queued write for a record that never reached the remote.
    fn forget_local_only(&self, content_type: ContentType, id: &str) {
        let entries = self.pending.entries();
        let kept: Vec<PendingWrite> = entries
            .iter()
            .filter(|w| !(w.content_type == content_type && w.record_id == id))
            .cloned()
            .collect();
        if kept.len() != entries.len() {
            if let Err(err) = self.pending.replace(&kept) {
                warn!(error = %err, "could not compact pending log");
            }
        }
    }
}

fn item(record: &ContentRecord) -> Value {
    serde_json::to_value(record).unwrap_or_else(|_| json!({ "id": record.id }))
}
