//! The sync signal bus: one in-process channel for this tab, one cross-tab
//! channel carried by change events on the shared store.

use church_core::{ContentType, EventBus, SignalFilter, SyncAction, SyncSignal};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::local::{LocalContentStore, LAST_SYNC_KEY};
use crate::storage::{StorageEvent, StorageEvents};

/// What woke a listener up.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotice {
    /// Raised by a mutation in this tab.
    InProcess(SyncSignal),
    /// Another tab published a signal through `lastSync`.
    CrossTab(SyncSignal),
    /// Another tab rewrote a collection directly.
    CollectionChanged(ContentType),
}

impl SyncNotice {
    pub fn content_type(&self) -> ContentType {
        match self {
            SyncNotice::InProcess(signal) | SyncNotice::CrossTab(signal) => signal.content_type,
            SyncNotice::CollectionChanged(content_type) => *content_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncBus {
    in_process: EventBus<SyncSignal>,
    store: LocalContentStore,
}

impl SyncBus {
    pub fn new(store: LocalContentStore, capacity: usize) -> Self {
        Self {
            in_process: EventBus::new(capacity),
            store,
        }
    }

    /// Record `lastSync` (visible to other tabs) and dispatch in-process.
    /// A failed `lastSync` write is logged; same-tab delivery still happens.
    pub fn trigger_sync(&self, content_type: ContentType, action: SyncAction, item: Value) -> SyncSignal {
        let signal = SyncSignal::new(content_type, action, item);
        if let Err(err) = self.store.record_last_sync(&signal) {
            warn!(%content_type, ?action, error = %err, "could not record lastSync");
        }
        let delivered = self.in_process.publish(signal.clone()).unwrap_or(0);
        debug!(%content_type, ?action, delivered, "sync signal raised");
        signal
    }

    /// Both channels, filtered.
    pub fn subscribe(&self, filter: SignalFilter) -> SyncSubscription {
        SyncSubscription {
            in_process: self.in_process.subscribe(),
            cross_tab: self.store.storage().subscribe(),
            filter,
        }
    }

    /// Only signals raised in this tab.
    pub fn subscribe_in_process(&self) -> broadcast::Receiver<SyncSignal> {
        self.in_process.subscribe()
    }

    /// Only notices originating in other tabs.
    pub fn subscribe_cross_tab(&self, filter: SignalFilter) -> CrossTabSubscription {
        CrossTabSubscription {
            events: self.store.storage().subscribe(),
            filter,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.in_process.subscriber_count()
    }
}

pub struct SyncSubscription {
    in_process: broadcast::Receiver<SyncSignal>,
    cross_tab: StorageEvents,
    filter: SignalFilter,
}

impl SyncSubscription {
    /// Next relevant notice from either channel; `None` once both are gone.
    pub async fn recv(&mut self) -> Option<SyncNotice> {
        loop {
            let notice = tokio::select! {
                received = self.in_process.recv() => match received {
                    Ok(signal) => Some(SyncNotice::InProcess(signal)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "sync listener lagged");
                        None
                    }
                    Err(RecvError::Closed) => return None,
                },
                event = self.cross_tab.recv() => match event {
                    Some(event) => notice_from_storage(&event),
                    None => return None,
                },
            };
            if let Some(notice) = notice {
                if self.filter.matches(notice.content_type()) {
                    return Some(notice);
                }
            }
        }
    }
}

pub struct CrossTabSubscription {
    events: StorageEvents,
    filter: SignalFilter,
}

impl CrossTabSubscription {
    pub async fn recv(&mut self) -> Option<SyncNotice> {
        loop {
            let event = self.events.recv().await?;
            if let Some(notice) = notice_from_storage(&event) {
                if self.filter.matches(notice.content_type()) {
                    return Some(notice);
                }
            }
        }
    }
}

fn notice_from_storage(event: &StorageEvent) -> Option<SyncNotice> {
    if event.key == LAST_SYNC_KEY {
        let text = event.new_value.as_deref()?;
        return match serde_json::from_str::<SyncSignal>(text) {
            Ok(signal) => Some(SyncNotice::CrossTab(signal)),
            Err(err) => {
                warn!(error = %err, "unreadable lastSync payload from another tab");
                None
            }
        };
    }
    ContentType::ALL
        .into_iter()
        .find(|ct| ct.storage_key() == event.key)
        .map(SyncNotice::CollectionChanged)
}
