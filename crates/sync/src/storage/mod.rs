//! The local persistent store: an origin-wide key/value area shared by every
//! tab, plus per-tab handles that see each other's writes as change events.
//!
//! A tab never receives events for its own writes. Same-tab listeners are
//! expected to use the in-process channel of the sync bus instead.

pub mod file;
pub mod memory;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use church_core::EventBus;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::error::StorageError;

pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Raw key/value persistence. Values are JSON text.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

pub type TabId = u64;

/// A write observed on the shared area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub origin: TabId,
}

#[derive(Clone)]
pub struct StorageArea {
    backend: Arc<dyn StorageBackend>,
    events: EventBus<StorageEvent>,
    next_tab: Arc<AtomicU64>,
}

impl fmt::Debug for StorageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageArea").field("backend", &self.backend).finish()
    }
}

impl StorageArea {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            events: EventBus::new(256),
            next_tab: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Open a new tab on this area.
    pub fn open_tab(&self) -> TabStorage {
        TabStorage {
            area: self.clone(),
            tab: self.next_tab.fetch_add(1, Ordering::Relaxed),
        }
    }
}

/// One tab's view of the shared area.
#[derive(Debug, Clone)]
pub struct TabStorage {
    area: StorageArea,
    tab: TabId,
}

impl TabStorage {
    pub fn tab_id(&self) -> TabId {
        self.tab
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.area.backend.read(key)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let old_value = self.area.backend.read(key).unwrap_or(None);
        self.area.backend.write(key, value)?;
        self.notify(key, old_value, Some(value.to_string()));
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let old_value = self.area.backend.read(key).unwrap_or(None);
        self.area.backend.remove(key)?;
        if old_value.is_some() {
            self.notify(key, old_value, None);
        }
        Ok(())
    }

    pub fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.area.backend.keys()
    }

    /// Change events raised by *other* tabs.
    pub fn subscribe(&self) -> StorageEvents {
        StorageEvents {
            rx: self.area.events.subscribe(),
            tab: self.tab,
        }
    }

    fn notify(&self, key: &str, old_value: Option<String>, new_value: Option<String>) {
        // No listeners is the normal state of a single-tab session.
        let _ = self.area.events.publish(StorageEvent {
            key: key.to_string(),
            old_value,
            new_value,
            origin: self.tab,
        });
    }
}

pub struct StorageEvents {
    rx: broadcast::Receiver<StorageEvent>,
    tab: TabId,
}

impl StorageEvents {
    /// Next foreign event; `None` once the area is gone.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin != self.tab => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(tab = self.tab, skipped, "storage listener lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
