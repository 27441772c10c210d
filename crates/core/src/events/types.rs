use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::ContentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

/// "Content changed" notification raised after every successful mutation.
///
/// Persisted form (the `lastSync` key) uses `contentType`; the in-process
/// payload historically used `type`, which is accepted on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSignal {
    #[serde(alias = "type")]
    pub content_type: ContentType,
    pub action: SyncAction,
    pub item: Value,
    pub timestamp: DateTime<Utc>,
}

impl SyncSignal {
    pub fn new(content_type: ContentType, action: SyncAction, item: Value) -> Self {
        Self {
            content_type,
            action,
            item,
            timestamp: Utc::now(),
        }
    }

    /// Id of the record the signal is about, when the item carries one.
    pub fn item_id(&self) -> Option<&str> {
        self.item.get("id").and_then(Value::as_str)
    }
}

/// Which signals a listener wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalFilter {
    All,
    Only(ContentType),
}

impl SignalFilter {
    pub fn matches(self, content_type: ContentType) -> bool {
        match self {
            SignalFilter::All => true,
            SignalFilter::Only(wanted) => wanted == content_type,
        }
    }
}

/// Events pushed to live listeners of the content API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SiteEvent {
    Welcome,
    Sync(SyncSignal),
    Reconnect,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signal_reads_legacy_type_key() {
        let raw = json!({
            "type": "events",
            "action": "delete",
            "item": {"id": "42"},
            "timestamp": "2024-03-01T09:00:00Z"
        });
        let signal: SyncSignal = serde_json::from_value(raw).unwrap();
        assert_eq!(signal.content_type, ContentType::Events);
        assert_eq!(signal.action, SyncAction::Delete);
        assert_eq!(signal.item_id(), Some("42"));
    }

    #[test]
    fn signal_writes_content_type_key() {
        let signal = SyncSignal::new(ContentType::Blogs, SyncAction::Create, json!({"id": "1"}));
        let value = serde_json::to_value(&signal).unwrap();
        assert_eq!(value["contentType"], "blogs");
        assert_eq!(value["action"], "create");
    }

    #[test]
    fn site_event_is_tagged() {
        let event = SiteEvent::Sync(SyncSignal::new(ContentType::Sermons, SyncAction::Update, json!({})));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "sync");
        assert_eq!(value["contentType"], "sermons");
    }

    #[test]
    fn filter_matching() {
        assert!(SignalFilter::All.matches(ContentType::Events));
        assert!(SignalFilter::Only(ContentType::Events).matches(ContentType::Events));
        assert!(!SignalFilter::Only(ContentType::Blogs).matches(ContentType::Events));
    }
}
