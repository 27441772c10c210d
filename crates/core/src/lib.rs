//! Shared domain types for the church site: content records, sync signals,
//! the in-process event bus and the server-side content repository.

pub mod content;
pub mod envelope;
pub mod events;
pub mod store;
pub mod webhook;

pub use content::{ContentRecord, ContentStatus, ContentType, Fields};
pub use envelope::ApiEnvelope;
pub use events::{EventBus, SignalFilter, SyncAction, SyncSignal};
