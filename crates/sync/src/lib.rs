//! Client-side content synchronization for the church site.
//!
//! A [`DataService`] fronts two sinks, the remote content API and the local
//! persistent store, and raises a sync signal after every mutation. The
//! [`SyncBus`] delivers those signals to renderers in the same tab directly
//! and to other tabs through change notifications on the shared store.

pub mod bus;
pub mod config;
pub mod error;
pub mod local;
pub mod media;
pub mod pending;
pub mod remote;
pub mod render;
pub mod service;
pub mod storage;

pub use bus::{SyncBus, SyncNotice, SyncSubscription};
pub use config::{MediaLimits, RetryPolicy, ServiceConfig};
pub use error::{ConfigError, RemoteError, ServiceError, StorageError};
pub use local::LocalContentStore;
pub use pending::{PendingLog, PendingWrite, ReplayReport};
pub use remote::{ContentRemote, HttpRemote};
pub use render::{Audience, ListSnapshot, ListView, RenderState, Renderer};
pub use service::DataService;
pub use storage::{StorageArea, StorageBackend, StorageEvent, TabStorage};
