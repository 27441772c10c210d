use std::sync::Arc;

use church_core::content::id::ServerIdGenerator;
use church_core::events::SiteEvent;
use church_core::store::ContentRepository;
use church_core::EventBus;

use crate::config::AppConfig;
use crate::payments::PaymentClient;

/// Shared application state, passed to all handlers via Axum's `State` extractor.
/// Wrapped in `Arc` so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    repo: Arc<dyn ContentRepository>,
    config: AppConfig,
    event_bus: EventBus<SiteEvent>,
    ids: ServerIdGenerator,
    payments: Option<PaymentClient>,
}

impl AppState {
    pub fn new(repo: Arc<dyn ContentRepository>, config: AppConfig, event_bus: EventBus<SiteEvent>) -> Self {
        let payments = PaymentClient::from_config(&config.payments);
        Self {
            inner: Arc::new(InnerState {
                repo,
                config,
                event_bus,
                ids: ServerIdGenerator::new(),
                payments,
            }),
        }
    }

    pub fn repo(&self) -> &dyn ContentRepository {
        self.inner.repo.as_ref()
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn event_bus(&self) -> &EventBus<SiteEvent> {
        &self.inner.event_bus
    }

    pub fn ids(&self) -> &ServerIdGenerator {
        &self.inner.ids
    }

    /// `None` when no processor key is configured.
    pub fn payments(&self) -> Option<&PaymentClient> {
        self.inner.payments.as_ref()
    }
}
