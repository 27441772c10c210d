//! List renderers: keep a view of one collection current by reloading on
//! sync signals and on a fixed poll interval.

use std::future::Future;
use std::sync::Arc;

use church_core::{ContentRecord, ContentType, SignalFilter};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::service::DataService;

/// Anything that can show a list of records.
pub trait ListView: Send {
    fn render(&mut self, content_type: ContentType, records: &[ContentRecord]);
}

/// Keeps the last rendered list; useful for headless consumers and tests.
#[derive(Debug, Default, Clone)]
pub struct ListSnapshot {
    pub records: Vec<ContentRecord>,
    /// Number of renders so far.
    pub generation: u64,
}

impl ListView for ListSnapshot {
    fn render(&mut self, _content_type: ContentType, records: &[ContentRecord]) {
        self.records = records.to_vec();
        self.generation += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Loading,
    Rendered,
}

/// Public pages list published records only; admin lists see everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Public,
    Admin,
}

pub struct Renderer<V> {
    service: Arc<DataService>,
    content_type: ContentType,
    audience: Audience,
    view: V,
    state: RenderState,
    renders: u64,
}

impl<V: ListView> Renderer<V> {
    pub fn new(service: Arc<DataService>, content_type: ContentType, audience: Audience, view: V) -> Self {
        Self {
            service,
            content_type,
            audience,
            view,
            state: RenderState::Idle,
            renders: 0,
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn render_count(&self) -> u64 {
        self.renders
    }

    /// Full reload from the data service, then render.
    pub async fn refresh(&mut self) {
        self.state = RenderState::Loading;
        let mut records = match self.audience {
            Audience::Public => self.service.get_published(self.content_type).await,
            Audience::Admin => self.service.get_all(self.content_type).await,
        };
        sort_for_display(self.content_type, &mut records);
        self.view.render(self.content_type, &records);
        self.renders += 1;
        self.state = RenderState::Rendered;
        debug!(content_type = %self.content_type, count = records.len(), "list rendered");
    }

    /// Render once, then re-render on every matching signal (either
    /// channel) and on every poll tick until `shutdown` resolves.
    pub async fn run_until<F>(mut self, shutdown: F) -> Self
    where
        F: Future<Output = ()>,
    {
        let mut subscription = self.service.bus().subscribe(SignalFilter::Only(self.content_type));
        let period = self.service.config().poll_interval;
        let mut poll = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        self.refresh().await;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = poll.tick() => self.refresh().await,
                notice = subscription.recv() => match notice {
                    Some(notice) => {
                        debug!(content_type = %self.content_type, ?notice, "sync notice");
                        self.refresh().await;
                    }
                    None => break,
                },
            }
        }
        info!(content_type = %self.content_type, renders = self.renders, "renderer stopped");
        self
    }
}

/// Events soonest first; blogs and sermons newest first.
pub fn sort_for_display(content_type: ContentType, records: &mut [ContentRecord]) {
    match content_type {
        ContentType::Events => records.sort_by_key(ContentRecord::display_date),
        ContentType::Blogs | ContentType::Sermons => {
            records.sort_by(|a, b| b.display_date().cmp(&a.display_date()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::storage::StorageArea;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn fields(value: serde_json::Value) -> church_core::Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn events_sort_soonest_first() {
        let now = chrono::Utc::now();
        let mut records: Vec<ContentRecord> = ["2024-06-01", "2024-03-01", "2024-04-15"]
            .iter()
            .enumerate()
            .map(|(i, date)| {
                ContentRecord::from_fields(i.to_string(), fields(json!({"title": "e", "date": date})), now).unwrap()
            })
            .collect();
        sort_for_display(ContentType::Events, &mut records);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "0"]);

        sort_for_display(ContentType::Sermons, &mut records);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["0", "2", "1"]);
    }

    #[tokio::test]
    async fn refresh_moves_through_states() {
        let area = StorageArea::in_memory();
        let service = Arc::new(DataService::new(ServiceConfig::offline(), None, area.open_tab()));
        service
            .create(ContentType::Blogs, fields(json!({"title": "Hidden", "status": "draft"})))
            .await
            .unwrap();

        let mut public = Renderer::new(service.clone(), ContentType::Blogs, Audience::Public, ListSnapshot::default());
        assert_eq!(public.state(), RenderState::Idle);
        public.refresh().await;
        assert_eq!(public.state(), RenderState::Rendered);
        assert!(public.view().records.is_empty());

        let mut admin = Renderer::new(service, ContentType::Blogs, Audience::Admin, ListSnapshot::default());
        admin.refresh().await;
        assert_eq!(admin.view().records.len(), 1);
    }

    #[tokio::test]
    async fn other_tab_publish_rerenders_public_list() {
        let area = StorageArea::in_memory();
        let admin = DataService::new(ServiceConfig::offline(), None, area.open_tab());
        let visitor = Arc::new(DataService::new(ServiceConfig::offline(), None, area.open_tab()));

        let draft = admin
            .create(ContentType::Events, fields(json!({"title": "Retreat", "status": "draft"})))
            .await
            .unwrap();

        let renderer = Renderer::new(visitor, ContentType::Events, Audience::Public, ListSnapshot::default());
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(renderer.run_until(async {
            let _ = stopped.await;
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        admin
            .update(ContentType::Events, &draft.id, fields(json!({"status": "published"})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let _ = stop.send(());
        let renderer = task.await.unwrap();
        assert!(renderer.render_count() >= 2);
        assert_eq!(renderer.view().records.len(), 1);
        assert_eq!(renderer.view().records[0].id, draft.id);
    }
}
