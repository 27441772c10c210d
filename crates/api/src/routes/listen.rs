use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
    Router,
};
use church_core::events::SiteEvent;
use church_core::{ContentType, SignalFilter};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/sync/listen", get(listen))
}

#[derive(Debug, Deserialize)]
struct ListenQuery {
    #[serde(rename = "type")]
    content_type: Option<String>,
}

/// Stream every server-side sync signal to the client as JSON text frames.
async fn listen(
    State(state): State<AppState>,
    Query(query): Query<ListenQuery>,
    upgrade: WebSocketUpgrade,
) -> ApiResult<Response> {
    let filter = match query.content_type.as_deref() {
        Some(raw) => SignalFilter::Only(
            raw.parse::<ContentType>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        ),
        None => SignalFilter::All,
    };
    Ok(upgrade.on_upgrade(move |socket| forward(socket, state, filter)))
}

async fn forward(mut socket: WebSocket, state: AppState, filter: SignalFilter) {
    let mut events = state.event_bus().subscribe();
    tracing::debug!(listeners = state.event_bus().subscriber_count(), "sync listener connected");
    if send(&mut socket, &SiteEvent::Welcome).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            received = events.recv() => {
                let event = match received {
                    Ok(SiteEvent::Sync(signal)) if !filter.matches(signal.content_type) => continue,
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "sync listener lagged, asking client to reload");
                        SiteEvent::Reconnect
                    }
                    Err(RecvError::Closed) => break,
                };
                if send(&mut socket, &event).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!("sync listener disconnected");
}

async fn send(socket: &mut WebSocket, event: &SiteEvent) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    socket.send(Message::Text(text.into())).await
}
