pub mod auth;
pub mod content;
pub mod health;
pub mod listen;
pub mod payments;
pub mod upload;

use axum::Router;
use tower_http::services::ServeDir;

use crate::state::AppState;

/// Assemble the full router with all route groups.
pub fn build_router(state: AppState) -> Router {
    let upload_dir = state.config().upload_dir.clone();
    let max_upload_bytes = state.config().max_upload_bytes;

    let api = Router::new()
        .merge(content::routes())
        .merge(auth::routes())
        .merge(upload::routes(max_upload_bytes))
        .merge(payments::routes())
        .merge(listen::routes());

    Router::new()
        .merge(health::routes())
        .nest("/api", api)
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .with_state(state)
}
