//! Content API for the church site: CRUD over blogs, events and sermons,
//! admin login, image upload, donation payments and a live sync stream.

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod payments;
pub mod routes;
pub mod state;

use axum::Router;

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// The full application: routes plus tracing and CORS layers.
pub fn build_app(state: AppState) -> Router {
    let cors = middleware::cors::cors_layer(&state.config().cors_origins);
    routes::build_router(state)
        .layer(middleware::request_tracing::trace_layer())
        .layer(cors)
}
