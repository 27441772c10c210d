use axum::{extract::State, routing::{get, post}, Json, Router};
use chrono::{DateTime, Utc};
use church_core::ApiEnvelope;
use serde::{Deserialize, Serialize};

use crate::auth::{issue_token, verify_password, AdminClaims};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct Profile {
    username: String,
    role: String,
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<ApiEnvelope<LoginResponse>>> {
    let config = state.config();
    let Some(hash) = config.admin_password_hash.as_deref() else {
        return Err(ApiError::Unavailable("admin login is not configured".into()));
    };
    if request.username != config.admin_username || !verify_password(&request.password, hash) {
        tracing::warn!(username = %request.username, "failed admin login");
        return Err(ApiError::Unauthorized);
    }

    let (token, claims) = issue_token(config, &request.username)?;
    tracing::info!(username = %claims.sub, "admin logged in");
    Ok(Json(ApiEnvelope::ok_with_message(
        LoginResponse {
            token,
            expires_at: DateTime::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now),
        },
        "Login successful",
    )))
}

async fn me(AdminClaims(claims): AdminClaims) -> Json<ApiEnvelope<Profile>> {
    Json(ApiEnvelope::ok(Profile {
        username: claims.sub,
        role: claims.role,
    }))
}
