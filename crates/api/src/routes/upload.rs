use std::path::Path;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use church_core::ApiEnvelope;
use rand::Rng;
use serde::Serialize;

use crate::auth::AdminClaims;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];
/// Room for multipart framing on top of the file itself.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes + FORM_OVERHEAD_BYTES))
}

#[derive(Debug, Serialize)]
struct Uploaded {
    path: String,
}

/// Store the multipart `image` field and answer with its public path.
async fn upload(
    State(state): State<AppState>,
    AdminClaims(claims): AdminClaims,
    mut form: Multipart,
) -> ApiResult<(StatusCode, Json<ApiEnvelope<Uploaded>>)> {
    let config = state.config();
    while let Some(field) = form
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let extension = field
            .file_name()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| ApiError::BadRequest("Only image files are allowed".into()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("Uploaded file is empty".into()));
        }
        if bytes.len() > config.max_upload_bytes {
            return Err(ApiError::BadRequest(format!(
                "File too large; limit is {} bytes",
                config.max_upload_bytes
            )));
        }

        let name = format!(
            "{}-{}.{extension}",
            Utc::now().timestamp_millis(),
            rand::thread_rng().gen_range(0..1_000_000_000u32)
        );
        tokio::fs::create_dir_all(&config.upload_dir)
            .await
            .map_err(|e| ApiError::Internal(format!("cannot create upload dir: {e}")))?;
        tokio::fs::write(config.upload_dir.join(&name), &bytes)
            .await
            .map_err(|e| ApiError::Internal(format!("cannot store upload: {e}")))?;

        tracing::info!(file = %name, bytes = bytes.len(), admin = %claims.sub, "image uploaded");
        return Ok((
            StatusCode::CREATED,
            Json(ApiEnvelope::ok_with_message(
                Uploaded {
                    path: format!("/uploads/{name}"),
                },
                "File uploaded successfully",
            )),
        ));
    }
    Err(ApiError::BadRequest("No file uploaded".into()))
}
