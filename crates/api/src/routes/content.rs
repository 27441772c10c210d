use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use chrono::Utc;
use church_core::content::validate::{validate_fields, ValidationMode};
use church_core::events::SiteEvent;
use church_core::store::ListFilter;
use church_core::{ApiEnvelope, ContentRecord, ContentType, Fields, SyncAction, SyncSignal};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{AdminClaims, MaybeAdmin};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

type Envelope<T> = Json<ApiEnvelope<T>>;

/// CRUD routes for every content type, one nested router per path segment.
pub fn routes() -> Router<AppState> {
    ContentType::ALL.into_iter().fold(Router::new(), |router, content_type| {
        router.nest(&format!("/{}", content_type.path_segment()), collection(content_type))
    })
}

fn collection(content_type: ContentType) -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/public", get(list_public))
        .route("/{id}", get(get_one).put(update).delete(remove))
        .layer(Extension(content_type))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    published: Option<String>,
}

impl ListQuery {
    fn published_only(&self) -> bool {
        matches!(self.published.as_deref(), Some("true" | "1"))
    }
}

/// `GET /{type}`: everything for admins, `?published=true` for anyone.
async fn list(
    State(state): State<AppState>,
    Extension(content_type): Extension<ContentType>,
    MaybeAdmin(admin): MaybeAdmin,
    Query(query): Query<ListQuery>,
) -> ApiResult<Envelope<Vec<ContentRecord>>> {
    let filter = if query.published_only() {
        ListFilter::published()
    } else if admin.is_some() {
        ListFilter::default()
    } else {
        return Err(ApiError::Unauthorized);
    };
    let records = state.repo().list(content_type, filter).await?;
    Ok(Json(ApiEnvelope::ok(records)))
}

/// `GET /{type}/public`
async fn list_public(
    State(state): State<AppState>,
    Extension(content_type): Extension<ContentType>,
) -> ApiResult<Envelope<Vec<ContentRecord>>> {
    let records = state.repo().list(content_type, ListFilter::published()).await?;
    Ok(Json(ApiEnvelope::ok(records)))
}

/// Drafts are only visible to admins.
async fn get_one(
    State(state): State<AppState>,
    Extension(content_type): Extension<ContentType>,
    MaybeAdmin(admin): MaybeAdmin,
    Path(id): Path<String>,
) -> ApiResult<Envelope<ContentRecord>> {
    match state.repo().get(content_type, &id).await? {
        Some(record) if record.is_published() || admin.is_some() => Ok(Json(ApiEnvelope::ok(record))),
        _ => Err(not_found(content_type)),
    }
}

async fn create(
    State(state): State<AppState>,
    Extension(content_type): Extension<ContentType>,
    AdminClaims(claims): AdminClaims,
    body: Result<Json<Fields>, JsonRejection>,
) -> ApiResult<(StatusCode, Envelope<ContentRecord>)> {
    let Json(fields) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    validate_fields(content_type, &fields, ValidationMode::Create)?;

    let now = Utc::now();
    let record = ContentRecord::from_fields(state.ids().next_id(now), fields, now)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let record = state.repo().insert(content_type, record).await?;

    tracing::info!(%content_type, id = %record.id, admin = %claims.sub, "content created");
    announce(&state, content_type, SyncAction::Create, &record);
    Ok((
        StatusCode::CREATED,
        Json(ApiEnvelope::ok_with_message(
            record,
            format!("{} created successfully", content_type.label()),
        )),
    ))
}

async fn update(
    State(state): State<AppState>,
    Extension(content_type): Extension<ContentType>,
    AdminClaims(claims): AdminClaims,
    Path(id): Path<String>,
    body: Result<Json<Fields>, JsonRejection>,
) -> ApiResult<Envelope<ContentRecord>> {
    let Json(patch) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    validate_fields(content_type, &patch, ValidationMode::Update)?;

    let mut record = state
        .repo()
        .get(content_type, &id)
        .await?
        .ok_or_else(|| not_found(content_type))?;
    record
        .apply_patch(&patch, Utc::now())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let record = state
        .repo()
        .update(content_type, record)
        .await?
        .ok_or_else(|| not_found(content_type))?;

    tracing::info!(%content_type, %id, admin = %claims.sub, "content updated");
    announce(&state, content_type, SyncAction::Update, &record);
    Ok(Json(ApiEnvelope::ok_with_message(
        record,
        format!("{} updated successfully", content_type.label()),
    )))
}

async fn remove(
    State(state): State<AppState>,
    Extension(content_type): Extension<ContentType>,
    AdminClaims(claims): AdminClaims,
    Path(id): Path<String>,
) -> ApiResult<Envelope<Value>> {
    let existing = state.repo().get(content_type, &id).await?;
    if !state.repo().delete(content_type, &id).await? {
        return Err(not_found(content_type));
    }

    tracing::info!(%content_type, %id, admin = %claims.sub, "content deleted");
    let item = existing
        .as_ref()
        .and_then(|record| serde_json::to_value(record).ok())
        .unwrap_or_else(|| json!({ "id": id }));
    publish(&state, SyncSignal::new(content_type, SyncAction::Delete, item));
    Ok(Json(ApiEnvelope::ok_with_message(
        json!({ "id": id }),
        format!("{} deleted successfully", content_type.label()),
    )))
}

fn not_found(content_type: ContentType) -> ApiError {
    ApiError::NotFound(format!("{} not found", content_type.label()))
}

fn announce(state: &AppState, content_type: ContentType, action: SyncAction, record: &ContentRecord) {
    let item = serde_json::to_value(record).unwrap_or_else(|_| json!({ "id": record.id }));
    publish(state, SyncSignal::new(content_type, action, item));
}

/// Best effort: nobody listening is fine.
fn publish(state: &AppState, signal: SyncSignal) {
    let delivered = state.event_bus().publish(SiteEvent::Sync(signal)).unwrap_or(0);
    tracing::debug!(delivered, "sync signal broadcast");
}
