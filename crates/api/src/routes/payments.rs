use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use church_core::webhook::{self, DEFAULT_TOLERANCE_SECS};
use church_core::ApiEnvelope;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::payments::{DonationRequest, PaymentClient, PaymentIntent};
use crate::state::AppState;

/// Header carrying the processor's webhook signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payments/intent", post(create_intent))
        .route("/payments/confirm", post(confirm))
        .route("/payments/webhook", post(webhook_event))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmRequest {
    payment_intent_id: String,
}

fn client(state: &AppState) -> ApiResult<&PaymentClient> {
    state
        .payments()
        .ok_or_else(|| ApiError::Unavailable("payments are not configured".into()))
}

async fn create_intent(
    State(state): State<AppState>,
    body: Result<Json<DonationRequest>, JsonRejection>,
) -> ApiResult<Json<ApiEnvelope<PaymentIntent>>> {
    let Json(donation) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    donation.validate()?;
    let intent = client(&state)?.create_intent(&donation).await?;
    tracing::info!(intent = %intent.id, amount = intent.amount, fund = ?donation.fund, "payment intent created");
    Ok(Json(ApiEnvelope::ok(intent)))
}

async fn confirm(
    State(state): State<AppState>,
    body: Result<Json<ConfirmRequest>, JsonRejection>,
) -> ApiResult<Json<ApiEnvelope<PaymentIntent>>> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let intent = client(&state)?.retrieve_intent(&request.payment_intent_id).await?;
    let message = if intent.status == "succeeded" {
        "Payment confirmed"
    } else {
        "Payment not completed"
    };
    Ok(Json(ApiEnvelope::ok_with_message(intent, message)))
}

/// Accepts processor events only with a valid, fresh signature over the raw body.
async fn webhook_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let Some(secret) = state.config().payments.webhook_secret.as_deref() else {
        return Err(ApiError::Unavailable("webhook secret is not configured".into()));
    };
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing webhook signature".into()))?;
    webhook::verify(signature, &body, secret, Utc::now().timestamp(), DEFAULT_TOLERANCE_SECS).map_err(|e| {
        tracing::warn!("rejected webhook: {e}");
        ApiError::BadRequest(format!("Webhook error: {e}"))
    })?;

    let event: Value = serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("Webhook error: {e}")))?;
    let kind = event.get("type").and_then(Value::as_str).unwrap_or("unknown");
    let object_id = event.pointer("/data/object/id").and_then(Value::as_str).unwrap_or("-");
    match kind {
        "payment_intent.succeeded" => tracing::info!(intent = object_id, "donation succeeded"),
        "payment_intent.payment_failed" => tracing::warn!(intent = object_id, "donation failed"),
        other => tracing::debug!(event = other, "unhandled payment event"),
    }
    Ok(Json(json!({ "received": true })))
}
