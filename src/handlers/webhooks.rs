//! # Webhook Handlers
//!
//! Inbound provider push notifications. Withings pushes carry only the
//! provider-side subject id; the handler fetches the actual measurements from
//! the provider API and persists them through the idempotent upsert, so a
//! re-delivered notification is harmless.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::error::{ApiError, not_found, unauthorized, validation_error};
use crate::providers::{FetchWindow, ProviderError};
use crate::repositories::{ConnectionRepository, MeasurementRepository, SystemEventRepository};
use crate::server::AppState;
use crate::webhook_verification::{WITHINGS_SIGNATURE_HEADER, verify_withings_signature};

/// Webhook ingest response
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookIngestResponse {
    /// Ingest status
    pub status: String,
    /// Number of measurement rows imported by this push
    pub processed: u64,
}

/// Extract the Withings subject identifier, which arrives as a number or a
/// string depending on the notification variant
fn extract_userid(payload: &JsonValue) -> Option<String> {
    match payload.get("userid") {
        Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Ingest a Withings data push
#[utoipa::path(
    post,
    path = "/api/webhooks/withings",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Push ingested", body = WebhookIngestResponse, example = json!({
            "status": "ok",
            "processed": 4
        })),
        (status = 401, description = "Signature verification failed or provider rejected the stored token", body = ApiError),
        (status = 404, description = "No active connection for the pushed subject", body = ApiError),
        (status = 500, description = "Ingest failed", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn withings_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookIngestResponse>, ApiError> {
    // Signature check runs before any parsing or lookups.
    if let Some(secret) = state.config.webhook_withings_secret.as_deref() {
        let signature = headers
            .get(WITHINGS_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        verify_withings_signature(&body, signature, secret).map_err(|e| {
            warn!(error = %e, "Withings webhook signature rejected");
            unauthorized(Some("Invalid webhook signature"))
        })?;
    }

    let payload: JsonValue = serde_json::from_slice(&body).map_err(|e| {
        validation_error(
            "Invalid webhook payload",
            serde_json::json!({ "body": format!("not valid JSON: {}", e) }),
        )
    })?;

    let userid = extract_userid(&payload).ok_or_else(|| {
        validation_error(
            "Invalid webhook payload",
            serde_json::json!({ "userid": "Required field is missing" }),
        )
    })?;

    let db = Arc::new(state.db.clone());
    let connections = ConnectionRepository::new(db.clone(), state.keyring.clone());
    let measurements = MeasurementRepository::new(db.clone());
    let events = SystemEventRepository::new(db);

    let connection = connections
        .find_active_by_provider_user("withings", &userid)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| not_found("No active connection for this subject"))?;

    let (access_token, _refresh_token) = connections
        .decrypt_tokens(&connection)
        .map_err(ApiError::from)?;

    let provider = state.registry.get("withings").map_err(ApiError::from)?;

    let now = Utc::now();
    let window = FetchWindow {
        start: now - Duration::days(state.config.sync.window_days),
        end: now,
    };

    let fetched = provider
        .fetch_measurements(&access_token, window)
        .await
        .map_err(|e| {
            warn!(connection_id = %connection.id, error = %e, "Withings fetch failed");
            ApiError::from(e)
        })?;

    let processed = measurements
        .upsert_measurements(connection.patient_id, "withings", &fetched, now)
        .await
        .map_err(ApiError::from)?;

    events
        .record(
            "webhook_ingest",
            "info",
            serde_json::json!({
                "provider": "withings",
                "patient_id": connection.patient_id,
                "connection_id": connection.id,
                "fetched": fetched.len(),
                "processed": processed,
            }),
        )
        .await
        .map_err(ApiError::from)?;

    info!(
        patient_id = %connection.patient_id,
        fetched = fetched.len(),
        processed,
        "Withings push ingested"
    );

    Ok(Json(WebhookIngestResponse {
        status: "ok".to_string(),
        processed,
    }))
}

impl From<ProviderError> for ApiError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Unauthorized { .. } => {
                unauthorized(Some("Provider rejected the stored access token"))
            }
            ProviderError::RateLimited { retry_after_secs } => ApiError::new(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Provider rate limited the request",
            )
            .with_retry_after(retry_after_secs.unwrap_or(60)),
            ProviderError::UnknownProvider { slug } => {
                not_found(&format!("Unknown provider: {}", slug))
            }
            other => {
                tracing::error!(error = %other, "Provider call failed");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Provider call failed",
                )
            }
        }
    }
}
