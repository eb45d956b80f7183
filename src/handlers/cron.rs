//! # Cron Handlers
//!
//! HTTP entry points for the externally scheduled batch jobs. Both endpoints
//! are idempotent per invocation and bounded, so the scheduler can safely
//! re-trigger them until the returned counters drain.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use std::sync::Arc;
use tracing::info;

use crate::auth::CronAuth;
use crate::error::ApiError;
use crate::rotation::{RotationOutcome, RotationSummary, TokenRotationBatch};
use crate::server::AppState;
use crate::sync_runner::{RunSummary, SyncJobRunner};

/// Trigger one token rotation batch
#[utoipa::path(
    get,
    path = "/api/cron/rotate-tokens",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Rotation batch summary", body = RotationSummary, example = json!({
            "targetVersion": 3,
            "processed": 20,
            "success": 19,
            "failed": 1,
            "remaining": 5,
            "hasMore": true,
            "errors": ["connection 550e8400-e29b-41d4-a716-446655440000: unknown key version 1"]
        })),
        (status = 401, description = "Missing or invalid cron secret", body = ApiError),
        (status = 429, description = "Another rotation invocation holds the lease", body = ApiError)
    ),
    tag = "cron"
)]
pub async fn rotate_tokens(
    _auth: CronAuth,
    State(state): State<AppState>,
) -> Result<Json<RotationSummary>, ApiError> {
    let batch = TokenRotationBatch::new(
        Arc::new(state.db.clone()),
        state.keyring.clone(),
        state.config.rotation.clone(),
    );

    match batch.run().await.map_err(ApiError::from)? {
        RotationOutcome::Completed(summary) => {
            info!(
                processed = summary.processed,
                remaining = summary.remaining,
                "Rotation cron run finished"
            );
            Ok(Json(summary))
        }
        RotationOutcome::Locked { expires_at } => {
            let retry_after = (expires_at - chrono::Utc::now()).num_seconds().max(1) as u64;
            Err(ApiError::new(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Rotation lease is held by another invocation",
            )
            .with_retry_after(retry_after))
        }
    }
}

/// Process one batch of due sync jobs
#[utoipa::path(
    get,
    path = "/api/cron/process-sync-jobs",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sync run summary", body = RunSummary, example = json!({
            "processed": 10,
            "succeeded": 9,
            "failed": 1,
            "remaining": 3
        })),
        (status = 401, description = "Missing or invalid cron secret", body = ApiError)
    ),
    tag = "cron"
)]
pub async fn process_sync_jobs(
    _auth: CronAuth,
    State(state): State<AppState>,
) -> Result<Json<RunSummary>, ApiError> {
    let runner = SyncJobRunner::new(
        Arc::new(state.db.clone()),
        Arc::clone(&state.registry),
        state.keyring.clone(),
        state.config.sync.clone(),
    );

    let summary = runner.run_once().await.map_err(ApiError::from)?;
    info!(
        processed = summary.processed,
        succeeded = summary.succeeded,
        failed = summary.failed,
        remaining = summary.remaining,
        "Sync cron run finished"
    );
    Ok(Json(summary))
}
