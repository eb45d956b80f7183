//! # Sync Job API Handlers
//!
//! Operator endpoints for enqueueing sync jobs and inspecting the job table.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CronAuth;
use crate::cursor::{decode_cursor, encode_cursor};
use crate::error::{ApiError, not_found, validation_error};
use crate::models::sync_job;
use crate::models::wearable_connection::{self, Entity as WearableConnection};
use crate::repositories::SyncJobRepository;
use crate::server::AppState;

const DEFAULT_PAGE_SIZE: u64 = 50;
const MAX_PAGE_SIZE: u64 = 100;

/// Query parameters for listing sync jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    /// Filter by job status (pending, processing, retrying, completed, failed)
    pub status: Option<String>,
    /// Filter by provider slug
    pub provider: Option<String>,
    /// Maximum number of jobs to return (default: 50, max: 100)
    pub limit: Option<u64>,
    /// Opaque cursor for pagination
    pub cursor: Option<String>,
}

/// Request body for enqueueing a sync job
#[derive(Debug, Deserialize, ToSchema)]
pub struct EnqueueJobRequest {
    /// Patient to sync
    pub patient_id: Uuid,
    /// Provider slug of the patient's connection
    pub provider: String,
}

/// Job information response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    /// Unique identifier for the sync job
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: String,
    /// Patient the job imports data for
    pub patient_id: String,
    /// Connection whose credentials the job uses
    pub connection_id: String,
    /// Provider slug
    #[schema(example = "withings")]
    pub provider: String,
    /// Current status of the job
    #[schema(example = "pending")]
    pub status: String,
    /// Number of failed attempts so far
    pub retry_count: i32,
    /// When a retrying job becomes due again
    pub next_retry_at: Option<String>,
    /// Rows imported by the successful attempt
    pub records_imported: Option<i32>,
    /// Error message from the most recent failed attempt
    pub error_message: Option<String>,
    /// When the current/last attempt started
    pub started_at: Option<String>,
    /// When the job reached a terminal state
    pub completed_at: Option<String>,
    /// When the job was created
    pub created_at: String,
}

/// Response payload for the job listing endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct JobsResponse {
    /// Jobs matching the query, newest first
    pub jobs: Vec<JobInfo>,
    /// Opaque cursor for fetching the next page (null if no more pages)
    pub next_cursor: Option<String>,
}

impl From<sync_job::Model> for JobInfo {
    fn from(model: sync_job::Model) -> Self {
        Self {
            id: model.id.to_string(),
            patient_id: model.patient_id.to_string(),
            connection_id: model.connection_id.to_string(),
            provider: model.provider,
            status: model.status,
            retry_count: model.retry_count,
            next_retry_at: model.next_retry_at.map(|dt| dt.to_rfc3339()),
            records_imported: model.records_imported,
            error_message: model.error_message,
            started_at: model.started_at.map(|dt| dt.to_rfc3339()),
            completed_at: model.completed_at.map(|dt| dt.to_rfc3339()),
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

const VALID_STATUSES: &[&str] = &[
    sync_job::STATUS_PENDING,
    sync_job::STATUS_PROCESSING,
    sync_job::STATUS_RETRYING,
    sync_job::STATUS_COMPLETED,
    sync_job::STATUS_FAILED,
];

/// List sync jobs
#[utoipa::path(
    get,
    path = "/api/sync-jobs",
    security(("bearer_auth" = [])),
    params(
        ("status" = Option<String>, Query, description = "Filter by job status"),
        ("provider" = Option<String>, Query, description = "Filter by provider slug"),
        ("limit" = Option<u64>, Query, description = "Maximum number of jobs to return (default 50, max 100)"),
        ("cursor" = Option<String>, Query, description = "Opaque pagination cursor")
    ),
    responses(
        (status = 200, description = "Jobs matching the query", body = JobsResponse),
        (status = 400, description = "Invalid filter or cursor", body = ApiError),
        (status = 401, description = "Missing or invalid cron secret", body = ApiError)
    ),
    tag = "sync-jobs"
)]
pub async fn list_jobs(
    _auth: CronAuth,
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<JobsResponse>, ApiError> {
    if let Some(status) = query.status.as_deref()
        && !VALID_STATUSES.contains(&status)
    {
        return Err(validation_error(
            "Invalid status filter",
            serde_json::json!({ "status": format!("must be one of {:?}", VALID_STATUSES) }),
        ));
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let cursor = query.cursor.as_deref().map(decode_cursor).transpose()?;

    let repo = SyncJobRepository::new(Arc::new(state.db.clone()));
    let mut models = repo
        .list(
            query.status.as_deref(),
            query.provider.as_deref(),
            cursor.as_ref(),
            limit + 1,
        )
        .await
        .map_err(ApiError::from)?;

    let has_more = models.len() as u64 > limit;
    models.truncate(limit as usize);

    let next_cursor = has_more
        .then(|| models.last())
        .flatten()
        .map(|last| encode_cursor(&last.created_at.with_timezone(&chrono::Utc), &last.id));

    let jobs = models.into_iter().map(JobInfo::from).collect();

    Ok(Json(JobsResponse { jobs, next_cursor }))
}

/// Enqueue a sync job for a patient's provider connection
#[utoipa::path(
    post,
    path = "/api/sync-jobs",
    security(("bearer_auth" = [])),
    request_body = EnqueueJobRequest,
    responses(
        (status = 201, description = "Job enqueued", body = JobInfo),
        (status = 401, description = "Missing or invalid cron secret", body = ApiError),
        (status = 404, description = "No active connection for the patient and provider", body = ApiError),
        (status = 409, description = "A job is already open for this connection", body = ApiError)
    ),
    tag = "sync-jobs"
)]
pub async fn enqueue_job(
    _auth: CronAuth,
    State(state): State<AppState>,
    Json(request): Json<EnqueueJobRequest>,
) -> Result<(StatusCode, Json<JobInfo>), ApiError> {
    let connection = WearableConnection::find()
        .filter(wearable_connection::Column::PatientId.eq(request.patient_id))
        .filter(wearable_connection::Column::Provider.eq(request.provider.as_str()))
        .filter(wearable_connection::Column::IsActive.eq(true))
        .one(&state.db)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| not_found("No active connection for the patient and provider"))?;

    let repo = SyncJobRepository::new(Arc::new(state.db.clone()));
    let job = repo
        .enqueue(
            connection.patient_id,
            connection.id,
            &connection.provider,
            chrono::Utc::now(),
        )
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::CONFLICT,
                "CONFLICT",
                "A job is already open for this connection",
            )
        })?;

    Ok((StatusCode::CREATED, Json(JobInfo::from(job))))
}
