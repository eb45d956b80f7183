//! Problem-detail error responses.
//!
//! Every failure crosses the handler boundary as an [`ApiError`], rendered as
//! `application/problem+json` with a stable SCREAMING_SNAKE_CASE code and the
//! request's correlation id. Nothing escapes a handler as an unhandled panic;
//! `From` impls cover the common sources (database, anyhow, body rejections).

use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::telemetry;

/// Machine-readable error payload returned by every endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status, carried out-of-band in the response line
    #[serde(skip)]
    pub status: StatusCode,
    /// Stable error code for programmatic handling
    #[schema(example = "VALIDATION_FAILED")]
    pub code: String,
    /// Human-readable description
    pub message: String,
    /// Field-level details, when the failure is attributable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Suggested retry delay in seconds, mirrored in the Retry-After header
    pub retry_after: Option<u64>,
    /// Correlation id for log lookups
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
            retry_after: None,
            trace_id: telemetry::current_trace_id().or_else(fallback_correlation_id),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }
}

/// Errors built outside a request context still get a correlation id, so a
/// log line can always be matched to the response the caller saw.
fn fallback_correlation_id() -> Option<String> {
    Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        let retry_after = self
            .retry_after
            .and_then(|secs| HeaderValue::from_str(&secs.to_string()).ok());

        let mut response = (status, axum::Json(self)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        if let Some(value) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

pub fn unauthorized(message: Option<&str>) -> ApiError {
    ApiError::new(
        StatusCode::UNAUTHORIZED,
        "UNAUTHORIZED",
        message.unwrap_or("Authentication required"),
    )
}

/// 401 with an explicit trace id, for rejections raised before the
/// task-local request context is entered.
pub fn unauthorized_with_trace_id(message: Option<&str>, trace_id: String) -> ApiError {
    let mut error = unauthorized(message);
    error.trace_id = Some(trace_id);
    error
}

pub fn not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

pub fn service_unavailable(message: &str) -> ApiError {
    ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
}

/// Unique-constraint detection across Postgres (23505) and SQLite (1555,
/// 2067), checked alongside the driver's own classification.
pub(crate) fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    let sqlx_error = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(e))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(e)) => e,
        _ => return false,
    };
    let Some(db_error) = sqlx_error.as_database_error() else {
        return false;
    };
    db_error.is_unique_violation()
        || matches!(db_error.code().as_deref(), Some("23505" | "1555" | "2067"))
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!(error = ?error, "Unhandled internal error");
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            rejection.body_text(),
        )
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        use sea_orm::DbErr;

        if is_unique_violation(&error) {
            return ApiError::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            DbErr::RecordNotFound(what) => not_found(&format!("Record not found: {}", what)),
            DbErr::Conn(source) => {
                tracing::error!(error = ?source, "Database connection error");
                service_unavailable("Database service unavailable")
            }
            other => {
                tracing::error!(error = ?other, "Database error");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_sets_code_message_and_correlation_id() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "bad input");

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.code, "VALIDATION_FAILED");
        assert_eq!(error.message, "bad input");
        assert!(error.details.is_none());
        assert!(error.retry_after.is_none());
        assert!(error.trace_id.expect("correlation id").starts_with("corr-"));
    }

    #[test]
    fn response_carries_problem_json_content_type() {
        let response = not_found("no such job").into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn retry_after_lands_in_header_and_body() {
        let error = ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Rotation lease is held",
        )
        .with_retry_after(90);
        assert_eq!(error.retry_after, Some(90));

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "90");
    }

    #[test]
    fn validation_error_attaches_field_details() {
        let error = validation_error(
            "Invalid webhook payload",
            json!({ "userid": "Required field is missing" }),
        );

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            error.details,
            Some(json!({ "userid": "Required field is missing" }))
        );
    }

    #[test]
    fn record_not_found_maps_to_404() {
        let error: ApiError = sea_orm::DbErr::RecordNotFound("sync_jobs".to_string()).into();
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert!(error.message.contains("sync_jobs"));
    }

    #[test]
    fn anyhow_errors_are_opaque_500s() {
        let error: ApiError = anyhow::anyhow!("keyring exploded: version 3 missing").into();
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
        // Internal detail must not leak to the caller.
        assert!(!error.message.contains("keyring"));
    }

    #[test]
    fn explicit_trace_id_wins_over_generated_one() {
        let error = unauthorized_with_trace_id(Some("Invalid bearer token"), "req-abc123".into());
        assert_eq!(error.trace_id.as_deref(), Some("req-abc123"));
        assert_eq!(error.message, "Invalid bearer token");
    }
}
