//! Bearer-secret authentication for machine-facing endpoints.
//!
//! The cron scheduler and operator tooling authenticate with a single shared
//! secret (`CURIE_CRON_SECRET`). The check runs as middleware, before any
//! handler and therefore before any database work; comparison is
//! constant-time.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized, unauthorized_with_trace_id};
use crate::server::AppState;
use crate::telemetry::TraceContext;

/// Marker inserted into request extensions once the secret has been checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronAuth;

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.config)
    }
}

/// 401 that still carries the request's correlation id even though the
/// rejection happens before the handler runs
fn reject(trace_id: &Option<String>, message: &str) -> ApiError {
    match trace_id {
        Some(id) => unauthorized_with_trace_id(Some(message), id.clone()),
        None => unauthorized(Some(message)),
    }
}

fn secret_matches(config: &AppConfig, presented: &str) -> bool {
    config
        .cron_secret
        .as_deref()
        .is_some_and(|secret| presented.as_bytes().ct_eq(secret.as_bytes()).into())
}

/// Middleware guarding the cron and operator routes
pub async fn cron_auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = request
        .extensions()
        .get::<TraceContext>()
        .map(|ctx| ctx.trace_id.clone());

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| reject(&trace_id, "Missing Authorization header"))?
        .to_str()
        .map_err(|_| reject(&trace_id, "Invalid Authorization header"))?;
    let presented = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| reject(&trace_id, "Authorization header must use Bearer scheme"))?;

    if !secret_matches(&config, presented) {
        return Err(reject(&trace_id, "Invalid bearer token"));
    }

    request.extensions_mut().insert(CronAuth);
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for CronAuth
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CronAuth>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Cron authentication required")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    const SECRET: &str = "cron-secret-for-tests";

    async fn probe(config: AppConfig, authorization: Option<&str>) -> StatusCode {
        let config = Arc::new(config);
        let state = AppState::for_tests(Arc::clone(&config));
        let app = Router::new()
            .route("/probe", get(|_auth: CronAuth| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                config,
                cron_auth_middleware,
            ))
            .with_state(state);

        let mut request = Request::builder().uri("/probe");
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }

        app.oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    fn config_with_secret() -> AppConfig {
        AppConfig {
            cron_secret: Some(SECRET.to_string()),
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        assert_eq!(
            probe(config_with_secret(), None).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_rejected() {
        assert_eq!(
            probe(config_with_secret(), Some("Basic dXNlcjpwYXNz")).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        assert_eq!(
            probe(config_with_secret(), Some("Bearer nope")).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn unconfigured_secret_rejects_every_token() {
        assert_eq!(
            probe(AppConfig::default(), Some(&format!("Bearer {}", SECRET))).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn correct_secret_passes() {
        assert_eq!(
            probe(config_with_secret(), Some(&format!("Bearer {}", SECRET))).await,
            StatusCode::OK
        );
    }
}
