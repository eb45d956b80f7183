//! # Server Configuration
//!
//! This module contains the server setup and configuration for the Curie
//! sync service.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    middleware::Next,
    response::Response,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::auth::cron_auth_middleware;
use crate::config::AppConfig;
use crate::crypto::Keyring;
use crate::handlers;
use crate::providers::Registry;
use crate::telemetry::{TraceContext, with_trace_context};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub keyring: Keyring,
    pub registry: Arc<Registry>,
}

impl AppState {
    /// Builds the state, wiring the provider registry from configuration
    pub fn new(config: Arc<AppConfig>, db: DatabaseConnection, keyring: Keyring) -> Self {
        let registry = Arc::new(Registry::from_config(&config));
        Self {
            config,
            db,
            keyring,
            registry,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(config: Arc<AppConfig>) -> Self {
        use crate::crypto::CryptoKey;

        Self::new(
            config,
            DatabaseConnection::default(),
            Keyring::single(CryptoKey::new(vec![0u8; 32]).expect("valid test key")),
        )
    }
}

/// Assigns each request a correlation trace id, available to handlers and
/// error responses through task-local storage
async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let trace_id = format!("req-{}", &Uuid::new_v4().to_string()[..8]);
    let context = TraceContext {
        trace_id: trace_id.clone(),
    };
    request.extensions_mut().insert(context.clone());
    with_trace_context(context, next.run(request)).await
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/cron/rotate-tokens", get(handlers::cron::rotate_tokens))
        .route(
            "/api/cron/process-sync-jobs",
            get(handlers::cron::process_sync_jobs),
        )
        .route(
            "/api/sync-jobs",
            get(handlers::jobs::list_jobs).post(handlers::jobs::enqueue_job),
        )
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state.config),
            cron_auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(
            "/api/webhooks/withings",
            post(handlers::webhooks::withings_webhook),
        )
        .merge(protected)
        .layer(axum::middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let keyring = config.keyring()?;
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState::new(Arc::new(config), db, keyring);
    let app = create_app(state);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, profile = %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

/// Adds the bearer security scheme used by the cron and operator endpoints
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::cron::rotate_tokens,
        crate::handlers::cron::process_sync_jobs,
        crate::handlers::jobs::list_jobs,
        crate::handlers::jobs::enqueue_job,
        crate::handlers::webhooks::withings_webhook,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::jobs::JobInfo,
            crate::handlers::jobs::JobsResponse,
            crate::handlers::jobs::EnqueueJobRequest,
            crate::handlers::webhooks::WebhookIngestResponse,
            crate::rotation::RotationSummary,
            crate::sync_runner::RunSummary,
            crate::error::ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Curie Sync API",
        description = "Wearable sync, token rotation, and webhook ingest for the Curie dashboard",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
