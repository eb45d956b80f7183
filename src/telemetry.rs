//! Tracing setup and request correlation.
//!
//! One JSON (or pretty) `tracing-subscriber` pipeline for the whole process,
//! with the `log` facade bridged in so SQLx output lands in the same stream,
//! and a task-local correlation id that follows a request through handlers
//! and into error responses.

use std::sync::Once;

use tokio::task_local;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::AppConfig;

/// Correlation id scoped to one in-flight request.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
}

task_local! {
    static REQUEST_TRACE: TraceContext;
}

static INIT: Once = Once::new();

/// Install the global subscriber and the `log` bridge.
///
/// Safe to call more than once; only the first call takes effect, which keeps
/// test binaries that spin up several components from fighting over the
/// global logger.
pub fn init_tracing(config: &AppConfig) {
    INIT.call_once(|| {
        // The bridge must be in place before the subscriber so nothing logged
        // through the `log` facade is dropped. An already-installed logger
        // (another test in the same binary) is not an error.
        let _ = LogTracer::builder()
            .with_max_level(log::LevelFilter::Trace)
            .init();

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

        let output = if config.log_format == "pretty" {
            fmt::layer().pretty().boxed()
        } else {
            fmt::layer().json().boxed()
        };

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(output)
            .try_init();
    });
}

/// Run `future` with `context` as the ambient trace context.
pub async fn with_trace_context<F, R>(context: TraceContext, future: F) -> R
where
    F: std::future::Future<Output = R>,
{
    REQUEST_TRACE.scope(context, future).await
}

/// Correlation id of the current request, when inside one.
pub fn current_trace_id() -> Option<String> {
    REQUEST_TRACE.try_with(|ctx| ctx.trace_id.clone()).ok()
}
