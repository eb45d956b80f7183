//! Sync Job Runner
//!
//! Cron-triggered batch executor for sync jobs: claims due jobs atomically,
//! fans them out as concurrent tasks, imports provider measurements through
//! the idempotent upsert, and applies exponential backoff with a fixed retry
//! ceiling on failure.

use anyhow::{Result, anyhow, bail};
use chrono::{Duration, Utc};
use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

use crate::config::SyncRunnerConfig;
use crate::crypto::Keyring;
use crate::models::sync_job;
use crate::providers::{FetchWindow, Registry};
use crate::repositories::{
    ConnectionRepository, FailureOutcome, MeasurementRepository, SyncJobRepository,
    SystemEventRepository,
};

/// Summary of one runner invocation
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct RunSummary {
    /// Jobs claimed and attempted in this batch
    pub processed: u64,
    /// Jobs that completed successfully
    pub succeeded: u64,
    /// Jobs that failed this attempt (retrying or permanently failed)
    pub failed: u64,
    /// Jobs still due after the batch
    pub remaining: u64,
}

/// Batch executor for due sync jobs
#[derive(Clone)]
pub struct SyncJobRunner {
    registry: Arc<Registry>,
    jobs: SyncJobRepository,
    connections: ConnectionRepository,
    measurements: MeasurementRepository,
    events: SystemEventRepository,
    config: SyncRunnerConfig,
}

impl SyncJobRunner {
    /// Create a new runner over the shared database pool
    pub fn new(
        db: Arc<DatabaseConnection>,
        registry: Arc<Registry>,
        keyring: Keyring,
        config: SyncRunnerConfig,
    ) -> Self {
        Self {
            registry,
            jobs: SyncJobRepository::new(db.clone()),
            connections: ConnectionRepository::new(db.clone(), keyring),
            measurements: MeasurementRepository::new(db.clone()),
            events: SystemEventRepository::new(db),
            config,
        }
    }

    /// Claim due jobs and execute them as one fan-out batch.
    ///
    /// Each job gets its own error boundary; one failure never aborts the
    /// batch.
    #[instrument(skip(self), fields(batch_size = self.config.batch_size))]
    pub async fn run_once(&self) -> Result<RunSummary> {
        let timer = std::time::Instant::now();
        let now = Utc::now();

        let jobs = self.jobs.claim_due(now, self.config.batch_size).await?;
        let mut summary = RunSummary {
            processed: jobs.len() as u64,
            ..RunSummary::default()
        };

        if jobs.is_empty() {
            debug!("No due sync jobs found to claim");
            summary.remaining = self.jobs.count_due(Utc::now()).await?;
            return Ok(summary);
        }

        info!(claimed = jobs.len(), "Claimed sync jobs for execution");

        let mut handles = Vec::new();
        for job in jobs {
            let runner = self.clone();
            handles.push(tokio::spawn(
                async move { runner.run_single_job(job).await },
            ));
        }

        for handle in handles {
            match handle.await {
                Ok(true) => summary.succeeded += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!(error = ?e, "Sync job task panicked or was cancelled");
                }
            }
        }

        summary.remaining = self.jobs.count_due(Utc::now()).await?;

        counter!("sync_jobs_processed_total").increment(summary.processed);
        counter!("sync_jobs_succeeded_total").increment(summary.succeeded);
        counter!("sync_jobs_failed_total").increment(summary.failed);
        histogram!("sync_run_duration_ms").record(timer.elapsed().as_secs_f64() * 1_000.0);

        info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            remaining = summary.remaining,
            "Sync run completed"
        );

        Ok(summary)
    }

    /// Run a single claimed job, returning whether it succeeded
    #[instrument(skip(self), fields(job_id = %job.id, connection_id = %job.connection_id, provider = %job.provider))]
    pub async fn run_single_job(&self, job: sync_job::Model) -> bool {
        let started = std::time::Instant::now();
        info!(attempt = job.retry_count + 1, "Starting sync job");

        match self.execute_job(&job).await {
            Ok(imported) => {
                debug!(imported, elapsed = ?started.elapsed(), "Sync job fetch finished");
                match self.finish_success(&job, imported).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!(error = ?e, "Failed to record sync job success");
                        self.finish_failure(&job, &e.to_string()).await;
                        false
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, elapsed = ?started.elapsed(), "Sync job failed");
                self.finish_failure(&job, &e.to_string()).await;
                false
            }
        }
    }

    /// Fetch and persist measurements for one job
    async fn execute_job(&self, job: &sync_job::Model) -> Result<u64> {
        let connection = self
            .connections
            .get_by_id(&job.connection_id)
            .await?
            .ok_or_else(|| anyhow!("connection {} not found", job.connection_id))?;

        if !connection.is_active {
            bail!("connection {} is inactive", connection.id);
        }

        let (access_token, _refresh_token) = self.connections.decrypt_tokens(&connection)?;
        let provider = self.registry.get(&job.provider)?;

        let now = Utc::now();
        let window = FetchWindow {
            start: connection
                .last_successful_sync_at
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| now - Duration::days(self.config.window_days)),
            end: now,
        };

        let measurements = timeout(
            StdDuration::from_secs(self.config.provider_timeout_seconds),
            provider.fetch_measurements(&access_token, window),
        )
        .await
        .map_err(|_| anyhow!("provider request timed out"))??;

        let imported = self
            .measurements
            .upsert_measurements(connection.patient_id, &job.provider, &measurements, now)
            .await?;

        Ok(imported)
    }

    async fn finish_success(&self, job: &sync_job::Model, imported: u64) -> Result<()> {
        let now = Utc::now();
        self.jobs.mark_completed(job, imported as i32, now).await?;
        self.connections
            .record_sync_attempt(&job.connection_id, true, now)
            .await?;

        info!(imported, "Sync job completed");
        Ok(())
    }

    /// Record a failed attempt; permanent failures land on the connection and
    /// in the audit log.
    async fn finish_failure(&self, job: &sync_job::Model, error_message: &str) {
        let now = Utc::now();

        match self.jobs.mark_failure(job, error_message, now).await {
            Ok(FailureOutcome::Retrying { next_retry_at }) => {
                if let Err(e) = self
                    .connections
                    .record_sync_attempt(&job.connection_id, false, now)
                    .await
                {
                    error!(error = ?e, "Failed to record sync attempt on connection");
                }
                warn!(
                    attempt = job.retry_count + 1,
                    next_retry_at = %next_retry_at,
                    "Sync job scheduled for retry"
                );
            }
            Ok(FailureOutcome::Failed) => {
                if let Err(e) = self
                    .connections
                    .record_sync_error(&job.connection_id, error_message, now)
                    .await
                {
                    error!(error = ?e, "Failed to record sync error on connection");
                }
                if let Err(e) = self
                    .events
                    .record(
                        "sync_job_failed",
                        "error",
                        serde_json::json!({
                            "job_id": job.id,
                            "connection_id": job.connection_id,
                            "provider": job.provider,
                            "error": error_message,
                        }),
                    )
                    .await
                {
                    error!(error = ?e, "Failed to record sync failure event");
                }
                counter!("sync_jobs_exhausted_total").increment(1);
                warn!("Sync job permanently failed after exhausting retries");
            }
            Err(e) => {
                error!(error = ?e, "Failed to record sync job failure");
            }
        }
    }
}
