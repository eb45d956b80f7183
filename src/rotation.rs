//! Token Rotation Batch
//!
//! Cron-triggered batch that re-encrypts wearable tokens under the current
//! keyring version. A named database lease with heartbeat renewal guarantees
//! at most one batch runs at a time; the batch itself is bounded by size and
//! by a wall-clock budget so the triggering scheduler can re-invoke until the
//! backlog drains.

use anyhow::{Result, bail};
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use sea_orm::{ActiveModelTrait, DatabaseConnection, DatabaseTransaction, Set, TransactionTrait};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::RotationConfig;
use crate::crypto::{Keyring, connection_aad};
use crate::models::wearable_connection;
use crate::repositories::{
    ConnectionRepository, CronLeaseRepository, LeaseAcquisition, SystemEventRepository,
};

/// Lease name shared by every rotation invocation
pub const ROTATION_LEASE_NAME: &str = "token-rotation";

/// Summary of one rotation batch
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RotationSummary {
    /// Keyring version rows are rotated to
    pub target_version: i32,
    /// Connections attempted in this batch
    pub processed: u64,
    /// Connections successfully re-encrypted
    pub success: u64,
    /// Connections that failed to re-encrypt (left at their old version)
    pub failed: u64,
    /// Connections still below the target version after the batch
    pub remaining: u64,
    /// Whether another invocation is needed to drain the backlog
    pub has_more: bool,
    /// Per-row failures and budget notes
    pub errors: Vec<String>,
}

/// Outcome of a rotation invocation
#[derive(Debug, Clone)]
pub enum RotationOutcome {
    /// Another invocation holds the lease
    Locked { expires_at: DateTime<Utc> },
    /// The batch ran; see the summary
    Completed(RotationSummary),
}

/// Batch re-encryption of stale wearable tokens
#[derive(Clone)]
pub struct TokenRotationBatch {
    db: Arc<DatabaseConnection>,
    keyring: Keyring,
    connections: ConnectionRepository,
    leases: CronLeaseRepository,
    events: SystemEventRepository,
    config: RotationConfig,
}

impl TokenRotationBatch {
    /// Create a new rotation batch over the shared database pool
    pub fn new(db: Arc<DatabaseConnection>, keyring: Keyring, config: RotationConfig) -> Self {
        Self {
            connections: ConnectionRepository::new(db.clone(), keyring.clone()),
            leases: CronLeaseRepository::new(db.clone()),
            events: SystemEventRepository::new(db.clone()),
            db,
            keyring,
            config,
        }
    }

    /// Acquire the rotation lease and run one batch.
    ///
    /// The lease is released on every exit path, including batch errors; a
    /// release that itself fails only shortens the window to the lease TTL.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<RotationOutcome> {
        let holder = Uuid::new_v4();
        let now = Utc::now();
        let ttl = Duration::seconds(self.config.lease_ttl_seconds as i64);

        match self
            .leases
            .try_acquire(ROTATION_LEASE_NAME, holder, ttl, now)
            .await?
        {
            LeaseAcquisition::Held { expires_at } => {
                debug!(expires_at = %expires_at, "Rotation lease is held; skipping run");
                counter!("token_rotation_lock_contention_total").increment(1);
                return Ok(RotationOutcome::Locked { expires_at });
            }
            LeaseAcquisition::Acquired => {}
        }

        let result = self.rotate_batch(holder, ttl).await;

        if let Err(release_err) = self.leases.release(ROTATION_LEASE_NAME, holder).await {
            error!(error = ?release_err, "Failed to release rotation lease");
        }

        result.map(RotationOutcome::Completed)
    }

    async fn rotate_batch(&self, holder: Uuid, ttl: Duration) -> Result<RotationSummary> {
        let started = Instant::now();
        let budget = StdDuration::from_millis(self.config.time_budget_ms);
        let renew_after = StdDuration::from_secs(self.config.lease_ttl_seconds / 2);
        let mut last_renewal = Instant::now();

        let now = Utc::now();
        let target_version = self.keyring.current_version();
        let rotated_cutoff = now - Duration::hours(self.config.min_interval_hours);

        let candidates = self
            .connections
            .find_stale_for_rotation(target_version, rotated_cutoff, self.config.batch_size)
            .await?;

        let mut summary = RotationSummary {
            target_version,
            ..RotationSummary::default()
        };

        // All row updates commit together; per-row crypto failures are
        // collected and skipped without aborting the batch.
        let txn = self.db.begin().await?;

        let total = candidates.len();
        for (index, connection) in candidates.into_iter().enumerate() {
            if started.elapsed() >= budget {
                let deferred = total - index;
                warn!(deferred, "Rotation time budget exhausted; deferring remainder");
                summary.errors.push(format!(
                    "time budget exhausted; {} connections deferred to the next run",
                    deferred
                ));
                break;
            }

            if last_renewal.elapsed() >= renew_after {
                if !self
                    .leases
                    .renew(ROTATION_LEASE_NAME, holder, ttl, Utc::now())
                    .await?
                {
                    bail!("rotation lease lost mid-batch");
                }
                last_renewal = Instant::now();
            }

            summary.processed += 1;
            match self.rotate_connection(&txn, &connection, target_version).await {
                Ok(()) => summary.success += 1,
                Err(e) => {
                    summary.failed += 1;
                    summary
                        .errors
                        .push(format!("connection {}: {}", connection.id, e));
                    warn!(
                        connection_id = %connection.id,
                        error = %e,
                        "Failed to rotate connection tokens"
                    );
                }
            }
        }

        txn.commit().await?;

        summary.remaining = self
            .connections
            .count_stale(target_version, rotated_cutoff)
            .await?;
        summary.has_more = summary.remaining > 0;

        if summary.processed > 0 {
            self.events
                .record(
                    "token_rotation",
                    if summary.failed > 0 { "warning" } else { "info" },
                    serde_json::json!({
                        "target_version": summary.target_version,
                        "processed": summary.processed,
                        "success": summary.success,
                        "failed": summary.failed,
                        "remaining": summary.remaining,
                    }),
                )
                .await?;
        }

        counter!("token_rotation_success_total").increment(summary.success);
        counter!("token_rotation_failure_total").increment(summary.failed);
        histogram!("token_rotation_batch_duration_ms")
            .record(started.elapsed().as_secs_f64() * 1_000.0);

        info!(
            target_version = summary.target_version,
            processed = summary.processed,
            success = summary.success,
            failed = summary.failed,
            remaining = summary.remaining,
            "Token rotation batch completed"
        );

        Ok(summary)
    }

    /// Re-encrypt one connection's tokens inside the batch transaction
    async fn rotate_connection(
        &self,
        txn: &DatabaseTransaction,
        connection: &wearable_connection::Model,
        target_version: i32,
    ) -> Result<()> {
        let aad = connection_aad(connection);

        let access_ciphertext = self.keyring.reencrypt(
            connection.token_version,
            aad.as_bytes(),
            &connection.access_token_ciphertext,
        )?;
        let refresh_ciphertext = connection
            .refresh_token_ciphertext
            .as_ref()
            .map(|ct| {
                self.keyring
                    .reencrypt(connection.token_version, aad.as_bytes(), ct)
            })
            .transpose()?;

        let now = Utc::now();
        let mut active: wearable_connection::ActiveModel = connection.clone().into();
        active.access_token_ciphertext = Set(access_ciphertext);
        active.refresh_token_ciphertext = Set(refresh_ciphertext);
        active.token_version = Set(target_version);
        active.last_rotated_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        active.update(txn).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;
    use std::collections::BTreeMap;

    use crate::crypto::{CryptoKey, decrypt_connection_tokens, encrypt_bytes};
    use crate::models::patient;

    fn two_version_ring() -> Keyring {
        let mut keys = BTreeMap::new();
        keys.insert(1, CryptoKey::new(vec![0x11; 32]).unwrap());
        keys.insert(2, CryptoKey::new(vec![0x22; 32]).unwrap());
        Keyring::new(keys, 2).expect("valid keyring")
    }

    async fn test_db() -> Arc<DatabaseConnection> {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("create in-memory db");
        Migrator::up(&db, None).await.expect("apply migrations");
        Arc::new(db)
    }

    async fn seed_stale_connection(
        db: &DatabaseConnection,
        with_refresh: bool,
        valid_ciphertext: bool,
    ) -> wearable_connection::Model {
        let patient_id = Uuid::new_v4();
        patient::ActiveModel {
            id: Set(patient_id),
            display_name: Set("Test Patient".to_string()),
            created_at: Set(Utc::now().into()),
            updated_at: Set(Utc::now().into()),
        }
        .insert(db)
        .await
        .expect("insert patient");

        let connection_id = Uuid::new_v4();
        let external_user_id = format!("ext-{}", connection_id);
        let aad = format!("{}|withings|{}", patient_id, external_user_id);
        let v1_key = CryptoKey::new(vec![0x11; 32]).unwrap();

        let access_ciphertext = if valid_ciphertext {
            encrypt_bytes(&v1_key, aad.as_bytes(), b"access-token").expect("encrypt")
        } else {
            vec![0x01, 0xDE, 0xAD]
        };
        let refresh_ciphertext = with_refresh
            .then(|| encrypt_bytes(&v1_key, aad.as_bytes(), b"refresh-token").expect("encrypt"));

        wearable_connection::ActiveModel {
            id: Set(connection_id),
            patient_id: Set(patient_id),
            provider: Set("withings".to_string()),
            external_user_id: Set(external_user_id),
            is_active: Set(true),
            access_token_ciphertext: Set(access_ciphertext),
            refresh_token_ciphertext: Set(refresh_ciphertext),
            token_expires_at: Set(None),
            token_version: Set(1),
            last_rotated_at: Set(None),
            last_sync_at: Set(None),
            last_successful_sync_at: Set(None),
            sync_error: Set(None),
            created_at: Set(Utc::now().into()),
            updated_at: Set(Utc::now().into()),
        }
        .insert(db)
        .await
        .expect("insert connection")
    }

    fn completed(outcome: RotationOutcome) -> RotationSummary {
        match outcome {
            RotationOutcome::Completed(summary) => summary,
            RotationOutcome::Locked { .. } => panic!("expected a completed batch"),
        }
    }

    #[tokio::test]
    async fn rotates_stale_connections_to_target_version() {
        let db = test_db().await;
        let keyring = two_version_ring();
        let connection = seed_stale_connection(&db, true, true).await;

        let batch = TokenRotationBatch::new(db.clone(), keyring.clone(), RotationConfig::default());
        let summary = completed(batch.run().await.expect("run succeeds"));

        assert_eq!(summary.target_version, 2);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.success, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.remaining, 0);
        assert!(!summary.has_more);
        assert!(summary.errors.is_empty());

        let repo = ConnectionRepository::new(db.clone(), keyring.clone());
        let rotated = repo
            .get_by_id(&connection.id)
            .await
            .expect("fetch")
            .expect("exists");
        assert_eq!(rotated.token_version, 2);
        assert!(rotated.last_rotated_at.is_some());

        // Ciphertexts must decrypt under the new version.
        let (access, refresh) =
            decrypt_connection_tokens(&keyring, &rotated).expect("decrypts under target version");
        assert_eq!(access, "access-token");
        assert_eq!(refresh.as_deref(), Some("refresh-token"));
    }

    #[tokio::test]
    async fn batch_size_caps_processed_and_reports_remainder() {
        let db = test_db().await;
        let keyring = two_version_ring();
        for _ in 0..25 {
            seed_stale_connection(&db, false, true).await;
        }

        let config = RotationConfig {
            batch_size: 20,
            ..RotationConfig::default()
        };
        let batch = TokenRotationBatch::new(db.clone(), keyring, config);
        let summary = completed(batch.run().await.expect("run succeeds"));

        assert_eq!(summary.processed, 20);
        assert_eq!(summary.success, 20);
        assert_eq!(summary.remaining, 5);
        assert!(summary.has_more);
    }

    #[tokio::test]
    async fn held_lease_short_circuits_the_run() {
        let db = test_db().await;
        let keyring = two_version_ring();
        seed_stale_connection(&db, false, true).await;

        let leases = CronLeaseRepository::new(db.clone());
        let other_holder = Uuid::new_v4();
        leases
            .try_acquire(
                ROTATION_LEASE_NAME,
                other_holder,
                Duration::minutes(15),
                Utc::now(),
            )
            .await
            .expect("acquire");

        let batch = TokenRotationBatch::new(db.clone(), keyring.clone(), RotationConfig::default());
        let outcome = batch.run().await.expect("run succeeds");
        assert!(matches!(outcome, RotationOutcome::Locked { .. }));

        // Nothing was rotated while locked.
        let repo = ConnectionRepository::new(db.clone(), keyring);
        assert_eq!(
            repo.count_stale(2, Utc::now() - Duration::hours(24))
                .await
                .expect("count"),
            1
        );
    }

    #[tokio::test]
    async fn lease_is_released_after_each_run() {
        let db = test_db().await;
        let keyring = two_version_ring();
        seed_stale_connection(&db, false, true).await;

        let batch = TokenRotationBatch::new(db.clone(), keyring, RotationConfig::default());
        let first = batch.run().await.expect("first run succeeds");
        assert!(matches!(first, RotationOutcome::Completed(_)));

        // A follow-up run must be able to take the lease again.
        let second = batch.run().await.expect("second run succeeds");
        let summary = completed(second);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.remaining, 0);
    }

    #[tokio::test]
    async fn per_row_failures_are_collected_not_fatal() {
        let db = test_db().await;
        let keyring = two_version_ring();
        let broken = seed_stale_connection(&db, false, false).await;
        let healthy = seed_stale_connection(&db, false, true).await;

        let batch = TokenRotationBatch::new(db.clone(), keyring.clone(), RotationConfig::default());
        let summary = completed(batch.run().await.expect("run succeeds"));

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.success, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains(&broken.id.to_string()));
        // The broken row still counts toward the backlog.
        assert_eq!(summary.remaining, 1);
        assert!(summary.has_more);

        let repo = ConnectionRepository::new(db.clone(), keyring);
        let rotated = repo
            .get_by_id(&healthy.id)
            .await
            .expect("fetch")
            .expect("exists");
        assert_eq!(rotated.token_version, 2);
        let still_stale = repo
            .get_by_id(&broken.id)
            .await
            .expect("fetch")
            .expect("exists");
        assert_eq!(still_stale.token_version, 1);
    }

    #[tokio::test]
    async fn rotation_records_audit_event() {
        let db = test_db().await;
        let keyring = two_version_ring();
        seed_stale_connection(&db, false, true).await;

        let batch = TokenRotationBatch::new(db.clone(), keyring, RotationConfig::default());
        completed(batch.run().await.expect("run succeeds"));

        let events = SystemEventRepository::new(db.clone());
        assert_eq!(
            events.count_by_type("token_rotation").await.expect("count"),
            1
        );
    }
}
