//! Sync job repository.
//!
//! Owns the sync_jobs state machine: enqueueing, atomic claiming, and the
//! completion/backoff transitions the runner applies.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::cursor::CursorData;
use crate::models::sync_job::{
    self, Entity as SyncJob, MAX_RETRIES, STATUS_COMPLETED, STATUS_FAILED, STATUS_PENDING,
    STATUS_PROCESSING, STATUS_RETRYING,
};

/// Outcome of recording a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// The job will run again once next_retry_at passes
    Retrying { next_retry_at: DateTime<Utc> },
    /// The retry ceiling is exhausted; the job is permanently failed
    Failed,
}

/// Repository for sync job database operations
#[derive(Debug, Clone)]
pub struct SyncJobRepository {
    pub db: Arc<DatabaseConnection>,
}

impl SyncJobRepository {
    /// Creates a new SyncJobRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn due_condition(now: DateTime<Utc>) -> Condition {
        Condition::any()
            .add(sync_job::Column::Status.eq(STATUS_PENDING))
            .add(
                Condition::all()
                    .add(sync_job::Column::Status.eq(STATUS_RETRYING))
                    .add(sync_job::Column::NextRetryAt.lte(now)),
            )
    }

    /// Enqueues a pending job unless one is already pending or processing for
    /// the connection
    pub async fn enqueue(
        &self,
        patient_id: Uuid,
        connection_id: Uuid,
        provider: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<sync_job::Model>> {
        let open_jobs = SyncJob::find()
            .filter(sync_job::Column::ConnectionId.eq(connection_id))
            .filter(
                sync_job::Column::Status
                    .is_in([STATUS_PENDING, STATUS_PROCESSING, STATUS_RETRYING]),
            )
            .count(&*self.db)
            .await?;
        if open_jobs > 0 {
            return Ok(None);
        }

        let job = sync_job::ActiveModel {
            id: Set(Uuid::new_v4()),
            patient_id: Set(patient_id),
            connection_id: Set(connection_id),
            provider: Set(provider.to_string()),
            status: Set(STATUS_PENDING.to_string()),
            retry_count: Set(0),
            next_retry_at: Set(None),
            records_imported: Set(None),
            error_message: Set(None),
            started_at: Set(None),
            completed_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&*self.db)
        .await?;

        Ok(Some(job))
    }

    /// Atomically claims up to `limit` due jobs, transitioning them to
    /// processing.
    ///
    /// The guarded UPDATE means a double-fired scheduler invocation cannot
    /// claim the same job twice: whichever invocation loses the race sees
    /// zero affected rows for the contested ids.
    pub async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<sync_job::Model>> {
        let txn = self.db.begin().await?;

        let due_ids = SyncJob::find()
            .select_only()
            .column(sync_job::Column::Id)
            .filter(Self::due_condition(now))
            .order_by_asc(sync_job::Column::CreatedAt)
            .limit(Some(limit))
            .into_tuple::<Uuid>()
            .all(&txn)
            .await?;

        if due_ids.is_empty() {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        let update_result = SyncJob::update_many()
            .col_expr(sync_job::Column::Status, Expr::value(STATUS_PROCESSING))
            .col_expr(sync_job::Column::StartedAt, Expr::value(now))
            .col_expr(sync_job::Column::UpdatedAt, Expr::value(now))
            .filter(sync_job::Column::Id.is_in(due_ids.clone()))
            .filter(
                sync_job::Column::Status
                    .eq(STATUS_PENDING)
                    .or(sync_job::Column::Status.eq(STATUS_RETRYING)),
            )
            .exec(&txn)
            .await?;

        let claimed = if update_result.rows_affected > 0 {
            SyncJob::find()
                .filter(sync_job::Column::Id.is_in(due_ids))
                .filter(sync_job::Column::Status.eq(STATUS_PROCESSING))
                .filter(sync_job::Column::StartedAt.eq(now))
                .order_by_asc(sync_job::Column::CreatedAt)
                .all(&txn)
                .await?
        } else {
            Vec::new()
        };

        txn.commit().await?;
        Ok(claimed)
    }

    /// Marks a job completed with its import count
    pub async fn mark_completed(
        &self,
        job: &sync_job::Model,
        records_imported: i32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut active: sync_job::ActiveModel = job.clone().into();
        active.status = Set(STATUS_COMPLETED.to_string());
        active.records_imported = Set(Some(records_imported));
        active.error_message = Set(None);
        active.next_retry_at = Set(None);
        active.completed_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        active.update(&*self.db).await?;
        Ok(())
    }

    /// Records a failed attempt, either scheduling a retry with exponential
    /// backoff or failing the job permanently once the ceiling is exhausted.
    ///
    /// Backoff is exactly `2^retry_count` minutes from the attempt time; the
    /// external scheduler's poll cadence supplies all the smearing this
    /// endpoint needs, so no jitter is applied.
    pub async fn mark_failure(
        &self,
        job: &sync_job::Model,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome> {
        let retry_count = job.retry_count + 1;

        let mut active: sync_job::ActiveModel = job.clone().into();
        active.retry_count = Set(retry_count);
        active.error_message = Set(Some(error_message.to_string()));
        active.updated_at = Set(now.into());

        let outcome = if retry_count <= MAX_RETRIES {
            let next_retry_at = now + Duration::minutes(2i64.pow(retry_count as u32));
            active.status = Set(STATUS_RETRYING.to_string());
            active.next_retry_at = Set(Some(next_retry_at.into()));
            FailureOutcome::Retrying { next_retry_at }
        } else {
            active.status = Set(STATUS_FAILED.to_string());
            active.next_retry_at = Set(None);
            active.completed_at = Set(Some(now.into()));
            FailureOutcome::Failed
        };

        active.update(&*self.db).await?;
        Ok(outcome)
    }

    /// Counts jobs that are currently due
    pub async fn count_due(&self, now: DateTime<Utc>) -> Result<u64> {
        Ok(SyncJob::find()
            .filter(Self::due_condition(now))
            .count(&*self.db)
            .await?)
    }

    /// Fetches a job by id
    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<sync_job::Model>> {
        Ok(SyncJob::find_by_id(*id).one(&*self.db).await?)
    }

    /// Lists jobs newest-first with optional filters and cursor pagination
    pub async fn list(
        &self,
        status: Option<&str>,
        provider: Option<&str>,
        cursor: Option<&CursorData>,
        limit: u64,
    ) -> Result<Vec<sync_job::Model>> {
        let mut query = SyncJob::find();

        if let Some(status) = status {
            query = query.filter(sync_job::Column::Status.eq(status));
        }
        if let Some(provider) = provider {
            query = query.filter(sync_job::Column::Provider.eq(provider));
        }
        if let Some(cursor) = cursor {
            query = query.filter(
                Condition::any()
                    .add(sync_job::Column::CreatedAt.lt(cursor.created_at))
                    .add(
                        Condition::all()
                            .add(sync_job::Column::CreatedAt.eq(cursor.created_at))
                            .add(sync_job::Column::Id.lt(cursor.id)),
                    ),
            );
        }

        Ok(query
            .order_by_desc(sync_job::Column::CreatedAt)
            .order_by_desc(sync_job::Column::Id)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }
}
