//! Cron lease repository.
//!
//! A single-row-per-name lease with holder identity and heartbeat renewal.
//! Acquisition is a conditional steal of an expired row (or an insert when no
//! row exists); renewal and release only touch rows the caller still holds,
//! which closes the race where a slow batch outlives a fixed TTL and a second
//! invocation's cleanup would otherwise release the wrong holder's lock.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::cron_lease::{self, Entity as CronLease};

/// Result of a lease acquisition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum LeaseAcquisition {
    /// The caller now holds the lease
    Acquired,
    /// Another holder owns an unexpired lease
    Held { expires_at: DateTime<Utc> },
}

/// Repository for cron lease operations
#[derive(Debug, Clone)]
pub struct CronLeaseRepository {
    pub db: Arc<DatabaseConnection>,
}

impl CronLeaseRepository {
    /// Creates a new CronLeaseRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Attempts to acquire the named lease for `holder` with the given TTL.
    pub async fn try_acquire(
        &self,
        name: &str,
        holder: Uuid,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<LeaseAcquisition> {
        let expires_at = now + ttl;

        // Steal an expired row, or re-enter a lease this holder already owns.
        let update_result = CronLease::update_many()
            .col_expr(cron_lease::Column::Holder, Expr::value(holder))
            .col_expr(cron_lease::Column::ExpiresAt, Expr::value(expires_at))
            .col_expr(cron_lease::Column::AcquiredAt, Expr::value(now))
            .filter(cron_lease::Column::Name.eq(name))
            .filter(
                Condition::any()
                    .add(cron_lease::Column::ExpiresAt.lte(now))
                    .add(cron_lease::Column::Holder.eq(holder)),
            )
            .exec(&*self.db)
            .await?;

        if update_result.rows_affected == 1 {
            return Ok(LeaseAcquisition::Acquired);
        }

        // No stealable row; either none exists yet or another holder is live.
        let insert_result = cron_lease::ActiveModel {
            name: Set(name.to_string()),
            holder: Set(holder),
            expires_at: Set(expires_at.into()),
            acquired_at: Set(now.into()),
        }
        .insert(&*self.db)
        .await;

        match insert_result {
            Ok(_) => Ok(LeaseAcquisition::Acquired),
            Err(err) if is_unique_violation(&err) => {
                let current = CronLease::find_by_id(name.to_string())
                    .one(&*self.db)
                    .await?;
                let expires_at = current
                    .map(|lease| lease.expires_at.with_timezone(&Utc))
                    .unwrap_or(expires_at);
                Ok(LeaseAcquisition::Held { expires_at })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Renews the lease heartbeat; returns false if the caller no longer
    /// holds it.
    pub async fn renew(
        &self,
        name: &str,
        holder: Uuid,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let update_result = CronLease::update_many()
            .col_expr(cron_lease::Column::ExpiresAt, Expr::value(now + ttl))
            .filter(cron_lease::Column::Name.eq(name))
            .filter(cron_lease::Column::Holder.eq(holder))
            .exec(&*self.db)
            .await?;

        Ok(update_result.rows_affected == 1)
    }

    /// Releases the lease if the caller still holds it.
    pub async fn release(&self, name: &str, holder: Uuid) -> Result<()> {
        CronLease::delete_many()
            .filter(cron_lease::Column::Name.eq(name))
            .filter(cron_lease::Column::Holder.eq(holder))
            .exec(&*self.db)
            .await?;
        Ok(())
    }
}
