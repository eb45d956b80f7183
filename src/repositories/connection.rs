//! Wearable connection repository.
//!
//! Encapsulates SeaORM operations for the wearable_connections table,
//! including token decryption and the staleness queries the rotation batch
//! runs.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{Keyring, decrypt_connection_tokens};
use crate::models::wearable_connection::{self, Entity as WearableConnection};

/// Repository for wearable connection database operations
#[derive(Debug, Clone)]
pub struct ConnectionRepository {
    pub db: Arc<DatabaseConnection>,
    pub keyring: Keyring,
}

impl ConnectionRepository {
    /// Creates a new ConnectionRepository instance
    pub fn new(db: Arc<DatabaseConnection>, keyring: Keyring) -> Self {
        Self { db, keyring }
    }

    /// Retrieves a connection by its ID
    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<wearable_connection::Model>> {
        Ok(WearableConnection::find_by_id(*id).one(&*self.db).await?)
    }

    /// Finds the active connection for a provider-side subject identifier
    pub async fn find_active_by_provider_user(
        &self,
        provider: &str,
        external_user_id: &str,
    ) -> Result<Option<wearable_connection::Model>> {
        Ok(WearableConnection::find()
            .filter(wearable_connection::Column::Provider.eq(provider))
            .filter(wearable_connection::Column::ExternalUserId.eq(external_user_id))
            .filter(wearable_connection::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?)
    }

    /// Decrypts a connection's stored tokens under its recorded key version
    pub fn decrypt_tokens(
        &self,
        connection: &wearable_connection::Model,
    ) -> Result<(String, Option<String>)> {
        decrypt_connection_tokens(&self.keyring, connection).map_err(|e| {
            tracing::error!(
                patient_id = %connection.patient_id,
                provider = %connection.provider,
                external_user_id = %connection.external_user_id,
                "Token decryption failed"
            );
            anyhow!("Token decryption failed: {}", e)
        })
    }

    fn stale_condition(target_version: i32, rotated_cutoff: DateTime<Utc>) -> Condition {
        Condition::all()
            .add(wearable_connection::Column::IsActive.eq(true))
            .add(wearable_connection::Column::TokenVersion.lt(target_version))
            .add(
                Condition::any()
                    .add(wearable_connection::Column::LastRotatedAt.is_null())
                    .add(wearable_connection::Column::LastRotatedAt.lte(rotated_cutoff)),
            )
    }

    /// Lists connections still encrypted under an older key version, oldest
    /// rotation first
    pub async fn find_stale_for_rotation(
        &self,
        target_version: i32,
        rotated_cutoff: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<wearable_connection::Model>> {
        Ok(WearableConnection::find()
            .filter(Self::stale_condition(target_version, rotated_cutoff))
            .order_by_asc(wearable_connection::Column::LastRotatedAt)
            .order_by_asc(wearable_connection::Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }

    /// Counts connections still pending rotation
    pub async fn count_stale(
        &self,
        target_version: i32,
        rotated_cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        Ok(WearableConnection::find()
            .filter(Self::stale_condition(target_version, rotated_cutoff))
            .count(&*self.db)
            .await?)
    }

    /// Records a sync attempt on the connection; successful attempts advance
    /// the successful-sync watermark and clear any stored error
    pub async fn record_sync_attempt(
        &self,
        connection_id: &Uuid,
        success: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut active = wearable_connection::ActiveModel {
            id: Set(*connection_id),
            last_sync_at: Set(Some(now.into())),
            updated_at: Set(now.into()),
            ..Default::default()
        };
        if success {
            active.last_successful_sync_at = Set(Some(now.into()));
            active.sync_error = Set(None);
        }
        active.update(&*self.db).await?;
        Ok(())
    }

    /// Records a permanent sync failure on the connection
    pub async fn record_sync_error(
        &self,
        connection_id: &Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let active = wearable_connection::ActiveModel {
            id: Set(*connection_id),
            sync_error: Set(Some(error.to_string())),
            last_sync_at: Set(Some(now.into())),
            updated_at: Set(now.into()),
            ..Default::default()
        };
        active.update(&*self.db).await?;
        Ok(())
    }
}
