//! System event repository.
//!
//! Append-only writes to the audit log; nothing here mutates existing rows.

use anyhow::Result;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::system_event::{self, Entity as SystemEvent};

/// Repository for system event writes
#[derive(Debug, Clone)]
pub struct SystemEventRepository {
    pub db: Arc<DatabaseConnection>,
}

impl SystemEventRepository {
    /// Creates a new SystemEventRepository instance
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Appends an event to the audit log
    pub async fn record(
        &self,
        event_type: &str,
        severity: &str,
        payload: JsonValue,
    ) -> Result<system_event::Model> {
        let event = system_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            event_type: Set(event_type.to_string()),
            severity: Set(severity.to_string()),
            payload: Set(Some(payload)),
            created_at: Set(Utc::now().into()),
        }
        .insert(&*self.db)
        .await?;
        Ok(event)
    }

    /// Counts events of a given type (used by tests and health tooling)
    pub async fn count_by_type(&self, event_type: &str) -> Result<u64> {
        Ok(SystemEvent::find()
            .filter(system_event::Column::EventType.eq(event_type))
            .count(&*self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;
    use serde_json::json;

    async fn test_repo() -> SystemEventRepository {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("create in-memory db");
        Migrator::up(&db, None).await.expect("apply migrations");
        SystemEventRepository::new(Arc::new(db))
    }

    #[tokio::test]
    async fn record_appends_events() {
        let repo = test_repo().await;

        let event = repo
            .record("webhook_ingest", "info", json!({"processed": 4}))
            .await
            .expect("record succeeds");
        assert_eq!(event.event_type, "webhook_ingest");
        assert_eq!(event.severity, "info");

        repo.record("webhook_ingest", "info", json!({"processed": 0}))
            .await
            .expect("record succeeds");
        repo.record("sync_job_failed", "error", json!({"job_id": "x"}))
            .await
            .expect("record succeeds");

        assert_eq!(
            repo.count_by_type("webhook_ingest").await.expect("count"),
            2
        );
        assert_eq!(
            repo.count_by_type("sync_job_failed").await.expect("count"),
            1
        );
    }
}
