//! SyncJob entity model
//!
//! This module contains the SeaORM entity model for the sync_jobs table.
//! Status values: pending, processing, retrying, completed, failed; the last
//! two are terminal.

use super::wearable_connection::Entity as WearableConnection;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Retry ceiling; a job failing with retry_count already at this value goes
/// to failed instead of retrying.
pub const MAX_RETRIES: i32 = 3;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_RETRYING: &str = "retrying";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_jobs")]
pub struct Model {
    /// Unique identifier for the sync job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Patient the job imports data for
    pub patient_id: Uuid,

    /// Connection whose credentials the job uses
    pub connection_id: Uuid,

    /// Provider slug, duplicated from the connection for cheap filtering
    pub provider: String,

    /// Current status of the job
    pub status: String,

    /// Number of failed attempts so far
    pub retry_count: i32,

    /// When a retrying job becomes due again
    pub next_retry_at: Option<DateTimeWithTimeZone>,

    /// Measurement rows imported by the successful attempt
    pub records_imported: Option<i32>,

    /// Error message from the most recent failed attempt
    pub error_message: Option<String>,

    /// Timestamp when the current/last attempt started
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the job reached a terminal state
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the sync job was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the sync job was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "WearableConnection",
        from = "Column::ConnectionId",
        to = "super::wearable_connection::Column::Id"
    )]
    Connection,
}

impl Related<WearableConnection> for Entity {
    fn to() -> RelationDef {
        Relation::Connection.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
