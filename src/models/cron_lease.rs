//! CronLease entity model
//!
//! One row per named cron job. The holder column scopes renewal and release
//! to the invocation that acquired the lease.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cron_leases")]
pub struct Model {
    /// Lease name, one per cron job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,

    /// Identity of the invocation currently holding the lease
    pub holder: Uuid,

    /// When the lease lapses unless renewed
    pub expires_at: DateTimeWithTimeZone,

    /// When the current holder acquired the lease
    pub acquired_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
