//! Patient entity model
//!
//! This module contains the SeaORM entity model for the patients table, the
//! tenancy anchor for connections, jobs, and composition records.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "patients")]
pub struct Model {
    /// Unique identifier for the patient (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Display name shown in audit payloads
    pub display_name: String,

    /// Timestamp when the patient was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the patient was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
