//! CompositionRecord entity model
//!
//! Body-composition measurement snapshots imported from providers. The
//! (patient_id, source, measured_at, metric) unique index backs the
//! idempotent upsert.

use super::patient::Entity as Patient;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "composition_records")]
pub struct Model {
    /// Unique identifier for the record (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Patient the measurement belongs to
    pub patient_id: Uuid,

    /// Provider slug the measurement was imported from
    pub source: String,

    /// Canonical metric name (weight, fat_ratio, muscle_mass, ...)
    pub metric: String,

    /// When the measurement was taken, per the provider
    pub measured_at: DateTimeWithTimeZone,

    /// Measurement value in the canonical unit for the metric
    pub value: f64,

    /// Unit label (kg, percent)
    pub unit: Option<String>,

    /// Timestamp when the record was imported
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Patient",
        from = "Column::PatientId",
        to = "super::patient::Column::Id"
    )]
    Patient,
}

impl Related<Patient> for Entity {
    fn to() -> RelationDef {
        Relation::Patient.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
