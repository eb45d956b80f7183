//! WearableConnection entity model
//!
//! This module contains the SeaORM entity model for the wearable_connections
//! table, which stores a patient's OAuth credential set for one device
//! provider. Token ciphertexts are written by the rotation batch only; rows
//! are deactivated rather than deleted.

use super::patient::Entity as Patient;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "wearable_connections")]
pub struct Model {
    /// Unique identifier for the connection (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Patient this connection belongs to
    pub patient_id: Uuid,

    /// Provider slug (e.g., "withings", "fitbit")
    pub provider: String,

    /// Provider-side subject identifier (unique per provider)
    pub external_user_id: String,

    /// Whether the connection is live; revoked connections stay on disk
    pub is_active: bool,

    /// Encrypted access token (keyring AEAD ciphertext)
    pub access_token_ciphertext: Vec<u8>,

    /// Encrypted refresh token, when the provider issues one
    pub refresh_token_ciphertext: Option<Vec<u8>>,

    /// Access token expiry reported by the provider
    pub token_expires_at: Option<DateTimeWithTimeZone>,

    /// Keyring version the token ciphertexts are encrypted under
    pub token_version: i32,

    /// When the rotation batch last re-encrypted this row
    pub last_rotated_at: Option<DateTimeWithTimeZone>,

    /// When a sync last ran for this connection, success or not
    pub last_sync_at: Option<DateTimeWithTimeZone>,

    /// When a sync last completed successfully
    pub last_successful_sync_at: Option<DateTimeWithTimeZone>,

    /// Error message from the last permanently failed sync job
    pub sync_error: Option<String>,

    /// Timestamp when the connection was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the connection was last updated
    pub updated_at: DateTimeWithTimeZone,
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
