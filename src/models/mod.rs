//! # Data Models
//!
//! This module contains all the data models used throughout the Curie sync
//! service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod composition_record;
pub mod cron_lease;
pub mod patient;
pub mod sync_job;
pub mod system_event;
pub mod wearable_connection;

pub use composition_record::Entity as CompositionRecord;
pub use cron_lease::Entity as CronLease;
pub use patient::Entity as Patient;
pub use sync_job::Entity as SyncJob;
pub use system_event::Entity as SystemEvent;
pub use wearable_connection::Entity as WearableConnection;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "curie-sync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
