//! Database migrations for the Curie sync service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_05_01_000100_create_patients;
mod m2025_05_01_000200_create_wearable_connections;
mod m2025_05_01_000300_create_sync_jobs;
mod m2025_05_01_000400_create_composition_records;
mod m2025_05_01_000500_create_cron_leases;
mod m2025_05_01_000600_create_system_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_05_01_000100_create_patients::Migration),
            Box::new(m2025_05_01_000200_create_wearable_connections::Migration),
            Box::new(m2025_05_01_000300_create_sync_jobs::Migration),
            Box::new(m2025_05_01_000400_create_composition_records::Migration),
            Box::new(m2025_05_01_000500_create_cron_leases::Migration),
            Box::new(m2025_05_01_000600_create_system_events::Migration),
        ]
    }
}
