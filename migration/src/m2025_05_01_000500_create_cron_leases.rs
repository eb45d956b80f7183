//! Migration to create the cron_leases table.
//!
//! One row per named cron job. A row whose expires_at is in the future and
//! whose holder differs from the caller means the job is running elsewhere.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CronLeases::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CronLeases::Name)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CronLeases::Holder).uuid().not_null())
                    .col(
                        ColumnDef::new(CronLeases::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CronLeases::AcquiredAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CronLeases::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CronLeases {
    Table,
    Name,
    Holder,
    ExpiresAt,
    AcquiredAt,
}
