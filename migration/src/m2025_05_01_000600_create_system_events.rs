//! Migration to create the system_events table.
//!
//! Append-only audit log. Rows are written on webhook ingests, permanent job
//! failures, and rotation runs, and are never mutated afterwards.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SystemEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SystemEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SystemEvents::EventType).text().not_null())
                    .col(
                        ColumnDef::new(SystemEvents::Severity)
                            .text()
                            .not_null()
                            .default("info"),
                    )
                    .col(ColumnDef::new(SystemEvents::Payload).json_binary().null())
                    .col(
                        ColumnDef::new(SystemEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_system_events_event_type_created")
                    .table(SystemEvents::Table)
                    .col(SystemEvents::EventType)
                    .col(SystemEvents::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_system_events_event_type_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(SystemEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SystemEvents {
    Table,
    Id,
    EventType,
    Severity,
    Payload,
    CreatedAt,
}
