//! Migration to create the composition_records table.
//!
//! Composition records are body-composition measurement snapshots imported
//! from providers. The unique (patient, source, measured_at, metric) index is
//! what makes webhook re-delivery and re-sync idempotent.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CompositionRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CompositionRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CompositionRecords::PatientId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CompositionRecords::Source).text().not_null())
                    .col(ColumnDef::new(CompositionRecords::Metric).text().not_null())
                    .col(
                        ColumnDef::new(CompositionRecords::MeasuredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CompositionRecords::Value)
                            .double()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CompositionRecords::Unit).text().null())
                    .col(
                        ColumnDef::new(CompositionRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_composition_records_patient_id")
                            .from(CompositionRecords::Table, CompositionRecords::PatientId)
                            .to(Patients::Table, Patients::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_composition_records_dedup")
                    .table(CompositionRecords::Table)
                    .col(CompositionRecords::PatientId)
                    .col(CompositionRecords::Source)
                    .col(CompositionRecords::MeasuredAt)
                    .col(CompositionRecords::Metric)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_composition_records_dedup")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(CompositionRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CompositionRecords {
    Table,
    Id,
    PatientId,
    Source,
    Metric,
    MeasuredAt,
    Value,
    Unit,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Patients {
    Table,
    Id,
}
