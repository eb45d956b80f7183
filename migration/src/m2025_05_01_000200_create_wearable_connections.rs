//! Migration to create the wearable_connections table.
//!
//! A wearable connection stores a patient's OAuth credentials for one device
//! provider. Token ciphertexts carry a key version so the rotation batch can
//! find rows still encrypted under an older keyring entry.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WearableConnections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WearableConnections::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WearableConnections::PatientId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WearableConnections::Provider)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WearableConnections::ExternalUserId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WearableConnections::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(WearableConnections::AccessTokenCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WearableConnections::RefreshTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WearableConnections::TokenExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WearableConnections::TokenVersion)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(WearableConnections::LastRotatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WearableConnections::LastSyncAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WearableConnections::LastSuccessfulSyncAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(WearableConnections::SyncError).text().null())
                    .col(
                        ColumnDef::new(WearableConnections::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WearableConnections::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_wearable_connections_patient_id")
                            .from(WearableConnections::Table, WearableConnections::PatientId)
                            .to(Patients::Table, Patients::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One connection per provider account, and one per patient per provider.
        manager
            .create_index(
                Index::create()
                    .name("idx_wearable_connections_provider_external")
                    .table(WearableConnections::Table)
                    .col(WearableConnections::Provider)
                    .col(WearableConnections::ExternalUserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_wearable_connections_patient_provider")
                    .table(WearableConnections::Table)
                    .col(WearableConnections::PatientId)
                    .col(WearableConnections::Provider)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Rotation scans filter on (is_active, token_version, last_rotated_at).
        manager
            .create_index(
                Index::create()
                    .name("idx_wearable_connections_token_version")
                    .table(WearableConnections::Table)
                    .col(WearableConnections::TokenVersion)
                    .col(WearableConnections::LastRotatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_wearable_connections_provider_external")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_wearable_connections_patient_provider")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_wearable_connections_token_version")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(WearableConnections::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WearableConnections {
    Table,
    Id,
    PatientId,
    Provider,
    ExternalUserId,
    IsActive,
    AccessTokenCiphertext,
    RefreshTokenCiphertext,
    TokenExpiresAt,
    TokenVersion,
    LastRotatedAt,
    LastSyncAt,
    LastSuccessfulSyncAt,
    SyncError,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Patients {
    Table,
    Id,
}
