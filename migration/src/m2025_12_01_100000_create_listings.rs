//! Migration to create the listings table.
//!
//! The listings table is the local cache of the external auction inventory,
//! keyed by the feed-assigned external id. Rows are only ever soft-archived
//! by the sync engine; `is_active = false` means the row is invisible to
//! catalog readers regardless of any other field.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Listings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Listings::ExternalId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Listings::Make).text().not_null())
                    .col(ColumnDef::new(Listings::Model).text().not_null())
                    .col(ColumnDef::new(Listings::Year).integer().not_null())
                    .col(ColumnDef::new(Listings::Price).big_integer().not_null())
                    .col(ColumnDef::new(Listings::Mileage).integer().not_null())
                    .col(ColumnDef::new(Listings::Title).text().not_null())
                    .col(ColumnDef::new(Listings::Vin).text().null())
                    .col(ColumnDef::new(Listings::Color).text().null())
                    .col(ColumnDef::new(Listings::Fuel).text().null())
                    .col(ColumnDef::new(Listings::Transmission).text().null())
                    .col(ColumnDef::new(Listings::LotNumber).text().null())
                    .col(ColumnDef::new(Listings::ImageUrl).text().null())
                    .col(ColumnDef::new(Listings::Images).json_binary().null())
                    .col(
                        ColumnDef::new(Listings::Condition)
                            .text()
                            .not_null()
                            .default("good"),
                    )
                    .col(
                        ColumnDef::new(Listings::IsLive)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Listings::KeysAvailable)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Listings::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Listings::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Listings::IsArchived)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Listings::ArchivedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Listings::ArchiveReason).text().null())
                    .col(ColumnDef::new(Listings::ContentHash).text().not_null())
                    .col(
                        ColumnDef::new(Listings::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Listings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Listings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Reconciliation and visibility reads filter on these.
        manager
            .create_index(
                Index::create()
                    .name("idx_listings_active_status")
                    .table(Listings::Table)
                    .col(Listings::IsActive)
                    .col(Listings::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_listings_last_synced_at")
                    .table(Listings::Table)
                    .col(Listings::LastSyncedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Listings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Listings {
    Table,
    ExternalId,
    Make,
    Model,
    Year,
    Price,
    Mileage,
    Title,
    Vin,
    Color,
    Fuel,
    Transmission,
    LotNumber,
    ImageUrl,
    Images,
    Condition,
    IsLive,
    KeysAvailable,
    Status,
    IsActive,
    IsArchived,
    ArchivedAt,
    ArchiveReason,
    ContentHash,
    LastSyncedAt,
    CreatedAt,
    UpdatedAt,
}
