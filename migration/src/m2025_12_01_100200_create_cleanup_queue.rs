//! Migration to create the cleanup_queue table.
//!
//! Every transition of a listing into a removed status enqueues one row
//! carrying the listing's image URLs. The rows are consumed by an external
//! asset-cleanup worker; this service only produces them.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CleanupQueue::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CleanupQueue::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CleanupQueue::ListingId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CleanupQueue::ImageUrls).json_binary().null())
                    .col(
                        ColumnDef::new(CleanupQueue::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(CleanupQueue::QueuedAt)
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
                    .name("idx_cleanup_queue_status")
                    .table(CleanupQueue::Table)
                    .col(CleanupQueue::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CleanupQueue::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CleanupQueue {
    Table,
    Id,
    ListingId,
    ImageUrls,
    Status,
    QueuedAt,
}
