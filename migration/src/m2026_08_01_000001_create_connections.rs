//! Migration to create the connections table.
//!
//! The connections table stores one row per account-to-provider authorization
//! attempt: the transient OAuth state token plus the encrypted tokens that the
//! callback handler persists after a successful code exchange.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Connections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Connections::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Connections::OwnerId).text().not_null())
                    .col(ColumnDef::new(Connections::Provider).text().not_null())
                    .col(ColumnDef::new(Connections::Domain).text().null())
                    .col(
                        ColumnDef::new(Connections::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Connections::StateToken).text().not_null())
                    .col(
                        ColumnDef::new(Connections::StateExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Connections::AccessTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Connections::RefreshTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Connections::TokenExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Connections::SnippetVerifiedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Connections::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Connections::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // State tokens are random and single-use; a plain unique index is
        // enough to uphold the at-most-one-pending-row-per-token invariant.
        manager
            .create_index(
                Index::create()
                    .name("idx_connections_state_token")
                    .table(Connections::Table)
                    .col(Connections::StateToken)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Owner lookups for account-management surfaces.
        manager
            .create_index(
                Index::create()
                    .name("idx_connections_owner_provider")
                    .table(Connections::Table)
                    .col(Connections::OwnerId)
                    .col(Connections::Provider)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_connections_owner_provider")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_connections_state_token").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Connections::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Connections {
    Table,
    Id,
    OwnerId,
    Provider,
    Domain,
    Status,
    StateToken,
    StateExpiresAt,
    AccessTokenCiphertext,
    RefreshTokenCiphertext,
    TokenExpiresAt,
    SnippetVerifiedAt,
    CreatedAt,
    UpdatedAt,
}
