use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Popups {
    Table,
    Id,
    Title,
    Content,
    StartDate,
    EndDate,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Popups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Popups::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Popups::Title).string_len(200).not_null())
                    .col(ColumnDef::new(Popups::Content).text().not_null())
                    .col(ColumnDef::new(Popups::StartDate).timestamp().null())
                    .col(ColumnDef::new(Popups::EndDate).timestamp().null())
                    .col(
                        ColumnDef::new(Popups::IsActive)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Popups::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Popups::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_popups_is_active")
                    .table(Popups::Table)
                    .col(Popups::IsActive)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Popups::Table).to_owned())
            .await
    }
}
