//! Create `book` table.
//! One row per catalog record, keyed by the allocated numeric id. `rating` is an
//! unconstrained DECIMAL so values keep their exact decimal form.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Book::Table)
                    .if_not_exists()
                    .col(big_integer(Book::Id).primary_key())
                    .col(string_len(Book::Title, 512).not_null())
                    .col(decimal(Book::Rating).not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Book::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Book {
    Table,
    Id,
    Title,
    Rating,
}
