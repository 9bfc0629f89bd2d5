//! Create vote option table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VoteOption::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VoteOption::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VoteOption::VoteId).string_len(32).not_null())
                    .col(ColumnDef::new(VoteOption::Content).string_len(256).not_null())
                    .col(ColumnDef::new(VoteOption::Position).integer().not_null())
                    .col(
                        ColumnDef::new(VoteOption::Count)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_option_vote")
                            .from(VoteOption::Table, VoteOption::VoteId)
                            .to(Vote::Table, Vote::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (vote_id, position) - options are always read in display order
        manager
            .create_index(
                Index::create()
                    .name("idx_vote_option_vote_id_position")
                    .table(VoteOption::Table)
                    .col(VoteOption::VoteId)
                    .col(VoteOption::Position)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VoteOption::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum VoteOption {
    Table,
    Id,
    VoteId,
    Content,
    Position,
    Count,
}

#[derive(Iden)]
enum Vote {
    Table,
    Id,
}
