//! Create user vote (ballot) table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserVote::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserVote::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UserVote::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(UserVote::VoteId).string_len(32).not_null())
                    .col(ColumnDef::new(UserVote::OptionId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(UserVote::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_vote_user")
                            .from(UserVote::Table, UserVote::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_vote_vote")
                            .from(UserVote::Table, UserVote::VoteId)
                            .to(Vote::Table, Vote::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_vote_option")
                            .from(UserVote::Table, UserVote::OptionId)
                            .to(VoteOption::Table, VoteOption::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (user_id, vote_id, option_id) - an option is selected at most once
        manager
            .create_index(
                Index::create()
                    .name("idx_user_vote_user_vote_option")
                    .table(UserVote::Table)
                    .col(UserVote::UserId)
                    .col(UserVote::VoteId)
                    .col(UserVote::OptionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: (vote_id, user_id) - "has this viewer voted" lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_user_vote_vote_user")
                    .table(UserVote::Table)
                    .col(UserVote::VoteId)
                    .col(UserVote::UserId)
                    .to_owned(),
            )
            .await?;

        // Index: option_id (tally reconciliation)
        manager
            .create_index(
                Index::create()
                    .name("idx_user_vote_option_id")
                    .table(UserVote::Table)
                    .col(UserVote::OptionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserVote::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum UserVote {
    Table,
    Id,
    UserId,
    VoteId,
    OptionId,
    CreatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}

#[derive(Iden)]
enum Vote {
    Table,
    Id,
}

#[derive(Iden)]
enum VoteOption {
    Table,
    Id,
}
