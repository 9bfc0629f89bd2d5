//! Ballot (user vote) repository.

use std::sync::Arc;

use crate::{
    db_error,
    entities::{UserVote, user_vote},
};
use ballotbox_common::AppResult;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};

/// Ballot repository for database operations.
#[derive(Clone)]
pub struct UserVoteRepository {
    db: Arc<DatabaseConnection>,
}

impl UserVoteRepository {
    /// Create a new ballot repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Shared pool connection for statements that need no transaction.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    /// Ballot rows of a user in a vote.
    pub async fn find_by_user_and_vote<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: &str,
        vote_id: &str,
    ) -> AppResult<Vec<user_vote::Model>> {
        UserVote::find()
            .filter(user_vote::Column::UserId.eq(user_id))
            .filter(user_vote::Column::VoteId.eq(vote_id))
            .order_by_asc(user_vote::Column::CreatedAt)
            .all(conn)
            .await
            .map_err(db_error)
    }

    /// Check if a user has at least one ballot in a vote.
    pub async fn has_voted<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: &str,
        vote_id: &str,
    ) -> AppResult<bool> {
        let count = UserVote::find()
            .filter(user_vote::Column::UserId.eq(user_id))
            .filter(user_vote::Column::VoteId.eq(vote_id))
            .count(conn)
            .await
            .map_err(db_error)?;
        Ok(count > 0)
    }

    /// Number of ballot rows recorded for an option.
    pub async fn count_by_option<C: ConnectionTrait>(
        &self,
        conn: &C,
        option_id: &str,
    ) -> AppResult<u64> {
        UserVote::find()
            .filter(user_vote::Column::OptionId.eq(option_id))
            .count(conn)
            .await
            .map_err(db_error)
    }

    /// Record a ballot row.
    pub async fn create<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: user_vote::ActiveModel,
    ) -> AppResult<user_vote::Model> {
        model.insert(conn).await.map_err(db_error)
    }

    /// Remove a user's ballot rows in a vote.
    pub async fn delete_by_user_and_vote<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: &str,
        vote_id: &str,
    ) -> AppResult<u64> {
        let result = UserVote::delete_many()
            .filter(user_vote::Column::UserId.eq(user_id))
            .filter(user_vote::Column::VoteId.eq(vote_id))
            .exec(conn)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected)
    }

    /// Remove every ballot row of a vote.
    pub async fn delete_by_vote<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
    ) -> AppResult<u64> {
        let result = UserVote::delete_many()
            .filter(user_vote::Column::VoteId.eq(vote_id))
            .exec(conn)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected)
    }
}
