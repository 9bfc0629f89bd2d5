//! Vote and vote option repositories.

use std::sync::Arc;

use crate::{
    db_error,
    entities::{Vote, VoteOption, vote, vote_option},
};
use ballotbox_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, sea_query::Expr,
};

/// Vote repository for database operations.
#[derive(Clone)]
pub struct VoteRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteRepository {
    /// Create a new vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Shared pool connection for statements that need no transaction.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    /// Start a transaction on the pool.
    ///
    /// Dropping the returned transaction without committing rolls it back.
    pub async fn begin(&self) -> AppResult<DatabaseTransaction> {
        self.db.begin().await.map_err(db_error)
    }

    /// Find a vote by ID.
    pub async fn find_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<Option<vote::Model>> {
        Vote::find_by_id(id).one(conn).await.map_err(db_error)
    }

    /// Get a vote by ID, returning error if not found.
    pub async fn get_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &str,
    ) -> AppResult<vote::Model> {
        self.find_by_id(conn, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Vote not found: {id}")))
    }

    /// Get a vote by ID and hold a row lock on it until `txn` ends.
    ///
    /// Every mutation of a vote's options or ballots takes this lock first,
    /// which serializes them per vote.
    pub async fn get_for_update(
        &self,
        txn: &DatabaseTransaction,
        id: &str,
    ) -> AppResult<vote::Model> {
        Vote::find_by_id(id)
            .lock_exclusive()
            .one(txn)
            .await
            .map_err(db_error)?
            .ok_or_else(|| AppError::NotFound(format!("Vote not found: {id}")))
    }

    /// Votes created by a user, newest first.
    pub async fn find_by_creator<C: ConnectionTrait>(
        &self,
        conn: &C,
        creator_id: &str,
    ) -> AppResult<Vec<vote::Model>> {
        Vote::find()
            .filter(vote::Column::CreatorId.eq(creator_id))
            .order_by_desc(vote::Column::CreatedAt)
            .order_by_desc(vote::Column::Id)
            .all(conn)
            .await
            .map_err(db_error)
    }

    /// All votes, newest first.
    pub async fn find_all<C: ConnectionTrait>(&self, conn: &C) -> AppResult<Vec<vote::Model>> {
        Vote::find()
            .order_by_desc(vote::Column::CreatedAt)
            .order_by_desc(vote::Column::Id)
            .all(conn)
            .await
            .map_err(db_error)
    }

    /// Create a new vote.
    pub async fn create<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: vote::ActiveModel,
    ) -> AppResult<vote::Model> {
        model.insert(conn).await.map_err(db_error)
    }

    /// Update a vote.
    pub async fn update<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: vote::ActiveModel,
    ) -> AppResult<vote::Model> {
        model.update(conn).await.map_err(db_error)
    }

    /// Delete a vote row.
    pub async fn delete<C: ConnectionTrait>(&self, conn: &C, id: &str) -> AppResult<()> {
        Vote::delete_by_id(id).exec(conn).await.map_err(db_error)?;
        Ok(())
    }
}

/// Vote option repository for database operations.
#[derive(Clone)]
pub struct VoteOptionRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteOptionRepository {
    /// Create a new vote option repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Shared pool connection for statements that need no transaction.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    /// Options of a vote in display order.
    pub async fn find_by_vote<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
    ) -> AppResult<Vec<vote_option::Model>> {
        VoteOption::find()
            .filter(vote_option::Column::VoteId.eq(vote_id))
            .order_by_asc(vote_option::Column::Position)
            .all(conn)
            .await
            .map_err(db_error)
    }

    /// Options of several votes in one query, ordered by vote then position.
    pub async fn find_by_votes<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_ids: &[String],
    ) -> AppResult<Vec<vote_option::Model>> {
        if vote_ids.is_empty() {
            return Ok(vec![]);
        }

        VoteOption::find()
            .filter(vote_option::Column::VoteId.is_in(vote_ids.to_vec()))
            .order_by_asc(vote_option::Column::VoteId)
            .order_by_asc(vote_option::Column::Position)
            .all(conn)
            .await
            .map_err(db_error)
    }

    /// Insert a batch of options.
    pub async fn create_many<C: ConnectionTrait>(
        &self,
        conn: &C,
        models: Vec<vote_option::ActiveModel>,
    ) -> AppResult<()> {
        if models.is_empty() {
            return Ok(());
        }

        VoteOption::insert_many(models)
            .exec_without_returning(conn)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    /// Delete every option of a vote.
    pub async fn delete_by_vote<C: ConnectionTrait>(
        &self,
        conn: &C,
        vote_id: &str,
    ) -> AppResult<u64> {
        let result = VoteOption::delete_many()
            .filter(vote_option::Column::VoteId.eq(vote_id))
            .exec(conn)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected)
    }

    /// Increment an option's count atomically (single UPDATE query, no fetch).
    pub async fn increment_count<C: ConnectionTrait>(
        &self,
        conn: &C,
        option_id: &str,
    ) -> AppResult<()> {
        let result = VoteOption::update_many()
            .col_expr(
                vote_option::Column::Count,
                Expr::col(vote_option::Column::Count).add(1),
            )
            .filter(vote_option::Column::Id.eq(option_id))
            .exec(conn)
            .await
            .map_err(db_error)?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "Vote option not found: {option_id}"
            )));
        }
        Ok(())
    }

    /// Decrement an option's count atomically.
    ///
    /// The count never drops below zero; a retraction that finds nothing to
    /// decrement means the stored tally disagrees with the ballot rows.
    pub async fn decrement_count<C: ConnectionTrait>(
        &self,
        conn: &C,
        option_id: &str,
    ) -> AppResult<()> {
        let result = VoteOption::update_many()
            .col_expr(
                vote_option::Column::Count,
                Expr::col(vote_option::Column::Count).sub(1),
            )
            .filter(vote_option::Column::Id.eq(option_id))
            .filter(vote_option::Column::Count.gt(0))
            .exec(conn)
            .await
            .map_err(db_error)?;

        if result.rows_affected == 0 {
            return Err(AppError::Internal(format!(
                "Tally underflow for vote option {option_id}"
            )));
        }
        Ok(())
    }
}
