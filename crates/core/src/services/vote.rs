//! Vote lifecycle service: create, replace and delete polls.

use ballotbox_common::{AppError, AppResult, IdGenerator};
use ballotbox_db::{
    db_error,
    entities::{vote, vote_option},
    repositories::{UserVoteRepository, VoteOptionRepository, VoteRepository},
};
use chrono::Utc;
use sea_orm::Set;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

/// Maximum number of options on a single vote.
pub const MAX_OPTIONS: usize = 20;

/// Title and option set of a vote, used for both creation and replacement.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VoteInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 2, max = 20))]
    pub options: Vec<String>,
    pub multi: bool,
    /// Epoch seconds, `0` for no deadline.
    #[validate(range(min = 0))]
    pub deadline: i64,
}

impl VoteInput {
    /// Validate and trim the input.
    fn normalize(self) -> AppResult<Self> {
        self.validate()?;

        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::Validation("Title cannot be empty".to_string()));
        }

        let mut options = Vec::with_capacity(self.options.len());
        for option in self.options {
            let content = option.trim();
            if content.is_empty() {
                return Err(AppError::Validation(
                    "Vote options cannot be empty".to_string(),
                ));
            }
            if content.chars().count() > 200 {
                return Err(AppError::Validation(
                    "Vote option is too long (max 200 chars)".to_string(),
                ));
            }
            options.push(content.to_string());
        }

        Ok(Self {
            title,
            options,
            multi: self.multi,
            deadline: self.deadline,
        })
    }
}

/// A vote together with its options in display order.
#[derive(Debug, Clone)]
pub struct VoteWithOptions {
    pub vote: vote::Model,
    pub options: Vec<vote_option::Model>,
}

/// Service owning the vote lifecycle.
#[derive(Clone)]
pub struct VoteService {
    vote_repo: VoteRepository,
    option_repo: VoteOptionRepository,
    user_vote_repo: UserVoteRepository,
    id_gen: IdGenerator,
}

impl VoteService {
    /// Create a new vote service.
    #[must_use]
    pub const fn new(
        vote_repo: VoteRepository,
        option_repo: VoteOptionRepository,
        user_vote_repo: UserVoteRepository,
    ) -> Self {
        Self {
            vote_repo,
            option_repo,
            user_vote_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a vote and its options.
    pub async fn create(&self, creator_id: &str, input: VoteInput) -> AppResult<VoteWithOptions> {
        let input = input.normalize()?;
        let vote_id = self.id_gen.generate();

        let txn = self.vote_repo.begin().await?;

        let vote = self
            .vote_repo
            .create(
                &txn,
                vote::ActiveModel {
                    id: Set(vote_id.clone()),
                    title: Set(input.title),
                    multi: Set(input.multi),
                    deadline: Set(input.deadline),
                    creator_id: Set(creator_id.to_string()),
                    created_at: Set(Utc::now().into()),
                    updated_at: Set(None),
                },
            )
            .await?;

        self.option_repo
            .create_many(&txn, self.option_models(&vote_id, input.options))
            .await?;
        let options = self.option_repo.find_by_vote(&txn, &vote_id).await?;

        txn.commit().await.map_err(db_error)?;

        info!(
            vote_id = %vote.id,
            creator_id = %creator_id,
            options = options.len(),
            "Vote created"
        );
        Ok(VoteWithOptions { vote, options })
    }

    /// Replace the title, settings and option set of a vote.
    ///
    /// All ballots are discarded and the new options start at zero.
    pub async fn update(
        &self,
        vote_id: &str,
        requester_id: &str,
        input: VoteInput,
    ) -> AppResult<VoteWithOptions> {
        let txn = self.vote_repo.begin().await?;

        let vote = self.vote_repo.get_for_update(&txn, vote_id).await?;
        if vote.creator_id != requester_id {
            return Err(AppError::Forbidden(
                "Only the creator can edit this vote".to_string(),
            ));
        }
        let input = input.normalize()?;

        let ballots_removed = self.user_vote_repo.delete_by_vote(&txn, vote_id).await?;
        self.option_repo.delete_by_vote(&txn, vote_id).await?;
        self.option_repo
            .create_many(&txn, self.option_models(vote_id, input.options))
            .await?;

        let mut active: vote::ActiveModel = vote.into();
        active.title = Set(input.title);
        active.multi = Set(input.multi);
        active.deadline = Set(input.deadline);
        active.updated_at = Set(Some(Utc::now().into()));
        let vote = self.vote_repo.update(&txn, active).await?;

        let options = self.option_repo.find_by_vote(&txn, vote_id).await?;

        txn.commit().await.map_err(db_error)?;

        info!(vote_id = %vote_id, ballots_removed, "Vote replaced, results reset");
        Ok(VoteWithOptions { vote, options })
    }

    /// Delete a vote with its options and ballots.
    pub async fn delete(&self, vote_id: &str, requester_id: &str) -> AppResult<()> {
        let txn = self.vote_repo.begin().await?;

        let vote = self.vote_repo.get_for_update(&txn, vote_id).await?;
        if vote.creator_id != requester_id {
            return Err(AppError::Forbidden(
                "Only the creator can delete this vote".to_string(),
            ));
        }

        self.user_vote_repo.delete_by_vote(&txn, vote_id).await?;
        self.option_repo.delete_by_vote(&txn, vote_id).await?;
        self.vote_repo.delete(&txn, vote_id).await?;

        txn.commit().await.map_err(db_error)?;

        info!(vote_id = %vote_id, "Vote deleted");
        Ok(())
    }

    fn option_models(
        &self,
        vote_id: &str,
        contents: Vec<String>,
    ) -> Vec<vote_option::ActiveModel> {
        contents
            .into_iter()
            .enumerate()
            .map(|(position, content)| vote_option::ActiveModel {
                id: Set(self.id_gen.generate()),
                vote_id: Set(vote_id.to_string()),
                content: Set(content),
                position: Set(position as i32),
                count: Set(0),
            })
            .collect()
    }
}
