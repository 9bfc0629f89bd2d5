//! Read side of votes: single vote status and vote listings.

use std::collections::HashMap;

use ballotbox_common::AppResult;
use ballotbox_db::{
    entities::{vote, vote_option},
    repositories::{UserVoteRepository, VoteOptionRepository, VoteRepository},
};
use chrono::Utc;

use super::vote::VoteWithOptions;

/// A vote as seen by one viewer.
#[derive(Debug, Clone)]
pub struct VoteWithStatus {
    pub vote: vote::Model,
    pub options: Vec<vote_option::Model>,
    pub has_voted: bool,
    pub voted_option_ids: Vec<String>,
    pub is_expired: bool,
}

/// Query service assembling vote aggregates from explicit repository reads.
#[derive(Clone)]
pub struct VoteQueryService {
    vote_repo: VoteRepository,
    option_repo: VoteOptionRepository,
    user_vote_repo: UserVoteRepository,
}

impl VoteQueryService {
    /// Create a new vote query service.
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
        }
    }

    /// Get a vote with its options and the viewer's selection.
    pub async fn get(&self, vote_id: &str, viewer_id: &str) -> AppResult<VoteWithStatus> {
        let conn = self.vote_repo.connection();

        let vote = self.vote_repo.get_by_id(conn, vote_id).await?;
        let options = self.option_repo.find_by_vote(conn, vote_id).await?;
        let ballots = self
            .user_vote_repo
            .find_by_user_and_vote(conn, viewer_id, vote_id)
            .await?;

        let is_expired = vote.is_expired_at(Utc::now().timestamp());

        Ok(VoteWithStatus {
            vote,
            options,
            has_voted: !ballots.is_empty(),
            voted_option_ids: ballots.into_iter().map(|b| b.option_id).collect(),
            is_expired,
        })
    }

    /// Votes created by a user, newest first.
    pub async fn list_by_creator(&self, user_id: &str) -> AppResult<Vec<VoteWithOptions>> {
        let votes = self
            .vote_repo
            .find_by_creator(self.vote_repo.connection(), user_id)
            .await?;
        self.with_options(votes).await
    }

    /// All votes, newest first.
    pub async fn list_all(&self) -> AppResult<Vec<VoteWithOptions>> {
        let votes = self.vote_repo.find_all(self.vote_repo.connection()).await?;
        self.with_options(votes).await
    }

    /// Attach options to votes with a single batched query.
    async fn with_options(&self, votes: Vec<vote::Model>) -> AppResult<Vec<VoteWithOptions>> {
        let vote_ids: Vec<String> = votes.iter().map(|v| v.id.clone()).collect();
        let options = self
            .option_repo
            .find_by_votes(self.option_repo.connection(), &vote_ids)
            .await?;

        let mut by_vote: HashMap<String, Vec<vote_option::Model>> = HashMap::new();
        for option in options {
            by_vote
                .entry(option.vote_id.clone())
                .or_default()
                .push(option);
        }

        Ok(votes
            .into_iter()
            .map(|vote| {
                let options = by_vote.remove(&vote.id).unwrap_or_default();
                VoteWithOptions { vote, options }
            })
            .collect())
    }
}
