//! Ballot submission service.
//!
//! A submission runs in one transaction that starts by locking the vote row,
//! so concurrent submissions to the same vote are applied one after another
//! and the "already voted" read always sees the latest ballots.

use std::collections::HashSet;

use ballotbox_common::{AppError, AppResult, IdGenerator};
use ballotbox_db::{
    db_error,
    entities::user_vote,
    repositories::{UserVoteRepository, VoteOptionRepository, VoteRepository},
};
use chrono::Utc;
use sea_orm::Set;
use tracing::{debug, info};

/// Service recording ballots and keeping option tallies in step with them.
#[derive(Clone)]
pub struct BallotService {
    vote_repo: VoteRepository,
    option_repo: VoteOptionRepository,
    user_vote_repo: UserVoteRepository,
    id_gen: IdGenerator,
}

impl BallotService {
    /// Create a new ballot service.
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

    /// Record a voter's selection.
    ///
    /// On a single-select vote an earlier ballot is retracted and replaced.
    /// On a multi-select vote every option may be chosen once; picking an
    /// option that is already selected rejects the whole call.
    pub async fn submit(
        &self,
        voter_id: &str,
        vote_id: &str,
        option_ids: &[String],
    ) -> AppResult<()> {
        let txn = self.vote_repo.begin().await?;

        let vote = self.vote_repo.get_for_update(&txn, vote_id).await?;

        if vote.is_expired_at(Utc::now().timestamp()) {
            return Err(AppError::Expired(vote_id.to_string()));
        }

        let options = self.option_repo.find_by_vote(&txn, vote_id).await?;
        let known: HashSet<&str> = options.iter().map(|o| o.id.as_str()).collect();
        if let Some(foreign) = option_ids.iter().find(|id| !known.contains(id.as_str())) {
            return Err(AppError::InvalidOption(foreign.clone()));
        }

        check_cardinality(option_ids, vote.multi)?;

        let existing = self
            .user_vote_repo
            .find_by_user_and_vote(&txn, voter_id, vote_id)
            .await?;

        if vote.multi {
            if let Some(selected) = option_ids
                .iter()
                .find(|id| existing.iter().any(|b| &b.option_id == *id))
            {
                return Err(AppError::AlreadyVoted(selected.clone()));
            }
        } else if !existing.is_empty() {
            for ballot in &existing {
                self.option_repo
                    .decrement_count(&txn, &ballot.option_id)
                    .await?;
            }
            self.user_vote_repo
                .delete_by_user_and_vote(&txn, voter_id, vote_id)
                .await?;
            debug!(
                voter_id = %voter_id,
                vote_id = %vote_id,
                retracted = existing.len(),
                "Retracted previous ballot"
            );
        }

        let now = Utc::now();
        for option_id in option_ids {
            self.user_vote_repo
                .create(
                    &txn,
                    user_vote::ActiveModel {
                        id: Set(self.id_gen.generate()),
                        user_id: Set(voter_id.to_string()),
                        vote_id: Set(vote_id.to_string()),
                        option_id: Set(option_id.clone()),
                        created_at: Set(now.into()),
                    },
                )
                .await?;
            self.option_repo.increment_count(&txn, option_id).await?;
        }

        txn.commit().await.map_err(db_error)?;

        info!(
            voter_id = %voter_id,
            vote_id = %vote_id,
            options = option_ids.len(),
            "Ballot recorded"
        );
        Ok(())
    }
}

fn check_cardinality(option_ids: &[String], multi: bool) -> AppResult<()> {
    if option_ids.is_empty() {
        return Err(AppError::Validation(
            "At least one option must be selected".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(option_ids.len());
    if !option_ids.iter().all(|id| seen.insert(id.as_str())) {
        return Err(AppError::Validation(
            "Options may only be selected once per submission".to_string(),
        ));
    }

    if !multi && option_ids.len() > 1 {
        return Err(AppError::Validation(
            "This vote accepts a single option".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::vote::{
        VoteWithOptions,
        tests::{Fixture, input},
    };
    use ballotbox_db::test_utils::TestDatabase;
    use sea_orm::Database;
    use std::sync::Arc;

    /// Fixture over a fresh `PostgreSQL` database with a multi-connection pool.
    async fn postgres_fixture() -> (TestDatabase, Fixture) {
        let db = TestDatabase::create_unique().await.unwrap();
        let conn = Database::connect(db.config.database_url()).await.unwrap();
        (db, Fixture::with_connection(Arc::new(conn)))
    }

    impl Fixture {
        fn ballot_service(&self) -> BallotService {
            BallotService::new(
                self.votes.clone(),
                self.options.clone(),
                self.ballots.clone(),
            )
        }

        async fn poll(
            &self,
            creator: &str,
            options: &[&str],
            multi: bool,
            deadline: i64,
        ) -> VoteWithOptions {
            self.vote_service()
                .create(creator, input("Lunch", options, multi, deadline))
                .await
                .unwrap()
        }

        /// Every option's counter equals its number of ballot rows.
        async fn assert_tallies_match(&self, vote: &VoteWithOptions) {
            let conn = self.ballots.connection();
            let options = self.options.find_by_vote(conn, &vote.vote.id).await.unwrap();
            for option in options {
                let rows = self.ballots.count_by_option(conn, &option.id).await.unwrap();
                assert_eq!(option.count as u64, rows, "option {}", option.content);
            }
        }
    }

    fn ids(vote: &VoteWithOptions, picks: &[usize]) -> Vec<String> {
        picks.iter().map(|&i| vote.options[i].id.clone()).collect()
    }

    #[test]
    fn test_check_cardinality() {
        let one = vec!["a".to_string()];
        let two = vec!["a".to_string(), "b".to_string()];
        let dup = vec!["a".to_string(), "a".to_string()];

        assert!(check_cardinality(&one, false).is_ok());
        assert!(check_cardinality(&two, true).is_ok());
        assert!(matches!(check_cardinality(&[], true), Err(AppError::Validation(_))));
        assert!(matches!(check_cardinality(&dup, true), Err(AppError::Validation(_))));
        assert!(matches!(check_cardinality(&two, false), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_single_select_revote_replaces_ballot() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let lunch = fx.poll(&alice, &["Pizza", "Sushi"], false, 0).await;
        let service = fx.ballot_service();

        service.submit(&alice, &lunch.vote.id, &ids(&lunch, &[0])).await.unwrap();
        assert_eq!(fx.counts(&lunch.vote.id).await, [1, 0]);

        service.submit(&alice, &lunch.vote.id, &ids(&lunch, &[1])).await.unwrap();
        assert_eq!(fx.counts(&lunch.vote.id).await, [0, 1]);

        let ballots = fx
            .ballots
            .find_by_user_and_vote(fx.ballots.connection(), &alice, &lunch.vote.id)
            .await
            .unwrap();
        assert_eq!(ballots.len(), 1);
        assert_eq!(ballots[0].option_id, lunch.options[1].id);
        fx.assert_tallies_match(&lunch).await;
    }

    #[tokio::test]
    async fn test_single_select_revote_same_option_is_idempotent() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let lunch = fx.poll(&alice, &["Pizza", "Sushi"], false, 0).await;
        let service = fx.ballot_service();

        service.submit(&alice, &lunch.vote.id, &ids(&lunch, &[0])).await.unwrap();
        service.submit(&alice, &lunch.vote.id, &ids(&lunch, &[0])).await.unwrap();

        assert_eq!(fx.counts(&lunch.vote.id).await, [1, 0]);
        fx.assert_tallies_match(&lunch).await;
    }

    #[tokio::test]
    async fn test_multi_select_already_voted_changes_nothing() {
        let fx = Fixture::new().await;
        let bob = fx.user("bob").await;
        let poll = fx.poll(&bob, &["A", "B", "C"], true, 0).await;
        let service = fx.ballot_service();

        service.submit(&bob, &poll.vote.id, &ids(&poll, &[0, 1])).await.unwrap();
        assert_eq!(fx.counts(&poll.vote.id).await, [1, 1, 0]);

        let again = service.submit(&bob, &poll.vote.id, &ids(&poll, &[0])).await;
        assert!(matches!(again, Err(AppError::AlreadyVoted(id)) if id == poll.options[0].id));

        // A fresh option alongside a selected one is rejected as a whole.
        let mixed = service.submit(&bob, &poll.vote.id, &ids(&poll, &[2, 1])).await;
        assert!(matches!(mixed, Err(AppError::AlreadyVoted(_))));
        assert_eq!(fx.counts(&poll.vote.id).await, [1, 1, 0]);

        service.submit(&bob, &poll.vote.id, &ids(&poll, &[2])).await.unwrap();
        assert_eq!(fx.counts(&poll.vote.id).await, [1, 1, 1]);
        fx.assert_tallies_match(&poll).await;
    }

    #[tokio::test]
    async fn test_foreign_option_is_rejected() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let lunch = fx.poll(&alice, &["Pizza", "Sushi"], false, 0).await;
        let other = fx.poll(&alice, &["Tea", "Coffee"], false, 0).await;
        let service = fx.ballot_service();

        let result = service.submit(&alice, &lunch.vote.id, &ids(&other, &[0])).await;
        assert!(matches!(result, Err(AppError::InvalidOption(id)) if id == other.options[0].id));

        let unknown = service
            .submit(&alice, &lunch.vote.id, &["missing".to_string()])
            .await;
        assert!(matches!(unknown, Err(AppError::InvalidOption(_))));

        assert_eq!(fx.counts(&lunch.vote.id).await, [0, 0]);
        assert_eq!(fx.counts(&other.vote.id).await, [0, 0]);
    }

    #[tokio::test]
    async fn test_expired_vote_rejects_submission() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let past = Utc::now().timestamp() - 60;
        let closed = fx.poll(&alice, &["Pizza", "Sushi"], false, past).await;
        let service = fx.ballot_service();

        let result = service.submit(&alice, &closed.vote.id, &ids(&closed, &[0])).await;
        assert!(matches!(result, Err(AppError::Expired(_))));
        assert_eq!(fx.counts(&closed.vote.id).await, [0, 0]);

        let future = Utc::now().timestamp() + 3600;
        let open = fx.poll(&alice, &["Pizza", "Sushi"], false, future).await;
        service.submit(&alice, &open.vote.id, &ids(&open, &[1])).await.unwrap();
        assert_eq!(fx.counts(&open.vote.id).await, [0, 1]);
    }

    #[tokio::test]
    async fn test_errors_follow_check_order() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let past = Utc::now().timestamp() - 60;
        let closed = fx.poll(&alice, &["Pizza", "Sushi"], false, past).await;
        let open = fx.poll(&alice, &["Pizza", "Sushi"], false, 0).await;
        let service = fx.ballot_service();

        let missing = service.submit(&alice, "missing", &[]).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        // Expiry wins over a foreign option.
        let expired = service
            .submit(&alice, &closed.vote.id, &["missing".to_string()])
            .await;
        assert!(matches!(expired, Err(AppError::Expired(_))));

        // A foreign option wins over a cardinality problem.
        let mut picks = ids(&open, &[0, 1]);
        picks.push("missing".to_string());
        let foreign = service.submit(&alice, &open.vote.id, &picks).await;
        assert!(matches!(foreign, Err(AppError::InvalidOption(_))));

        let too_many = service.submit(&alice, &open.vote.id, &ids(&open, &[0, 1])).await;
        assert!(matches!(too_many, Err(AppError::Validation(_))));

        let empty = service.submit(&alice, &open.vote.id, &[]).await;
        assert!(matches!(empty, Err(AppError::Validation(_))));

        assert_eq!(fx.counts(&open.vote.id).await, [0, 0]);
    }

    #[tokio::test]
    async fn test_unknown_voter_is_not_found() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let lunch = fx.poll(&alice, &["Pizza", "Sushi"], false, 0).await;

        let result = fx
            .ballot_service()
            .submit("ghost", &lunch.vote.id, &ids(&lunch, &[0]))
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(fx.counts(&lunch.vote.id).await, [0, 0]);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_lose_no_increment() {
        let fx = Fixture::new().await;
        let creator = fx.user("creator").await;
        let poll = fx.poll(&creator, &["Yes", "No"], false, 0).await;
        let service = fx.ballot_service();

        let mut voters = Vec::new();
        for i in 0..16 {
            voters.push(fx.user(&format!("voter{i}")).await);
        }

        let choice = ids(&poll, &[0]);
        let handles: Vec<_> = voters
            .iter()
            .map(|voter| {
                let service = service.clone();
                let voter = voter.clone();
                let vote_id = poll.vote.id.clone();
                let choice = choice.clone();
                tokio::spawn(async move { service.submit(&voter, &vote_id, &choice).await })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }

        assert_eq!(fx.counts(&poll.vote.id).await, [16, 0]);
        fx.assert_tallies_match(&poll).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires running PostgreSQL instance"]
    async fn test_concurrent_voters_on_postgres_lose_no_increment() {
        const VOTERS: usize = 32;
        let (db, fx) = postgres_fixture().await;
        let creator = fx.user("creator").await;
        let poll = fx.poll(&creator, &["Yes", "No"], false, 0).await;
        let service = fx.ballot_service();

        let mut voters = Vec::new();
        for i in 0..VOTERS {
            voters.push(fx.user(&format!("voter{i}")).await);
        }

        let choice = ids(&poll, &[0]);
        let handles: Vec<_> = voters
            .iter()
            .map(|voter| {
                let service = service.clone();
                let voter = voter.clone();
                let vote_id = poll.vote.id.clone();
                let choice = choice.clone();
                tokio::spawn(async move { service.submit(&voter, &vote_id, &choice).await })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }

        assert_eq!(fx.counts(&poll.vote.id).await, [VOTERS as i32, 0]);
        fx.assert_tallies_match(&poll).await;
        for voter in &voters {
            let ballots = fx
                .ballots
                .find_by_user_and_vote(fx.ballots.connection(), voter, &poll.vote.id)
                .await
                .unwrap();
            assert_eq!(ballots.len(), 1, "{voter}");
        }

        drop(fx);
        db.drop_database().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires running PostgreSQL instance"]
    async fn test_concurrent_revotes_on_postgres_keep_one_ballot() {
        const ATTEMPTS: usize = 24;
        let (db, fx) = postgres_fixture().await;
        let alice = fx.user("alice").await;
        let poll = fx.poll(&alice, &["Pizza", "Sushi", "Ramen"], false, 0).await;
        let service = fx.ballot_service();

        let handles: Vec<_> = (0..ATTEMPTS)
            .map(|i| {
                let service = service.clone();
                let voter = alice.clone();
                let vote_id = poll.vote.id.clone();
                let choice = ids(&poll, &[i % 3]);
                tokio::spawn(async move { service.submit(&voter, &vote_id, &choice).await })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }

        let ballots = fx
            .ballots
            .find_by_user_and_vote(fx.ballots.connection(), &alice, &poll.vote.id)
            .await
            .unwrap();
        assert_eq!(ballots.len(), 1);

        let counts = fx.counts(&poll.vote.id).await;
        assert_eq!(counts.iter().sum::<i32>(), 1);
        let chosen = poll
            .options
            .iter()
            .position(|o| o.id == ballots[0].option_id)
            .unwrap();
        assert_eq!(counts[chosen], 1);
        fx.assert_tallies_match(&poll).await;

        drop(fx);
        db.drop_database().await.unwrap();
    }
}
