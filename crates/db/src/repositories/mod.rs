//! Database repositories.

mod user;
mod user_vote;
mod vote;

pub use user::UserRepository;
pub use user_vote::UserVoteRepository;
pub use vote::{VoteOptionRepository, VoteRepository};
