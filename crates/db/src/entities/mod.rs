//! Database entities.

#![allow(missing_docs)]

pub mod user;
pub mod user_vote;
pub mod vote;
pub mod vote_option;

pub use user::Entity as User;
pub use user_vote::Entity as UserVote;
pub use vote::Entity as Vote;
pub use vote_option::Entity as VoteOption;
