//! Business logic services.

#![allow(missing_docs)]

pub mod auth;
pub mod ballot;
pub mod vote;
pub mod vote_query;

pub use auth::{AuthService, Claims, LoginResult, RegisterInput};
pub use ballot::BallotService;
pub use vote::{MAX_OPTIONS, VoteInput, VoteService, VoteWithOptions};
pub use vote_query::{VoteQueryService, VoteWithStatus};
