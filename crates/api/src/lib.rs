//! HTTP API layer for ballotbox.
//!
//! - **Endpoints**: account and vote routes, mounted under `/api` by the server
//! - **Extractors**: the authenticated caller
//! - **Middleware**: bearer token authentication
//!
//! Built on Axum 0.8.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;
pub use middleware::{AppState, auth_middleware};
