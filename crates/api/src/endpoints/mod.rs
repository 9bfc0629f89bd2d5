//! API endpoints.

#![allow(missing_docs)]

mod auth;
mod vote;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/vote", vote::router())
}
