//! API middleware.

#![allow(missing_docs)]

use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use ballotbox_core::{AuthService, BallotService, VoteQueryService, VoteService};
use tracing::debug;

use crate::extractors::AuthUser;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub auth_service: AuthService,
    pub vote_service: VoteService,
    pub ballot_service: BallotService,
    pub vote_query_service: VoteQueryService,
}

/// Authentication middleware.
///
/// A valid bearer token places an [`AuthUser`] in the request extensions.
/// Requests without one pass through; protected handlers reject them through
/// the extractor.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth_header) = req.headers().get(AUTHORIZATION)
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        match state.auth_service.verify_token(token.trim()) {
            Ok(claims) => {
                req.extensions_mut().insert(AuthUser {
                    id: claims.sub,
                    username: claims.username,
                });
            }
            Err(_) => debug!(path = %req.uri().path(), "Ignoring invalid bearer token"),
        }
    }

    next.run(req).await
}
