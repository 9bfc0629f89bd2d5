//! Authentication endpoints.

use axum::{
    Router,
    extract::State,
    routing::{get, post},
};
use ballotbox_common::AppResult;
use ballotbox_core::RegisterInput;
use serde::{Deserialize, Serialize};

use crate::{
    extractors::{AuthUser, JsonBody},
    middleware::AppState,
    response::ApiResponse,
};

/// Credentials for registration and login.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

/// Register response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub id: String,
    pub username: String,
}

/// Create a new account.
async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CredentialsRequest>,
) -> AppResult<ApiResponse<RegisterResponse>> {
    let user = state
        .auth_service
        .register(RegisterInput {
            username: req.username,
            password: req.password,
        })
        .await?;

    Ok(ApiResponse::ok(RegisterResponse {
        id: user.id,
        username: user.username,
    }))
}

/// Login response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: String,
    pub username: String,
    pub token: String,
}

/// Exchange credentials for a session token.
async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CredentialsRequest>,
) -> AppResult<ApiResponse<LoginResponse>> {
    let result = state
        .auth_service
        .login(&req.username, &req.password)
        .await?;

    Ok(ApiResponse::ok(LoginResponse {
        user_id: result.user.id,
        username: result.user.username,
        token: result.token,
    }))
}

/// Profile response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: String,
    pub username: String,
    pub created_at: String,
}

/// Profile of the caller.
async fn profile(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<ProfileResponse>> {
    let user = state.auth_service.profile(&user.id).await?;

    Ok(ApiResponse::ok(ProfileResponse {
        id: user.id,
        username: user.username,
        created_at: user.created_at.to_rfc3339(),
    }))
}

/// Refresh token response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token: String,
}

/// Issue a fresh token to the caller.
async fn refresh(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<RefreshResponse>> {
    let token = state.auth_service.refresh(&user.id).await?;

    Ok(ApiResponse::ok(RefreshResponse { token }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/profile", get(profile))
        .route("/refresh", post(refresh))
}
