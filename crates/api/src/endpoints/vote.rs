//! Vote endpoints.

use axum::{
    Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use ballotbox_common::AppResult;
use ballotbox_core::{VoteInput, VoteWithOptions};
use ballotbox_db::entities::{vote, vote_option};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    extractors::{AuthUser, JsonBody},
    middleware::AppState,
    response::{ApiResponse, OkResponse},
};

/// Vote response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub id: String,
    pub title: String,
    pub multi: bool,
    pub deadline: i64,
    pub creator_id: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl From<vote::Model> for VoteResponse {
    fn from(vote: vote::Model) -> Self {
        Self {
            id: vote.id,
            title: vote.title,
            multi: vote.multi,
            deadline: vote.deadline,
            creator_id: vote.creator_id,
            created_at: vote.created_at.to_rfc3339(),
            updated_at: vote.updated_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Vote option response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionResponse {
    pub id: String,
    pub content: String,
    pub position: i32,
    pub count: i32,
}

impl From<vote_option::Model> for OptionResponse {
    fn from(option: vote_option::Model) -> Self {
        Self {
            id: option.id,
            content: option.content,
            position: option.position,
            count: option.count,
        }
    }
}

/// Vote with its options, as listed.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSummaryResponse {
    #[serde(flatten)]
    pub vote: VoteResponse,
    pub options: Vec<OptionResponse>,
}

impl From<VoteWithOptions> for VoteSummaryResponse {
    fn from(item: VoteWithOptions) -> Self {
        Self {
            vote: item.vote.into(),
            options: item.options.into_iter().map(Into::into).collect(),
        }
    }
}

/// Create vote request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVoteRequest {
    pub title: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub multi: bool,
    #[serde(default)]
    pub deadline: i64,
}

/// Create vote response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVoteResponse {
    pub vote_id: String,
}

/// Create a vote.
async fn create(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateVoteRequest>,
) -> AppResult<ApiResponse<CreateVoteResponse>> {
    let created = state
        .vote_service
        .create(
            &user.id,
            VoteInput {
                title: req.title,
                options: req.options,
                multi: req.multi,
                deadline: req.deadline,
            },
        )
        .await?;

    Ok(ApiResponse::ok(CreateVoteResponse {
        vote_id: created.vote.id,
    }))
}

/// Vote detail response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteDetailResponse {
    pub vote: VoteResponse,
    pub options: Vec<OptionResponse>,
    pub has_voted: bool,
    pub voted_option_ids: Vec<String>,
    pub is_expired: bool,
}

/// Get a vote with the caller's selection.
async fn show(
    user: AuthUser,
    State(state): State<AppState>,
    Path(vote_id): Path<String>,
) -> AppResult<ApiResponse<VoteDetailResponse>> {
    let status = state.vote_query_service.get(&vote_id, &user.id).await?;

    Ok(ApiResponse::ok(VoteDetailResponse {
        vote: status.vote.into(),
        options: status.options.into_iter().map(Into::into).collect(),
        has_voted: status.has_voted,
        voted_option_ids: status.voted_option_ids,
        is_expired: status.is_expired,
    }))
}

/// Update vote request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVoteRequest {
    pub id: String,
    pub title: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub multi: bool,
    #[serde(default)]
    pub deadline: i64,
}

/// Update vote response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVoteResponse {
    pub ok: bool,
    /// Always true: replacing the options discards every ballot.
    pub results_reset: bool,
}

/// Replace a vote's title, settings and options.
async fn update(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<UpdateVoteRequest>,
) -> AppResult<ApiResponse<UpdateVoteResponse>> {
    state
        .vote_service
        .update(
            &req.id,
            &user.id,
            VoteInput {
                title: req.title,
                options: req.options,
                multi: req.multi,
                deadline: req.deadline,
            },
        )
        .await?;

    Ok(ApiResponse::ok(UpdateVoteResponse {
        ok: true,
        results_reset: true,
    }))
}

/// Delete a vote.
async fn remove(
    user: AuthUser,
    State(state): State<AppState>,
    Path(vote_id): Path<String>,
) -> AppResult<ApiResponse<OkResponse>> {
    state.vote_service.delete(&vote_id, &user.id).await?;

    Ok(ApiResponse::ok(OkResponse::new()))
}

/// Submit ballot request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[validate(length(min = 1, max = 32))]
    pub vote_id: String,
    pub option_ids: Vec<String>,
}

/// Submit a ballot.
async fn submit(
    user: AuthUser,
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SubmitRequest>,
) -> AppResult<ApiResponse<OkResponse>> {
    req.validate()?;

    state
        .ballot_service
        .submit(&user.id, &req.vote_id, &req.option_ids)
        .await?;

    Ok(ApiResponse::ok(OkResponse::new()))
}

/// Votes created by the caller.
async fn my_votes(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<VoteSummaryResponse>>> {
    let votes = state.vote_query_service.list_by_creator(&user.id).await?;

    Ok(ApiResponse::ok(votes.into_iter().map(Into::into).collect()))
}

/// All votes.
async fn all_votes(
    _user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<VoteSummaryResponse>>> {
    let votes = state.vote_query_service.list_all().await?;

    Ok(ApiResponse::ok(votes.into_iter().map(Into::into).collect()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create))
        .route("/update", put(update))
        .route("/submit", post(submit))
        .route("/my", get(my_votes))
        .route("/all", get(all_votes))
        .route("/{id}", get(show).delete(remove))
}
