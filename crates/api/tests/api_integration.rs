//! API integration tests.
//!
//! These tests drive the router against a migrated in-memory database.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::redundant_clone)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    middleware::from_fn_with_state,
};
use ballotbox_api::{AppState, auth_middleware, router as api_router};
use ballotbox_common::config::AuthConfig;
use ballotbox_core::{AuthService, BallotService, VoteQueryService, VoteService};
use ballotbox_db::{
    repositories::{UserRepository, UserVoteRepository, VoteOptionRepository, VoteRepository},
    test_utils::TestDatabase,
};
use serde_json::{Value, json};
use tower::ServiceExt;

struct TestApp {
    router: Router,
}

impl TestApp {
    async fn new() -> Self {
        let db = Arc::new(TestDatabase::in_memory().await.unwrap());
        let vote_repo = VoteRepository::new(Arc::clone(&db));
        let option_repo = VoteOptionRepository::new(Arc::clone(&db));
        let user_vote_repo = UserVoteRepository::new(Arc::clone(&db));

        let state = AppState {
            auth_service: AuthService::new(
                UserRepository::new(Arc::clone(&db)),
                &AuthConfig {
                    jwt_secret: "api-test-secret".to_string(),
                    token_ttl_secs: 3600,
                },
            ),
            vote_service: VoteService::new(
                vote_repo.clone(),
                option_repo.clone(),
                user_vote_repo.clone(),
            ),
            ballot_service: BallotService::new(
                vote_repo.clone(),
                option_repo.clone(),
                user_vote_repo.clone(),
            ),
            vote_query_service: VoteQueryService::new(vote_repo, option_repo, user_vote_repo),
        };

        let router = Router::new().nest(
            "/api",
            api_router()
                .layer(from_fn_with_state(state.clone(), auth_middleware))
                .with_state(state),
        );

        Self { router }
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    /// Register and log in, returning the bearer token.
    async fn sign_up(&self, username: &str) -> String {
        let credentials = json!({ "username": username, "password": "password123" });

        let (status, _) = self
            .request(Method::POST, "/api/auth/register", None, Some(credentials.clone()))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = self
            .request(Method::POST, "/api/auth/login", None, Some(credentials))
            .await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["token"].as_str().unwrap().to_string()
    }

    async fn create_vote(&self, token: &str, body: Value) -> String {
        let (status, body) = self
            .request(Method::POST, "/api/vote/create", Some(token), Some(body))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["voteId"].as_str().unwrap().to_string()
    }

    async fn show(&self, token: &str, vote_id: &str) -> Value {
        let (status, body) = self
            .request(Method::GET, &format!("/api/vote/{vote_id}"), Some(token), None)
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"].clone()
    }
}

fn option_ids(detail: &Value) -> Vec<String> {
    detail["options"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_str().unwrap().to_string())
        .collect()
}

fn counts(detail: &Value) -> Vec<i64> {
    detail["options"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["count"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_register_login_and_profile() {
    let app = TestApp::new().await;
    let token = app.sign_up("alice").await;

    let (status, body) = app
        .request(Method::GET, "/api/auth/profile", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "alice");
    assert!(body["data"]["createdAt"].is_string());

    let (status, body) = app
        .request(Method::POST, "/api/auth/refresh", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["token"].is_string());
}

#[tokio::test]
async fn test_duplicate_registration_is_conflict() {
    let app = TestApp::new().await;
    app.sign_up("alice").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "username": "Alice", "password": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let app = TestApp::new().await;
    app.sign_up("alice").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_ERROR");
}

#[tokio::test]
async fn test_vote_routes_require_auth() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/api/vote/all", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = app
        .request(Method::GET, "/api/vote/all", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_lunch_scenario() {
    let app = TestApp::new().await;
    let token = app.sign_up("alice").await;
    let vote_id = app
        .create_vote(
            &token,
            json!({ "title": "Lunch", "options": ["Pizza", "Sushi"], "multi": false }),
        )
        .await;

    let detail = app.show(&token, &vote_id).await;
    assert_eq!(detail["hasVoted"], false);
    assert_eq!(detail["vote"]["title"], "Lunch");
    let ids = option_ids(&detail);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/vote/submit",
            Some(&token),
            Some(json!({ "voteId": vote_id, "optionIds": [ids[0]] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ok"], true);

    let detail = app.show(&token, &vote_id).await;
    assert_eq!(detail["hasVoted"], true);
    assert_eq!(detail["votedOptionIds"], json!([ids[0]]));
    assert_eq!(counts(&detail), [1, 0]);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/vote/submit",
            Some(&token),
            Some(json!({ "voteId": vote_id, "optionIds": [ids[1]] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let detail = app.show(&token, &vote_id).await;
    assert_eq!(counts(&detail), [0, 1]);
    assert_eq!(detail["votedOptionIds"], json!([ids[1]]));
}

#[tokio::test]
async fn test_multi_select_already_voted() {
    let app = TestApp::new().await;
    let token = app.sign_up("bob").await;
    let vote_id = app
        .create_vote(
            &token,
            json!({ "title": "Toppings", "options": ["Cheese", "Ham", "Olives"], "multi": true }),
        )
        .await;
    let ids = option_ids(&app.show(&token, &vote_id).await);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/vote/submit",
            Some(&token),
            Some(json!({ "voteId": vote_id, "optionIds": [ids[0], ids[1]] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/vote/submit",
            Some(&token),
            Some(json!({ "voteId": vote_id, "optionIds": [ids[0]] })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_VOTED");

    assert_eq!(counts(&app.show(&token, &vote_id).await), [1, 1, 0]);
}

#[tokio::test]
async fn test_submission_errors_map_to_codes() {
    let app = TestApp::new().await;
    let token = app.sign_up("alice").await;
    let open = app
        .create_vote(&token, json!({ "title": "Open", "options": ["a", "b"] }))
        .await;
    let closed = app
        .create_vote(
            &token,
            json!({ "title": "Closed", "options": ["a", "b"], "deadline": 1 }),
        )
        .await;
    let closed_ids = option_ids(&app.show(&token, &closed).await);

    let cases = [
        (json!({ "voteId": "missing", "optionIds": ["x"] }), StatusCode::NOT_FOUND, "NOT_FOUND"),
        (json!({ "voteId": closed, "optionIds": [closed_ids[0]] }), StatusCode::GONE, "EXPIRED"),
        (
            json!({ "voteId": open, "optionIds": [closed_ids[0]] }),
            StatusCode::BAD_REQUEST,
            "INVALID_OPTION",
        ),
        (json!({ "voteId": open, "optionIds": [] }), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
    ];

    for (request, status, code) in cases {
        let (actual, body) = app
            .request(Method::POST, "/api/vote/submit", Some(&token), Some(request))
            .await;
        assert_eq!(actual, status, "{body}");
        assert_eq!(body["error"]["code"], code);
    }

    assert_eq!(counts(&app.show(&token, &open).await), [0, 0]);
}

#[tokio::test]
async fn test_malformed_bodies_are_validation_errors() {
    let app = TestApp::new().await;
    let token = app.sign_up("alice").await;

    let cases = [
        ("/api/vote/create", json!({ "title": "Lunch" })),
        ("/api/vote/submit", json!({ "voteId": "v1", "optionIds": "notalist" })),
    ];
    for (uri, request) in cases {
        let (status, body) = app
            .request(Method::POST, uri, Some(&token), Some(request))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR", "{uri}");
        assert_eq!(body["error"]["retryable"], false, "{uri}");
    }

    let (status, body) = app
        .request(Method::POST, "/api/auth/login", None, Some(json!({ "username": 7 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_update_and_delete_are_creator_only() {
    let app = TestApp::new().await;
    let alice = app.sign_up("alice").await;
    let bob = app.sign_up("bob").await;
    let vote_id = app
        .create_vote(&alice, json!({ "title": "Lunch", "options": ["Pizza", "Sushi"] }))
        .await;
    let replacement = json!({
        "id": vote_id,
        "title": "Dinner",
        "options": ["Ramen", "Curry"],
        "multi": true,
        "deadline": 0
    });

    let (status, body) = app
        .request(Method::PUT, "/api/vote/update", Some(&bob), Some(replacement.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
    assert_eq!(app.show(&alice, &vote_id).await["vote"]["title"], "Lunch");

    let (status, body) = app
        .request(Method::PUT, "/api/vote/update", Some(&alice), Some(replacement))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["resultsReset"], true);
    let detail = app.show(&alice, &vote_id).await;
    assert_eq!(detail["vote"]["title"], "Dinner");
    assert_eq!(detail["vote"]["multi"], true);

    let uri = format!("/api/vote/{vote_id}");
    let (status, _) = app.request(Method::DELETE, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.request(Method::DELETE, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ok"], true);

    let (status, _) = app.request(Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_listings() {
    let app = TestApp::new().await;
    let alice = app.sign_up("alice").await;
    let bob = app.sign_up("bob").await;
    app.create_vote(&alice, json!({ "title": "Mine", "options": ["a", "b"] }))
        .await;
    app.create_vote(&bob, json!({ "title": "Theirs", "options": ["c", "d", "e"] }))
        .await;

    let (status, body) = app
        .request(Method::GET, "/api/vote/my", Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let mine = body["data"].as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["title"], "Mine");
    assert_eq!(mine[0]["options"].as_array().unwrap().len(), 2);

    let (status, body) = app
        .request(Method::GET, "/api/vote/all", Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_endpoint_returns_404() {
    let app = TestApp::new().await;

    let (status, _) = app
        .request(Method::GET, "/api/nonexistent/endpoint", None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
