use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use chatkeep_api::auth::AppStateInner;
use chatkeep_api::password::CredentialHasher;
use chatkeep_api::routes::router;
use chatkeep_api::token::{TokenService, TokenSettings};
use chatkeep_db::Database;

fn app() -> Router {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let tokens = TokenService::new(&TokenSettings::new("integration-secret")).unwrap();
    let hasher = CredentialHasher::with_params(8, 1, 1).unwrap();
    router(AppStateInner::new(db, tokens, hasher))
}

async fn send(
    app: &Router,
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
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Registers a user and returns (token, user_id).
async fn register(app: &Router, email: &str, username: &str) -> (String, String) {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({
            "email": email,
            "username": username,
            "password": "secret1",
            "first_name": "Test",
            "last_name": "User",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["user_id"].as_str().unwrap().to_string(),
    )
}

async fn create_conversation(app: &Router, token: &str, title: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/conversations",
        Some(token),
        Some(json!({ "title": title, "model_used": "gpt-4" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["conversation_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_outside_api_prefix() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "message": "Service is running" }));
}

#[tokio::test]
async fn register_then_login() {
    let app = app();
    let (_, user_id) = register(&app, "a@b.com", "ann").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "a@b.com", "password": "secret1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["user_id"], user_id.as_str());
    assert_eq!(body["user"]["username"], "ann");
    assert!(body["user"].get("password_hash").is_none());
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app();
    register(&app, "a@b.com", "ann").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({
            "email": "a@b.com",
            "username": "someone",
            "password": "secret1",
            "first_name": "A",
            "last_name": "B",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "email already exists");
}

#[tokio::test]
async fn wrong_password_and_unknown_email_are_indistinguishable() {
    let app = app();
    register(&app, "a@b.com", "ann").await;

    let (s1, b1) = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "a@b.com", "password": "wrong-password" })),
    )
    .await;
    let (s2, b2) = send(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "nobody@b.com", "password": "secret1" })),
    )
    .await;

    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!(s2, StatusCode::UNAUTHORIZED);
    assert_eq!(b1, json!({ "error": "invalid credentials" }));
    assert_eq!(b1, b2);
}

#[tokio::test]
async fn short_password_is_rejected() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({
            "email": "a@b.com",
            "username": "ann",
            "password": "123",
            "first_name": "A",
            "last_name": "B",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("password"));
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/conversations",
        None,
        Some(json!({ "title": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/conversations",
        Some("garbage.token.value"),
        Some(json!({ "title": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid token");
}

#[tokio::test]
async fn token_from_another_secret_is_rejected() {
    let app = app();
    let (_, user_id) = register(&app, "a@b.com", "ann").await;

    let foreign = TokenService::new(&TokenSettings::new("another-secret")).unwrap();
    let now = chrono::Utc::now();
    let user = chatkeep_types::models::User {
        id: user_id.parse().unwrap(),
        email: "a@b.com".into(),
        username: "ann".into(),
        first_name: "Test".into(),
        last_name: "User".into(),
        created_at: now,
        updated_at: now,
    };
    let token = foreign.issue(&user).unwrap();

    let uri = format!("/api/v1/users/{user_id}/conversations");
    let (status, _) = send(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn conversation_lifecycle() {
    let app = app();
    let (token, user_id) = register(&app, "a@b.com", "ann").await;
    let conversation_id = create_conversation(&app, &token, "First chat").await;

    let messages_uri = format!("/api/v1/conversations/{conversation_id}/messages");
    let (status, body) = send(
        &app,
        Method::POST,
        &messages_uri,
        Some(&token),
        Some(json!({ "sender": "user", "message": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Message added successfully");
    let first_id = body["message_id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        Method::POST,
        &messages_uri,
        Some(&token),
        Some(json!({
            "sender": "ai",
            "message": "hi there",
            "parent_message_id": first_id,
            "metadata": { "tokens": 3 },
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let history_uri = format!("/api/v1/conversations/{conversation_id}/history");
    let (status, body) = send(&app, Method::GET, &history_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["message"], "hello");
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "ai");
    assert_eq!(messages[1]["parent_message_id"], first_id.as_str());
    assert_eq!(messages[1]["metadata"], json!({ "tokens": 3 }));

    let list_uri = format!("/api/v1/users/{user_id}/conversations");
    let (status, body) = send(&app, Method::GET, &list_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let conversations = body["conversations"].as_array().unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0]["conversation_id"], conversation_id.as_str());
    assert_eq!(conversations[0]["is_pinned"], false);
}

#[tokio::test]
async fn new_message_moves_conversation_to_top() {
    let app = app();
    let (token, user_id) = register(&app, "a@b.com", "ann").await;
    let older = create_conversation(&app, &token, "older").await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let newer = create_conversation(&app, &token, "newer").await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let list_uri = format!("/api/v1/users/{user_id}/conversations");
    let (_, body) = send(&app, Method::GET, &list_uri, Some(&token), None).await;
    assert_eq!(body["conversations"][0]["conversation_id"], newer.as_str());

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/v1/conversations/{older}/messages"),
        Some(&token),
        Some(json!({ "sender": "user", "message": "bump" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app, Method::GET, &list_uri, Some(&token), None).await;
    assert_eq!(body["conversations"][0]["conversation_id"], older.as_str());
    assert_eq!(body["conversations"][1]["conversation_id"], newer.as_str());
}

#[tokio::test]
async fn invalid_sender_role_is_rejected() {
    let app = app();
    let (token, _) = register(&app, "a@b.com", "ann").await;
    let conversation_id = create_conversation(&app, &token, "chat").await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/v1/conversations/{conversation_id}/messages"),
        Some(&token),
        Some(json!({ "sender": "robot", "message": "beep" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("robot"));

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/conversations/{conversation_id}/history"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(body["messages"], json!([]));
}

#[tokio::test]
async fn message_to_missing_conversation_is_not_found() {
    let app = app();
    let (token, _) = register(&app, "a@b.com", "ann").await;
    let missing = uuid::Uuid::new_v4();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/v1/conversations/{missing}/messages"),
        Some(&token),
        Some(json!({ "sender": "user", "message": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Conversation not found");

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/v1/conversations/{missing}/history"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_uuid_path_is_a_validation_error() {
    let app = app();
    let (token, _) = register(&app, "a@b.com", "ann").await;
    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/conversations/not-a-uuid/history",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn only_owner_may_delete_conversation() {
    let app = app();
    let (ann_token, _) = register(&app, "a@b.com", "ann").await;
    let (bob_token, _) = register(&app, "b@b.com", "bob").await;
    let conversation_id = create_conversation(&app, &ann_token, "private").await;
    let uri = format!("/api/v1/conversations/{conversation_id}");

    let (status, body) = send(&app, Method::DELETE, &uri, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Access denied");

    let history_uri = format!("{uri}/history");
    let (status, _) = send(&app, Method::GET, &history_uri, Some(&ann_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::DELETE, &uri, Some(&ann_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Conversation deleted successfully");

    let (status, _) = send(&app, Method::GET, &history_uri, Some(&ann_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&ann_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pin_is_idempotent_and_owner_only() {
    let app = app();
    let (ann_token, _) = register(&app, "a@b.com", "ann").await;
    let (bob_token, _) = register(&app, "b@b.com", "bob").await;
    let conversation_id = create_conversation(&app, &ann_token, "chat").await;
    let uri = format!("/api/v1/conversations/{conversation_id}/pin");

    for _ in 0..2 {
        let (status, body) = send(
            &app,
            Method::PATCH,
            &uri,
            Some(&ann_token),
            Some(json!({ "is_pinned": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_pinned"], true);
        assert_eq!(body["message"], "Conversation pinned successfully");
        assert_eq!(body["conversation_id"], conversation_id.as_str());
    }

    let (status, body) = send(
        &app,
        Method::PATCH,
        &uri,
        Some(&ann_token),
        Some(json!({ "is_pinned": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Conversation unpinned successfully");

    let (status, _) = send(
        &app,
        Method::PATCH,
        &uri,
        Some(&bob_token),
        Some(json!({ "is_pinned": true })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::PATCH, &uri, Some(&ann_token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn listing_someone_elses_conversations_is_forbidden() {
    let app = app();
    let (ann_token, ann_id) = register(&app, "a@b.com", "ann").await;
    let (bob_token, _) = register(&app, "b@b.com", "bob").await;
    create_conversation(&app, &ann_token, "mine").await;

    let uri = format!("/api/v1/users/{ann_id}/conversations");
    let (status, body) = send(&app, Method::GET, &uri, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Access denied");
}

#[tokio::test]
async fn user_profile_endpoints() {
    let app = app();
    let (ann_token, ann_id) = register(&app, "a@b.com", "ann").await;
    let (bob_token, _) = register(&app, "b@b.com", "bob").await;
    let uri = format!("/api/v1/users/{ann_id}");

    let (status, body) = send(&app, Method::GET, &uri, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "a@b.com");

    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&bob_token),
        Some(json!({ "first_name": "Hacked" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&ann_token),
        Some(json!({ "first_name": "Annie" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["first_name"], "Annie");

    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        Some(&ann_token),
        Some(json!({ "username": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "username already exists");

    let (status, body) = send(&app, Method::DELETE, &uri, Some(&ann_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User deleted successfully");

    let (status, body) = send(&app, Method::GET, &uri, Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");
}
