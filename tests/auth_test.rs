//! Integration tests for account registration, login, and session introspection.

use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Helper: start the server on a random port and return its base URL.
async fn start_test_server() -> String {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = boardsync_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = boardsync_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state = boardsync_server::state::AppState {
        db,
        jwt_secret,
        rooms: Arc::new(boardsync_server::ws::rooms::RoomRegistry::new()),
        cors_origin: "http://localhost:3000".to_string(),
    };

    let app = boardsync_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_register_and_me() {
    let base_url = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "hunter22"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    let token = body["token"].as_str().unwrap();
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert!(body["user"].get("password").is_none());

    let resp = client
        .get(format!("{}/api/auth/me", base_url))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let me: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(me["username"], "alice");
    assert_eq!(me["id"], body["user"]["id"]);
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_missing_fields() {
    let base_url = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({
            "username": "bob",
            "email": "bob@example.com",
            "password": "secret"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // Same email, different username
    let resp = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({
            "username": "bob2",
            "email": "bob@example.com",
            "password": "secret"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Empty password
    let resp = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({
            "username": "carol",
            "email": "carol@example.com",
            "password": ""
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_login_roundtrip_and_wrong_password() {
    let base_url = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({
            "username": "dave",
            "email": "dave@example.com",
            "password": "correct-horse"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client
        .post(format!("{}/api/auth/login", base_url))
        .json(&json!({
            "email": "dave@example.com",
            "password": "correct-horse"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["token"].as_str().is_some());
    assert_eq!(body["user"]["username"], "dave");

    // Wrong password and unknown email return the same 401
    let resp = client
        .post(format!("{}/api/auth/login", base_url))
        .json(&json!({
            "email": "dave@example.com",
            "password": "wrong"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .post(format!("{}/api/auth/login", base_url))
        .json(&json!({
            "email": "nobody@example.com",
            "password": "correct-horse"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_me_requires_token() {
    let base_url = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/api/auth/me", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .get(format!("{}/api/auth/me", base_url))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}
