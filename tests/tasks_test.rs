//! Integration tests for task CRUD, status filters, and membership checks.

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

/// Register a user and return (token, user_id).
async fn register_user(base_url: &str, username: &str) -> (String, String) {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "test-password"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201, "Registration failed for {}", username);
    let body: serde_json::Value = resp.json().await.unwrap();
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_str().unwrap().to_string(),
    )
}

/// Create a project and return its id.
async fn create_project(base_url: &str, token: &str, name: &str) -> String {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/projects", base_url))
        .bearer_auth(token)
        .json(&json!({ "name": name }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_task_crud_cycle_with_status_filter() {
    let base_url = start_test_server().await;
    let client = reqwest::Client::new();
    let (token, user_id) = register_user(&base_url, "alice").await;
    let project_id = create_project(&base_url, &token, "Board").await;

    // Create with assignee and due date
    let resp = client
        .post(format!("{}/api/tasks", base_url))
        .bearer_auth(&token)
        .json(&json!({
            "title": "Write docs",
            "description": "user guide",
            "dueDate": "2025-07-01T00:00:00Z",
            "assignees": [user_id],
            "projectId": project_id
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let task: serde_json::Value = resp.json().await.unwrap();
    let task_id = task["id"].as_str().unwrap().to_string();
    assert_eq!(task["status"], "todo");
    assert_eq!(task["project"], project_id.as_str());
    assert_eq!(task["createdBy"]["id"], user_id.as_str());
    assert_eq!(task["assignees"][0]["id"], user_id.as_str());
    assert_eq!(task["dueDate"], "2025-07-01T00:00:00Z");

    // Move it along
    let resp = client
        .patch(format!("{}/api/tasks/{}", base_url, task_id))
        .bearer_auth(&token)
        .json(&json!({ "status": "in-progress" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let task: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(task["status"], "in-progress");

    // Status filter matches
    let resp = client
        .get(format!(
            "{}/api/tasks/project/{}?status=in-progress",
            base_url, project_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let tasks: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(tasks.as_array().unwrap().len(), 1);

    let resp = client
        .get(format!(
            "{}/api/tasks/project/{}?status=done",
            base_url, project_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let tasks: serde_json::Value = resp.json().await.unwrap();
    assert!(tasks.as_array().unwrap().is_empty());

    // Delete
    let resp = client
        .delete(format!("{}/api/tasks/{}", base_url, task_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .get(format!("{}/api/tasks/project/{}", base_url, project_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let tasks: serde_json::Value = resp.json().await.unwrap();
    assert!(tasks.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_task_update_field_validation() {
    let base_url = start_test_server().await;
    let client = reqwest::Client::new();
    let (token, _) = register_user(&base_url, "bob").await;
    let project_id = create_project(&base_url, &token, "Board").await;

    let resp = client
        .post(format!("{}/api/tasks", base_url))
        .bearer_auth(&token)
        .json(&json!({ "title": "Task", "projectId": project_id }))
        .send()
        .await
        .unwrap();
    let task: serde_json::Value = resp.json().await.unwrap();
    let task_id = task["id"].as_str().unwrap();

    // Unknown fields rejected
    let resp = client
        .patch(format!("{}/api/tasks/{}", base_url, task_id))
        .bearer_auth(&token)
        .json(&json!({ "title": "X", "createdBy": "someone-else" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Invalid status rejected
    let resp = client
        .patch(format!("{}/api/tasks/{}", base_url, task_id))
        .bearer_auth(&token)
        .json(&json!({ "status": "archived" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Allowed fields pass
    let resp = client
        .patch(format!("{}/api/tasks/{}", base_url, task_id))
        .bearer_auth(&token)
        .json(&json!({ "title": "Renamed", "description": "new", "dueDate": "2025-08-01T00:00:00Z" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let task: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(task["title"], "Renamed");
    assert_eq!(task["dueDate"], "2025-08-01T00:00:00Z");
}

#[tokio::test]
async fn test_tasks_invisible_to_non_members() {
    let base_url = start_test_server().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = register_user(&base_url, "carol").await;
    let (outsider_token, _) = register_user(&base_url, "dave").await;
    let project_id = create_project(&base_url, &owner_token, "Private").await;

    let resp = client
        .post(format!("{}/api/tasks", base_url))
        .bearer_auth(&owner_token)
        .json(&json!({ "title": "Secret task", "projectId": project_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let task: serde_json::Value = resp.json().await.unwrap();
    let task_id = task["id"].as_str().unwrap();

    // Creating a task in someone else's project is a 404
    let resp = client
        .post(format!("{}/api/tasks", base_url))
        .bearer_auth(&outsider_token)
        .json(&json!({ "title": "Sneaky", "projectId": project_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // So are listing, updating, and deleting
    let resp = client
        .get(format!("{}/api/tasks/project/{}", base_url, project_id))
        .bearer_auth(&outsider_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .patch(format!("{}/api/tasks/{}", base_url, task_id))
        .bearer_auth(&outsider_token)
        .json(&json!({ "title": "Defaced" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .delete(format!("{}/api/tasks/{}", base_url, task_id))
        .bearer_auth(&outsider_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
