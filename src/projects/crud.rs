use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt::issue_room_grant;
use crate::auth::middleware::Claims;
use crate::db::models::{
    is_project_member, load_project, load_user, project_tasks, ProjectModel, TaskModel,
};
use crate::projects::broadcast::{broadcast_member_added, broadcast_project_updated};
use crate::state::AppState;

// --- Request/response types ---

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub email: String,
}

/// Full project detail: the project, its tasks, and the room grant that
/// authorizes joining the project's realtime room. Fetching the project
/// is what proves the caller may join.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetailResponse {
    #[serde(flatten)]
    pub project: ProjectModel,
    pub tasks: Vec<TaskModel>,
    pub realtime_grant: String,
}

/// Fields a PATCH may touch. Anything else is rejected.
const ALLOWED_PROJECT_UPDATES: &[&str] = &["name", "description"];

// --- Handlers ---

/// POST /api/projects — Create a project. The creator becomes owner and
/// first member.
pub async fn create_project(
    State(state): State<AppState>,
    claims: Claims,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectModel>), (StatusCode, String)> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Project name cannot be empty".to_string(),
        ));
    }

    let db = state.db.clone();
    let owner_id = claims.sub.clone();
    let description = req.description.clone();

    let project = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let project_id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO projects (id, name, description, owner_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![project_id, name, description, owner_id, now],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert project: {}", e)))?;

        conn.execute(
            "INSERT INTO project_members (project_id, user_id, added_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![project_id, owner_id, now],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert member: {}", e)))?;

        load_project(&conn, &project_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load project: {}", e)))?
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Project vanished".to_string()))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    tracing::info!("Project {} created by {}", project.id, claims.sub);

    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/projects — List projects the caller is a member of.
pub async fn list_projects(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<ProjectModel>>, (StatusCode, String)> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let projects = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT p.id FROM projects p
                 JOIN project_members pm ON pm.project_id = p.id
                 WHERE pm.user_id = ?1
                 ORDER BY p.created_at DESC",
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Prepare: {}", e)))?;

        let ids: Vec<String> = stmt
            .query_map([&user_id], |row| row.get(0))
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        let mut projects = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(project) = load_project(&conn, &id)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load: {}", e)))?
            {
                projects.push(project);
            }
        }

        Ok::<_, (StatusCode, String)>(projects)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(Json(projects))
}

/// GET /api/projects/{id} — Full project with tasks, plus the realtime
/// room grant. Non-members get 404, not 403: invisible projects do not
/// exist as far as the caller can tell.
pub async fn get_project(
    State(state): State<AppState>,
    claims: Claims,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectDetailResponse>, (StatusCode, String)> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();
    let pid = project_id.clone();

    let (project, tasks) = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let member = is_project_member(&conn, &pid, &user_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Member check: {}", e)))?;
        if !member {
            return Err((StatusCode::NOT_FOUND, "Project not found".to_string()));
        }

        let project = load_project(&conn, &pid)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load project: {}", e)))?
            .ok_or((StatusCode::NOT_FOUND, "Project not found".to_string()))?;

        let tasks = project_tasks(&conn, &pid, None)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load tasks: {}", e)))?;

        Ok::<_, (StatusCode, String)>((project, tasks))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    let realtime_grant = issue_room_grant(&state.jwt_secret, &claims.sub, &project_id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Grant: {}", e)))?;

    Ok(Json(ProjectDetailResponse {
        project,
        tasks,
        realtime_grant,
    }))
}

/// PATCH /api/projects/{id} — Owner only; name/description only.
/// Broadcasts `project-updated` after the write commits.
pub async fn update_project(
    State(state): State<AppState>,
    claims: Claims,
    Path(project_id): Path<String>,
    Json(updates): Json<serde_json::Value>,
) -> Result<Json<ProjectModel>, (StatusCode, String)> {
    let fields = updates
        .as_object()
        .ok_or((StatusCode::BAD_REQUEST, "Invalid updates".to_string()))?;

    if fields.is_empty()
        || fields
            .keys()
            .any(|k| !ALLOWED_PROJECT_UPDATES.contains(&k.as_str()))
    {
        return Err((StatusCode::BAD_REQUEST, "Invalid updates".to_string()));
    }

    let db = state.db.clone();
    let user_id = claims.sub.clone();
    let pid = project_id.clone();
    let name = fields.get("name").and_then(|v| v.as_str()).map(String::from);
    let description = fields
        .get("description")
        .and_then(|v| v.as_str())
        .map(String::from);

    let project = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let owner: Option<String> = conn
            .query_row(
                "SELECT owner_id FROM projects WHERE id = ?1",
                [&pid],
                |row| row.get(0),
            )
            .ok();

        // Hide both unknown projects and foreign ones behind the same 404
        match owner {
            Some(owner_id) if owner_id == user_id => {}
            _ => return Err((StatusCode::NOT_FOUND, "Project not found".to_string())),
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE projects SET
                name = COALESCE(?1, name),
                description = COALESCE(?2, description),
                updated_at = ?3
             WHERE id = ?4",
            rusqlite::params![name, description, now, pid],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update: {}", e)))?;

        load_project(&conn, &pid)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load project: {}", e)))?
            .ok_or((StatusCode::NOT_FOUND, "Project not found".to_string()))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    broadcast_project_updated(&state.rooms, project.clone());

    Ok(Json(project))
}

/// DELETE /api/projects/{id} — Owner only. Tasks and memberships cascade.
pub async fn delete_project(
    State(state): State<AppState>,
    claims: Claims,
    Path(project_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let owner: Option<String> = conn
            .query_row(
                "SELECT owner_id FROM projects WHERE id = ?1",
                [&project_id],
                |row| row.get(0),
            )
            .ok();

        match owner {
            Some(owner_id) if owner_id == user_id => {}
            _ => return Err((StatusCode::NOT_FOUND, "Project not found".to_string())),
        }

        conn.execute("DELETE FROM projects WHERE id = ?1", [&project_id])
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete: {}", e)))?;

        Ok::<_, (StatusCode, String)>(())
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/projects/{id}/members — Owner only; add a user by email.
/// Broadcasts `member-added` after the write commits.
pub async fn add_member(
    State(state): State<AppState>,
    claims: Claims,
    Path(project_id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<ProjectModel>), (StatusCode, String)> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();
    let pid = project_id.clone();
    let email = req.email.trim().to_lowercase();

    let (project, added) = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let owner: Option<String> = conn
            .query_row(
                "SELECT owner_id FROM projects WHERE id = ?1",
                [&pid],
                |row| row.get(0),
            )
            .ok();

        match owner {
            Some(owner_id) if owner_id == user_id => {}
            _ => return Err((StatusCode::NOT_FOUND, "Project not found".to_string())),
        }

        let added: Option<(String, String, String)> = conn
            .query_row(
                "SELECT id, username, email FROM users WHERE email = ?1",
                [&email],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .ok();
        let (added_id, _, _) = added
            .clone()
            .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

        let already = is_project_member(&conn, &pid, &added_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Member check: {}", e)))?;
        if already {
            return Err((
                StatusCode::BAD_REQUEST,
                "User is already a member".to_string(),
            ));
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO project_members (project_id, user_id, added_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![pid, added_id, now],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert member: {}", e)))?;

        let project = load_project(&conn, &pid)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load project: {}", e)))?
            .ok_or((StatusCode::NOT_FOUND, "Project not found".to_string()))?;

        let user = load_user(&conn, &added_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load user: {}", e)))?
            .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

        Ok::<_, (StatusCode, String)>((project, user))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    broadcast_member_added(&state.rooms, &project_id, added);

    Ok((StatusCode::CREATED, Json(project)))
}
