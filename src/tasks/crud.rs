use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::db::models::{is_project_member, load_task, project_tasks, TaskModel};
use crate::state::AppState;
use crate::tasks::broadcast::{
    broadcast_task_created, broadcast_task_deleted, broadcast_task_updated,
};

// --- Request types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub due_date: Option<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
    pub project_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<String>,
}

const TASK_STATUSES: &[&str] = &["todo", "in-progress", "done"];

/// Fields a PATCH may touch. Anything else is rejected.
const ALLOWED_TASK_UPDATES: &[&str] = &["title", "description", "status", "dueDate", "assignees"];

fn valid_status(status: &str) -> bool {
    TASK_STATUSES.contains(&status)
}

fn replace_assignees(
    conn: &rusqlite::Connection,
    task_id: &str,
    assignees: &[String],
) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM task_assignees WHERE task_id = ?1", [task_id])?;
    for user_id in assignees {
        // Unknown assignee ids are skipped rather than failing the write
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE id = ?1",
            [user_id],
            |row| row.get::<_, i64>(0).map(|c| c > 0),
        )?;
        if exists {
            conn.execute(
                "INSERT OR IGNORE INTO task_assignees (task_id, user_id) VALUES (?1, ?2)",
                rusqlite::params![task_id, user_id],
            )?;
        }
    }
    Ok(())
}

// --- Handlers ---

/// POST /api/tasks — Create a task in a project the caller belongs to.
/// Broadcasts `task-created` after the write commits.
pub async fn create_task(
    State(state): State<AppState>,
    claims: Claims,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskModel>), (StatusCode, String)> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Task title cannot be empty".to_string(),
        ));
    }

    let db = state.db.clone();
    let user_id = claims.sub.clone();
    let project_id = req.project_id.clone();
    let description = req.description.clone();
    let due_date = req.due_date.clone();
    let assignees = req.assignees.clone();

    let task = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let member = is_project_member(&conn, &project_id, &user_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Member check: {}", e)))?;
        if !member {
            return Err((StatusCode::NOT_FOUND, "Project not found".to_string()));
        }

        let task_id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO tasks (id, project_id, title, description, status, due_date, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'todo', ?5, ?6, ?7, ?7)",
            rusqlite::params![task_id, project_id, title, description, due_date, user_id, now],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert task: {}", e)))?;

        replace_assignees(&conn, &task_id, &assignees)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Assignees: {}", e)))?;

        load_task(&conn, &task_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load task: {}", e)))?
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Task vanished".to_string()))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    broadcast_task_created(&state.rooms, task.clone());

    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /api/tasks/project/{project_id}?status= — Tasks in a project,
/// newest first, optionally filtered by status. Member only.
pub async fn list_project_tasks(
    State(state): State<AppState>,
    claims: Claims,
    Path(project_id): Path<String>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<TaskModel>>, (StatusCode, String)> {
    if let Some(status) = &query.status {
        if !valid_status(status) {
            return Err((StatusCode::BAD_REQUEST, "Invalid status".to_string()));
        }
    }

    let db = state.db.clone();
    let user_id = claims.sub.clone();
    let status = query.status.clone();

    let tasks = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let member = is_project_member(&conn, &project_id, &user_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Member check: {}", e)))?;
        if !member {
            return Err((StatusCode::NOT_FOUND, "Project not found".to_string()));
        }

        project_tasks(&conn, &project_id, status.as_deref())
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load tasks: {}", e)))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(Json(tasks))
}

/// PATCH /api/tasks/{id} — Member of the task's project only; allowed
/// fields title/description/status/dueDate/assignees. Broadcasts
/// `task-updated` after the write commits.
pub async fn update_task(
    State(state): State<AppState>,
    claims: Claims,
    Path(task_id): Path<String>,
    Json(updates): Json<serde_json::Value>,
) -> Result<Json<TaskModel>, (StatusCode, String)> {
    let fields = updates
        .as_object()
        .ok_or((StatusCode::BAD_REQUEST, "Invalid updates".to_string()))?;

    if fields.is_empty()
        || fields
            .keys()
            .any(|k| !ALLOWED_TASK_UPDATES.contains(&k.as_str()))
    {
        return Err((StatusCode::BAD_REQUEST, "Invalid updates".to_string()));
    }

    let status = fields.get("status").and_then(|v| v.as_str()).map(String::from);
    if let Some(status) = &status {
        if !valid_status(status) {
            return Err((StatusCode::BAD_REQUEST, "Invalid status".to_string()));
        }
    }

    let title = fields.get("title").and_then(|v| v.as_str()).map(String::from);
    let description = fields
        .get("description")
        .and_then(|v| v.as_str())
        .map(String::from);
    // dueDate may be set to a string or cleared with null
    let due_date = fields.get("dueDate").map(|v| {
        v.as_str().map(String::from)
    });
    let assignees: Option<Vec<String>> = fields.get("assignees").map(|v| {
        v.as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    });

    let db = state.db.clone();
    let user_id = claims.sub.clone();
    let tid = task_id.clone();

    let task = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let project_id: Option<String> = conn
            .query_row(
                "SELECT project_id FROM tasks WHERE id = ?1",
                [&tid],
                |row| row.get(0),
            )
            .ok();
        let project_id = project_id.ok_or((StatusCode::NOT_FOUND, "Task not found".to_string()))?;

        let member = is_project_member(&conn, &project_id, &user_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Member check: {}", e)))?;
        if !member {
            return Err((StatusCode::NOT_FOUND, "Task not found".to_string()));
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE tasks SET
                title = COALESCE(?1, title),
                description = COALESCE(?2, description),
                status = COALESCE(?3, status),
                updated_at = ?4
             WHERE id = ?5",
            rusqlite::params![title, description, status, now, tid],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update: {}", e)))?;

        if let Some(due_date) = due_date {
            conn.execute(
                "UPDATE tasks SET due_date = ?1 WHERE id = ?2",
                rusqlite::params![due_date, tid],
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update: {}", e)))?;
        }

        if let Some(assignees) = assignees {
            replace_assignees(&conn, &tid, &assignees)
                .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Assignees: {}", e)))?;
        }

        load_task(&conn, &tid)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load task: {}", e)))?
            .ok_or((StatusCode::NOT_FOUND, "Task not found".to_string()))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    broadcast_task_updated(&state.rooms, task.clone());

    Ok(Json(task))
}

/// DELETE /api/tasks/{id} — Member of the task's project only.
/// Broadcasts `task-deleted` (id only) after the write commits.
pub async fn delete_task(
    State(state): State<AppState>,
    claims: Claims,
    Path(task_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();
    let tid = task_id.clone();

    let project_id = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let project_id: Option<String> = conn
            .query_row(
                "SELECT project_id FROM tasks WHERE id = ?1",
                [&tid],
                |row| row.get(0),
            )
            .ok();
        let project_id = project_id.ok_or((StatusCode::NOT_FOUND, "Task not found".to_string()))?;

        let member = is_project_member(&conn, &project_id, &user_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Member check: {}", e)))?;
        if !member {
            return Err((StatusCode::NOT_FOUND, "Task not found".to_string()));
        }

        conn.execute("DELETE FROM tasks WHERE id = ?1", [&tid])
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete: {}", e)))?;

        Ok::<_, (StatusCode, String)>(project_id)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    broadcast_task_deleted(&state.rooms, &project_id, &task_id);

    Ok(StatusCode::NO_CONTENT)
}
