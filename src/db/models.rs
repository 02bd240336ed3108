//! Shared API model types and row loaders.
//! REST responses and room broadcast payloads serialize the same structs,
//! so they live here rather than in the handler modules.

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Public user identity (no credentials).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserModel {
    pub id: String,
    pub username: String,
    pub email: String,
}

/// Project with owner and members resolved to full identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectModel {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner: UserModel,
    pub members: Vec<UserModel>,
    pub created_at: String,
    pub updated_at: String,
}

/// Task with assignees and creator resolved to full identities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskModel {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    pub assignees: Vec<UserModel>,
    pub project: String,
    pub created_by: UserModel,
    pub created_at: String,
    pub updated_at: String,
}

/// Load a user's public identity. None if the id is unknown.
pub fn load_user(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<UserModel>> {
    conn.query_row(
        "SELECT id, username, email FROM users WHERE id = ?1",
        [user_id],
        |row| {
            Ok(UserModel {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
            })
        },
    )
    .optional()
}

/// Check project membership. The owner is always inserted as a member
/// at creation, so a single table lookup suffices.
pub fn is_project_member(
    conn: &Connection,
    project_id: &str,
    user_id: &str,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM project_members WHERE project_id = ?1 AND user_id = ?2",
        [project_id, user_id],
        |row| row.get::<_, i64>(0).map(|c| c > 0),
    )
}

fn task_assignees(conn: &Connection, task_id: &str) -> rusqlite::Result<Vec<UserModel>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, u.email FROM task_assignees ta
         JOIN users u ON u.id = ta.user_id
         WHERE ta.task_id = ?1
         ORDER BY u.username ASC",
    )?;
    let assignees = stmt
        .query_map([task_id], |row| {
            Ok(UserModel {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(assignees)
}

/// Load a task with assignees and creator resolved. None if unknown.
pub fn load_task(conn: &Connection, task_id: &str) -> rusqlite::Result<Option<TaskModel>> {
    let row = conn
        .query_row(
            "SELECT t.id, t.title, t.description, t.status, t.due_date, t.project_id,
                    t.created_at, t.updated_at, u.id, u.username, u.email
             FROM tasks t
             JOIN users u ON u.id = t.created_by
             WHERE t.id = ?1",
            [task_id],
            |row| {
                Ok(TaskModel {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    status: row.get(3)?,
                    due_date: row.get(4)?,
                    project: row.get(5)?,
                    created_at: row.get(6)?,
                    updated_at: row.get(7)?,
                    created_by: UserModel {
                        id: row.get(8)?,
                        username: row.get(9)?,
                        email: row.get(10)?,
                    },
                    assignees: Vec::new(),
                })
            },
        )
        .optional()?;

    match row {
        Some(mut task) => {
            task.assignees = task_assignees(conn, task_id)?;
            Ok(Some(task))
        }
        None => Ok(None),
    }
}

/// Load all tasks in a project, newest first, optionally filtered by status.
pub fn project_tasks(
    conn: &Connection,
    project_id: &str,
    status: Option<&str>,
) -> rusqlite::Result<Vec<TaskModel>> {
    let mut stmt = conn.prepare(
        "SELECT t.id FROM tasks t
         WHERE t.project_id = ?1 AND (?2 IS NULL OR t.status = ?2)
         ORDER BY t.created_at DESC",
    )?;
    let ids: Vec<String> = stmt
        .query_map(rusqlite::params![project_id, status], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();

    let mut tasks = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(task) = load_task(conn, &id)? {
            tasks.push(task);
        }
    }
    Ok(tasks)
}

/// Load a project with owner and members resolved. None if unknown.
pub fn load_project(conn: &Connection, project_id: &str) -> rusqlite::Result<Option<ProjectModel>> {
    let row = conn
        .query_row(
            "SELECT p.id, p.name, p.description, p.created_at, p.updated_at,
                    u.id, u.username, u.email
             FROM projects p
             JOIN users u ON u.id = p.owner_id
             WHERE p.id = ?1",
            [project_id],
            |row| {
                Ok(ProjectModel {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                    owner: UserModel {
                        id: row.get(5)?,
                        username: row.get(6)?,
                        email: row.get(7)?,
                    },
                    members: Vec::new(),
                })
            },
        )
        .optional()?;

    match row {
        Some(mut project) => {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.email FROM project_members pm
                 JOIN users u ON u.id = pm.user_id
                 WHERE pm.project_id = ?1
                 ORDER BY pm.added_at ASC",
            )?;
            project.members = stmt
                .query_map([project_id], |row| {
                    Ok(UserModel {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        email: row.get(2)?,
                    })
                })?
                .filter_map(|r| r.ok())
                .collect();
            Ok(Some(project))
        }
        None => Ok(None),
    }
}
