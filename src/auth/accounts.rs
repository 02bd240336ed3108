use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt::issue_access_token;
use crate::auth::middleware::Claims;
use crate::db::models::{load_user, UserModel};
use crate::state::AppState;

// --- Request/response types ---

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserModel,
    pub token: String,
}

// --- Handlers ---

/// POST /api/auth/register — Create an account and return a session token.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), (StatusCode, String)> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();

    if username.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Username, email and password are required".to_string(),
        ));
    }

    let db = state.db.clone();
    let password = req.password.clone();

    let user = tokio::task::spawn_blocking(move || {
        // bcrypt is deliberately slow; hash inside the blocking task
        let password_hash = bcrypt::hash(&password, bcrypt::DEFAULT_COST)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Hash: {}", e)))?;

        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;

        let taken: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE email = ?1 OR username = ?2",
                rusqlite::params![email, username],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .unwrap_or(false);

        if taken {
            return Err((
                StatusCode::BAD_REQUEST,
                "Email or username already registered".to_string(),
            ));
        }

        let user_id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![user_id, username, email, password_hash, now],
        )
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert user: {}", e)))?;

        Ok::<_, (StatusCode, String)>(UserModel {
            id: user_id,
            username,
            email,
        })
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    let token = issue_access_token(&state.jwt_secret, &user.id, &user.username)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Token: {}", e)))?;

    tracing::info!("Registered user {} ({})", user.username, user.id);

    Ok((StatusCode::CREATED, Json(SessionResponse { user, token })))
}

/// POST /api/auth/login — Verify credentials and return a session token.
/// Unknown email and wrong password both return the same 401.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, (StatusCode, String)> {
    let email = req.email.trim().to_lowercase();
    let db = state.db.clone();
    let password = req.password.clone();

    let user = tokio::task::spawn_blocking(move || {
        let row: Option<(String, String, String, String)> = {
            let conn = db
                .lock()
                .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;
            conn.query_row(
                "SELECT id, username, email, password_hash FROM users WHERE email = ?1",
                [&email],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .ok()
        };

        // Lock is released before the bcrypt verify
        let (id, username, email, password_hash) = row.ok_or((
            StatusCode::UNAUTHORIZED,
            "Invalid credentials".to_string(),
        ))?;

        let valid = bcrypt::verify(&password, &password_hash).unwrap_or(false);
        if !valid {
            return Err((
                StatusCode::UNAUTHORIZED,
                "Invalid credentials".to_string(),
            ));
        }

        Ok::<_, (StatusCode, String)>(UserModel { id, username, email })
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    let token = issue_access_token(&state.jwt_secret, &user.id, &user.username)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Token: {}", e)))?;

    Ok(Json(SessionResponse { user, token }))
}

/// GET /api/auth/me — Return the authenticated user's identity.
pub async fn me(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<UserModel>, (StatusCode, String)> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();

    let user = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;
        load_user(&conn, &user_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Load user: {}", e)))?
            .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Task join: {}", e)))??;

    Ok(Json(user))
}
