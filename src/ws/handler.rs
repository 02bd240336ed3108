use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth::jwt;
use crate::state::AppState;
use crate::ws::actor;

/// The access token rides the handshake query string; tokens never
/// appear in message bodies.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

/// Application close codes for handshake auth failures.
const CLOSE_TOKEN_EXPIRED: u16 = 4001;
const CLOSE_TOKEN_INVALID: u16 = 4002;

/// GET /ws?token=JWT — authenticate, then hand the socket to an actor.
///
/// Auth failures still complete the HTTP upgrade so the client can read
/// a close code; there is no degraded connection state. The check runs
/// once, at connect time.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match jwt::validate_access_token(&state.jwt_secret, &params.token) {
        Ok(claims) => {
            tracing::info!(user_id = %claims.sub, username = %claims.username, "Socket authenticated");
            ws.on_upgrade(move |socket| {
                actor::run_connection(socket, state, claims.sub, claims.username)
            })
        }
        Err(err) => {
            let (code, reason) = match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    (CLOSE_TOKEN_EXPIRED, "Token expired")
                }
                _ => (CLOSE_TOKEN_INVALID, "Token invalid"),
            };
            tracing::warn!(code, reason, "Socket auth refused");

            ws.on_upgrade(move |mut socket| async move {
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })))
                    .await;
            })
        }
    }
}
