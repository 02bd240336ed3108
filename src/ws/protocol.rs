//! Wire protocol for the realtime layer.
//!
//! One JSON event per text frame: `{"event": <name>, "data": <payload>}`.
//! Event names are kebab-case, payload fields camelCase, matching the
//! REST API.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::jwt::validate_room_grant;
use crate::db::models::{ProjectModel, TaskModel, UserModel};
use crate::state::AppState;
use crate::ws::rooms::RoomMember;
use crate::ws::ConnectionId;

/// Cursor coordinates within the project board view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

/// Client-supplied chat message body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatBody {
    pub text: String,
    pub timestamp: i64,
}

/// Events a client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinProject { project_id: String, grant: String },
    #[serde(rename_all = "camelCase")]
    LeaveProject { project_id: String },
    #[serde(rename_all = "camelCase")]
    CursorMove {
        project_id: String,
        position: CursorPosition,
    },
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        project_id: String,
        message: ChatBody,
    },
}

/// Events the server sends into rooms or back to a single connection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    TaskCreated(TaskModel),
    TaskUpdated(TaskModel),
    TaskDeleted(String),
    ProjectUpdated(ProjectModel),
    #[serde(rename_all = "camelCase")]
    MemberAdded { project_id: String, user: UserModel },
    #[serde(rename_all = "camelCase")]
    CursorMoved {
        user_id: String,
        username: String,
        x: f64,
        y: f64,
    },
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        id: String,
        user_id: String,
        username: String,
        text: String,
        timestamp: i64,
    },
    Error { message: String },
}

/// Handle an incoming text frame: decode the event envelope and dispatch.
/// A frame that fails to decode gets an `error` event back; the
/// connection stays up.
pub async fn handle_text_message(
    text: &str,
    conn_id: ConnectionId,
    tx: &mpsc::UnboundedSender<Message>,
    state: &AppState,
    user_id: &str,
    username: &str,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(user_id, error = %e, "Malformed client event");
            send_error(tx, "Malformed event");
            return;
        }
    };

    match event {
        ClientEvent::JoinProject { project_id, grant } => {
            handle_join(conn_id, tx, state, user_id, username, &project_id, &grant);
        }
        ClientEvent::LeaveProject { project_id } => {
            state.rooms.leave(conn_id, &project_id);
        }
        ClientEvent::CursorMove {
            project_id,
            position,
        } => {
            handle_cursor_move(conn_id, state, user_id, username, &project_id, position);
        }
        ClientEvent::ChatMessage {
            project_id,
            message,
        } => {
            handle_chat_message(conn_id, state, user_id, username, &project_id, message);
        }
    }
}

/// Join a project room. The grant is the short-lived capability issued
/// when the project was fetched; a join without a valid grant for this
/// user and room is refused and membership is unchanged.
fn handle_join(
    conn_id: ConnectionId,
    tx: &mpsc::UnboundedSender<Message>,
    state: &AppState,
    user_id: &str,
    username: &str,
    project_id: &str,
    grant: &str,
) {
    if !validate_room_grant(&state.jwt_secret, grant, user_id, project_id) {
        tracing::debug!(user_id, project_id, "Join refused: invalid room grant");
        send_error(tx, "Not authorized for project room");
        return;
    }

    let member = RoomMember {
        user_id: user_id.to_string(),
        username: username.to_string(),
        tx: tx.clone(),
    };
    state.rooms.join(conn_id, member, project_id);
}

/// Relay a cursor position to the rest of the room. The sender is
/// excluded; receivers expire stale cursors on their own clock.
fn handle_cursor_move(
    conn_id: ConnectionId,
    state: &AppState,
    user_id: &str,
    username: &str,
    project_id: &str,
    position: CursorPosition,
) {
    if !state.rooms.is_member(conn_id, project_id) {
        tracing::debug!(user_id, project_id, "Cursor from non-member dropped");
        return;
    }

    let event = ServerEvent::CursorMoved {
        user_id: user_id.to_string(),
        username: username.to_string(),
        x: position.x,
        y: position.y,
    };
    state.rooms.broadcast(project_id, &event, Some(conn_id));
}

/// Relay a chat message to the whole room, sender included. The echo is
/// the sender's delivery confirmation. Messages are not persisted.
fn handle_chat_message(
    conn_id: ConnectionId,
    state: &AppState,
    user_id: &str,
    username: &str,
    project_id: &str,
    message: ChatBody,
) {
    if !state.rooms.is_member(conn_id, project_id) {
        tracing::debug!(user_id, project_id, "Chat from non-member dropped");
        return;
    }

    let event = ServerEvent::ChatMessage {
        id: Uuid::now_v7().to_string(),
        user_id: user_id.to_string(),
        username: username.to_string(),
        text: message.text,
        timestamp: message.timestamp,
    };
    state.rooms.broadcast(project_id, &event, None);
}

/// Serialize and send an event to a single connection.
pub fn send_event(tx: &mpsc::UnboundedSender<Message>, event: &ServerEvent) {
    if let Ok(text) = serde_json::to_string(event) {
        let _ = tx.send(Message::Text(text.into()));
    }
}

/// Send an `error` event to a single connection.
fn send_error(tx: &mpsc::UnboundedSender<Message>, message: &str) {
    send_event(
        tx,
        &ServerEvent::Error {
            message: message.to_string(),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_deleted_serializes_as_tagged_envelope() {
        let event = ServerEvent::TaskDeleted("t1".to_string());
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"event":"task-deleted","data":"t1"}"#);
    }

    #[test]
    fn join_project_decodes_from_wire_frame() {
        let frame = r#"{"event":"join-project","data":{"projectId":"p1","grant":"g"}}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        match event {
            ClientEvent::JoinProject { project_id, grant } => {
                assert_eq!(project_id, "p1");
                assert_eq!(grant, "g");
            }
            other => panic!("decoded wrong variant: {:?}", other),
        }
    }

    #[test]
    fn cursor_moved_uses_camel_case_fields() {
        let event = ServerEvent::CursorMoved {
            user_id: "u1".to_string(),
            username: "alice".to_string(),
            x: 1.5,
            y: 2.0,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "cursor-moved");
        assert_eq!(value["data"]["userId"], "u1");
        assert_eq!(value["data"]["username"], "alice");
        assert_eq!(value["data"]["x"], 1.5);
    }

    #[test]
    fn malformed_frame_fails_to_decode() {
        let frame = r#"{"event":"join-project","data":{"wrong":true}}"#;
        assert!(serde_json::from_str::<ClientEvent>(frame).is_err());
    }
}
