//! Room broadcast helpers for project mutations.
//! Called by the CRUD handlers strictly after the database write commits.
//! Broadcasts do not exclude the originator; a client treats the echo of
//! its own mutation as an idempotent refresh.

use crate::db::models::{ProjectModel, UserModel};
use crate::ws::protocol::ServerEvent;
use crate::ws::rooms::RoomRegistry;

/// Broadcast a `project-updated` event into the project's room.
pub fn broadcast_project_updated(rooms: &RoomRegistry, project: ProjectModel) {
    let room_id = project.id.clone();
    rooms.broadcast(&room_id, &ServerEvent::ProjectUpdated(project), None);
}

/// Broadcast a `member-added` event into the project's room.
pub fn broadcast_member_added(rooms: &RoomRegistry, project_id: &str, user: UserModel) {
    rooms.broadcast(
        project_id,
        &ServerEvent::MemberAdded {
            project_id: project_id.to_string(),
            user,
        },
        None,
    );
}
