//! Room broadcast helpers for task mutations.
//! Called by the CRUD handlers strictly after the database write commits.
//! Broadcasts do not exclude the originator; a client treats the echo of
//! its own mutation as an idempotent refresh.

use crate::db::models::TaskModel;
use crate::ws::protocol::ServerEvent;
use crate::ws::rooms::RoomRegistry;

/// Broadcast a `task-created` event into the task's project room.
pub fn broadcast_task_created(rooms: &RoomRegistry, task: TaskModel) {
    let room_id = task.project.clone();
    rooms.broadcast(&room_id, &ServerEvent::TaskCreated(task), None);
}

/// Broadcast a `task-updated` event into the task's project room.
pub fn broadcast_task_updated(rooms: &RoomRegistry, task: TaskModel) {
    let room_id = task.project.clone();
    rooms.broadcast(&room_id, &ServerEvent::TaskUpdated(task), None);
}

/// Broadcast a `task-deleted` event (id only) into the project room.
pub fn broadcast_task_deleted(rooms: &RoomRegistry, project_id: &str, task_id: &str) {
    rooms.broadcast(
        project_id,
        &ServerEvent::TaskDeleted(task_id.to_string()),
        None,
    );
}
