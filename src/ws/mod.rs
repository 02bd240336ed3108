pub mod actor;
pub mod handler;
pub mod protocol;
pub mod rooms;

use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Process-unique identifier for one WebSocket connection.
/// Two sessions of the same user are two distinct connections.
pub type ConnectionId = u64;
