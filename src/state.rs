use std::sync::Arc;

use crate::db::DbPool;
use crate::ws::rooms::RoomRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Room membership registry for the realtime layer
    pub rooms: Arc<RoomRegistry>,
    /// Allowed CORS origin for the browser frontend
    pub cors_origin: String,
}
