pub mod migrations;
pub mod models;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Shared handle to the single SQLite connection. rusqlite is
/// synchronous, so handlers take the lock inside spawn_blocking and
/// release it before any slow non-DB work.
pub type DbPool = Arc<Mutex<Connection>>;

/// Open (or create) the database under `data_dir` and bring the schema
/// up to date.
pub fn init_db(data_dir: &str) -> Result<DbPool, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = Path::new(data_dir).join("boardsync.db");

    let mut conn = Connection::open(&db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    migrations::migrations().to_latest(&mut conn)?;

    tracing::info!(path = %db_path.display(), "Database ready");
    Ok(Arc::new(Mutex::new(conn)))
}
