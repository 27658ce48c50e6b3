// Database layer — SQLite storage for the job queues, the comment/profile
// cache, and the subscription store.
//
// rusqlite with the "bundled" feature, so there's no system SQLite
// dependency. The database file lives wherever ECP_NOTIFY_DB_PATH points
// (defaults to ./ecp-notify.db).

pub mod models;
pub mod queries;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteDatabase;
pub use traits::Database;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

/// Open (or create) the database and run migrations.
pub fn initialize(db_path: &str) -> Result<Connection> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for database: {db_path}"))?;
        }
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {db_path}"))?;

    // WAL lets the listener and worker processes share the file
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    schema::create_tables(&conn)?;

    Ok(conn)
}

/// Open an existing database (fails if it doesn't exist yet).
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        anyhow::bail!("Database not found at {db_path}. Run `ecp-notify init` first.");
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {db_path}"))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    // Pick up migrations added since `init` ran
    schema::create_tables(&conn)?;

    Ok(conn)
}

/// Initialize the SQLite database and wrap it for shared async use.
pub fn initialize_sqlite(db_path: &str) -> Result<Arc<dyn Database>> {
    Ok(Arc::new(SqliteDatabase::new(initialize(db_path)?)))
}

/// Open the existing SQLite database for shared async use.
pub fn open_sqlite(db_path: &str) -> Result<Arc<dyn Database>> {
    Ok(Arc::new(SqliteDatabase::new(open(db_path)?)))
}
