// Table creation and migrations.
//
// A `schema_version` table tracks which migrations have run; each migration
// is a function executing SQL. `create_tables` is safe to call on every
// startup.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables if they don't exist yet.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Listener cursor and other small key/value state
        CREATE TABLE IF NOT EXISTS scan_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Processing queue. job_id is the comment id, which is the dedup key.
        -- Completed rows are kept so replays of old logs stay no-ops.
        CREATE TABLE IF NOT EXISTS comment_jobs (
            job_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            chain_id INTEGER NOT NULL,
            payload TEXT NOT NULL,              -- JSON CommentProcessingJob
            state TEXT NOT NULL,                -- pending / active / completed / failed
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL,
            available_at INTEGER NOT NULL,      -- unix ms; retry backoff pushes this out
            claimed_at INTEGER,
            worker_id TEXT,
            last_error TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Notification queue, consumed by delivery
        CREATE TABLE IF NOT EXISTS notification_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            recipient TEXT NOT NULL,
            target_user_ids TEXT,               -- JSON array, post fan-out only
            payload TEXT NOT NULL,              -- JSON NotificationJob
            state TEXT NOT NULL DEFAULT 'pending',
            created_at INTEGER NOT NULL
        );

        -- Read-through cache of comments and author profiles
        CREATE TABLE IF NOT EXISTS comment_cache (
            chain_id INTEGER NOT NULL,
            comment_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            cached_at INTEGER NOT NULL,
            PRIMARY KEY (chain_id, comment_id)
        );

        CREATE TABLE IF NOT EXISTS profile_cache (
            chain_id INTEGER NOT NULL,
            address TEXT NOT NULL,              -- lower-cased
            payload TEXT NOT NULL,
            cached_at INTEGER NOT NULL,
            PRIMARY KEY (chain_id, address)
        );

        -- Subscription store
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS notification_devices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            token TEXT NOT NULL UNIQUE,
            platform TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS post_subscriptions (
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            target_author TEXT NOT NULL,        -- lower-cased address
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (user_id, target_author)
        );

        CREATE INDEX IF NOT EXISTS idx_comment_jobs_available
            ON comment_jobs(state, available_at);

        CREATE INDEX IF NOT EXISTS idx_notification_jobs_state
            ON notification_jobs(state, id);

        CREATE INDEX IF NOT EXISTS idx_post_subscriptions_target
            ON post_subscriptions(target_author);

        CREATE INDEX IF NOT EXISTS idx_devices_user
            ON notification_devices(user_id);
        ",
    )
    .context("Failed to create database tables")?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    // Migration v2: settle time of completed and failed jobs, shown by
    // `status`.
    run_migration(conn, 2, |c| {
        c.execute_batch("ALTER TABLE comment_jobs ADD COLUMN finished_at INTEGER;")
    })?;

    Ok(())
}

/// Run a migration if it hasn't been applied yet.
fn run_migration<F>(conn: &Connection, version: i64, migrate: F) -> Result<()>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM schema_version WHERE version = ?1",
        [version],
        |row| row.get(0),
    )?;

    if !already_applied {
        migrate(conn).with_context(|| format!("Migration v{version} failed"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// Count the user-created tables (shown by `init`).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
