// SqliteDatabase — rusqlite backend implementing the Database trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// The lock is never held across an .await on anything else.

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{ClaimedJob, CommentJobRecord, JobState, QueueCounts, QueuedNotification};
use super::queries;
use super::traits::Database;
use crate::notifications::NotificationJob;
use crate::pipeline::jobs::CommentProcessingJob;

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Fresh in-memory database with the schema applied.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        super::schema::create_tables(&conn)?;
        Ok(Self::new(conn))
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn with_age(entry: Option<(String, i64)>) -> Option<(String, i64)> {
    entry.map(|(payload, cached_at)| (payload, (now_ms() - cached_at).max(0)))
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn get_scan_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        queries::get_scan_state(&conn, key)
    }

    async fn set_scan_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::set_scan_state(&conn, key, value)
    }

    async fn enqueue_comment_job(
        &self,
        job: &CommentProcessingJob,
        max_attempts: u32,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        queries::enqueue_comment_job(&conn, job, max_attempts, now_ms())
    }

    async fn claim_comment_job(&self, worker_id: &str) -> Result<Option<ClaimedJob>> {
        let conn = self.conn.lock().await;
        queries::claim_comment_job(&conn, worker_id, now_ms())
    }

    async fn complete_comment_job(&self, job_id: &str, worker_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        queries::complete_comment_job(&conn, job_id, worker_id, now_ms())
    }

    async fn fail_comment_job(
        &self,
        job_id: &str,
        worker_id: &str,
        error: &str,
        backoff_ms: i64,
    ) -> Result<Option<JobState>> {
        let conn = self.conn.lock().await;
        queries::fail_comment_job(&conn, job_id, worker_id, error, backoff_ms, now_ms())
    }

    async fn requeue_stalled_jobs(&self, stall_timeout_ms: i64) -> Result<usize> {
        let now = now_ms();
        let conn = self.conn.lock().await;
        queries::requeue_stalled_jobs(&conn, now - stall_timeout_ms, now)
    }

    async fn get_comment_job(&self, job_id: &str) -> Result<Option<CommentJobRecord>> {
        let conn = self.conn.lock().await;
        queries::get_comment_job(&conn, job_id)
    }

    async fn queue_counts(&self) -> Result<QueueCounts> {
        let conn = self.conn.lock().await;
        queries::queue_counts(&conn)
    }

    async fn enqueue_notification(&self, job: &NotificationJob) -> Result<i64> {
        let conn = self.conn.lock().await;
        queries::enqueue_notification(&conn, job, now_ms())
    }

    async fn get_pending_notifications(&self, limit: u32) -> Result<Vec<QueuedNotification>> {
        let conn = self.conn.lock().await;
        queries::get_pending_notifications(&conn, limit)
    }

    async fn get_cached_comment(
        &self,
        chain_id: u64,
        comment_id: &str,
    ) -> Result<Option<(String, i64)>> {
        let conn = self.conn.lock().await;
        queries::get_cached_comment(&conn, chain_id, comment_id).map(with_age)
    }

    async fn put_cached_comment(
        &self,
        chain_id: u64,
        comment_id: &str,
        payload: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::upsert_cached_comment(&conn, chain_id, comment_id, payload, now_ms())
    }

    async fn get_cached_profile(
        &self,
        chain_id: u64,
        address: &str,
    ) -> Result<Option<(String, i64)>> {
        let conn = self.conn.lock().await;
        queries::get_cached_profile(&conn, chain_id, address).map(with_age)
    }

    async fn put_cached_profile(&self, chain_id: u64, address: &str, payload: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::upsert_cached_profile(&conn, chain_id, address, payload, now_ms())
    }

    async fn cache_sizes(&self) -> Result<(i64, i64)> {
        let conn = self.conn.lock().await;
        queries::cache_sizes(&conn)
    }

    async fn register_device(
        &self,
        user_id: &str,
        token: &str,
        platform: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::register_device(&conn, user_id, token, platform)
    }

    async fn add_post_subscription(&self, user_id: &str, target_author: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::add_post_subscription(&conn, user_id, target_author)
    }

    async fn find_post_subscribers(&self, target_author: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        queries::find_post_subscribers(&conn, target_author)
    }
}
