// Database trait — async interface over the queues, caches, and
// subscription store.
//
// All methods are async so a synchronous backend (rusqlite behind a Mutex)
// and a native async one fit behind the same interface. The trait mirrors
// the free functions in queries.rs, minus the clock: implementations read
// the current time themselves.

use anyhow::Result;
use async_trait::async_trait;

use super::models::{ClaimedJob, CommentJobRecord, JobState, QueueCounts, QueuedNotification};
use crate::notifications::NotificationJob;
use crate::pipeline::jobs::CommentProcessingJob;

#[async_trait]
pub trait Database: Send + Sync {
    // --- Lifecycle ---

    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    // --- Scan state ---

    async fn get_scan_state(&self, key: &str) -> Result<Option<String>>;

    async fn set_scan_state(&self, key: &str, value: &str) -> Result<()>;

    // --- Processing queue ---

    /// Submit a job keyed by its comment id. Returns false if a job for that
    /// comment already exists (the submission is coalesced).
    async fn enqueue_comment_job(&self, job: &CommentProcessingJob, max_attempts: u32)
        -> Result<bool>;

    /// Claim the next available job for `worker_id`, if any.
    async fn claim_comment_job(&self, worker_id: &str) -> Result<Option<ClaimedJob>>;

    /// Returns false when `worker_id` lost its claim on the job.
    async fn complete_comment_job(&self, job_id: &str, worker_id: &str) -> Result<bool>;

    /// Record a failed attempt; see `queries::fail_comment_job`. `None` means
    /// `worker_id` lost its claim and nothing was changed.
    async fn fail_comment_job(
        &self,
        job_id: &str,
        worker_id: &str,
        error: &str,
        backoff_ms: i64,
    ) -> Result<Option<JobState>>;

    /// Redeliver jobs claimed more than `stall_timeout_ms` ago.
    async fn requeue_stalled_jobs(&self, stall_timeout_ms: i64) -> Result<usize>;

    async fn get_comment_job(&self, job_id: &str) -> Result<Option<CommentJobRecord>>;

    async fn queue_counts(&self) -> Result<QueueCounts>;

    // --- Notification queue ---

    async fn enqueue_notification(&self, job: &NotificationJob) -> Result<i64>;

    async fn get_pending_notifications(&self, limit: u32) -> Result<Vec<QueuedNotification>>;

    // --- Read-through cache ---

    /// Cached comment JSON and its age in milliseconds.
    async fn get_cached_comment(&self, chain_id: u64, comment_id: &str)
        -> Result<Option<(String, i64)>>;

    async fn put_cached_comment(&self, chain_id: u64, comment_id: &str, payload: &str)
        -> Result<()>;

    /// Cached profile JSON and its age in milliseconds.
    async fn get_cached_profile(&self, chain_id: u64, address: &str)
        -> Result<Option<(String, i64)>>;

    async fn put_cached_profile(&self, chain_id: u64, address: &str, payload: &str)
        -> Result<()>;

    async fn cache_sizes(&self) -> Result<(i64, i64)>;

    // --- Subscription store ---

    async fn register_device(&self, user_id: &str, token: &str, platform: Option<&str>)
        -> Result<()>;

    async fn add_post_subscription(&self, user_id: &str, target_author: &str) -> Result<()>;

    /// Users following `target_author` who have at least one device.
    async fn find_post_subscribers(&self, target_author: &str) -> Result<Vec<String>>;
}
