// Database queries — every SQL statement lives here.
//
// Timestamps used for queue scheduling are unix milliseconds passed in by
// the caller, so tests can drive the clock.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::models::{ClaimedJob, CommentJobRecord, JobState, QueueCounts, QueuedNotification};
use crate::notifications::sanitize::parse_notification_job;
use crate::notifications::{NotificationJob, NOTIFICATIONS_QUEUE_NAME};
use crate::pipeline::jobs::{CommentProcessingJob, PROCESS_COMMENT_JOB};

/// Largest power of two applied to the retry backoff.
const MAX_BACKOFF_SHIFT: u32 = 16;

// --- Scan state ---

/// Get a scan state value by key (e.g. "listener_next_block").
pub fn get_scan_state(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM scan_state WHERE key = ?1")?;
    let result = stmt.query_row(params![key], |row| row.get(0)).optional()?;
    Ok(result)
}

/// Set a scan state value (upsert).
pub fn set_scan_state(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO scan_state (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
        params![key, value],
    )?;
    Ok(())
}

// --- Processing queue ---

/// Add a job unless one with the same comment id already exists.
///
/// Returns false when the submission was coalesced with an existing job.
pub fn enqueue_comment_job(
    conn: &Connection,
    job: &CommentProcessingJob,
    max_attempts: u32,
    now_ms: i64,
) -> Result<bool> {
    let payload = serde_json::to_string(job)?;
    let inserted = conn.execute(
        "INSERT INTO comment_jobs
            (job_id, name, chain_id, payload, state, attempts, max_attempts,
             available_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?6, ?6, ?6)
         ON CONFLICT(job_id) DO NOTHING",
        params![
            job.dedup_key(),
            PROCESS_COMMENT_JOB,
            job.chain_id as i64,
            payload,
            max_attempts.max(1),
            now_ms,
        ],
    )?;
    Ok(inserted == 1)
}

/// Atomically move the oldest available pending job to `active`.
pub fn claim_comment_job(
    conn: &Connection,
    worker_id: &str,
    now_ms: i64,
) -> Result<Option<ClaimedJob>> {
    let row: Option<(String, u32, u32)> = conn
        .query_row(
            "UPDATE comment_jobs
             SET state = 'active', attempts = attempts + 1, claimed_at = ?1,
                 worker_id = ?2, updated_at = ?1
             WHERE state = 'pending' AND job_id = (
                 SELECT job_id FROM comment_jobs
                 WHERE state = 'pending' AND available_at <= ?1
                 ORDER BY available_at, created_at
                 LIMIT 1
             )
             RETURNING payload, attempts, max_attempts",
            params![now_ms, worker_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((payload, attempt, max_attempts)) => {
            let job: CommentProcessingJob =
                serde_json::from_str(&payload).context("Corrupt comment job payload")?;
            Ok(Some(ClaimedJob {
                job,
                attempt,
                max_attempts,
            }))
        }
    }
}

/// Mark an active job as done. Returns false when `worker_id` no longer holds
/// the claim (the job was redelivered after a stall).
pub fn complete_comment_job(
    conn: &Connection,
    job_id: &str,
    worker_id: &str,
    now_ms: i64,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE comment_jobs
         SET state = 'completed', last_error = NULL, updated_at = ?3, finished_at = ?3
         WHERE job_id = ?1 AND state = 'active' AND worker_id = ?2",
        params![job_id, worker_id, now_ms],
    )?;
    Ok(updated == 1)
}

/// Record a failed attempt.
///
/// With attempts left the job goes back to `pending`, available after
/// `backoff_ms * 2^(attempts - 1)`. Otherwise it is dead-lettered as
/// `failed`. Returns the state the job ended up in, or `None` when
/// `worker_id` no longer holds the claim.
pub fn fail_comment_job(
    conn: &Connection,
    job_id: &str,
    worker_id: &str,
    error: &str,
    backoff_ms: i64,
    now_ms: i64,
) -> Result<Option<JobState>> {
    let counts: Option<(u32, u32)> = conn
        .query_row(
            "SELECT attempts, max_attempts FROM comment_jobs
             WHERE job_id = ?1 AND state = 'active' AND worker_id = ?2",
            params![job_id, worker_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((attempts, max_attempts)) = counts else {
        return Ok(None);
    };

    if attempts >= max_attempts {
        conn.execute(
            "UPDATE comment_jobs
             SET state = 'failed', last_error = ?3, updated_at = ?4, finished_at = ?4
             WHERE job_id = ?1 AND state = 'active' AND worker_id = ?2",
            params![job_id, worker_id, error, now_ms],
        )?;
        return Ok(Some(JobState::Failed));
    }

    let shift = attempts.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    let delay = backoff_ms.saturating_mul(1i64 << shift);
    conn.execute(
        "UPDATE comment_jobs
         SET state = 'pending', last_error = ?3, available_at = ?4,
             worker_id = NULL, updated_at = ?5
         WHERE job_id = ?1 AND state = 'active' AND worker_id = ?2",
        params![job_id, worker_id, error, now_ms.saturating_add(delay), now_ms],
    )?;
    Ok(Some(JobState::Pending))
}

/// Return jobs stuck in `active` (their worker died) to the queue.
///
/// A stall counts as an attempt; jobs with none left are dead-lettered.
/// Returns the number of jobs made available again.
pub fn requeue_stalled_jobs(conn: &Connection, stalled_before_ms: i64, now_ms: i64) -> Result<usize> {
    conn.execute(
        "UPDATE comment_jobs
         SET state = 'failed', last_error = 'job stalled', updated_at = ?2, finished_at = ?2
         WHERE state = 'active' AND claimed_at < ?1 AND attempts >= max_attempts",
        params![stalled_before_ms, now_ms],
    )?;
    let requeued = conn.execute(
        "UPDATE comment_jobs
         SET state = 'pending', available_at = ?2, worker_id = NULL, updated_at = ?2
         WHERE state = 'active' AND claimed_at < ?1",
        params![stalled_before_ms, now_ms],
    )?;
    Ok(requeued)
}

/// Look up a processing job by its comment id.
pub fn get_comment_job(conn: &Connection, job_id: &str) -> Result<Option<CommentJobRecord>> {
    let row: Option<(String, String, u32, u32, i64, Option<String>)> = conn
        .query_row(
            "SELECT job_id, state, attempts, max_attempts, available_at, last_error
             FROM comment_jobs WHERE job_id = ?1",
            params![job_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .optional()?;

    row.map(
        |(job_id, state, attempts, max_attempts, available_at, last_error)| -> Result<CommentJobRecord> {
            let state = JobState::parse(&state)
                .with_context(|| format!("Unknown job state {state:?} for {job_id}"))?;
            Ok(CommentJobRecord {
                job_id,
                state,
                attempts,
                max_attempts,
                available_at,
                last_error,
            })
        },
    )
    .transpose()
}

/// Count processing jobs by state, plus pending notifications.
pub fn queue_counts(conn: &Connection) -> Result<QueueCounts> {
    let mut counts = QueueCounts::default();
    let mut stmt = conn.prepare("SELECT state, COUNT(*) FROM comment_jobs GROUP BY state")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    for row in rows {
        let (state, count) = row?;
        let count = count as u64;
        match JobState::parse(&state) {
            Some(JobState::Pending) => counts.pending = count,
            Some(JobState::Active) => counts.active = count,
            Some(JobState::Completed) => counts.completed = count,
            Some(JobState::Failed) => counts.failed = count,
            None => {}
        }
    }

    let pending: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notification_jobs WHERE state = 'pending'",
        [],
        |row| row.get(0),
    )?;
    counts.notifications_pending = pending as u64;

    counts.last_finished_at =
        conn.query_row("SELECT MAX(finished_at) FROM comment_jobs", [], |row| row.get(0))?;
    Ok(counts)
}

// --- Notification queue ---

/// Append a notification job and return its queue id.
pub fn enqueue_notification(conn: &Connection, job: &NotificationJob, now_ms: i64) -> Result<i64> {
    let payload = serde_json::to_string(job)?;
    let target_user_ids = job
        .target_user_ids
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO notification_jobs (name, recipient, target_user_ids, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            NOTIFICATIONS_QUEUE_NAME,
            job.author,
            target_user_ids,
            payload,
            now_ms,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Oldest pending notifications first.
pub fn get_pending_notifications(conn: &Connection, limit: u32) -> Result<Vec<QueuedNotification>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, payload, created_at
         FROM notification_jobs
         WHERE state = 'pending'
         ORDER BY id
         LIMIT ?1",
    )?;

    let rows = stmt.query_map(params![limit], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut notifications = Vec::new();
    for row in rows {
        let (id, name, payload, created_at) = row?;
        let job = parse_notification_job(&payload)
            .with_context(|| format!("Corrupt notification payload (id {id})"))?;
        notifications.push(QueuedNotification {
            id,
            name,
            job,
            created_at,
        });
    }
    Ok(notifications)
}

// --- Read-through cache ---

/// Cached comment JSON and when it was cached (unix ms).
pub fn get_cached_comment(
    conn: &Connection,
    chain_id: u64,
    comment_id: &str,
) -> Result<Option<(String, i64)>> {
    let result = conn
        .query_row(
            "SELECT payload, cached_at FROM comment_cache WHERE chain_id = ?1 AND comment_id = ?2",
            params![chain_id as i64, comment_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(result)
}

pub fn upsert_cached_comment(
    conn: &Connection,
    chain_id: u64,
    comment_id: &str,
    payload: &str,
    now_ms: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO comment_cache (chain_id, comment_id, payload, cached_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(chain_id, comment_id) DO UPDATE SET payload = ?3, cached_at = ?4",
        params![chain_id as i64, comment_id, payload, now_ms],
    )?;
    Ok(())
}

pub fn get_cached_profile(
    conn: &Connection,
    chain_id: u64,
    address: &str,
) -> Result<Option<(String, i64)>> {
    let result = conn
        .query_row(
            "SELECT payload, cached_at FROM profile_cache WHERE chain_id = ?1 AND address = ?2",
            params![chain_id as i64, address.to_lowercase()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(result)
}

/// Unconditional upsert: the last write for an address wins.
pub fn upsert_cached_profile(
    conn: &Connection,
    chain_id: u64,
    address: &str,
    payload: &str,
    now_ms: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO profile_cache (chain_id, address, payload, cached_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(chain_id, address) DO UPDATE SET payload = ?3, cached_at = ?4",
        params![chain_id as i64, address.to_lowercase(), payload, now_ms],
    )?;
    Ok(())
}

/// Number of cached (comments, profiles).
pub fn cache_sizes(conn: &Connection) -> Result<(i64, i64)> {
    let comments: i64 = conn.query_row("SELECT COUNT(*) FROM comment_cache", [], |row| row.get(0))?;
    let profiles: i64 = conn.query_row("SELECT COUNT(*) FROM profile_cache", [], |row| row.get(0))?;
    Ok((comments, profiles))
}

// --- Subscription store ---

/// Register a delivery device, creating the user if needed. Re-registering
/// a token moves it to the given user.
pub fn register_device(
    conn: &Connection,
    user_id: &str,
    token: &str,
    platform: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (id) VALUES (?1)",
        params![user_id],
    )?;
    conn.execute(
        "INSERT INTO notification_devices (user_id, token, platform)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(token) DO UPDATE SET user_id = ?1, platform = ?3",
        params![user_id, token, platform],
    )?;
    Ok(())
}

/// Subscribe a user to an author's top-level posts.
pub fn add_post_subscription(conn: &Connection, user_id: &str, target_author: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (id) VALUES (?1)",
        params![user_id],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO post_subscriptions (user_id, target_author) VALUES (?1, ?2)",
        params![user_id, target_author.trim().to_lowercase()],
    )?;
    Ok(())
}

/// Users subscribed to `target_author` with at least one registered device.
pub fn find_post_subscribers(conn: &Connection, target_author: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT u.id
         FROM users u
         JOIN post_subscriptions s ON s.user_id = u.id
         WHERE s.target_author = ?1
           AND EXISTS (SELECT 1 FROM notification_devices d WHERE d.user_id = u.id)
         ORDER BY u.id",
    )?;
    let rows = stmt.query_map(params![target_author.trim().to_lowercase()], |row| row.get(0))?;

    let mut users = Vec::new();
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}
