// Rust structs that map to queue and cache rows.
//
// Kept apart from the queries so other modules can use them without
// depending on rusqlite directly.

use serde::{Deserialize, Serialize};

use crate::notifications::NotificationJob;
use crate::pipeline::jobs::CommentProcessingJob;

/// Lifecycle of a job on the processing queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Active,
    Completed,
    /// Attempts exhausted (dead letter).
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(JobState::Pending),
            "active" => Some(JobState::Active),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job handed to a worker by `claim_comment_job`.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: CommentProcessingJob,
    /// Attempt number of this run (1-based).
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Queue-side view of one processing job.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentJobRecord {
    pub job_id: String,
    pub state: JobState,
    pub attempts: u32,
    pub max_attempts: u32,
    pub available_at: i64,
    pub last_error: Option<String>,
}

/// A notification waiting for delivery.
#[derive(Debug, Clone)]
pub struct QueuedNotification {
    pub id: i64,
    pub name: String,
    pub job: NotificationJob,
    pub created_at: i64,
}

/// Per-state job counts for the status view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub pending: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub notifications_pending: u64,
    /// When the most recent job settled (unix ms).
    pub last_finished_at: Option<i64>,
}
