// Claims processComment jobs and runs the processor on them.
//
// One job runs to completion before the worker acknowledges it. Failures go
// back to the queue with exponential backoff until the attempts run out, at
// which point the job is dead-lettered as `failed`. Before each claim, jobs
// left `active` by a crashed worker are made available again.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::processor::{CommentProcessor, ProcessReport};
use crate::db::models::JobState;
use crate::db::Database;

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub worker_id: String,
    /// Sleep between claims when the queue is empty.
    pub idle_interval: Duration,
    /// Retry backoff base; doubles per attempt.
    pub backoff: Duration,
    /// Active jobs older than this are redelivered.
    pub stall_timeout: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            worker_id: "worker-0".to_string(),
            idle_interval: Duration::from_secs(1),
            backoff: Duration::from_millis(5000),
            stall_timeout: Duration::from_secs(300),
        }
    }
}

/// Result of one `run_once` call.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Nothing was available to claim.
    Idle,
    Completed {
        comment_id: String,
        report: ProcessReport,
    },
    /// Failed with attempts left; back on the queue after the backoff.
    Retrying { comment_id: String, error: String },
    /// Failed on its last attempt.
    DeadLettered { comment_id: String, error: String },
    /// The claim expired while the job ran and another worker took it over.
    /// The result was discarded.
    LostClaim { comment_id: String },
}

pub struct Worker {
    db: Arc<dyn Database>,
    processor: Arc<CommentProcessor>,
    options: WorkerOptions,
}

impl Worker {
    pub fn new(db: Arc<dyn Database>, processor: Arc<CommentProcessor>, options: WorkerOptions) -> Self {
        Self {
            db,
            processor,
            options,
        }
    }

    /// Claim and process at most one job.
    pub async fn run_once(&self) -> Result<JobOutcome> {
        let stall_ms = self.options.stall_timeout.as_millis() as i64;
        let requeued = self.db.requeue_stalled_jobs(stall_ms).await?;
        if requeued > 0 {
            warn!(requeued, "Redelivering stalled jobs");
        }

        let Some(claimed) = self.db.claim_comment_job(&self.options.worker_id).await? else {
            return Ok(JobOutcome::Idle);
        };
        let comment_id = claimed.job.dedup_key().to_string();
        debug!(
            comment_id = %comment_id,
            attempt = claimed.attempt,
            max_attempts = claimed.max_attempts,
            worker = %self.options.worker_id,
            "Claimed job"
        );

        let worker_id = self.options.worker_id.as_str();
        match self.processor.process(&claimed.job).await {
            Ok(report) => {
                if !self.db.complete_comment_job(&comment_id, worker_id).await? {
                    return Ok(self.lost_claim(comment_id));
                }
                Ok(JobOutcome::Completed { comment_id, report })
            }
            Err(e) => {
                let error = e.to_string();
                let backoff_ms = self.options.backoff.as_millis() as i64;
                let state = self
                    .db
                    .fail_comment_job(&comment_id, worker_id, &error, backoff_ms)
                    .await?;
                match state {
                    None => Ok(self.lost_claim(comment_id)),
                    Some(JobState::Failed) => {
                        error!(
                            comment_id = %comment_id,
                            attempts = claimed.attempt,
                            error = %error,
                            "Job failed permanently"
                        );
                        Ok(JobOutcome::DeadLettered { comment_id, error })
                    }
                    Some(_) => {
                        warn!(
                            comment_id = %comment_id,
                            attempt = claimed.attempt,
                            max_attempts = claimed.max_attempts,
                            error = %error,
                            "Job failed, will retry"
                        );
                        Ok(JobOutcome::Retrying { comment_id, error })
                    }
                }
            }
        }
    }

    fn lost_claim(&self, comment_id: String) -> JobOutcome {
        warn!(
            comment_id = %comment_id,
            worker = %self.options.worker_id,
            "Claim expired while the job ran, discarding result"
        );
        JobOutcome::LostClaim { comment_id }
    }

    /// Run until `shutdown` flips to true. The job in flight when the signal
    /// arrives is finished first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(worker = %self.options.worker_id, "Worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let idle = match self.run_once().await {
                Ok(JobOutcome::Idle) => true,
                Ok(_) => false,
                Err(e) => {
                    error!(worker = %self.options.worker_id, error = %e, "Queue operation failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = tokio::time::sleep(self.options.idle_interval) => {}
                }
            }
        }
        info!(worker = %self.options.worker_id, "Worker stopped");
    }
}
