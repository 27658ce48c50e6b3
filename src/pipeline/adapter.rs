// Event-to-job adapter and the listener loop that drives it.
//
// Each CommentEvent becomes one CommentProcessingJob keyed by its comment id,
// so replays of the same log coalesce on the queue. The listener persists the
// block cursor only after a whole batch was submitted; on a failed submit the
// source is rewound and the range is polled again on the next tick.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::jobs::CommentProcessingJob;
use crate::chain::{ChainEventSource, CommentEvent, EventBatch};
use crate::db::Database;

/// scan_state key holding the next block the listener should poll.
pub const LISTENER_CURSOR_KEY: &str = "listener_next_block";

/// What happened to one submitted batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitReport {
    pub added: usize,
    pub coalesced: usize,
}

pub struct EventToJobAdapter {
    db: Arc<dyn Database>,
    max_attempts: u32,
}

impl EventToJobAdapter {
    pub fn new(db: Arc<dyn Database>, max_attempts: u32) -> Self {
        Self { db, max_attempts }
    }

    /// Submit one event. Returns false when a job for the comment already exists.
    pub async fn submit(&self, event: CommentEvent) -> Result<bool> {
        let job = CommentProcessingJob::from(event);
        let added = self.db.enqueue_comment_job(&job, self.max_attempts).await?;
        if added {
            debug!(comment_id = %job.comment_id, "Queued processComment job");
        } else {
            debug!(comment_id = %job.comment_id, "Duplicate processComment job coalesced");
        }
        Ok(added)
    }

    /// Submit every event in the batch, then advance the persisted cursor.
    ///
    /// The first failed submit aborts the batch without touching the cursor.
    pub async fn submit_batch(&self, batch: &EventBatch) -> Result<SubmitReport> {
        let mut report = SubmitReport::default();
        for event in &batch.events {
            if self.submit(event.clone()).await? {
                report.added += 1;
            } else {
                report.coalesced += 1;
            }
        }
        self.db
            .set_scan_state(LISTENER_CURSOR_KEY, &batch.next_block().to_string())
            .await?;
        Ok(report)
    }

    /// Cursor persisted by the last fully submitted batch.
    pub async fn saved_cursor(&self) -> Result<Option<u64>> {
        let raw = self.db.get_scan_state(LISTENER_CURSOR_KEY).await?;
        match raw {
            Some(value) => match value.parse::<u64>() {
                Ok(block) => Ok(Some(block)),
                Err(e) => {
                    warn!(value = %value, error = %e, "Ignoring unparseable listener cursor");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}

/// A running listener. Dropping it does not stop the task; call `unsubscribe`.
pub struct Subscription {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Stop polling and wait for the listener task to exit. Events already
    /// submitted stay on the queue.
    pub async fn unsubscribe(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "Listener task panicked");
        }
    }
}

/// Spawn the listener: poll `source`, hand each batch to `adapter`.
pub fn subscribe(mut source: ChainEventSource, adapter: EventToJobAdapter) -> Subscription {
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        loop {
            let batch = tokio::select! {
                _ = shutdown_rx.changed() => break,
                batch = source.next_batch() => batch,
            };

            match adapter.submit_batch(&batch).await {
                Ok(report) => {
                    if report.added + report.coalesced > 0 {
                        info!(
                            added = report.added,
                            coalesced = report.coalesced,
                            from_block = batch.from_block,
                            to_block = batch.to_block,
                            "Submitted CommentAdded batch"
                        );
                    }
                }
                Err(e) => {
                    error!(
                        error = %e,
                        from_block = batch.from_block,
                        "Failed to submit batch, will retry range"
                    );
                    source.rewind(batch.from_block);
                }
            }
        }
        info!("Listener stopped");
    });

    Subscription { shutdown, handle }
}
