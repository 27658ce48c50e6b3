// Comment Processing Job — the unit of work on the processing queue.

use serde::{Deserialize, Serialize};

use crate::chain::events::CommentEvent;
use crate::ecp::models::CommentId;

/// Job name for comment processing jobs.
pub const PROCESS_COMMENT_JOB: &str = "processComment";

/// One comment to classify and fan out.
///
/// Queued with `comment_id` as its dedup key: at most one job per comment
/// ever exists on the queue, so replaying the same log is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentProcessingJob {
    pub comment_id: CommentId,
    pub chain_id: u64,
    #[serde(default)]
    pub content: String,
    /// `None` for top-level comments.
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    #[serde(default)]
    pub comment_type: u8,
}

impl CommentProcessingJob {
    pub fn dedup_key(&self) -> &str {
        self.comment_id.as_str()
    }
}

impl From<CommentEvent> for CommentProcessingJob {
    fn from(event: CommentEvent) -> Self {
        Self {
            comment_id: event.comment_id,
            chain_id: event.chain_id,
            content: event.content,
            parent_id: event.parent_id,
            comment_type: event.comment_type,
        }
    }
}
