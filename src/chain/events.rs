// Payload extracted from one CommentAdded log.

use crate::ecp::models::CommentId;

/// A decoded CommentAdded log. Transient: the adapter turns it into a
/// CommentProcessingJob and drops it.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentEvent {
    pub comment_id: CommentId,
    pub chain_id: u64,
    pub author: String,
    pub content: String,
    /// `None` when the log carried the zero parent id.
    pub parent_id: Option<CommentId>,
    pub comment_type: u8,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<String>,
}
