// CommentAdded log decoding.
//
// The event is declared once with `sol!`; alloy derives the topic hash and
// the ABI decoder from it. Strings are decoded lossily, so a comment whose
// content is not valid UTF-8 still yields an event.

use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;
use thiserror::Error;

use super::events::CommentEvent;
use crate::ecp::models::CommentId;

sol! {
    /// Emitted by the CommentManager for every new comment.
    event CommentAdded(
        bytes32 indexed commentId,
        address indexed author,
        address indexed app,
        uint256 channelId,
        bytes32 parentId,
        uint96 createdAt,
        string content,
        string targetUri,
        uint8 commentType,
        uint8 authMethod
    );
}

#[derive(Debug, Error)]
#[error("malformed CommentAdded log: {0}")]
pub struct AbiError(#[from] alloy::sol_types::Error);

/// Decode one CommentAdded log.
///
/// Returns `Ok(None)` for logs of other events and for logs carrying the zero
/// comment id; those are dropped without failing the batch.
pub fn decode_comment_added(log: &Log, chain_id: u64) -> Result<Option<CommentEvent>, AbiError> {
    if log.topic0() != Some(&CommentAdded::SIGNATURE_HASH) {
        return Ok(None);
    }

    let event = log.log_decode::<CommentAdded>()?.inner.data;
    if event.commentId.is_zero() {
        return Ok(None);
    }

    Ok(Some(CommentEvent {
        comment_id: CommentId::new(&format!("{:#x}", event.commentId)),
        chain_id,
        author: event.author.to_string().to_lowercase(),
        content: event.content,
        parent_id: CommentId::parent(&format!("{:#x}", event.parentId)),
        comment_type: event.commentType,
        block_number: log.block_number,
        transaction_hash: log.transaction_hash.map(|hash| format!("{hash:#x}")),
    }))
}
