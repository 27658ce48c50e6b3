// ChainEventSource — polls eth_getLogs for CommentAdded and yields batches.
//
// The source is a pull-based producer: `next_batch` waits for the next tick,
// polls, and returns whatever was decoded. Transport errors are logged and the
// source simply tries again on the next tick, so the sequence never ends on
// its own. The caller owns the cursor's durability; the source only tracks it
// in memory and can be rewound when a batch could not be handed off.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::rpc::types::Filter;
use alloy::sol_types::SolEvent;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::abi::{decode_comment_added, CommentAdded};
use super::events::CommentEvent;
use super::rpc::LogSource;
use crate::error::TransportError;

/// Events decoded from one block range.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    pub events: Vec<CommentEvent>,
    pub from_block: u64,
    pub to_block: u64,
}

impl EventBatch {
    /// First block the following poll should cover.
    pub fn next_block(&self) -> u64 {
        self.to_block + 1
    }
}

pub struct ChainEventSource {
    logs: Arc<dyn LogSource>,
    contract: Address,
    chain_id: u64,
    poll_interval: Duration,
    max_block_range: u64,
    next_block: Option<u64>,
    ticker: Option<Interval>,
}

impl ChainEventSource {
    pub fn new(
        logs: Arc<dyn LogSource>,
        contract: Address,
        chain_id: u64,
        poll_interval: Duration,
        max_block_range: u64,
    ) -> Self {
        Self {
            logs,
            contract,
            chain_id,
            poll_interval,
            max_block_range: max_block_range.max(1),
            next_block: None,
            ticker: None,
        }
    }

    /// Resume from a persisted cursor. Without one, polling starts at the head.
    pub fn starting_at(mut self, block: Option<u64>) -> Self {
        self.next_block = block;
        self
    }

    pub fn next_block(&self) -> Option<u64> {
        self.next_block
    }

    /// Move the cursor back so `block` is polled again.
    pub fn rewind(&mut self, block: u64) {
        self.next_block = Some(block);
    }

    /// Poll once. Returns `None` when there are no new blocks yet.
    pub async fn poll_once(&mut self) -> Result<Option<EventBatch>, TransportError> {
        let head = self.logs.block_number().await?;
        let from_block = self.next_block.unwrap_or(head);
        if from_block > head {
            return Ok(None);
        }
        let to_block = head.min(from_block.saturating_add(self.max_block_range - 1));

        let filter = Filter::new()
            .address(self.contract)
            .event_signature(CommentAdded::SIGNATURE_HASH)
            .from_block(from_block)
            .to_block(to_block);
        let logs = self.logs.get_logs(&filter).await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            if log.removed {
                debug!(tx = ?log.transaction_hash, "Skipping log removed by reorg");
                continue;
            }
            match decode_comment_added(log, self.chain_id) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => {
                    warn!(tx = ?log.transaction_hash, error = %e, "Dropping malformed CommentAdded log");
                }
            }
        }

        if !events.is_empty() {
            debug!(
                count = events.len(),
                from_block,
                to_block,
                first_tx = ?events[0].transaction_hash,
                "Received CommentAdded logs"
            );
        }

        self.next_block = Some(to_block + 1);
        Ok(Some(EventBatch {
            events,
            from_block,
            to_block,
        }))
    }

    /// Wait for the next tick and return the next batch, retrying through
    /// transport errors. Never returns without a batch.
    pub async fn next_batch(&mut self) -> EventBatch {
        loop {
            let poll_interval = self.poll_interval;
            let ticker = self.ticker.get_or_insert_with(|| {
                let mut ticker = tokio::time::interval(poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            });
            ticker.tick().await;

            match self.poll_once().await {
                Ok(Some(batch)) => return batch,
                Ok(None) => {}
                Err(e) => warn!(error = %e, "CommentAdded poll failed"),
            }
        }
    }
}
