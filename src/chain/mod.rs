// Chain side of the pipeline: JSON-RPC transport, CommentAdded decoding,
// and the polling event source.

pub mod abi;
pub mod events;
pub mod rpc;
pub mod source;

pub use events::CommentEvent;
pub use rpc::{LogSource, RpcClient};
pub use source::{ChainEventSource, EventBatch};

/// Base mainnet.
pub const DEFAULT_CHAIN_ID: u64 = 8453;

/// CommentManager contract on Base.
pub const DEFAULT_COMMENT_MANAGER_ADDRESS: &str = "0xb262C9278fBcac384Ef59Fc49E24d800152E19b1";
