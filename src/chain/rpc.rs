// Chain RPC seam. The listener needs two calls, the head block number and
// eth_getLogs; RpcClient forwards both to an alloy HTTP provider.

use alloy::network::Ethereum;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use crate::error::TransportError;

/// The chain calls the event source depends on.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn block_number(&self) -> Result<u64, TransportError>;

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, TransportError>;
}

/// HTTP JSON-RPC client.
pub struct RpcClient {
    provider: DynProvider<Ethereum>,
}

impl RpcClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let url: reqwest::Url = url
            .parse()
            .with_context(|| format!("Invalid RPC URL: {url}"))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self::from_provider(provider))
    }

    pub fn from_provider(provider: DynProvider<Ethereum>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl LogSource for RpcClient {
    async fn block_number(&self) -> Result<u64, TransportError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| TransportError::new("eth_blockNumber", e))
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, TransportError> {
        debug!(
            from_block = ?filter.get_from_block(),
            to_block = ?filter.get_to_block(),
            "eth_getLogs"
        );
        self.provider
            .get_logs(filter)
            .await
            .map_err(|e| TransportError::new("eth_getLogs", e))
    }
}
