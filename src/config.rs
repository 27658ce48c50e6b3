use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::chain::{DEFAULT_CHAIN_ID, DEFAULT_COMMENT_MANAGER_ADDRESS};
use crate::ecp::cache::FetchOptions;
use crate::ecp::client::DEFAULT_API_URL;

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy. Everything
/// has a default except the RPC endpoint, which only the listener needs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Chain JSON-RPC endpoint (BASE_RPC_URL).
    pub rpc_url: String,
    pub db_path: String,
    /// Comment read API base URL.
    pub api_url: String,
    /// Contract emitting CommentAdded.
    pub comment_manager_address: String,
    pub chain_id: u64,
    pub poll_interval: Duration,
    /// Max blocks covered by one eth_getLogs call.
    pub max_block_range: u64,
    pub fetch_max_attempts: u32,
    pub fetch_initial_delay_ms: u64,
    /// Processing-queue attempts before a job is dead-lettered.
    pub job_max_attempts: u32,
    pub job_backoff: Duration,
    pub cache_ttl: Duration,
    pub stall_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |name: &str, default: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            rpc_url: lookup("BASE_RPC_URL").unwrap_or_default(),
            db_path: string("ECP_NOTIFY_DB_PATH", "./ecp-notify.db"),
            api_url: string("ECP_API_URL", DEFAULT_API_URL),
            comment_manager_address: string(
                "COMMENT_MANAGER_ADDRESS",
                DEFAULT_COMMENT_MANAGER_ADDRESS,
            ),
            chain_id: number(&lookup, "CHAIN_ID", DEFAULT_CHAIN_ID)?,
            poll_interval: Duration::from_secs(number(&lookup, "POLL_INTERVAL_SECS", 10)?),
            max_block_range: number(&lookup, "MAX_BLOCK_RANGE", 2000)?,
            fetch_max_attempts: number(&lookup, "FETCH_MAX_ATTEMPTS", 5)?,
            fetch_initial_delay_ms: number(&lookup, "FETCH_INITIAL_DELAY_MS", 1000)?,
            job_max_attempts: number(&lookup, "JOB_MAX_ATTEMPTS", 3)?,
            job_backoff: Duration::from_millis(number(&lookup, "JOB_BACKOFF_MS", 5000)?),
            cache_ttl: Duration::from_secs(number(&lookup, "CACHE_TTL_SECS", 3600)?),
            stall_timeout: Duration::from_secs(number(&lookup, "STALL_TIMEOUT_SECS", 300)?),
        })
    }

    /// Check that the chain RPC endpoint is configured.
    /// Call this before anything that polls the chain.
    pub fn require_rpc(&self) -> Result<()> {
        if self.rpc_url.trim().is_empty() {
            anyhow::bail!(
                "BASE_RPC_URL not set. Add it to your .env file.\n\
                 See .env.example for the required variables."
            );
        }
        Ok(())
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            max_attempts: self.fetch_max_attempts,
            initial_delay_ms: self.fetch_initial_delay_ms,
        }
    }
}

fn number<T, F>(lookup: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {name}: {raw:?}")),
        _ => Ok(default),
    }
}
