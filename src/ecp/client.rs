// HTTP client for the comment read API.
//
// The API is served by an indexer that trails the chain, so a comment can
// 404 for a few seconds after its CommentAdded log was emitted. This client
// reports that case as FetchError::NotFound and leaves retrying to the cache.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use super::models::{Comment, CommentId};
use crate::error::FetchError;

/// Default comment read API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.ethcomments.xyz";

/// Anything that can resolve a comment by chain and id.
#[async_trait]
pub trait CommentSource: Send + Sync {
    async fn fetch_comment(
        &self,
        chain_id: u64,
        comment_id: &CommentId,
    ) -> Result<Comment, FetchError>;
}

/// Client for the hosted comment read API.
pub struct EcpApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl EcpApiClient {
    /// Create a new client pointing at the given base URL.
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ecp-notify/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn comment_url(&self, comment_id: &CommentId) -> String {
        format!("{}/api/comments/{}", self.base_url, comment_id)
    }
}

#[async_trait]
impl CommentSource for EcpApiClient {
    async fn fetch_comment(
        &self,
        chain_id: u64,
        comment_id: &CommentId,
    ) -> Result<Comment, FetchError> {
        let url = self.comment_url(comment_id);
        debug!(comment_id = %comment_id, chain_id, "Fetching comment");

        let response = self
            .client
            .get(&url)
            .query(&[("chainId", chain_id.to_string())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                chain_id,
                comment_id: comment_id.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        serde_json::from_str::<Comment>(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_url_trims_trailing_slash() {
        let client = EcpApiClient::new("https://api.example.com/").unwrap();
        let url = client.comment_url(&CommentId::new("0xABC"));
        assert_eq!(url, "https://api.example.com/api/comments/0xabc");
    }
}
