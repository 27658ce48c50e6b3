// Comment read-through cache.
//
// Wraps a CommentSource with two things: a retry loop for the indexer lag
// (only NotFound is retried, with exponential backoff) and a SQLite cache of
// comments and author profiles. The cache only memoizes; a cold cache changes
// latency, never outcomes. Cache I/O failures are logged and ignored.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::client::CommentSource;
use super::models::{Author, Comment, CommentId};
use crate::db::Database;
use crate::error::FetchError;

/// Retry policy for one comment fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
        }
    }
}

impl FetchOptions {
    /// Delay before retry number `retry` (1-based): initial * 2^(retry-1).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(20);
        Duration::from_millis(self.initial_delay_ms.saturating_mul(factor))
    }
}

pub struct CommentCache {
    source: Arc<dyn CommentSource>,
    db: Arc<dyn Database>,
    ttl: Duration,
}

impl CommentCache {
    pub fn new(source: Arc<dyn CommentSource>, db: Arc<dyn Database>, ttl: Duration) -> Self {
        Self { source, db, ttl }
    }

    /// Resolve a comment, serving a fresh cache entry when there is one.
    ///
    /// Fails with `FetchError::NotFound` once `max_attempts` fetches have all
    /// come back 404. Any other error fails immediately.
    pub async fn fetch_cached_comment(
        &self,
        chain_id: u64,
        comment_id: &CommentId,
        options: FetchOptions,
    ) -> Result<Comment, FetchError> {
        if let Some(comment) = self.read_cached(chain_id, comment_id).await {
            debug!(comment_id = %comment_id, "Comment cache hit");
            return Ok(comment);
        }

        let max_attempts = options.max_attempts.max(1);
        let mut attempt = 1u32;
        let comment = loop {
            match self.source.fetch_comment(chain_id, comment_id).await {
                Ok(comment) => break comment,
                Err(err) if err.is_not_found() && attempt < max_attempts => {
                    let delay = options.delay_for(attempt);
                    debug!(
                        comment_id = %comment_id,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Comment not indexed yet, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };

        self.write_cached(chain_id, &comment).await;
        self.cache_user_data(chain_id, &comment.author).await;
        Ok(comment)
    }

    /// Upsert an author profile. Safe to call repeatedly and in any order.
    pub async fn cache_user_data(&self, chain_id: u64, author: &Author) {
        let payload = match serde_json::to_string(author) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(address = %author.address, error = %e, "Failed to encode profile for cache");
                return;
            }
        };
        if let Err(e) = self
            .db
            .put_cached_profile(chain_id, &author.address, &payload)
            .await
        {
            warn!(address = %author.address, error = %e, "Failed to cache profile");
        }
    }

    async fn read_cached(&self, chain_id: u64, comment_id: &CommentId) -> Option<Comment> {
        let (payload, age_ms) = match self.db.get_cached_comment(chain_id, comment_id.as_str()).await {
            Ok(entry) => entry?,
            Err(e) => {
                warn!(comment_id = %comment_id, error = %e, "Comment cache read failed");
                return None;
            }
        };
        if age_ms as u128 > self.ttl.as_millis() {
            return None;
        }
        match serde_json::from_str(&payload) {
            Ok(comment) => Some(comment),
            Err(e) => {
                warn!(comment_id = %comment_id, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    async fn write_cached(&self, chain_id: u64, comment: &Comment) {
        let payload = match serde_json::to_string(comment) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(comment_id = %comment.id, error = %e, "Failed to encode comment for cache");
                return;
            }
        };
        if let Err(e) = self
            .db
            .put_cached_comment(chain_id, comment.id.as_str(), &payload)
            .await
        {
            warn!(comment_id = %comment.id, error = %e, "Failed to cache comment");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDatabase;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Returns NotFound for the first `misses` calls, then the comment.
    struct LaggingSource {
        misses: u32,
        calls: AtomicU32,
        fail_hard: bool,
    }

    impl LaggingSource {
        fn new(misses: u32) -> Self {
            Self {
                misses,
                calls: AtomicU32::new(0),
                fail_hard: false,
            }
        }
    }

    #[async_trait]
    impl CommentSource for LaggingSource {
        async fn fetch_comment(
            &self,
            chain_id: u64,
            comment_id: &CommentId,
        ) -> Result<Comment, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_hard {
                return Err(FetchError::Api {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            if call <= self.misses {
                return Err(FetchError::NotFound {
                    chain_id,
                    comment_id: comment_id.to_string(),
                });
            }
            Ok(Comment {
                id: comment_id.clone(),
                author: Author {
                    address: "0xAbC0000000000000000000000000000000000001".to_string(),
                    ens: None,
                    farcaster: None,
                },
                parent_id: None,
                content: "gm".to_string(),
                references: vec![],
                comment_type: Some(0),
            })
        }
    }

    fn fast() -> FetchOptions {
        FetchOptions {
            max_attempts: 3,
            initial_delay_ms: 1,
        }
    }

    fn cache(source: Arc<LaggingSource>, db: Arc<SqliteDatabase>) -> CommentCache {
        CommentCache::new(source, db, Duration::from_secs(3600))
    }

    #[test]
    fn test_delay_doubles() {
        let options = FetchOptions::default();
        assert_eq!(options.delay_for(1), Duration::from_millis(1000));
        assert_eq!(options.delay_for(2), Duration::from_millis(2000));
        assert_eq!(options.delay_for(3), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_retries_not_found_then_succeeds() {
        let source = Arc::new(LaggingSource::new(2));
        let db = Arc::new(SqliteDatabase::in_memory().unwrap());
        let cache = cache(source.clone(), db.clone());

        let comment = cache
            .fetch_cached_comment(8453, &CommentId::new("0x01"), fast())
            .await
            .unwrap();
        assert_eq!(comment.content, "gm");
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        // Comment and author profile were both written
        assert_eq!(db.cache_sizes().await.unwrap(), (1, 1));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let source = Arc::new(LaggingSource::new(10));
        let db = Arc::new(SqliteDatabase::in_memory().unwrap());
        let cache = cache(source.clone(), db);

        let err = cache
            .fetch_cached_comment(8453, &CommentId::new("0x01"), fast())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let mut source = LaggingSource::new(0);
        source.fail_hard = true;
        let source = Arc::new(source);
        let db = Arc::new(SqliteDatabase::in_memory().unwrap());
        let cache = cache(source.clone(), db);

        let err = cache
            .fetch_cached_comment(8453, &CommentId::new("0x01"), fast())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Api { status: 500, .. }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_fetch_served_from_cache() {
        let source = Arc::new(LaggingSource::new(0));
        let db = Arc::new(SqliteDatabase::in_memory().unwrap());
        let cache = cache(source.clone(), db);
        let id = CommentId::new("0x01");

        let first = cache.fetch_cached_comment(8453, &id, fast()).await.unwrap();
        let second = cache.fetch_cached_comment(8453, &id, fast()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_refetches() {
        let source = Arc::new(LaggingSource::new(0));
        let db = Arc::new(SqliteDatabase::in_memory().unwrap());
        let cache = CommentCache::new(source.clone(), db, Duration::ZERO);
        let id = CommentId::new("0x01");

        cache.fetch_cached_comment(8453, &id, fast()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.fetch_cached_comment(8453, &id, fast()).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_user_data_upserts() {
        let source = Arc::new(LaggingSource::new(0));
        let db = Arc::new(SqliteDatabase::in_memory().unwrap());
        let cache = cache(source, db.clone());
        let mut author = Author {
            address: "0xAbC0000000000000000000000000000000000001".to_string(),
            ens: None,
            farcaster: None,
        };
        cache.cache_user_data(8453, &author).await;
        author.ens = Some(crate::ecp::models::EnsProfile {
            name: "alice.eth".to_string(),
            avatar_url: None,
        });
        cache.cache_user_data(8453, &author).await;

        assert_eq!(db.cache_sizes().await.unwrap(), (0, 1));
        let (payload, _) = db
            .get_cached_profile(8453, "0xabc0000000000000000000000000000000000001")
            .await
            .unwrap()
            .unwrap();
        assert!(payload.contains("alice.eth"));
    }
}
