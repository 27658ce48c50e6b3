// Shared fakes for the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ecp_notify::db::{Database, SqliteDatabase};
use ecp_notify::ecp::cache::{CommentCache, FetchOptions};
use ecp_notify::ecp::client::CommentSource;
use ecp_notify::ecp::models::{Author, Comment, CommentId, EnsProfile, FarcasterProfile, Reference};
use ecp_notify::error::{FetchError, StoreError};
use ecp_notify::notifications::{NotificationJob, NotificationType};
use ecp_notify::pipeline::{CommentProcessor, DbNotificationQueue, NotificationQueue};
use ecp_notify::subscribers::{DbSubscriberResolver, SubscriberResolver};

pub const CHAIN_ID: u64 = 8453;
pub const ALICE: &str = "0xA11CE0000000000000000000000000000000A11C";
pub const BOB: &str = "0xB0B0000000000000000000000000000000000B0B";
pub const CAROL: &str = "0xCA501000000000000000000000000000000CA501";

/// Comment read API backed by a map. Comments listed in `lag` 404 that many
/// times before they appear.
#[derive(Default)]
pub struct FakeApi {
    comments: Mutex<HashMap<CommentId, Comment>>,
    lag: Mutex<HashMap<CommentId, u32>>,
    pub calls: AtomicU32,
}

impl FakeApi {
    pub fn insert(&self, comment: Comment) {
        self.comments.lock().unwrap().insert(comment.id.clone(), comment);
    }

    pub fn lag(&self, id: &str, misses: u32) {
        self.lag.lock().unwrap().insert(CommentId::new(id), misses);
    }
}

#[async_trait]
impl CommentSource for FakeApi {
    async fn fetch_comment(
        &self,
        chain_id: u64,
        comment_id: &CommentId,
    ) -> Result<Comment, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let not_found = || FetchError::NotFound {
            chain_id,
            comment_id: comment_id.to_string(),
        };

        {
            let mut lag = self.lag.lock().unwrap();
            if let Some(left) = lag.get_mut(comment_id) {
                if *left > 0 {
                    *left -= 1;
                    return Err(not_found());
                }
            }
        }

        self.comments
            .lock()
            .unwrap()
            .get(comment_id)
            .cloned()
            .ok_or_else(not_found)
    }
}

/// Subscriber store that is always down.
pub struct BrokenResolver;

#[async_trait]
impl SubscriberResolver for BrokenResolver {
    async fn find_subscribers(&self, _target_author: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError("connection refused".to_string()))
    }
}

/// Resolver returning a fixed list, duplicates included.
pub struct FixedResolver(pub Vec<String>);

#[async_trait]
impl SubscriberResolver for FixedResolver {
    async fn find_subscribers(&self, _target_author: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.0.clone())
    }
}

/// Notification queue that records jobs and rejects one notification type.
#[derive(Default)]
pub struct RecordingQueue {
    pub jobs: Mutex<Vec<NotificationJob>>,
    pub reject: Option<NotificationType>,
}

#[async_trait]
impl NotificationQueue for RecordingQueue {
    async fn enqueue(&self, job: &NotificationJob) -> anyhow::Result<()> {
        if Some(job.notification.data.kind) == self.reject {
            anyhow::bail!("broker unavailable");
        }
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}

pub fn fast_fetch() -> FetchOptions {
    FetchOptions {
        max_attempts: 3,
        initial_delay_ms: 1,
    }
}

pub fn author(address: &str, ens: Option<&str>, farcaster: Option<&str>) -> Author {
    Author {
        address: address.to_string(),
        ens: ens.map(|name| EnsProfile {
            name: name.to_string(),
            avatar_url: None,
        }),
        farcaster: farcaster.map(|username| FarcasterProfile {
            fid: None,
            username: Some(username.to_string()),
            display_name: None,
            pfp_url: None,
        }),
    }
}

pub fn comment(id: &str, author: Author, parent: Option<&str>, content: &str) -> Comment {
    Comment {
        id: CommentId::new(id),
        author,
        parent_id: parent.and_then(CommentId::parent),
        content: content.to_string(),
        references: vec![],
        comment_type: None,
    }
}

pub fn ens_mention(address: &str) -> Reference {
    Reference::Ens {
        address: address.to_string(),
        name: None,
    }
}

pub fn farcaster_mention(address: &str) -> Reference {
    Reference::Farcaster {
        address: address.to_string(),
        username: None,
    }
}

pub fn memory_db() -> Arc<SqliteDatabase> {
    Arc::new(SqliteDatabase::in_memory().unwrap())
}

/// Processor writing into the database queues.
pub fn db_processor(api: Arc<FakeApi>, db: Arc<SqliteDatabase>) -> CommentProcessor {
    let cache = CommentCache::new(api, db.clone(), Duration::from_secs(3600));
    CommentProcessor::new(
        cache,
        Arc::new(DbNotificationQueue::new(db.clone())),
        Arc::new(DbSubscriberResolver::new(db)),
        fast_fetch(),
    )
}

/// Processor with a recording queue and the given resolver.
pub fn recording_processor(
    api: Arc<FakeApi>,
    queue: Arc<RecordingQueue>,
    resolver: Arc<dyn SubscriberResolver>,
) -> CommentProcessor {
    let cache = CommentCache::new(api, memory_db(), Duration::from_secs(3600));
    CommentProcessor::new(cache, queue, resolver, fast_fetch())
}

pub async fn pending_notifications(db: &SqliteDatabase) -> Vec<NotificationJob> {
    db.get_pending_notifications(100)
        .await
        .unwrap()
        .into_iter()
        .map(|queued| queued.job)
        .collect()
}
