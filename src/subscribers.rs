// Subscriber resolution for the follower fan-out.
//
// A user is notified of an author's new top-level posts when they follow the
// author and have at least one device registered for notifications.

use std::sync::Arc;

use async_trait::async_trait;

use crate::db::Database;
use crate::error::StoreError;

#[async_trait]
pub trait SubscriberResolver: Send + Sync {
    /// User ids following `target_author` (already lower-cased) with a device.
    async fn find_subscribers(&self, target_author: &str) -> Result<Vec<String>, StoreError>;
}

/// Resolver backed by the subscription tables in the database.
pub struct DbSubscriberResolver {
    db: Arc<dyn Database>,
}

impl DbSubscriberResolver {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SubscriberResolver for DbSubscriberResolver {
    async fn find_subscribers(&self, target_author: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.db.find_post_subscribers(target_author).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDatabase;

    #[tokio::test]
    async fn test_only_users_with_devices_are_returned() {
        let db = Arc::new(SqliteDatabase::in_memory().unwrap());
        db.add_post_subscription("with-device", "0xauthor").await.unwrap();
        db.add_post_subscription("no-device", "0xauthor").await.unwrap();
        db.add_post_subscription("other", "0xsomeoneelse").await.unwrap();
        db.register_device("with-device", "token-1", None).await.unwrap();
        db.register_device("with-device", "token-2", Some("ios")).await.unwrap();
        db.register_device("other", "token-3", None).await.unwrap();

        let resolver = DbSubscriberResolver::new(db);
        let users = resolver.find_subscribers("0xauthor").await.unwrap();
        assert_eq!(users, vec!["with-device".to_string()]);
    }

    #[tokio::test]
    async fn test_no_subscribers_is_empty() {
        let db = Arc::new(SqliteDatabase::in_memory().unwrap());
        let resolver = DbSubscriberResolver::new(db);
        assert!(resolver.find_subscribers("0xauthor").await.unwrap().is_empty());
    }
}
