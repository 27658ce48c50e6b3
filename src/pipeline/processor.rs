// Comment processor — turns one CommentProcessingJob into notification jobs.
//
// Steps, in order:
// 1. Resolve the comment through the read-through cache (fatal on failure)
// 2. Pick the actor's display name and cache their profile
// 3. If the comment has a parent: resolve it (fatal on failure), then notify
//    the parent author of the reaction or reply
// 4. Notify each distinct ENS/Farcaster-mentioned address once
// 5. For top-level comments: one "post" job fanned out to every subscriber
//
// Each emission branch has its own failure boundary. A failed parent or
// mention emission does not stop later branches, but the job still fails
// afterwards so the queue redelivers it. The follower fan-out only degrades.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::jobs::CommentProcessingJob;
use crate::db::Database;
use crate::ecp::cache::{CommentCache, FetchOptions};
use crate::ecp::models::{Comment, COMMENT_TYPE_REACTION};
use crate::error::JobError;
use crate::notifications::format::{author_display_name, format_comment_content};
use crate::notifications::{
    sanitize, Notification, NotificationData, NotificationJob, NotificationType,
};
use crate::subscribers::SubscriberResolver;

/// Raw reaction content that renders as "liked".
const LIKE_REACTION: &str = "like";

/// Where finished notification jobs go.
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn enqueue(&self, job: &NotificationJob) -> anyhow::Result<()>;
}

/// Notification queue stored in the database.
pub struct DbNotificationQueue {
    db: Arc<dyn Database>,
}

impl DbNotificationQueue {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationQueue for DbNotificationQueue {
    async fn enqueue(&self, job: &NotificationJob) -> anyhow::Result<()> {
        self.db.enqueue_notification(job).await?;
        Ok(())
    }
}

/// What one successful run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessReport {
    pub emitted: Vec<NotificationType>,
    /// Best-effort steps skipped after an error, with the reason.
    pub degraded: Vec<String>,
}

pub struct CommentProcessor {
    cache: CommentCache,
    queue: Arc<dyn NotificationQueue>,
    subscribers: Arc<dyn SubscriberResolver>,
    fetch_options: FetchOptions,
}

/// Shared fields of every notification built for one comment.
struct Actor<'a> {
    comment: &'a Comment,
    chain_id: u64,
    username: String,
    address: String,
}

impl Actor<'_> {
    fn data(&self, kind: NotificationType) -> NotificationData {
        NotificationData {
            kind,
            reaction_type: None,
            comment_id: self.comment.id.to_string(),
            parent_id: None,
            chain_id: self.chain_id,
            actor_address: self.address.clone(),
            parent_address: None,
        }
    }

    fn own_body(&self) -> String {
        format_comment_content(&self.comment.content, &self.comment.references)
    }
}

#[derive(Default)]
struct Emissions {
    report: ProcessReport,
    failures: Vec<String>,
}

impl CommentProcessor {
    pub fn new(
        cache: CommentCache,
        queue: Arc<dyn NotificationQueue>,
        subscribers: Arc<dyn SubscriberResolver>,
        fetch_options: FetchOptions,
    ) -> Self {
        Self {
            cache,
            queue,
            subscribers,
            fetch_options,
        }
    }

    pub async fn process(&self, job: &CommentProcessingJob) -> Result<ProcessReport, JobError> {
        let chain_id = job.chain_id;
        debug!(comment_id = %job.comment_id, chain_id, "Processing comment");

        let comment = self
            .cache
            .fetch_cached_comment(chain_id, &job.comment_id, self.fetch_options)
            .await
            .map_err(|source| JobError::CommentFetch {
                comment_id: job.comment_id.to_string(),
                source,
            })?;

        let actor = Actor {
            comment: &comment,
            chain_id,
            username: author_display_name(&comment.author),
            address: comment.author.address.to_lowercase(),
        };
        self.cache.cache_user_data(chain_id, &comment.author).await;

        // Resolve the parent before emitting anything, so a lagging parent
        // fails the job with nothing sent yet.
        let parent = match &comment.parent_id {
            Some(parent_id) => {
                let parent = self
                    .cache
                    .fetch_cached_comment(chain_id, parent_id, self.fetch_options)
                    .await
                    .map_err(|source| JobError::ParentFetch {
                        parent_id: parent_id.to_string(),
                        source,
                    })?;
                self.cache.cache_user_data(chain_id, &parent.author).await;
                Some(parent)
            }
            None => None,
        };

        let mut emissions = Emissions::default();

        if let Some(parent) = &parent {
            let notification = parent_notification(&actor, parent, job.comment_type);
            self.emit(notification, &mut emissions).await;
        }

        for notification in mention_notifications(&actor, parent.as_ref()) {
            self.emit(notification, &mut emissions).await;
        }

        if comment.is_top_level() {
            self.notify_followers(&actor, &mut emissions).await;
        }

        let Emissions { report, failures } = emissions;
        if let Some(first) = failures.first() {
            return Err(JobError::Emission {
                failed: failures.len(),
                first: first.clone(),
            });
        }

        info!(
            comment_id = %comment.id,
            emitted = report.emitted.len(),
            degraded = report.degraded.len(),
            "Comment processed"
        );
        Ok(report)
    }

    async fn emit(&self, job: NotificationJob, emissions: &mut Emissions) {
        let kind = job.notification.data.kind;
        match self.queue.enqueue(&job).await {
            Ok(()) => emissions.report.emitted.push(kind),
            Err(e) => {
                warn!(
                    kind = %kind,
                    recipient = %job.author,
                    comment_id = %job.notification.data.comment_id,
                    error = %e,
                    "Failed to queue notification"
                );
                emissions.failures.push(format!("{kind} for {}: {e:#}", job.author));
            }
        }
    }

    async fn notify_followers(&self, actor: &Actor<'_>, emissions: &mut Emissions) {
        let subscribers = match self.subscribers.find_subscribers(&actor.address).await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                warn!(author = %actor.address, error = %e, "Failed to resolve subscribers");
                emissions.report.degraded.push(format!("post fan-out: {e}"));
                return;
            }
        };

        let target_user_ids: Vec<String> = subscribers
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if target_user_ids.is_empty() {
            return;
        }

        let job = NotificationJob {
            author: actor.address.clone(),
            target_user_ids: Some(target_user_ids),
            notification: sanitize(Notification {
                title: format!("@{} posted", actor.username),
                body: actor.own_body(),
                data: actor.data(NotificationType::Post),
            }),
        };

        match self.queue.enqueue(&job).await {
            Ok(()) => emissions.report.emitted.push(NotificationType::Post),
            Err(e) => {
                warn!(author = %actor.address, error = %e, "Failed to queue post notification");
                emissions.report.degraded.push(format!("post fan-out: {e:#}"));
            }
        }
    }
}

/// Reaction or reply notification for the parent's author.
fn parent_notification(actor: &Actor<'_>, parent: &Comment, comment_type: u8) -> NotificationJob {
    let parent_address = parent.author.address.to_lowercase();
    let mut data = if comment_type == COMMENT_TYPE_REACTION {
        actor.data(NotificationType::Reaction)
    } else {
        actor.data(NotificationType::Reply)
    };
    data.parent_id = Some(parent.id.to_string());
    data.parent_address = Some(parent_address.clone());

    let content = &actor.comment.content;
    let (title, body) = if comment_type == COMMENT_TYPE_REACTION {
        let verb = if content == LIKE_REACTION { "liked" } else { "reaction" };
        data.reaction_type = Some(content.clone());
        (
            format!("{verb} by @{}", actor.username),
            format_comment_content(&parent.content, &parent.references),
        )
    } else {
        (format!("reply from @{}", actor.username), actor.own_body())
    };

    NotificationJob {
        author: parent_address,
        target_user_ids: None,
        notification: sanitize(Notification { title, body, data }),
    }
}

/// One mention notification per distinct ENS/Farcaster address.
fn mention_notifications(actor: &Actor<'_>, parent: Option<&Comment>) -> Vec<NotificationJob> {
    let addresses: BTreeSet<String> = actor
        .comment
        .references
        .iter()
        .filter_map(|reference| reference.mention_address())
        .collect();

    addresses
        .into_iter()
        .map(|address| {
            let mut data = actor.data(NotificationType::Mention);
            data.parent_id = actor.comment.parent_id.as_ref().map(|id| id.to_string());
            data.parent_address = parent.map(|p| p.author.address.to_lowercase());
            NotificationJob {
                author: address,
                target_user_ids: None,
                notification: sanitize(Notification {
                    title: format!("@{} mentioned you", actor.username),
                    body: actor.own_body(),
                    data,
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecp::models::{Author, CommentId, EnsProfile, Reference};

    fn comment(parent: Option<&str>, content: &str, references: Vec<Reference>) -> Comment {
        Comment {
            id: CommentId::new("0xc0"),
            author: Author {
                address: "0xAAAA00000000000000000000000000000000BBBB".to_string(),
                ens: Some(EnsProfile {
                    name: "alice.eth".to_string(),
                    avatar_url: None,
                }),
                farcaster: None,
            },
            parent_id: parent.map(CommentId::new),
            content: content.to_string(),
            references,
            comment_type: None,
        }
    }

    fn parent() -> Comment {
        Comment {
            id: CommentId::new("0xp0"),
            author: Author {
                address: "0xCCCC00000000000000000000000000000000DDDD".to_string(),
                ens: None,
                farcaster: None,
            },
            parent_id: None,
            content: "original post".to_string(),
            references: vec![],
            comment_type: None,
        }
    }

    fn actor(comment: &Comment) -> Actor<'_> {
        Actor {
            comment,
            chain_id: 8453,
            username: author_display_name(&comment.author),
            address: comment.author.address.to_lowercase(),
        }
    }

    #[test]
    fn test_like_reaction() {
        let c = comment(Some("0xp0"), "like", vec![]);
        let job = parent_notification(&actor(&c), &parent(), COMMENT_TYPE_REACTION);
        assert_eq!(job.author, "0xcccc00000000000000000000000000000000dddd");
        assert_eq!(job.notification.title, "liked by @alice.eth");
        assert_eq!(job.notification.body, "original post");
        assert_eq!(job.notification.data.kind, NotificationType::Reaction);
        assert_eq!(job.notification.data.reaction_type.as_deref(), Some("like"));
        assert_eq!(job.notification.data.parent_id.as_deref(), Some("0xp0"));
    }

    #[test]
    fn test_other_reaction_keeps_raw_content() {
        let c = comment(Some("0xp0"), "🔥", vec![]);
        let job = parent_notification(&actor(&c), &parent(), COMMENT_TYPE_REACTION);
        assert_eq!(job.notification.title, "reaction by @alice.eth");
        assert_eq!(job.notification.data.reaction_type.as_deref(), Some("🔥"));
    }

    #[test]
    fn test_reply_uses_own_content() {
        let c = comment(Some("0xp0"), "great point", vec![]);
        let job = parent_notification(&actor(&c), &parent(), 0);
        assert_eq!(job.notification.title, "reply from @alice.eth");
        assert_eq!(job.notification.body, "great point");
        assert_eq!(job.notification.data.kind, NotificationType::Reply);
        assert!(job.notification.data.reaction_type.is_none());
        assert_eq!(
            job.notification.data.actor_address,
            "0xaaaa00000000000000000000000000000000bbbb"
        );
    }

    #[test]
    fn test_mentions_are_deduplicated() {
        let c = comment(
            None,
            "hey",
            vec![
                Reference::Ens {
                    address: "0xBob0000000000000000000000000000000000001".to_string(),
                    name: Some("bob.eth".to_string()),
                },
                Reference::Farcaster {
                    address: "0xbob0000000000000000000000000000000000001".to_string(),
                    username: Some("bob".to_string()),
                },
                Reference::Erc20 {
                    address: "0xToken000000000000000000000000000000000001".to_string(),
                    symbol: Some("TKN".to_string()),
                    name: None,
                },
            ],
        );
        let jobs = mention_notifications(&actor(&c), None);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].author, "0xbob0000000000000000000000000000000000001");
        assert_eq!(jobs[0].notification.title, "@alice.eth mentioned you");
        assert_eq!(jobs[0].notification.data.parent_id, None);
        assert_eq!(jobs[0].notification.data.parent_address, None);
    }

    #[test]
    fn test_mention_in_reply_carries_parent() {
        let c = comment(
            Some("0xp0"),
            "cc",
            vec![Reference::Ens {
                address: "0xbob0000000000000000000000000000000000001".to_string(),
                name: None,
            }],
        );
        let p = parent();
        let jobs = mention_notifications(&actor(&c), Some(&p));
        assert_eq!(jobs[0].notification.data.parent_id.as_deref(), Some("0xp0"));
        assert_eq!(
            jobs[0].notification.data.parent_address.as_deref(),
            Some("0xcccc00000000000000000000000000000000dddd")
        );
    }
}
