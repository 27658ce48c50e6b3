// Comment processor behavior: classification, recipients, and failure boundaries.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use ecp_notify::db::Database;
use ecp_notify::ecp::models::{Comment, CommentId, Reference, COMMENT_TYPE_REACTION};
use ecp_notify::error::JobError;
use ecp_notify::notifications::NotificationType;
use ecp_notify::pipeline::CommentProcessingJob;

const POST_ID: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
const REPLY_ID: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";

fn job_for(comment: &Comment, comment_type: u8) -> CommentProcessingJob {
    CommentProcessingJob {
        comment_id: comment.id.clone(),
        chain_id: CHAIN_ID,
        content: comment.content.clone(),
        parent_id: comment.parent_id.clone(),
        comment_type,
    }
}

fn alice_post() -> Comment {
    comment(POST_ID, author(ALICE, Some("alice.eth"), None), None, "hello world")
}

#[tokio::test]
async fn top_level_post_without_subscribers_emits_nothing() {
    let api = Arc::new(FakeApi::default());
    let post = alice_post();
    api.insert(post.clone());
    let db = memory_db();
    let processor = db_processor(api, db.clone());

    let report = processor.process(&job_for(&post, 0)).await.unwrap();
    assert!(report.emitted.is_empty());
    assert!(pending_notifications(&db).await.is_empty());
}

#[tokio::test]
async fn top_level_post_fans_out_in_one_job() {
    let api = Arc::new(FakeApi::default());
    let post = alice_post();
    api.insert(post.clone());
    let db = memory_db();

    let follower_address = ALICE.to_lowercase();
    for (user, token) in [("user-1", "t1"), ("user-2", "t2")] {
        db.add_post_subscription(user, &follower_address).await.unwrap();
        db.register_device(user, token, None).await.unwrap();
    }
    // Subscribed but no device: never notified
    db.add_post_subscription("user-3", ALICE).await.unwrap();

    let processor = db_processor(api, db.clone());
    let report = processor.process(&job_for(&post, 0)).await.unwrap();
    assert_eq!(report.emitted, vec![NotificationType::Post]);

    let jobs = pending_notifications(&db).await;
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(
        job.target_user_ids,
        Some(vec!["user-1".to_string(), "user-2".to_string()])
    );
    assert_eq!(job.author, follower_address);
    assert_eq!(job.notification.title, "@alice.eth posted");
    assert_eq!(job.notification.body, "hello world");
    assert_eq!(job.notification.data.kind, NotificationType::Post);
    assert_eq!(job.notification.data.parent_id, None);
}

#[tokio::test]
async fn duplicate_subscribers_are_collapsed() {
    let api = Arc::new(FakeApi::default());
    let post = alice_post();
    api.insert(post.clone());
    let queue = Arc::new(RecordingQueue::default());
    let resolver = Arc::new(FixedResolver(vec![
        "u2".to_string(),
        "u1".to_string(),
        "u2".to_string(),
    ]));
    let processor = recording_processor(api, queue.clone(), resolver);

    processor.process(&job_for(&post, 0)).await.unwrap();
    let jobs = queue.jobs.lock().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(
        jobs[0].target_user_ids,
        Some(vec!["u1".to_string(), "u2".to_string()])
    );
}

#[tokio::test]
async fn reply_notifies_parent_author_only() {
    let api = Arc::new(FakeApi::default());
    let post = alice_post();
    let reply = comment(REPLY_ID, author(BOB, None, Some("bob")), Some(POST_ID), "nice post");
    api.insert(post);
    api.insert(reply.clone());
    let queue = Arc::new(RecordingQueue::default());
    // A subscriber exists, but replies never fan out to followers
    let resolver = Arc::new(FixedResolver(vec!["u1".to_string()]));
    let processor = recording_processor(api, queue.clone(), resolver);

    let report = processor.process(&job_for(&reply, 0)).await.unwrap();
    assert_eq!(report.emitted, vec![NotificationType::Reply]);

    let jobs = queue.jobs.lock().unwrap();
    let job = &jobs[0];
    assert_eq!(job.author, ALICE.to_lowercase());
    assert_eq!(job.target_user_ids, None);
    assert_eq!(job.notification.title, "reply from @bob");
    assert_eq!(job.notification.body, "nice post");
    assert_eq!(job.notification.data.parent_id.as_deref(), Some(POST_ID));
    assert_eq!(
        job.notification.data.parent_address.as_deref(),
        Some(ALICE.to_lowercase().as_str())
    );
    assert_eq!(job.notification.data.actor_address, BOB.to_lowercase());
}

#[tokio::test]
async fn like_reaction_uses_parent_content() {
    let api = Arc::new(FakeApi::default());
    let post = alice_post();
    let like = comment(REPLY_ID, author(BOB, None, None), Some(POST_ID), "like");
    api.insert(post);
    api.insert(like.clone());
    let queue = Arc::new(RecordingQueue::default());
    let processor = recording_processor(api, queue.clone(), Arc::new(FixedResolver(vec![])));

    processor
        .process(&job_for(&like, COMMENT_TYPE_REACTION))
        .await
        .unwrap();

    let jobs = queue.jobs.lock().unwrap();
    assert_eq!(jobs.len(), 1);
    let notification = &jobs[0].notification;
    assert_eq!(notification.title, "liked by @0xB0B0...0B0B");
    assert_eq!(notification.body, "hello world");
    assert_eq!(notification.data.kind, NotificationType::Reaction);
    assert_eq!(notification.data.reaction_type.as_deref(), Some("like"));
}

#[tokio::test]
async fn zero_parent_from_api_counts_as_top_level() {
    let api = Arc::new(FakeApi::default());
    let raw = format!(
        r#"{{"id":"{POST_ID}","author":{{"address":"{ALICE}"}},"parentId":"0x{}","content":"gm","references":null}}"#,
        "0".repeat(64)
    );
    let post: Comment = serde_json::from_str(&raw).unwrap();
    assert!(post.is_top_level());
    api.insert(post.clone());
    let queue = Arc::new(RecordingQueue::default());
    let processor = recording_processor(api, queue.clone(), Arc::new(FixedResolver(vec!["u1".to_string()])));

    // Even a stale job claiming a reaction cannot produce one without a parent
    let report = processor
        .process(&job_for(&post, COMMENT_TYPE_REACTION))
        .await
        .unwrap();
    assert_eq!(report.emitted, vec![NotificationType::Post]);
}

#[tokio::test]
async fn mentions_are_sent_once_per_address() {
    let api = Arc::new(FakeApi::default());
    let mut post = alice_post();
    post.references = vec![
        ens_mention(BOB),
        farcaster_mention(&BOB.to_lowercase()),
        ens_mention(CAROL),
        Reference::Erc20 {
            address: "0x00000000000000000000000000000000000000ee".to_string(),
            symbol: Some("TKN".to_string()),
            name: None,
        },
    ];
    api.insert(post.clone());
    let queue = Arc::new(RecordingQueue::default());
    let processor = recording_processor(api, queue.clone(), Arc::new(FixedResolver(vec![])));

    let report = processor.process(&job_for(&post, 0)).await.unwrap();
    assert_eq!(
        report.emitted,
        vec![NotificationType::Mention, NotificationType::Mention]
    );

    let jobs = queue.jobs.lock().unwrap();
    let mut recipients: Vec<&str> = jobs.iter().map(|j| j.author.as_str()).collect();
    recipients.sort();
    let mut expected = vec![BOB.to_lowercase(), CAROL.to_lowercase()];
    expected.sort();
    assert_eq!(recipients, expected);
    for job in jobs.iter() {
        assert_eq!(job.notification.title, "@alice.eth mentioned you");
        assert_eq!(job.notification.data.parent_id, None);
        assert_eq!(job.notification.data.parent_address, None);
    }
}

#[tokio::test]
async fn subscriber_store_failure_only_degrades_fan_out() {
    let api = Arc::new(FakeApi::default());
    let mut post = alice_post();
    post.references = vec![ens_mention(BOB)];
    api.insert(post.clone());
    let queue = Arc::new(RecordingQueue::default());
    let processor = recording_processor(api, queue.clone(), Arc::new(BrokenResolver));

    let report = processor.process(&job_for(&post, 0)).await.unwrap();
    assert_eq!(report.emitted, vec![NotificationType::Mention]);
    assert_eq!(report.degraded.len(), 1);
    assert!(report.degraded[0].contains("connection refused"));
}

#[tokio::test]
async fn failed_mention_does_not_suppress_fan_out() {
    let api = Arc::new(FakeApi::default());
    let mut post = alice_post();
    post.references = vec![ens_mention(BOB)];
    api.insert(post.clone());
    let queue = Arc::new(RecordingQueue {
        reject: Some(NotificationType::Mention),
        ..Default::default()
    });
    let processor = recording_processor(api, queue.clone(), Arc::new(FixedResolver(vec!["u1".to_string()])));

    let err = processor.process(&job_for(&post, 0)).await.unwrap_err();
    assert!(matches!(err, JobError::Emission { failed: 1, .. }));

    // The post fan-out still went out
    let jobs = queue.jobs.lock().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].notification.data.kind, NotificationType::Post);
}

#[tokio::test]
async fn comment_is_retried_until_indexed() {
    let api = Arc::new(FakeApi::default());
    let post = alice_post();
    api.insert(post.clone());
    api.lag(POST_ID, 2);
    let queue = Arc::new(RecordingQueue::default());
    let processor = recording_processor(api.clone(), queue, Arc::new(FixedResolver(vec![])));

    processor.process(&job_for(&post, 0)).await.unwrap();
    assert_eq!(api.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn missing_comment_fails_the_job() {
    let api = Arc::new(FakeApi::default());
    let queue = Arc::new(RecordingQueue::default());
    let processor = recording_processor(api.clone(), queue, Arc::new(FixedResolver(vec![])));

    let job = CommentProcessingJob {
        comment_id: CommentId::new(POST_ID),
        chain_id: CHAIN_ID,
        content: String::new(),
        parent_id: None,
        comment_type: 0,
    };
    let err = processor.process(&job).await.unwrap_err();
    match err {
        JobError::CommentFetch { source, .. } => assert!(source.is_not_found()),
        other => panic!("expected CommentFetch, got {other:?}"),
    }
    // fast_fetch allows three attempts
    assert_eq!(api.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn missing_parent_fails_before_any_emission() {
    let api = Arc::new(FakeApi::default());
    let mut reply = comment(REPLY_ID, author(BOB, None, None), Some(POST_ID), "hi @carol");
    reply.references = vec![ens_mention(CAROL)];
    api.insert(reply.clone());
    let queue = Arc::new(RecordingQueue::default());
    let processor = recording_processor(api, queue.clone(), Arc::new(FixedResolver(vec![])));

    let err = processor.process(&job_for(&reply, 0)).await.unwrap_err();
    assert!(matches!(err, JobError::ParentFetch { .. }));
    assert!(queue.jobs.lock().unwrap().is_empty());
}
