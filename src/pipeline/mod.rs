// Pipeline — chain events in, notification jobs out.
//
// adapter:   CommentEvent -> processComment job (dedup by comment id)
// processor: processComment job -> reaction/reply/mention/post notifications
// worker:    queue consumer with retry, dead-letter, and stall recovery

pub mod adapter;
pub mod jobs;
pub mod processor;
pub mod worker;

pub use adapter::{subscribe, EventToJobAdapter, Subscription};
pub use jobs::{CommentProcessingJob, PROCESS_COMMENT_JOB};
pub use processor::{CommentProcessor, DbNotificationQueue, NotificationQueue, ProcessReport};
pub use worker::{JobOutcome, Worker, WorkerOptions};
