// Error taxonomy for the pipeline.
//
// Persistence and CLI code use anyhow. The types here exist where callers
// need to branch on the failure: only NotFound is retried by the comment
// fetch, a StoreError degrades one step, and a JobError fails the job.

use thiserror::Error;

/// Chain RPC / polling failure. Logged by the event source, never fatal.
#[derive(Debug, Error)]
#[error("{method} failed: {message}")]
pub struct TransportError {
    pub method: &'static str,
    pub message: String,
}

impl TransportError {
    pub fn new(method: &'static str, err: impl std::fmt::Display) -> Self {
        Self {
            method,
            message: err.to_string(),
        }
    }
}

/// Failure fetching a comment from the read API.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The indexer has not (yet) ingested the comment.
    #[error("comment {comment_id} not found on chain {chain_id}")]
    NotFound { chain_id: u64, comment_id: String },

    #[error("comment API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("comment API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode comment response: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// A raw notification payload the sanitizer cannot repair.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("notification payload is not valid JSON: {0}")]
    Json(String),

    #[error("unknown notification type: {0}")]
    UnknownType(String),

    #[error("notification is missing required field `{0}`")]
    MissingField(&'static str),
}

/// Subscription store query failure.
#[derive(Debug, Error)]
#[error("subscription store query failed: {0}")]
pub struct StoreError(pub String);

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        Self(format!("{err:#}"))
    }
}

/// Outcome that fails a Comment Processing Job and hands it back to the queue.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to resolve comment {comment_id}: {source}")]
    CommentFetch {
        comment_id: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to resolve parent comment {parent_id}: {source}")]
    ParentFetch {
        parent_id: String,
        #[source]
        source: FetchError,
    },

    /// One or more required notifications could not be queued. Every branch
    /// still ran; this only reports the failures afterwards.
    #[error("{failed} notification(s) could not be queued: {first}")]
    Emission { failed: usize, first: String },
}
