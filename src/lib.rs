// ecp-notify: push notifications for on-chain comments
//
// This is the library root. Each module corresponds to a stage of the
// CommentAdded -> notification pipeline.

pub mod chain;
pub mod config;
pub mod db;
pub mod ecp;
pub mod error;
pub mod notifications;
pub mod pipeline;
pub mod status;
pub mod subscribers;
