// Notifications — payload types, text formatting, and the sanitizer.
//
// The worker builds notifications from resolved comments; delivery reads
// them off the notification queue. Nothing here does I/O.

pub mod format;
pub mod models;
pub mod sanitize;

pub use models::{
    Notification, NotificationData, NotificationJob, NotificationType, NOTIFICATIONS_QUEUE_NAME,
};
pub use sanitize::sanitize;
