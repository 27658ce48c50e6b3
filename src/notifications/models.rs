// Notification job types — what the comment worker hands to delivery.
//
// Delivery itself (APNs/FCM) lives elsewhere; it only reads these payloads
// from the notification queue, so the serialized field names are the
// contract and stay camelCase.

use serde::{Deserialize, Serialize};

/// Job name used for every entry on the notification queue.
pub const NOTIFICATIONS_QUEUE_NAME: &str = "sendNotification";

/// Which relationship triggered the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Reaction,
    Reply,
    Mention,
    Post,
}

impl NotificationType {
    pub const ALL: [NotificationType; 4] = [
        NotificationType::Reaction,
        NotificationType::Reply,
        NotificationType::Mention,
        NotificationType::Post,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Reaction => "reaction",
            NotificationType::Reply => "reply",
            NotificationType::Mention => "mention",
            NotificationType::Post => "post",
        }
    }

    pub fn from_str_opt(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == raw)
    }

    /// Title used when a notification arrives with an empty one.
    pub fn default_title(&self) -> &'static str {
        match self {
            NotificationType::Reaction => "New reaction",
            NotificationType::Reply => "New reply",
            NotificationType::Mention => "New mention",
            NotificationType::Post => "New post",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing data the client app uses to open the right screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction_type: Option<String>,
    pub comment_id: String,
    /// Serialized as `null` for top-level comments.
    #[serde(default)]
    pub parent_id: Option<String>,
    pub chain_id: u64,
    pub actor_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: NotificationData,
}

/// One entry on the notification queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationJob {
    /// Recipient identity key (an address). For post fan-out this is the
    /// posting author and the recipients are in `target_user_ids`.
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user_ids: Option<Vec<String>>,
    pub notification: Notification,
}
