// Notification payload sanitizer.
//
// Every notification the worker queues passes through `sanitize`, which
// only repairs: it never fails. Raw payloads coming from outside the type
// system go through `parse_notification`, or `parse_notification_job` for
// whole queue entries read back off the notification queue; both reject
// what can't be repaired.

use serde_json::Value;

use super::models::{Notification, NotificationData, NotificationJob, NotificationType};
use crate::error::ValidationError;

/// Maximum title length in characters, including any "..." suffix.
pub const MAX_TITLE_CHARS: usize = 100;

/// Maximum body length in characters, including any "..." suffix.
pub const MAX_BODY_CHARS: usize = 500;

/// Maximum reaction label length. Reactions are short words or emoji.
pub const MAX_REACTION_CHARS: usize = 32;

/// Normalize a notification so delivery can send it as-is.
pub fn sanitize(notification: Notification) -> Notification {
    let Notification { title, body, data } = notification;

    let mut title = truncate_chars(&clean_title(&title), MAX_TITLE_CHARS);
    if title.is_empty() {
        title = data.kind.default_title().to_string();
    }

    Notification {
        title,
        body: truncate_chars(&clean_body(&body), MAX_BODY_CHARS),
        data: normalize_data(data),
    }
}

/// Validate and sanitize a raw JSON notification payload.
pub fn parse_notification(raw: &str) -> Result<Notification, ValidationError> {
    notification_from_value(parse_json(raw)?)
}

/// Validate a queued notification entry and sanitize the notification in it.
pub fn parse_notification_job(raw: &str) -> Result<NotificationJob, ValidationError> {
    let mut value = parse_json(raw)?;
    let obj = value
        .as_object_mut()
        .ok_or_else(|| ValidationError::Json("expected an object".to_string()))?;

    let author = obj
        .get("author")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or(ValidationError::MissingField("author"))?
        .to_string();

    let target_user_ids = match obj.remove("targetUserIds") {
        None | Some(Value::Null) => None,
        Some(ids) => Some(
            serde_json::from_value::<Vec<String>>(ids)
                .map_err(|e| ValidationError::Json(e.to_string()))?,
        ),
    };

    let notification = obj
        .remove("notification")
        .ok_or(ValidationError::MissingField("notification"))?;

    Ok(NotificationJob {
        author,
        target_user_ids,
        notification: notification_from_value(notification)?,
    })
}

fn parse_json(raw: &str) -> Result<Value, ValidationError> {
    serde_json::from_str(raw).map_err(|e| ValidationError::Json(e.to_string()))
}

fn notification_from_value(value: Value) -> Result<Notification, ValidationError> {
    let data = value
        .get("data")
        .filter(|d| d.is_object())
        .ok_or(ValidationError::MissingField("data"))?;

    let kind = data
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingField("data.type"))?;
    if NotificationType::from_str_opt(kind).is_none() {
        return Err(ValidationError::UnknownType(kind.to_string()));
    }

    for (field, path) in [
        ("commentId", "data.commentId"),
        ("actorAddress", "data.actorAddress"),
    ] {
        let present = data
            .get(field)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        if !present {
            return Err(ValidationError::MissingField(path));
        }
    }

    let mut value = value;
    // Missing title/body are repaired rather than rejected.
    if let Some(obj) = value.as_object_mut() {
        obj.entry("title").or_insert_with(|| Value::String(String::new()));
        obj.entry("body").or_insert_with(|| Value::String(String::new()));
    }

    let notification: Notification =
        serde_json::from_value(value).map_err(|e| ValidationError::Json(e.to_string()))?;
    Ok(sanitize(notification))
}

/// Truncate to at most `max_chars` characters, ending in "..." if truncated.
///
/// The suffix counts towards the limit, so truncated output is itself
/// within the limit and a second pass leaves it alone.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", truncated.trim_end())
    }
}

// Titles are single-line: every control character becomes a space and runs
// of whitespace collapse.
fn clean_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// Bodies keep their line breaks.
fn clean_body(body: &str) -> String {
    body.chars()
        .filter(|c| *c == '\n' || !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

fn normalize_data(data: NotificationData) -> NotificationData {
    let normalize = |s: String| s.trim().to_lowercase();
    NotificationData {
        kind: data.kind,
        reaction_type: data
            .reaction_type
            .map(|r| truncate_chars(&clean_title(&r), MAX_REACTION_CHARS)),
        comment_id: normalize(data.comment_id),
        parent_id: data.parent_id.map(normalize),
        chain_id: data.chain_id,
        actor_address: normalize(data.actor_address),
        parent_address: data.parent_address.map(normalize),
    }
}
