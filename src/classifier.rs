use crate::types::{LiveFrame, Notification, User};
use chrono::{DateTime, Utc};
use log::debug;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashSet;

/// Type tags routed to the live message stream.
const CHAT_TAGS: &[&str] = &["private_message", "group_message"];

/// Type tags routed to the notification stream.
static NOTIFICATION_TAGS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "LIKE",
        "DISLIKE",
        "COMMENT",
        "COMMENT_LIKE",
        "COMMENT_DISLIKE",
        "ASK_FOLLOW",
        "INVITE_GROUP",
        "NEW_FOLLOWER",
        "EVENT_GROUP",
    ]
    .into_iter()
    .collect()
});

/// The classifier's output: one inbound payload normalized into a strict,
/// fully-typed structure, assigned to one of the two streams.
#[derive(Debug)]
pub enum ClassifiedFrame {
    Chat(LiveFrame),
    Notification(Box<Notification>),
}

/// Parse and classify a raw inbound payload.
///
/// Returns `None` for anything that should not reach the buffers: malformed
/// JSON, unrecognized type tags, and frames whose id, sender or conversation
/// cannot be determined. Dropping is silent apart from a debug log; a bad
/// frame never takes the stream down.
pub fn classify(raw: &str) -> Option<ClassifiedFrame> {
    let mut value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            debug!(target: "Classifier", "Dropping unparseable frame: {e}");
            return None;
        }
    };

    let obj = match value.as_object_mut() {
        Some(obj) => obj,
        None => {
            debug!(target: "Classifier", "Dropping non-object frame");
            return None;
        }
    };

    let kind = match obj.get("type").and_then(Value::as_str) {
        Some(kind) => kind.to_string(),
        None => {
            debug!(target: "Classifier", "Dropping frame without a type tag");
            return None;
        }
    };

    if CHAT_TAGS.contains(&kind.as_str()) {
        return classify_chat(&kind, obj).map(ClassifiedFrame::Chat);
    }

    if NOTIFICATION_TAGS.contains(kind.as_str()) {
        // Every frame entering a buffer needs a non-empty id.
        if !has_nonempty_str(obj, "id") {
            obj.insert("id".to_string(), Value::String(local_id()));
        }
        return match serde_json::from_value::<Notification>(value) {
            Ok(n) => Some(ClassifiedFrame::Notification(Box::new(n))),
            Err(e) => {
                debug!(target: "Classifier", "Dropping malformed {kind} notification: {e}");
                None
            }
        };
    }

    debug!(target: "Classifier", "Dropping frame with unrecognized type tag '{kind}'");
    None
}

fn classify_chat(kind: &str, obj: &serde_json::Map<String, Value>) -> Option<LiveFrame> {
    let conversation_id = str_field(obj, &["convId", "conversationId"])?.to_string();

    // The push path sends a full sender object; older frames carry a bare
    // senderId. Either works, nothing resolvable means drop.
    let sender = match obj.get("sender") {
        Some(v) if v.is_object() => match serde_json::from_value::<User>(v.clone()) {
            Ok(user) if !user.id.is_empty() => user,
            _ => {
                debug!(target: "Classifier", "Dropping chat frame with malformed sender");
                return None;
            }
        },
        _ => match str_field(obj, &["senderId", "sender_id"]) {
            Some(id) => User::unknown(id),
            None => {
                debug!(target: "Classifier", "Dropping chat frame without a sender");
                return None;
            }
        },
    };

    let id = str_field(obj, &["id"])
        .map(str::to_string)
        .unwrap_or_else(local_id);

    let timestamp = obj
        .get("time")
        .or_else(|| obj.get("timestamp"))
        .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v.clone()).ok());

    Some(LiveFrame {
        kind: kind.to_string(),
        id,
        conversation_id,
        sender,
        content: str_field(obj, &["content"]).unwrap_or_default().to_string(),
        image_url: str_field(obj, &["imageUrl", "image_url"]).map(str::to_string),
        timestamp,
    })
}

fn str_field<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

fn has_nonempty_str(obj: &serde_json::Map<String, Value>, key: &str) -> bool {
    obj.get(key)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

/// Locally-unique id for frames that arrive without one. Unstable across
/// reconnects; consumers must not treat it as a server identity.
fn local_id() -> String {
    format!(
        "local-{}-{:04x}",
        Utc::now().timestamp_millis(),
        rand::random::<u16>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NotificationPayload;

    #[test]
    fn malformed_json_is_dropped() {
        assert!(classify("{not json").is_none());
        assert!(classify("42").is_none());
    }

    #[test]
    fn unrecognized_tag_is_dropped() {
        let raw = r#"{"type":"presence","id":"x","convId":"c1"}"#;
        assert!(classify(raw).is_none());
    }

    #[test]
    fn private_message_with_sender_object() {
        let raw = r#"{
            "type": "private_message",
            "id": "m-1",
            "convId": "c-9",
            "content": "hello",
            "sender": {"id": "u-2", "username": "ana", "first_name": "Ana", "last_name": "Gil", "profile_pic": "/ana.png"},
            "time": "2025-06-01T10:00:00Z"
        }"#;
        match classify(raw) {
            Some(ClassifiedFrame::Chat(frame)) => {
                assert_eq!(frame.id, "m-1");
                assert_eq!(frame.conversation_id, "c-9");
                assert_eq!(frame.sender.id, "u-2");
                assert_eq!(frame.sender.display_name(), "Ana Gil");
                assert!(frame.timestamp.is_some());
            }
            other => panic!("expected chat frame, got {other:?}"),
        }
    }

    #[test]
    fn chat_frame_without_conversation_is_dropped() {
        let raw = r#"{"type":"private_message","id":"m-1","content":"x","senderId":"u-2"}"#;
        assert!(classify(raw).is_none());
    }

    #[test]
    fn chat_frame_without_sender_is_dropped() {
        let raw = r#"{"type":"group_message","id":"m-1","convId":"c-1","content":"x"}"#;
        assert!(classify(raw).is_none());
    }

    #[test]
    fn missing_id_gets_a_local_one() {
        let raw = r#"{"type":"private_message","convId":"c-1","content":"x","senderId":"u-2"}"#;
        match classify(raw) {
            Some(ClassifiedFrame::Chat(frame)) => {
                assert!(frame.id.starts_with("local-"));
            }
            other => panic!("expected chat frame, got {other:?}"),
        }
    }

    #[test]
    fn notification_push_is_parsed_into_typed_payload() {
        let raw = r#"{
            "type": "LIKE",
            "id": "n-1",
            "read": false,
            "created_at": "2025-06-01T10:00:00Z",
            "data": {
                "post_id": "p-1",
                "content": "nice post",
                "user": {"id": "u-3", "firstname": "Bob", "lastname": "Roy"}
            }
        }"#;
        match classify(raw) {
            Some(ClassifiedFrame::Notification(n)) => {
                assert_eq!(n.id, "n-1");
                assert!(!n.read);
                assert!(matches!(n.payload, NotificationPayload::Like(_)));
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn notification_without_id_is_normalized() {
        let raw = r#"{
            "type": "ASK_FOLLOW",
            "data": {"follower_id": "u-4", "sender": {"id": "u-4", "username": "eve"}}
        }"#;
        match classify(raw) {
            Some(ClassifiedFrame::Notification(n)) => {
                assert!(n.id.starts_with("local-"));
                assert!(matches!(n.payload, NotificationPayload::AskFollow(_)));
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }
}
