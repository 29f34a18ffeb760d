use super::user::User;
use chrono::{DateTime, Utc};

/// A normalized live chat frame, produced by the classifier from one inbound
/// WebSocket payload. Never persisted; consumed by the reconciler and the
/// bounded message buffer.
///
/// The `id` is always non-empty: frames that arrive without one get a
/// locally-generated id, which is unstable across reconnects.
#[derive(Debug, Clone)]
pub struct LiveFrame {
    /// Server-defined type tag (`private_message` or `group_message`).
    pub kind: String,
    pub id: String,
    pub conversation_id: String,
    pub sender: User,
    pub content: String,
    pub image_url: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}
