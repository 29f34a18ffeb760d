use super::user::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Prefix used for locally-created ids that have not been confirmed by the
/// server yet (optimistic messages and not-yet-created conversations).
pub const TEMP_ID_PREFIX: &str = "temp-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Sent optimistically, awaiting server confirmation.
    Sent,
    #[default]
    Delivered,
    Read,
    /// The send request failed; the entry stays visible for manual retry.
    Failed,
}

/// A chat message as displayed in a conversation view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender: User,
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: DeliveryStatus,
}

impl ChatMessage {
    pub fn is_temporary(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }
}

/// A message record as the REST history endpoint returns it. The sender is
/// an id only; profile data comes from the conversation's participant list.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "senderId", alias = "sender_id")]
    pub sender: String,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "imageUrl", alias = "image")]
    pub image_url: Option<String>,
    #[serde(default, alias = "conversationId")]
    pub conversation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationPreview {
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub participants: Vec<User>,
    #[serde(default, alias = "lastMessage")]
    pub last_message: Option<ConversationPreview>,
}

impl Conversation {
    pub fn is_temporary(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }

    /// Order-independent participant identity: same cardinality and the same
    /// set of participant ids.
    pub fn same_participants(&self, other: &Conversation) -> bool {
        if self.participants.len() != other.participants.len() {
            return false;
        }
        let ids: HashSet<&str> = self.participants.iter().map(|p| p.id.as_str()).collect();
        other.participants.iter().all(|p| ids.contains(p.id.as_str()))
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_message.as_ref().and_then(|m| m.created_at)
    }
}

/// The outbound WebSocket payload for a message send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub content: String,
    pub conversation_id: String,
    pub receiver_ids: Vec<String>,
}
