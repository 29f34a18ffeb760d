use super::user::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A notification as fetched over REST or pushed over the WebSocket.
///
/// The payload is a tagged union keyed by the server's `type` field; the
/// variant data lives under `data`. Unrecognized types deserialize to
/// [`NotificationPayload::Unknown`] rather than failing the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(default, alias = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default = "Utc::now", alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: NotificationPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum NotificationPayload {
    #[serde(rename = "LIKE")]
    Like(PostEventData),
    #[serde(rename = "DISLIKE")]
    Dislike(PostEventData),
    #[serde(rename = "COMMENT")]
    Comment(CommentEventData),
    #[serde(rename = "COMMENT_LIKE")]
    CommentLike(CommentEventData),
    #[serde(rename = "COMMENT_DISLIKE")]
    CommentDislike(CommentEventData),
    #[serde(rename = "ASK_FOLLOW")]
    AskFollow(FollowEventData),
    #[serde(rename = "NEW_FOLLOWER")]
    NewFollower(FollowEventData),
    #[serde(rename = "INVITE_GROUP")]
    GroupInvite(GroupInviteData),
    #[serde(rename = "EVENT_GROUP")]
    GroupEvent(GroupEventData),
    #[serde(other)]
    Unknown,
}

impl NotificationPayload {
    /// The user who triggered the notification, when the payload carries one.
    pub fn actor(&self) -> Option<&User> {
        match self {
            NotificationPayload::Like(d) | NotificationPayload::Dislike(d) => Some(&d.user),
            NotificationPayload::Comment(d)
            | NotificationPayload::CommentLike(d)
            | NotificationPayload::CommentDislike(d) => Some(&d.user),
            NotificationPayload::AskFollow(d) | NotificationPayload::NewFollower(d) => {
                Some(&d.sender)
            }
            NotificationPayload::GroupInvite(d) => Some(&d.user),
            NotificationPayload::GroupEvent(d) => Some(&d.user),
            NotificationPayload::Unknown => None,
        }
    }
}

/// Payload for LIKE / DISLIKE on a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostEventData {
    #[serde(default)]
    pub post_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub user: User,
}

/// Payload for COMMENT and the comment like/dislike variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentEventData {
    #[serde(default)]
    pub comment_id: String,
    #[serde(default)]
    pub post_id: String,
    #[serde(default)]
    pub content: String,
    pub user: User,
}

/// Payload for ASK_FOLLOW / NEW_FOLLOWER.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowEventData {
    #[serde(default)]
    pub follower_id: String,
    #[serde(alias = "user")]
    pub sender: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupInviteData {
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub group_bio: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupEventData {
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub event_title: String,
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub group_name: String,
    pub user: User,
}
