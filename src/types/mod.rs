pub mod frame;
pub mod message;
pub mod notification;
pub mod user;

pub use frame::LiveFrame;
pub use message::{
    ChatMessage, Conversation, ConversationPreview, DeliveryStatus, MessageRecord,
    OutboundMessage, TEMP_ID_PREFIX,
};
pub use notification::{Notification, NotificationPayload};
pub use user::User;
