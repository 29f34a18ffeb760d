use crate::types::{LiveFrame, Notification};
use std::sync::Arc;
use tokio::sync::broadcast;

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

/// Emitted when the connection manager reaches `Connected`.
#[derive(Debug, Clone)]
pub struct Connected;

/// Emitted when the connection is lost or closed.
#[derive(Debug, Clone)]
pub struct Disconnected;

// Macro to generate EventBus fields and constructor
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus that provides separate broadcast channels for each event type.
        /// The connection manager publishes here; the reconciler and the
        /// notification aggregator subscribe to the channels they care about.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    // Connection events
    (connected, Arc<Connected>),
    (disconnected, Arc<Disconnected>),

    // Classified live traffic
    (chat_message, Arc<LiveFrame>),
    (notification, Arc<Notification>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
