//! Real-time client subsystem for the SocialNet web application.
//!
//! Maintains the single persistent WebSocket connection with capped
//! exponential-backoff reconnection, classifies inbound frames into live
//! chat messages and notifications, keeps both in bounded buffers, and
//! reconciles REST-fetched history with optimistic local sends and live
//! deliveries into duplicate-free views for the UI layer.

pub mod api;
pub mod buffer;
pub mod classifier;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod lifecycle;
pub mod notifications;
pub mod reconciler;
pub mod transport;
pub mod types;

pub use api::{ApiClient, ImageAttachment};
pub use client::{Client, ConnectionStatus};
pub use config::{ClientConfig, ReconnectPolicy};
pub use error::{ApiError, ClientError};
pub use lifecycle::{AuthEvent, AuthLifecycle};
pub use notifications::{DesktopNotifier, NoopNotifier, NotificationAggregator};
pub use reconciler::ConversationReconciler;
