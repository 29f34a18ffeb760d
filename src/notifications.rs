use crate::api::ApiClient;
use crate::error::ApiError;
use crate::events::EventBus;
use crate::types::{Notification, NotificationPayload};
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

/// Best-effort OS-level popup hook. Absence of permission (or any failure)
/// must never affect the ingestion path, so implementations may fail freely;
/// the aggregator only logs.
#[async_trait]
pub trait DesktopNotifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> anyhow::Result<()>;
}

/// Default notifier that does nothing.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl DesktopNotifier for NoopNotifier {
    async fn notify(&self, _title: &str, _body: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct AggregatorState {
    /// Newest first.
    notifications: Vec<Notification>,
    unread_count: usize,
    error: Option<String>,
}

/// Merges REST-fetched notification history with live pushes and tracks the
/// unread count. Read state is the only client-side mutation and it is
/// applied confirm-then-apply: never before the server acknowledged it.
pub struct NotificationAggregator {
    api: Arc<ApiClient>,
    notifier: Arc<dyn DesktopNotifier>,
    state: Mutex<AggregatorState>,
}

impl NotificationAggregator {
    pub fn new(api: Arc<ApiClient>, notifier: Arc<dyn DesktopNotifier>) -> Arc<Self> {
        Arc::new(Self {
            api,
            notifier,
            state: Mutex::new(AggregatorState::default()),
        })
    }

    /// Subscribe to the live notification channel. Returns the pump task
    /// handle; the task ends when the bus is dropped.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> tokio::task::JoinHandle<()> {
        let mut rx = bus.notification.subscribe();
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(notification) => this.ingest(&notification).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(target: "Notifications", "Subscriber lagged, {n} pushes dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.clone()
    }

    pub async fn unread_count(&self) -> usize {
        self.state.lock().await.unread_count
    }

    pub async fn error(&self) -> Option<String> {
        self.state.lock().await.error.clone()
    }

    /// Replace local state with server history and recompute the unread
    /// count. On failure the previous data stays visible.
    pub async fn fetch_notifications(&self) -> Result<(), ApiError> {
        match self.api.notifications().await {
            Ok(notifications) => {
                let mut state = self.state.lock().await;
                state.unread_count = notifications.iter().filter(|n| !n.read).count();
                state.notifications = notifications;
                state.error = None;
                Ok(())
            }
            Err(e) => {
                self.state.lock().await.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Mark one notification read. The local flip happens only after the
    /// server confirmed; a failed PATCH leaves local state untouched.
    pub async fn mark_as_read(&self, id: &str) -> Result<(), ApiError> {
        if let Err(e) = self.api.mark_notification_read(id).await {
            warn!(target: "Notifications", "Failed to mark {id} read: {e}");
            self.state.lock().await.error = Some(e.to_string());
            return Err(e);
        }
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if let Some(n) = state.notifications.iter_mut().find(|n| n.id == id)
            && !n.read
        {
            n.read = true;
            state.unread_count = state.unread_count.saturating_sub(1);
        }
        state.error = None;
        Ok(())
    }

    /// Bulk variant of [`NotificationAggregator::mark_as_read`], same
    /// confirm-then-apply rule.
    pub async fn mark_all_as_read(&self) -> Result<(), ApiError> {
        if let Err(e) = self.api.mark_all_notifications_read().await {
            warn!(target: "Notifications", "Failed to mark all read: {e}");
            self.state.lock().await.error = Some(e.to_string());
            return Err(e);
        }
        let mut state = self.state.lock().await;
        for n in &mut state.notifications {
            n.read = true;
        }
        state.unread_count = 0;
        state.error = None;
        Ok(())
    }

    /// Ingest one live push: dedup by id, prepend, bump the unread count,
    /// then fire the desktop hook on its own task so it can never fail or
    /// delay ingestion.
    pub async fn ingest(self: &Arc<Self>, notification: &Notification) {
        {
            let mut state = self.state.lock().await;
            if state.notifications.iter().any(|n| n.id == notification.id) {
                debug!(target: "Notifications", "Ignoring duplicate notification {}", notification.id);
                return;
            }
            state.notifications.insert(0, notification.clone());
            if !notification.read {
                state.unread_count += 1;
            }
        }

        let notifier = self.notifier.clone();
        let body = notification_text(notification);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify("New notification", &body).await {
                debug!(target: "Notifications", "Desktop notification failed: {e}");
            }
        });
    }
}

/// Human-readable text for a notification. Total over every payload type;
/// unrecognized payloads get a generic line.
pub fn notification_text(notification: &Notification) -> String {
    let name = notification
        .payload
        .actor()
        .map(|user| user.display_name())
        .unwrap_or_else(|| "Someone".to_string());

    match &notification.payload {
        NotificationPayload::Like(_) => format!("{name} liked your post."),
        NotificationPayload::Dislike(_) => format!("{name} disliked your post."),
        NotificationPayload::Comment(_) => format!("{name} commented on your post."),
        NotificationPayload::CommentLike(_) => format!("{name} liked your comment."),
        NotificationPayload::CommentDislike(_) => format!("{name} disliked your comment."),
        NotificationPayload::AskFollow(_) => format!("{name} wants to follow you."),
        NotificationPayload::NewFollower(_) => format!("{name} started following you."),
        NotificationPayload::GroupInvite(d) => {
            format!("{name} invited you to join the group {}.", d.group_name)
        }
        NotificationPayload::GroupEvent(d) => {
            format!("{name} created an event in the group {}.", d.group_name)
        }
        NotificationPayload::Unknown => "New notification".to_string(),
    }
}
