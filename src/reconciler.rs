use crate::api::{ApiClient, ImageAttachment};
use crate::error::ApiError;
use crate::events::EventBus;
use crate::types::{
    ChatMessage, Conversation, ConversationPreview, DeliveryStatus, LiveFrame, MessageRecord,
    TEMP_ID_PREFIX, User,
};
use chrono::Utc;
use dashmap::DashMap;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

/// A locally-initiated send awaiting server confirmation, keyed by its
/// temporary message id. Consulted and cleared exactly once when the server
/// responds; kept alive on failure so the user can retry.
#[derive(Debug, Clone)]
struct PendingSend {
    conversation_id: String,
    receivers: Vec<String>,
    content: String,
    image: Option<ImageAttachment>,
}

#[derive(Default)]
struct ReconcilerState {
    conversations: Vec<Conversation>,
    active_conversation: Option<String>,
    /// Message view for the active conversation, sorted by timestamp
    /// ascending.
    messages: Vec<ChatMessage>,
    /// Dedup set: ids already represented in the view.
    processed_ids: HashSet<String>,
    pending_sends: HashMap<String, PendingSend>,
    /// Bumped on every history fetch; a response that comes back under an
    /// older generation is stale and gets discarded.
    fetch_generation: u64,
    error: Option<String>,
}

/// Merges three sources into one duplicate-free, chronologically sorted
/// view of conversations and of the active conversation's messages: REST
/// history, optimistic local sends, and live frames from the socket.
pub struct ConversationReconciler {
    api: Arc<ApiClient>,
    local_user: User,
    state: Mutex<ReconcilerState>,
    profile_cache: DashMap<String, User>,
}

impl ConversationReconciler {
    pub fn new(api: Arc<ApiClient>, local_user: User) -> Arc<Self> {
        Arc::new(Self {
            api,
            local_user,
            state: Mutex::new(ReconcilerState::default()),
            profile_cache: DashMap::new(),
        })
    }

    /// Subscribe to the live chat-frame channel. Returns the pump task
    /// handle; the task ends when the bus is dropped.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> tokio::task::JoinHandle<()> {
        let mut rx = bus.chat_message.subscribe();
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(frame) => this.ingest_frame(&frame).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(target: "Reconciler", "Subscriber lagged, {n} live frames dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.lock().await.conversations.clone()
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().await.messages.clone()
    }

    pub async fn active_conversation(&self) -> Option<String> {
        self.state.lock().await.active_conversation.clone()
    }

    /// The last fetch/send error, kept alongside whatever data already
    /// loaded; the view is never blanked on failure.
    pub async fn error(&self) -> Option<String> {
        self.state.lock().await.error.clone()
    }

    /// Fetch the conversation list and merge it with local temporary
    /// conversations. A server row with the same participant set absorbs
    /// the temporary one; the server id wins.
    pub async fn load_conversations(&self) -> Result<(), ApiError> {
        let fetched = match self.api.conversations().await {
            Ok(fetched) => fetched,
            Err(e) => {
                self.state.lock().await.error = Some(e.to_string());
                return Err(e);
            }
        };

        let mut state = self.state.lock().await;
        let mut merged = fetched;
        let temps: Vec<Conversation> = state
            .conversations
            .iter()
            .filter(|c| c.is_temporary())
            .filter(|temp| !merged.iter().any(|srv| srv.same_participants(temp)))
            .cloned()
            .collect();
        merged.extend(temps);
        sort_conversations(&mut merged);

        // If the active conversation was temporary and just got absorbed,
        // follow the server id so the open view stays attached to one row.
        let mut adopted: Option<(String, String)> = None;
        if let Some(active_id) = state.active_conversation.clone()
            && active_id.starts_with(TEMP_ID_PREFIX)
            && let Some(temp) = state.conversations.iter().find(|c| c.id == active_id)
            && let Some(server) = merged
                .iter()
                .find(|c| !c.is_temporary() && c.same_participants(temp))
        {
            adopted = Some((active_id, server.id.clone()));
        }

        state.conversations = merged;
        if let Some((temp_id, server_id)) = adopted {
            adopt_conversation_id(&mut state, &temp_id, &server_id);
        }
        state.error = None;
        Ok(())
    }

    /// Create a local-only conversation with the given participants and make
    /// it active. Returns the id of the conversation to use: an existing one
    /// when the participant set is already known, a fresh `temp-` id
    /// otherwise. The temporary row is collapsed into the server row once
    /// the server id is known.
    pub async fn start_conversation(&self, others: Vec<User>) -> String {
        let mut participants = others;
        if !participants.iter().any(|p| p.id == self.local_user.id) {
            participants.push(self.local_user.clone());
        }
        let conversation = Conversation {
            id: temp_id(),
            participants,
            last_message: None,
        };

        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .conversations
            .iter()
            .find(|c| c.same_participants(&conversation))
        {
            return existing.id.clone();
        }
        let id = conversation.id.clone();
        state.conversations.insert(0, conversation);
        state.active_conversation = Some(id.clone());
        state.messages.clear();
        state.processed_ids.clear();
        id
    }

    /// Make a conversation active and fetch its history. An empty id clears
    /// the view. A history response that arrives after the user has moved on
    /// to another conversation is discarded, not applied.
    pub async fn select_conversation(self: &Arc<Self>, id: &str) -> Result<(), ApiError> {
        if id.is_empty() {
            let mut state = self.state.lock().await;
            state.active_conversation = None;
            state.messages.clear();
            state.processed_ids.clear();
            return Ok(());
        }

        let generation = {
            let mut state = self.state.lock().await;
            state.active_conversation = Some(id.to_string());
            state.messages.clear();
            state.processed_ids.clear();
            state.fetch_generation += 1;
            state.fetch_generation
        };

        // A local-only conversation has no server history yet.
        if id.starts_with(TEMP_ID_PREFIX) {
            return Ok(());
        }

        let fetched = self.api.messages(id).await;

        let mut state = self.state.lock().await;
        if state.fetch_generation != generation || state.active_conversation.as_deref() != Some(id)
        {
            debug!(target: "Reconciler", "Discarding stale history response for conversation {id}");
            return Ok(());
        }

        match fetched {
            Ok(records) => {
                let participants = state
                    .conversations
                    .iter()
                    .find(|c| c.id == id)
                    .map(|c| c.participants.clone())
                    .unwrap_or_default();

                let mut unresolved: HashSet<String> = HashSet::new();
                let mut messages: Vec<ChatMessage> = records
                    .into_iter()
                    .map(|record| {
                        self.record_to_message(record, id, &participants, &mut unresolved)
                    })
                    .collect();
                sort_messages(&mut messages);
                state.processed_ids = messages.iter().map(|m| m.id.clone()).collect();
                state.messages = messages;
                state.error = None;
                drop(state);

                for user_id in unresolved {
                    self.spawn_resolve(user_id);
                }
                Ok(())
            }
            Err(e) => {
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Send a message: an optimistic entry with a temporary id appears in
    /// chronological position immediately, then the network request runs.
    /// On success the entry is swapped to its server identity with status
    /// `Delivered`; on failure it flips to `Failed` in place and stays
    /// visible for [`ConversationReconciler::retry_message`].
    pub async fn send_message(
        self: &Arc<Self>,
        conversation_id: &str,
        content: &str,
        image: Option<ImageAttachment>,
    ) -> Result<(), ApiError> {
        let temp = temp_id();
        let optimistic = ChatMessage {
            id: temp.clone(),
            conversation_id: conversation_id.to_string(),
            sender: self.local_user.clone(),
            content: content.to_string(),
            image_url: None,
            created_at: Utc::now(),
            status: DeliveryStatus::Sent,
        };

        {
            let mut state = self.state.lock().await;
            let receivers: Vec<String> = state
                .conversations
                .iter()
                .find(|c| c.id == conversation_id)
                .map(|c| {
                    c.participants
                        .iter()
                        .filter(|p| p.id != self.local_user.id)
                        .map(|p| p.id.clone())
                        .collect()
                })
                .unwrap_or_default();

            state.processed_ids.insert(temp.clone());
            if state.active_conversation.as_deref() == Some(conversation_id) {
                state.messages.push(optimistic);
                sort_messages(&mut state.messages);
            }
            state.pending_sends.insert(
                temp.clone(),
                PendingSend {
                    conversation_id: conversation_id.to_string(),
                    receivers,
                    content: content.to_string(),
                    image,
                },
            );
        }

        self.complete_send(&temp).await
    }

    /// Re-issue the network request for a message whose send failed.
    pub async fn retry_message(self: &Arc<Self>, temp_id: &str) -> Result<(), ApiError> {
        {
            let mut state = self.state.lock().await;
            if !state.pending_sends.contains_key(temp_id) {
                debug!(target: "Reconciler", "No pending send for {temp_id}, nothing to retry");
                return Ok(());
            }
            if let Some(m) = state.messages.iter_mut().find(|m| m.id == temp_id) {
                m.status = DeliveryStatus::Sent;
            }
        }
        self.complete_send(temp_id).await
    }

    async fn complete_send(self: &Arc<Self>, temp_id: &str) -> Result<(), ApiError> {
        let pending = {
            let state = self.state.lock().await;
            match state.pending_sends.get(temp_id) {
                Some(pending) => pending.clone(),
                None => return Ok(()),
            }
        };

        let result = self
            .api
            .send_message(
                &pending.receivers,
                &pending.content,
                pending.image.as_ref(),
                Some(&pending.conversation_id),
            )
            .await;

        // State may have moved while the request was in flight; everything
        // below re-validates under one lock scope.
        let mut state = self.state.lock().await;
        match result {
            Ok(record) => {
                // The swap happens exactly once per temporary id.
                if state.pending_sends.remove(temp_id).is_none() {
                    return Ok(());
                }
                let confirmed_at = record.created_at.unwrap_or_else(Utc::now);
                if let Some(m) = state.messages.iter_mut().find(|m| m.id == temp_id) {
                    m.id = record.id.clone();
                    m.created_at = confirmed_at;
                    m.status = DeliveryStatus::Delivered;
                }
                state.processed_ids.remove(temp_id);
                state.processed_ids.insert(record.id.clone());
                sort_messages(&mut state.messages);

                // A temporary conversation adopts the server id on its first
                // confirmed send.
                let mut final_conversation = pending.conversation_id.clone();
                if pending.conversation_id.starts_with(TEMP_ID_PREFIX)
                    && !record.conversation_id.is_empty()
                {
                    adopt_conversation_id(
                        &mut state,
                        &pending.conversation_id,
                        &record.conversation_id,
                    );
                    final_conversation = record.conversation_id.clone();
                }

                if let Some(c) = state
                    .conversations
                    .iter_mut()
                    .find(|c| c.id == final_conversation)
                {
                    c.last_message = Some(ConversationPreview {
                        content: pending.content.clone(),
                        created_at: Some(confirmed_at),
                    });
                }
                sort_conversations(&mut state.conversations);
                state.error = None;
                Ok(())
            }
            Err(e) => {
                if let Some(m) = state.messages.iter_mut().find(|m| m.id == temp_id) {
                    m.status = DeliveryStatus::Failed;
                }
                warn!(target: "Reconciler", "Send of {temp_id} failed: {e}");
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Ingest one live frame. Accepted into the active view only if the
    /// conversation matches, the sender is not the local user (the
    /// optimistic path already represents own sends) and the id has not
    /// been processed before. Everything happens in one lock scope so the
    /// dedup check and the insert cannot be interleaved.
    pub async fn ingest_frame(self: &Arc<Self>, frame: &LiveFrame) {
        let mut state = self.state.lock().await;

        if frame.sender.id == self.local_user.id {
            debug!(target: "Reconciler", "Suppressing self-sent frame {}", frame.id);
            return;
        }

        let arrived_at = frame.timestamp.unwrap_or_else(Utc::now);
        if let Some(c) = state
            .conversations
            .iter_mut()
            .find(|c| c.id == frame.conversation_id)
        {
            c.last_message = Some(ConversationPreview {
                content: frame.content.clone(),
                created_at: Some(arrived_at),
            });
        }
        sort_conversations(&mut state.conversations);

        let Some(active) = state.active_conversation.clone() else {
            return;
        };
        if frame.conversation_id != active {
            return;
        }
        if state.processed_ids.contains(&frame.id) {
            debug!(target: "Reconciler", "Ignoring duplicate frame {}", frame.id);
            return;
        }
        state.processed_ids.insert(frame.id.clone());

        let mut unresolved = None;
        let sender = if !frame.sender.username.is_empty() || !frame.sender.first_name.is_empty() {
            // The push path carries the full profile; remember it.
            self.profile_cache
                .insert(frame.sender.id.clone(), frame.sender.clone());
            frame.sender.clone()
        } else {
            self.lookup_sender(&state, &active, &frame.sender.id, &mut unresolved)
        };

        state.messages.push(ChatMessage {
            id: frame.id.clone(),
            conversation_id: active,
            sender,
            content: frame.content.clone(),
            image_url: frame.image_url.clone(),
            created_at: arrived_at,
            status: DeliveryStatus::Delivered,
        });
        sort_messages(&mut state.messages);
        drop(state);

        if let Some(user_id) = unresolved {
            self.spawn_resolve(user_id);
        }
    }

    fn record_to_message(
        &self,
        record: MessageRecord,
        conversation_id: &str,
        participants: &[User],
        unresolved: &mut HashSet<String>,
    ) -> ChatMessage {
        let sender = match participants.iter().find(|p| p.id == record.sender) {
            Some(user) => user.clone(),
            None => match self.profile_cache.get(&record.sender) {
                Some(user) => user.clone(),
                None => {
                    if !record.sender.is_empty() {
                        unresolved.insert(record.sender.clone());
                    }
                    User::unknown(&record.sender)
                }
            },
        };
        ChatMessage {
            id: record.id,
            conversation_id: conversation_id.to_string(),
            sender,
            content: record.content,
            image_url: record.image_url,
            created_at: record.created_at.unwrap_or_else(Utc::now),
            status: DeliveryStatus::Delivered,
        }
    }

    fn lookup_sender(
        &self,
        state: &ReconcilerState,
        conversation_id: &str,
        sender_id: &str,
        unresolved: &mut Option<String>,
    ) -> User {
        let participant = state
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .and_then(|c| c.participants.iter().find(|p| p.id == sender_id))
            .cloned();
        match participant {
            Some(user) => user,
            None => match self.profile_cache.get(sender_id) {
                Some(user) => user.clone(),
                None => {
                    *unresolved = Some(sender_id.to_string());
                    User::unknown(sender_id)
                }
            },
        }
    }

    /// Resolve a sender's profile in the background and patch the view once
    /// it arrives. Until then the sender displays as "Unknown".
    fn spawn_resolve(self: &Arc<Self>, user_id: String) {
        if user_id.is_empty() || self.profile_cache.contains_key(&user_id) {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            match this.api.user_profile(&user_id).await {
                Ok(user) => {
                    this.profile_cache.insert(user_id.clone(), user.clone());
                    let mut state = this.state.lock().await;
                    for m in &mut state.messages {
                        if m.sender.id == user_id {
                            m.sender = user.clone();
                        }
                    }
                }
                Err(e) => {
                    debug!(target: "Reconciler", "Profile lookup for {user_id} failed: {e}");
                }
            }
        });
    }
}

fn temp_id() -> String {
    format!(
        "{}{}-{:04x}",
        TEMP_ID_PREFIX,
        Utc::now().timestamp_millis(),
        rand::random::<u16>()
    )
}

/// Conversations sort by last activity descending; rows without a last
/// message sort as earliest possible, i.e. last.
fn sort_conversations(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
}

/// The displayed view is ordered by timestamp ascending, which is not the
/// same as buffer insertion order; re-sort after every mutation.
fn sort_messages(messages: &mut [ChatMessage]) {
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
}

fn adopt_conversation_id(state: &mut ReconcilerState, temp_id: &str, server_id: &str) {
    if let Some(pos) = state.conversations.iter().position(|c| c.id == temp_id) {
        if state.conversations.iter().any(|c| c.id == server_id) {
            // The server row already exists; never show the pair as two rows.
            state.conversations.remove(pos);
        } else {
            state.conversations[pos].id = server_id.to_string();
        }
    }
    if state.active_conversation.as_deref() == Some(temp_id) {
        state.active_conversation = Some(server_id.to_string());
    }
    for m in &mut state.messages {
        if m.conversation_id == temp_id {
            m.conversation_id = server_id.to_string();
        }
    }
    for p in state.pending_sends.values_mut() {
        if p.conversation_id == temp_id {
            p.conversation_id = server_id.to_string();
        }
    }
}
