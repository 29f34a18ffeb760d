use crate::buffer::BoundedBuffer;
use crate::classifier::{self, ClassifiedFrame};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::{Connected, Disconnected, EventBus};
use crate::transport::{Transport, TransportEvent, TransportFactory};
use crate::types::{LiveFrame, Notification, OutboundMessage};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::{Mutex, Notify, mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// The connection manager: sole owner of the single live socket.
///
/// One instance exists per authenticated session; it is created on session
/// start, injected into the reconciler and the aggregator, and destroyed on
/// session end. Everything else only reads the status, consumes buffer
/// snapshots or event-bus subscriptions, and calls [`Client::send`].
pub struct Client {
    config: ClientConfig,
    transport_factory: Arc<dyn TransportFactory>,
    transport: Mutex<Option<Arc<dyn Transport>>>,

    status_tx: watch::Sender<ConnectionStatus>,
    is_running: AtomicBool,
    expected_disconnect: AtomicBool,
    attempt: AtomicU32,
    last_error: std::sync::Mutex<Option<String>>,
    shutdown_notifier: Notify,

    pub event_bus: EventBus,
    message_buffer: Mutex<BoundedBuffer<Arc<LiveFrame>>>,
    notification_buffer: Mutex<BoundedBuffer<Arc<Notification>>>,
}

impl Client {
    pub fn new(config: ClientConfig, transport_factory: Arc<dyn TransportFactory>) -> Arc<Self> {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let message_buffer = BoundedBuffer::new(config.message_buffer_capacity);
        let notification_buffer = BoundedBuffer::new(config.notification_buffer_capacity);

        Arc::new(Self {
            config,
            transport_factory,
            transport: Mutex::new(None),
            status_tx,
            is_running: AtomicBool::new(false),
            expected_disconnect: AtomicBool::new(false),
            attempt: AtomicU32::new(0),
            last_error: std::sync::Mutex::new(None),
            shutdown_notifier: Notify::new(),
            event_bus: EventBus::new(),
            message_buffer: Mutex::new(message_buffer),
            notification_buffer: Mutex::new(notification_buffer),
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// A watch receiver over the connection status, for UI indicators.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// True while the run loop is active (connecting, connected, or waiting
    /// out a backoff delay).
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// The terminal error left behind when reconnection was exhausted.
    /// Cleared by the next `connect()`.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().expect("last_error lock").clone()
    }

    /// Consecutive connection failures so far.
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }

    /// Open the connection if none is open or opening. Idempotent: calling
    /// while connecting or connected is a no-op.
    pub fn connect(self: &Arc<Self>) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            debug!(target: "Client", "connect() called while already connecting or connected");
            return;
        }
        self.expected_disconnect.store(false, Ordering::Relaxed);
        self.attempt.store(0, Ordering::Relaxed);
        self.last_error.lock().expect("last_error lock").take();

        let client = self.clone();
        tokio::spawn(async move { client.run().await });
    }

    /// Close the socket and cancel any pending reconnect. Safe to call when
    /// already disconnected.
    pub async fn disconnect(&self) {
        info!(target: "Client", "Disconnecting client intentionally.");
        self.expected_disconnect.store(true, Ordering::Relaxed);
        self.shutdown_notifier.notify_waiters();
        if let Some(transport) = self.transport.lock().await.take() {
            transport.disconnect().await;
        }
        self.status_tx.send_replace(ConnectionStatus::Disconnected);
    }

    /// Transmit a message if connected. When not connected this is a
    /// reported no-op: it logs and returns `false`, callers may retry or
    /// drop.
    pub async fn send(&self, message: &OutboundMessage) -> bool {
        if !self.is_connected() {
            warn!(target: "Client", "Cannot send: not connected");
            return false;
        }
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target: "Client", "Failed to serialize outbound message: {e}");
                return false;
            }
        };
        let transport = self.transport.lock().await.clone();
        match transport {
            Some(transport) => match transport.send(&payload).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(target: "Client", "Send failed: {e}");
                    false
                }
            },
            None => {
                warn!(target: "Client", "Cannot send: not connected");
                false
            }
        }
    }

    /// Snapshot of the bounded live-message buffer, oldest first.
    pub async fn recent_messages(&self) -> Vec<Arc<LiveFrame>> {
        self.message_buffer.lock().await.snapshot()
    }

    /// Snapshot of the bounded notification buffer, oldest first.
    pub async fn recent_notifications(&self) -> Vec<Arc<Notification>> {
        self.notification_buffer.lock().await.snapshot()
    }

    async fn run(self: Arc<Self>) {
        let _guard = scopeguard::guard(self.clone(), |client| {
            client.is_running.store(false, Ordering::SeqCst);
            client.status_tx.send_replace(ConnectionStatus::Disconnected);
        });

        loop {
            if self.expected_disconnect.load(Ordering::Relaxed) {
                break;
            }
            self.status_tx.send_replace(ConnectionStatus::Connecting);

            match self.transport_factory.create_transport().await {
                Ok((transport, events)) => {
                    *self.transport.lock().await = Some(transport);
                    // A successful open resets the backoff counter.
                    self.attempt.store(0, Ordering::SeqCst);
                    self.status_tx.send_replace(ConnectionStatus::Connected);
                    let _ = self.event_bus.connected.send(Arc::new(Connected));
                    info!(target: "Client", "Connected to {}", self.config.ws_url);

                    self.read_loop(events).await;

                    *self.transport.lock().await = None;
                    self.status_tx.send_replace(ConnectionStatus::Disconnected);
                    let _ = self.event_bus.disconnected.send(Arc::new(Disconnected));

                    if self.expected_disconnect.load(Ordering::Relaxed) {
                        info!(target: "Client", "Disconnected as requested.");
                        break;
                    }
                    warn!(target: "Client", "Connection lost unexpectedly.");
                }
                Err(e) => {
                    warn!(target: "Client", "Failed to connect: {e}");
                }
            }

            let failures = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
            let policy = &self.config.reconnect;
            if failures >= policy.max_attempts {
                let err = ClientError::ReconnectExhausted { attempts: failures };
                error!(target: "Client", "{err}; manual connect() required");
                *self.last_error.lock().expect("last_error lock") = Some(err.to_string());
                break;
            }

            let delay = policy.delay_for(failures);
            info!(
                target: "Client",
                "Will attempt to reconnect in {:?} (attempt {}/{})",
                delay, failures, policy.max_attempts
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown_notifier.notified() => {
                    debug!(target: "Client", "Pending reconnect cancelled by disconnect()");
                    break;
                }
            }
        }
        info!(target: "Client", "Run loop has shut down.");
    }

    async fn read_loop(self: &Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_notifier.notified() => {
                    debug!(target: "Client", "Shutdown signaled in read loop.");
                    return;
                }
                event = events.recv() => {
                    match event {
                        Some(TransportEvent::FrameReceived(raw)) => self.handle_frame(&raw).await,
                        Some(TransportEvent::Connected) => {
                            debug!(target: "Client", "Transport connected event received");
                        }
                        Some(TransportEvent::Disconnected) | None => return,
                    }
                    // A disconnect may have been requested while this frame
                    // was being processed.
                    if self.expected_disconnect.load(Ordering::Relaxed) {
                        debug!(target: "Client", "Disconnect requested during frame processing.");
                        return;
                    }
                }
            }
        }
    }

    /// Classify one raw inbound payload and fan it out: append to the
    /// matching bounded buffer and publish on the event bus. Frames the
    /// classifier rejects never reach either.
    async fn handle_frame(&self, raw: &str) {
        match classifier::classify(raw) {
            Some(ClassifiedFrame::Chat(frame)) => {
                debug!(target: "Client/Recv", "Live {} in conversation {}", frame.kind, frame.conversation_id);
                let frame = Arc::new(frame);
                self.message_buffer.lock().await.push(frame.clone());
                let _ = self.event_bus.chat_message.send(frame);
            }
            Some(ClassifiedFrame::Notification(notification)) => {
                debug!(target: "Client/Recv", "Live notification {}", notification.id);
                let notification = Arc::new(*notification);
                self.notification_buffer.lock().await.push(notification.clone());
                let _ = self.event_bus.notification.send(notification);
            }
            None => {}
        }
    }
}
