use crate::client::Client;
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::broadcast;

/// External authentication signal. The subsystem has no other coupling to
/// how authentication itself is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn,
    LoggedOut,
}

/// Ties the connection manager's lifetime to the authentication signals:
/// login connects, logout disconnects. Dropping the handle releases the
/// subscription and stops reacting to further signals.
pub struct AuthLifecycle {
    handle: tokio::task::JoinHandle<()>,
}

impl AuthLifecycle {
    pub fn attach(
        client: Arc<Client>,
        mut events: broadcast::Receiver<AuthEvent>,
        initially_authenticated: bool,
    ) -> Self {
        let handle = tokio::spawn(async move {
            if initially_authenticated {
                debug!(target: "Lifecycle", "Session already authenticated, connecting");
                client.connect();
            }
            loop {
                match events.recv().await {
                    Ok(AuthEvent::LoggedIn) => client.connect(),
                    Ok(AuthEvent::LoggedOut) => client.disconnect().await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(target: "Lifecycle", "Missed {n} auth events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Self { handle }
    }

    /// Stop reacting to auth signals. The connection itself is left as-is;
    /// call `disconnect()` on the client to also close it.
    pub fn detach(self) {
        self.handle.abort();
    }
}

impl Drop for AuthLifecycle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
