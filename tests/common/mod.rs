#![allow(dead_code)]

use async_trait::async_trait;
use socialnet_realtime::http::{HttpClient, HttpRequest, HttpResponse};
use socialnet_realtime::notifications::DesktopNotifier;
use socialnet_realtime::transport::{Transport, TransportEvent, TransportFactory};
use socialnet_realtime::types::User;
use socialnet_realtime::{ApiClient, Client, ConnectionStatus};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn user(id: &str, username: &str) -> User {
    User {
        id: id.to_string(),
        username: username.to_string(),
        first_name: String::new(),
        last_name: String::new(),
        avatar: None,
    }
}

/// Build an `ApiClient` over a fresh mock HTTP client.
pub fn mock_api() -> (Arc<ApiClient>, Arc<MockHttpClient>) {
    let http = Arc::new(MockHttpClient::default());
    let api = Arc::new(ApiClient::new(
        http.clone(),
        "http://localhost:80",
        "session=test",
    ));
    (api, http)
}

struct Route {
    method: String,
    path: String,
    status: u16,
    body: String,
    delay: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub body: Vec<u8>,
}

/// Route-based scripted HTTP client. The first route whose method matches
/// and whose path is contained in the request URL wins; unmatched requests
/// get a 404.
#[derive(Default)]
pub struct MockHttpClient {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockHttpClient {
    pub fn respond(&self, method: &str, path: &str, status: u16, body: &str) {
        self.routes.lock().unwrap().push(Route {
            method: method.to_string(),
            path: path.to_string(),
            status,
            body: body.to_string(),
            delay: None,
        });
    }

    pub fn respond_with_delay(
        &self,
        method: &str,
        path: &str,
        status: u16,
        body: &str,
        delay: Duration,
    ) {
        self.routes.lock().unwrap().push(Route {
            method: method.to_string(),
            path: path.to_string(),
            status,
            body: body.to_string(),
            delay: Some(delay),
        });
    }

    pub fn clear_routes(&self) {
        self.routes.lock().unwrap().clear();
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method.clone(),
            url: request.url.clone(),
            body: request.body.clone().unwrap_or_default(),
        });

        let matched = {
            let routes = self.routes.lock().unwrap();
            routes
                .iter()
                .find(|r| r.method == request.method && request.url.contains(&r.path))
                .map(|r| (r.status, r.body.clone(), r.delay))
        };

        match matched {
            Some((status, body, delay)) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(HttpResponse {
                    status_code: status,
                    body: body.into_bytes(),
                })
            }
            None => Ok(HttpResponse {
                status_code: 404,
                body: b"no route".to_vec(),
            }),
        }
    }
}

/// A transport factory whose dial always fails. Records each attempt and
/// its (virtual) time for backoff assertions.
#[derive(Default)]
pub struct FailingTransportFactory {
    attempts: AtomicU32,
    times: Mutex<Vec<tokio::time::Instant>>,
}

impl FailingTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn attempt_times(&self) -> Vec<tokio::time::Instant> {
        self.times.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransportFactory for FailingTransportFactory {
    async fn create_transport(
        &self,
    ) -> anyhow::Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>)> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.times.lock().unwrap().push(tokio::time::Instant::now());
        Err(anyhow::anyhow!("connection refused"))
    }
}

/// A transport wired to an in-memory channel: tests inject inbound frames
/// and observe outbound payloads.
pub struct ChannelTransport {
    sent: Arc<Mutex<Vec<String>>>,
    event_tx: mpsc::Sender<TransportEvent>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, payload: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(payload.to_string());
        Ok(())
    }

    async fn disconnect(&self) {
        let _ = self.event_tx.send(TransportEvent::Disconnected).await;
    }
}

#[derive(Default)]
pub struct ChannelTransportFactory {
    sent: Arc<Mutex<Vec<String>>>,
    handles: Mutex<Vec<mpsc::Sender<TransportEvent>>>,
    connects: AtomicU32,
}

impl ChannelTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent_payloads(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    fn latest(&self) -> mpsc::Sender<TransportEvent> {
        self.handles
            .lock()
            .unwrap()
            .last()
            .expect("no transport created yet")
            .clone()
    }

    /// Inject an inbound frame on the current connection.
    pub async fn push_frame(&self, raw: &str) {
        self.latest()
            .send(TransportEvent::FrameReceived(raw.to_string()))
            .await
            .expect("client read loop gone");
    }

    /// Simulate an unexpected connection loss.
    pub async fn drop_connection(&self) {
        let _ = self.latest().send(TransportEvent::Disconnected).await;
    }
}

#[async_trait]
impl TransportFactory for ChannelTransportFactory {
    async fn create_transport(
        &self,
    ) -> anyhow::Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>)> {
        let (event_tx, event_rx) = mpsc::channel(100);
        self.handles.lock().unwrap().push(event_tx.clone());
        self.connects.fetch_add(1, Ordering::SeqCst);
        let transport = Arc::new(ChannelTransport {
            sent: self.sent.clone(),
            event_tx: event_tx.clone(),
        });
        let _ = event_tx.send(TransportEvent::Connected).await;
        Ok((transport, event_rx))
    }
}

/// Desktop notifier that records every popup body.
#[derive(Default)]
pub struct RecordingNotifier {
    bodies: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }
}

#[async_trait]
impl DesktopNotifier for RecordingNotifier {
    async fn notify(&self, _title: &str, body: &str) -> anyhow::Result<()> {
        self.bodies.lock().unwrap().push(body.to_string());
        Ok(())
    }
}

/// Desktop notifier that always fails, to prove ingestion is unaffected.
pub struct FailingNotifier;

#[async_trait]
impl DesktopNotifier for FailingNotifier {
    async fn notify(&self, _title: &str, _body: &str) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("permission denied"))
    }
}

/// Wait (bounded) until the client reports the given status.
pub async fn wait_for_status(client: &Arc<Client>, status: ConnectionStatus) {
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut rx = client.subscribe_status();
        loop {
            if *rx.borrow_and_update() == status {
                return;
            }
            rx.changed().await.expect("status channel closed");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for status {status:?}"));
}

/// Wait (bounded) until a predicate holds.
pub async fn wait_until(mut predicate: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(300), async {
        while !predicate() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}
