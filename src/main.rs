use chrono::Local;
use clap::Parser;
use log::info;
use socialnet_realtime::http::UreqHttpClient;
use socialnet_realtime::notifications::notification_text;
use socialnet_realtime::transport::WebSocketTransportFactory;
use socialnet_realtime::types::User;
use socialnet_realtime::{
    ApiClient, AuthEvent, AuthLifecycle, Client, ClientConfig, ConversationReconciler,
    DesktopNotifier, NotificationAggregator,
};
use std::sync::Arc;
use tokio::sync::broadcast;

// Demo: connect to a running backend with an existing session cookie and
// log live traffic until Ctrl-C.
//
// Usage:
//   socialnet-realtime --cookie "session=..." --user-id <id>
//   socialnet-realtime --ws-url ws://localhost:80/api/ws --api-base http://localhost:80

#[derive(Parser, Debug)]
#[command(about = "SocialNet real-time client demo")]
struct Args {
    /// WebSocket endpoint
    #[arg(long, default_value = "ws://localhost:80/api/ws")]
    ws_url: String,

    /// REST base URL
    #[arg(long, default_value = "http://localhost:80")]
    api_base: String,

    /// Session cookie, e.g. "session=abcd"
    #[arg(long)]
    cookie: String,

    /// Id of the logged-in user
    #[arg(long)]
    user_id: String,

    /// Display name of the logged-in user
    #[arg(long, default_value = "me")]
    username: String,
}

/// Desktop notifications for a terminal demo: just log them.
struct LogNotifier;

#[async_trait::async_trait]
impl DesktopNotifier for LogNotifier {
    async fn notify(&self, title: &str, body: &str) -> anyhow::Result<()> {
        info!(target: "Desktop", "{title}: {body}");
        Ok(())
    }
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    rt.block_on(async {
        let local_user = User {
            id: args.user_id.clone(),
            username: args.username.clone(),
            ..User::unknown(args.user_id.clone())
        };

        let api = Arc::new(ApiClient::new(
            Arc::new(UreqHttpClient::new()),
            args.api_base.clone(),
            args.cookie.clone(),
        ));

        let config = ClientConfig {
            ws_url: args.ws_url.clone(),
            ..ClientConfig::default()
        };
        let client = Client::new(config, Arc::new(WebSocketTransportFactory::new(args.ws_url)));

        let reconciler = ConversationReconciler::new(api.clone(), local_user);
        let _reconciler_pump = reconciler.attach(&client.event_bus);

        let aggregator = NotificationAggregator::new(api, Arc::new(LogNotifier));
        let _aggregator_pump = aggregator.attach(&client.event_bus);

        // The demo owns its own auth signal; a real embedding wires this to
        // the authentication collaborator.
        let (auth_tx, auth_rx) = broadcast::channel(4);
        let lifecycle = AuthLifecycle::attach(client.clone(), auth_rx, false);
        let _ = auth_tx.send(AuthEvent::LoggedIn);

        if let Err(e) = reconciler.load_conversations().await {
            info!(target: "Demo", "Conversation fetch failed: {e} (continuing)");
        }
        if let Err(e) = aggregator.fetch_notifications().await {
            info!(target: "Demo", "Notification fetch failed: {e} (continuing)");
        }

        for conversation in reconciler.conversations().await {
            let names: Vec<String> = conversation
                .participants
                .iter()
                .map(|p| p.display_name())
                .collect();
            info!(target: "Demo", "Conversation {}: {}", conversation.id, names.join(", "));
        }
        for notification in aggregator.notifications().await {
            info!(target: "Demo", "{}", notification_text(&notification));
        }
        info!(target: "Demo", "{} unread notifications", aggregator.unread_count().await);

        info!(target: "Demo", "Listening for live traffic, Ctrl-C to exit...");
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for ctrl-c");

        let _ = auth_tx.send(AuthEvent::LoggedOut);
        // Give the lifecycle task a moment to process the logout.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        lifecycle.detach();
        info!(target: "Demo", "Shut down.");
    });
}
