mod common;

use common::{ChannelTransportFactory, FailingTransportFactory, wait_for_status, wait_until};
use socialnet_realtime::{Client, ClientConfig, ConnectionStatus};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts_with_exponential_delays() {
    let factory = FailingTransportFactory::new();
    let client = Client::new(ClientConfig::default(), factory.clone());

    client.connect();
    wait_until(|| !client.is_running()).await;

    // 5 consecutive failures, then no further automatic attempt.
    assert_eq!(factory.attempts(), 5);
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert!(!client.is_connected());
    let err = client.last_error().expect("terminal error expected");
    assert!(err.contains("5"), "unexpected terminal error: {err}");

    // The Nth reconnect is scheduled no earlier than 1s * 2^(N-1) after the
    // failure that triggered it.
    let times = factory.attempt_times();
    assert_eq!(times.len(), 5);
    for (i, expected_secs) in [1u64, 2, 4, 8].iter().enumerate() {
        let delta = times[i + 1] - times[i];
        assert!(
            delta >= Duration::from_secs(*expected_secs),
            "reconnect {} came after {delta:?}, expected at least {expected_secs}s",
            i + 1
        );
    }

    // Long after giving up, still nothing new was scheduled.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(factory.attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn backoff_delay_is_capped() {
    let policy = socialnet_realtime::ReconnectPolicy {
        max_attempts: 8,
        ..Default::default()
    };
    let config = ClientConfig {
        reconnect: policy,
        ..Default::default()
    };
    let factory = FailingTransportFactory::new();
    let client = Client::new(config, factory.clone());

    client.connect();
    wait_until(|| !client.is_running()).await;

    assert_eq!(factory.attempts(), 8);
    let times = factory.attempt_times();
    // Attempt 7 follows failure 6: 1s * 2^5 = 32s is clipped to the 30s cap.
    let delta = times[6] - times[5];
    assert!(delta >= Duration::from_secs(30));
    assert!(delta < Duration::from_secs(32));
}

#[tokio::test(start_paused = true)]
async fn manual_connect_after_exhaustion_starts_over() {
    let factory = FailingTransportFactory::new();
    let client = Client::new(ClientConfig::default(), factory.clone());

    client.connect();
    wait_until(|| !client.is_running()).await;
    assert_eq!(factory.attempts(), 5);
    assert!(client.last_error().is_some());

    // The terminal failure requires an explicit reconnect, which clears the
    // error and starts counting attempts from zero.
    client.connect();
    assert!(client.last_error().is_none());
    wait_until(|| !client.is_running()).await;
    assert_eq!(factory.attempts(), 10);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect() {
    let factory = FailingTransportFactory::new();
    let client = Client::new(ClientConfig::default(), factory.clone());

    client.connect();
    wait_until(|| factory.attempts() >= 1).await;

    client.disconnect().await;
    wait_until(|| !client.is_running()).await;
    let settled = factory.attempts();

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(factory.attempts(), settled);
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn successful_open_resets_the_attempt_counter() {
    let factory = ChannelTransportFactory::new();
    let client = Client::new(ClientConfig::default(), factory.clone());

    client.connect();
    wait_for_status(&client, ConnectionStatus::Connected).await;
    assert_eq!(client.reconnect_attempts(), 0);

    // An unexpected drop schedules a reconnect, and the reopened connection
    // starts again from a clean counter.
    factory.drop_connection().await;
    wait_until(|| factory.connect_count() >= 2).await;
    wait_for_status(&client, ConnectionStatus::Connected).await;
    assert_eq!(client.reconnect_attempts(), 0);

    client.disconnect().await;
    wait_until(|| !client.is_running()).await;
}
