use std::time::Duration;

/// Reconnection policy for the connection manager.
///
/// The observed production configuration is 5 attempts with a 1 s initial
/// delay doubling up to a 30 s ceiling; all three are tunable.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the Nth reconnect attempt (1-based):
    /// `min(initial_delay * 2^(n-1), max_delay)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self
            .initial_delay
            .saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX));
        delay.min(self.max_delay)
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:80/api/ws`.
    pub ws_url: String,
    pub reconnect: ReconnectPolicy,
    pub message_buffer_capacity: usize,
    pub notification_buffer_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:80/api/ws".to_string(),
            reconnect: ReconnectPolicy::default(),
            message_buffer_capacity: 100,
            notification_buffer_capacity: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_ceiling() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(5), Duration::from_secs(16));
        assert_eq!(policy.delay_for(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40), Duration::from_secs(30));
    }
}
