//! Participant-runtime configuration: how to find the gateway, and how
//! aggressively to reconnect when it goes away.

use std::time::Duration;

/// Reconnect backoff for a network transport: exponential growth with
/// jitter, capped, with an optional attempt limit (`None` retries
/// forever, the default for a long-lived participant runtime).
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub max_attempts: Option<u32>,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 1.8,
            jitter_factor: 0.2,
        }
    }
}

impl ReconnectConfig {
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.base_delay;
        }
        let delay_ms = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32 - 1);
        let jitter = 1.0 + (fastrand::f64() - 0.5) * 2.0 * self.jitter_factor;
        let capped = (delay_ms * jitter).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        matches!(self.max_attempts, Some(max) if attempt >= max)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub gateway_url: String,
    pub space: String,
    pub token: String,
    pub reconnect: ReconnectConfig,
    pub request_timeout: Duration,
    pub max_pending_requests: usize,
    /// How often the transport pings the gateway to keep the connection
    /// alive and detect a half-open socket.
    pub heartbeat_interval: Duration,
    /// If no pong has been seen for this long, the connection is
    /// considered dead and torn down so the reconnect loop can take over.
    pub heartbeat_timeout: Duration,
}

impl ClientConfig {
    pub fn new(gateway_url: impl Into<String>, space: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            space: space.into(),
            token: token.into(),
            reconnect: ReconnectConfig::default(),
            request_timeout: Duration::from_secs(30),
            max_pending_requests: 256,
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(45),
        }
    }

    #[must_use]
    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn connect_url(&self) -> String {
        format!("{}/{}?token={}", self.gateway_url.trim_end_matches('/'), self.space, self.token)
    }
}
