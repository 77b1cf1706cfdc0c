//! Client configuration

use std::time::Duration;

use crate::client::retry::RetryPolicy;

/// Signaling client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the relay (`ws://host:port/`)
    pub url: String,

    /// Limit for a single connection attempt
    pub connect_timeout: Duration,

    /// Retry policy for establishing the connection
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }

    /// Set the per-attempt connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the connection retry policy
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }
}
