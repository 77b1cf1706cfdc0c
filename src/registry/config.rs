//! Registry configuration

use std::time::Duration;

/// Configuration for the session registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Tear down a session after this long without negotiation activity
    pub idle_timeout: Duration,

    /// How often the cleanup task scans for idle sessions
    pub cleanup_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(15),
        }
    }
}

impl RegistryConfig {
    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the cleanup scan interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
