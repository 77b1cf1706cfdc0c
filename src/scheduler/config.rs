//! Scheduler configuration

/// Frame scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Capacity of the transport-to-scheduler frame channel
    pub frame_queue_capacity: usize,

    /// Submit the current frame straight to an idle engine
    ///
    /// When off, every frame waits one render tick in the pending slot.
    pub submit_when_idle: bool,

    /// Capacity of the control channel used by `SchedulerHandle`
    pub command_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_queue_capacity: 4,
            submit_when_idle: true,
            command_capacity: 8,
        }
    }
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the frame channel capacity
    pub fn frame_queue_capacity(mut self, capacity: usize) -> Self {
        self.frame_queue_capacity = capacity.max(1);
        self
    }

    /// Enable or disable direct submission to an idle engine
    pub fn submit_when_idle(mut self, enabled: bool) -> Self {
        self.submit_when_idle = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.frame_queue_capacity, 4);
        assert!(config.submit_when_idle);
    }

    #[test]
    fn test_builder() {
        let config = SchedulerConfig::new()
            .frame_queue_capacity(0)
            .submit_when_idle(false);

        assert_eq!(config.frame_queue_capacity, 1);
        assert!(!config.submit_when_idle);
    }
}
