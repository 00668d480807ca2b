use std::time::Duration;

/// Default tick interval of a stream session
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

/// What a session does when a packet cannot be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailurePolicy {
    /// Log, skip the tick and keep going
    Continue,
    /// Terminate after this many consecutive failures
    GiveUpAfter(usize),
}

impl SendFailurePolicy {
    /// Give up after `max` consecutive failures; zero counts as one
    pub fn give_up_after(max: usize) -> Self {
        SendFailurePolicy::GiveUpAfter(max.max(1))
    }

    fn normalized(self) -> Self {
        match self {
            SendFailurePolicy::GiveUpAfter(max) => Self::give_up_after(max),
            policy => policy,
        }
    }
}

impl Default for SendFailurePolicy {
    fn default() -> Self {
        SendFailurePolicy::GiveUpAfter(5)
    }
}

/// Configuration for a stream session
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Time between two packets
    pub interval: Duration,
    pub send_failure: SendFailurePolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            send_failure: SendFailurePolicy::default(),
        }
    }
}

/// Builder for stream configuration
#[derive(Default)]
pub struct StreamConfigBuilder {
    config: StreamConfig,
}

impl StreamConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the delivery failure policy
    pub fn send_failure(mut self, policy: SendFailurePolicy) -> Self {
        self.config.send_failure = policy.normalized();
        self
    }

    /// Build the configuration
    pub fn build(self) -> StreamConfig {
        self.config
    }
}
