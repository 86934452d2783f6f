//! Coordinator configuration

use std::time::Duration;

/// Tuning knobs for a coordinator instance.
///
/// Timeouts apply per participant request, never to the coordination as a
/// whole; a stuck coordination stays visible through the reporter instead of
/// being auto-terminated.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Deadline for a single request to a participant
    pub request_timeout: Duration,

    /// How many unreachable prepare attempts a participant gets before its
    /// silence is treated as a vote to abort
    pub prepare_retry_limit: u32,

    /// Initial backoff between retries to the same participant
    pub backoff_initial: Duration,

    /// Backoff ceiling; terminal deliveries retry at this cadence forever
    pub backoff_max: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            prepare_retry_limit: 3,
            backoff_initial: Duration::from_millis(50),
            backoff_max: Duration::from_secs(5),
        }
    }
}
