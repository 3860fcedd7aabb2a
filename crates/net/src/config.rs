//! Session timing configuration.

use std::time::Duration;

/// Timeouts governing a session's request/response machinery.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Deadline for a request's response.
    pub request_timeout: Duration,
    /// Deadline for the peer's STATUS after the connection went active.
    pub status_timeout: Duration,
    /// Keepalive ping interval.
    pub ping_interval: Duration,
    /// How long a missing pong is tolerated.
    pub pong_timeout: Duration,
}

impl SessionConfig {
    /// Overrides the request deadline.
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Overrides the STATUS deadline.
    pub const fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Overrides the keepalive ping interval.
    pub const fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(8),
            status_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(15),
            pong_timeout: Duration::from_secs(30),
        }
    }
}
