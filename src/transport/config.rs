use std::time::Duration;

/// Default wait for a correlated response
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default pause before tearing down the link
pub const DEFAULT_DISCONNECT_SETTLE: Duration = Duration::from_millis(100);

/// Per-device tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceConfig {
    /// Timeout used by [`Device::request`](super::Device::request)
    pub response_timeout: Duration,
    /// Delay before a disconnect so queued writes can flush
    pub disconnect_settle: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            disconnect_settle: DEFAULT_DISCONNECT_SETTLE,
        }
    }
}

impl DeviceConfig {
    /// Override the response timeout
    #[must_use]
    pub const fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Override the disconnect settle delay
    #[must_use]
    pub const fn with_disconnect_settle(mut self, settle: Duration) -> Self {
        self.disconnect_settle = settle;
        self
    }
}
