//! Connection state observable

use std::fmt;

use parking_lot::Mutex;
use tracing::debug;

use super::bus::{Bus, Subscription};

/// Link state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// No link
    #[default]
    Disconnected,
    /// Connect in progress
    Connecting,
    /// Link up, notifications enabled
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Current connection state plus change notifications
///
/// Subscribers first receive the current value, then every change.
/// Setting the value it already holds emits nothing.
pub struct ConnectionStatus {
    state: Mutex<ConnectionState>,
    changes: Bus<ConnectionState>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}

impl ConnectionStatus {
    /// Create with an initial state
    #[must_use]
    pub fn new(initial: ConnectionState) -> Self {
        Self {
            state: Mutex::new(initial),
            changes: Bus::new("connection"),
        }
    }

    /// Current state
    #[must_use]
    pub fn get(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Update the state, notifying subscribers on change
    ///
    /// Returns `true` if the value changed.
    pub fn set(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if *state == next {
            return false;
        }
        debug!(from = %*state, to = %next, "connection state changed");
        *state = next;
        // subscribe() snapshots under the same lock
        self.changes.publish(next);
        true
    }

    /// Subscribe, replaying the current state first
    #[must_use]
    pub fn subscribe(&self) -> Subscription<ConnectionState> {
        let state = self.state.lock();
        self.changes.subscribe_with_initial(*state)
    }

    /// Number of change subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.changes.subscriber_count()
    }
}
