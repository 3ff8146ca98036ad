use std::sync::atomic::{AtomicU64, Ordering};

use super::Message;

/// Per-device protocol counters without external dependencies.
#[derive(Debug, Default)]
pub struct Metrics {
    received_packets: AtomicU64,
    sent_packets: AtomicU64,
    unknown_messages: AtomicU64,
    malformed_messages: AtomicU64,
    events: AtomicU64,
    responses: AtomicU64,
    correlation_timeouts: AtomicU64,
    notifications_dispatched: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Packets received from the transport
    pub received_packets: u64,
    /// Packets written to the transport
    pub sent_packets: u64,
    /// Inbound packets without a decoder
    pub unknown_messages: u64,
    /// Inbound packets that failed to decode
    pub malformed_messages: u64,
    /// Inbound events
    pub events: u64,
    /// Inbound responses (everything else that decoded)
    pub responses: u64,
    /// `send_and_await` calls that ran into their timeout
    pub correlation_timeouts: u64,
    /// Deliveries to notification subscribers
    pub notifications_dispatched: u64,
}

impl Metrics {
    /// Create zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_received(&self, message: &Message) {
        self.received_packets.fetch_add(1, Ordering::Relaxed);
        let counter = match message {
            Message::Unknown(_) => &self.unknown_messages,
            Message::Malformed(_) => &self.malformed_messages,
            Message::Event(_) => &self.events,
            _ => &self.responses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_sent(&self) {
        self.sent_packets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_timeout(&self) {
        self.correlation_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_dispatch(&self, subscribers: usize) {
        self.notifications_dispatched
            .fetch_add(subscribers as u64, Ordering::Relaxed);
    }

    /// Read all counters
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received_packets: self.received_packets.load(Ordering::Relaxed),
            sent_packets: self.sent_packets.load(Ordering::Relaxed),
            unknown_messages: self.unknown_messages.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            responses: self.responses.load(Ordering::Relaxed),
            correlation_timeouts: self.correlation_timeouts.load(Ordering::Relaxed),
            notifications_dispatched: self.notifications_dispatched.load(Ordering::Relaxed),
        }
    }
}
