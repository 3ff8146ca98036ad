//! Request/response correlation
//!
//! Responses carry no request id, only the command id of the request that
//! triggered them. Pending requests are therefore queued per command id and
//! resolved oldest first: a packet goes to the earliest request still waiting
//! for its command id that was registered before the packet arrived.
//!
//! Arrival is stamped with a sequence number when the packet is handed over
//! by the driver, so a packet that is still queued for processing when a
//! request registers can never answer that request.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::CorrelationError;
use crate::protocol::Packet;

type PendingTable = Arc<Mutex<HashMap<u8, VecDeque<PendingRequest>>>>;

struct PendingRequest {
    id: u64,
    /// Arrival sequence at registration; only later packets match
    registered_after: u64,
    created: Instant,
    tx: oneshot::Sender<Packet>,
}

/// Table of requests awaiting a response
#[derive(Default)]
pub struct Correlator {
    table: PendingTable,
    next_id: AtomicU64,
    received: AtomicU64,
}

impl Correlator {
    /// Create an empty correlator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp an inbound packet on arrival, returning its sequence number
    ///
    /// Must be called in the order packets arrive, before they are queued
    /// for [`Correlator::resolve_received`].
    pub fn mark_received(&self) -> u64 {
        self.received.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Queue a request for `command_id`
    ///
    /// Must be called before the request is written so a fast response
    /// cannot slip past.
    pub fn register(&self, command_id: u8) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut table = self.table.lock();
        let registered_after = self.received.load(Ordering::Acquire);
        let queue = table.entry(command_id).or_default();
        queue.push_back(PendingRequest {
            id,
            registered_after,
            created: Instant::now(),
            tx,
        });
        trace!(command_id, id, registered_after, queued = queue.len(), "request registered");

        PendingResponse {
            id,
            command_id,
            rx,
            table: Arc::clone(&self.table),
        }
    }

    /// Stamp `packet` as arrived now and resolve with it
    ///
    /// Returns `true` if a request consumed the packet.
    pub fn resolve(&self, packet: &Packet) -> bool {
        let sequence = self.mark_received();
        self.resolve_received(packet, sequence)
    }

    /// Hand a packet stamped with `sequence` to the oldest eligible request
    ///
    /// Requests registered after the packet arrived are skipped.
    /// Returns `true` if a request consumed the packet.
    pub fn resolve_received(&self, packet: &Packet, sequence: u64) -> bool {
        let command_id = packet.command_id();
        let mut table = self.table.lock();
        let Some(queue) = table.get_mut(&command_id) else {
            return false;
        };

        let mut resolved = false;
        let mut index = 0;
        while index < queue.len() {
            if queue[index].registered_after >= sequence {
                index += 1;
                continue;
            }
            let Some(request) = queue.remove(index) else {
                break;
            };
            let waited = request.created.elapsed();
            if request.tx.send(packet.clone()).is_ok() {
                trace!(command_id, id = request.id, sequence, ?waited, "request resolved");
                resolved = true;
                break;
            }
        }
        if queue.is_empty() {
            table.remove(&command_id);
        }
        resolved
    }

    /// Number of requests still waiting
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.table.lock().values().map(VecDeque::len).sum()
    }

    /// Number of requests waiting for `command_id`
    #[must_use]
    pub fn pending_for(&self, command_id: u8) -> usize {
        self.table.lock().get(&command_id).map_or(0, VecDeque::len)
    }

    /// Drop every pending request; waiters observe a disconnect
    pub fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.table.lock().drain().collect();
        let failed = drained.iter().map(|(_, queue)| queue.len()).sum();
        if failed > 0 {
            debug!(failed, "pending requests failed");
        }
        failed
    }
}

/// Receiver side of one registered request
///
/// Dropping it before completion removes the request from the table.
pub struct PendingResponse {
    id: u64,
    command_id: u8,
    rx: oneshot::Receiver<Packet>,
    table: PendingTable,
}

impl PendingResponse {
    /// Command id the request waits for
    #[must_use]
    pub fn command_id(&self) -> u8 {
        self.command_id
    }

    /// Wait up to `timeout` for the response packet
    ///
    /// # Errors
    ///
    /// [`CorrelationError::Timeout`] when nothing matched in time (the request
    /// is removed before returning), [`CorrelationError::Disconnected`] when
    /// the request was failed by a disconnect.
    pub async fn wait(mut self, timeout: Duration) -> Result<Packet, CorrelationError> {
        let command_id = self.command_id;
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(packet)) => Ok(packet),
            Ok(Err(_)) => Err(CorrelationError::Disconnected { command_id }),
            Err(_) => {
                if self.remove() {
                    return Err(CorrelationError::Timeout {
                        command_id,
                        timeout,
                    });
                }
                // resolved or failed between the deadline and the removal
                match self.rx.try_recv() {
                    Ok(packet) => Ok(packet),
                    Err(_) => Err(CorrelationError::Disconnected { command_id }),
                }
            }
        }
    }

    fn remove(&self) -> bool {
        let mut table = self.table.lock();
        let Some(queue) = table.get_mut(&self.command_id) else {
            return false;
        };
        let Some(position) = queue.iter().position(|request| request.id == self.id) else {
            return false;
        };
        queue.remove(position);
        if queue.is_empty() {
            table.remove(&self.command_id);
        }
        true
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.remove();
    }
}
