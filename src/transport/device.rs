//! Device layer
//!
//! A [`Device`] owns the notification bus, the correlator and the connection
//! state of one train. Inbound bytes and disconnect signals from the driver
//! callbacks share one queue drained by a single pump task, which decodes,
//! correlates and publishes them in the order the driver delivered them.

use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};

use super::bus::{Bus, Listener, Subscription, SubscriptionHandle};
use super::connection::{ConnectionState, ConnectionStatus};
use super::correlator::Correlator;
use super::{BleDriver, CorrelationError, DeviceConfig, TransportError};
use crate::protocol::{self, Message, Metrics, MetricsSnapshot, Packet, decode_message};

/// One train behind a [`BleDriver`]
pub struct Device {
    inner: Arc<DeviceInner>,
    pump: JoinHandle<()>,
}

/// Item of the inbound queue
enum Inbound {
    /// Notification bytes, stamped on arrival
    Packet { sequence: u64, data: Bytes },
    /// Link dropped
    Disconnected,
    /// Signals once everything queued before it was handled
    Barrier(oneshot::Sender<()>),
}

struct DeviceInner {
    driver: Arc<dyn BleDriver>,
    inbound: Mutex<mpsc::UnboundedSender<Inbound>>,
    config: DeviceConfig,
    runtime: Handle,
    status: ConnectionStatus,
    correlator: Correlator,
    notifications: Bus<Packet>,
    writes: Bus<Packet>,
    metrics: Metrics,
}

impl DeviceInner {
    fn receive(&self, data: &[u8]) {
        // stamp and enqueue atomically so sequence order is queue order
        let inbound = self.inbound.lock();
        let sequence = self.correlator.mark_received();
        let _ = inbound.send(Inbound::Packet {
            sequence,
            data: Bytes::copy_from_slice(data),
        });
    }

    fn enqueue(&self, item: Inbound) -> bool {
        self.inbound.lock().send(item).is_ok()
    }

    fn dispatch(&self, packet: Packet, sequence: u64) {
        let message = decode_message(packet.clone());
        self.metrics.record_received(&message);
        trace!(
            command_id = packet.command_id(),
            len = packet.len(),
            kind = message.kind(),
            "packet received"
        );

        self.correlator.resolve_received(&packet, sequence);
        let delivered = self.notifications.publish(packet);
        self.metrics.record_dispatch(delivered);
    }

    fn handle_disconnect(&self) {
        if self.status.set(ConnectionState::Disconnected) {
            debug!(id = %self.driver.id(), "device disconnected");
        }
        self.correlator.fail_all();
    }
}

impl Device {
    /// Wrap `driver`, registering its receive and disconnect callbacks
    ///
    /// The inbound pump and every listener spawned through the device run on
    /// `runtime`.
    #[must_use]
    pub fn new(driver: Arc<dyn BleDriver>, config: DeviceConfig, runtime: Handle) -> Self {
        let initial = if driver.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(DeviceInner {
            driver: Arc::clone(&driver),
            inbound: Mutex::new(tx),
            config,
            runtime: runtime.clone(),
            status: ConnectionStatus::new(initial),
            correlator: Correlator::new(),
            notifications: Bus::new("notifications"),
            writes: Bus::new("writes"),
            metrics: Metrics::new(),
        });

        let weak = Arc::downgrade(&inner);
        driver.set_receive_listener(Box::new(move |data: &[u8]| {
            if let Some(inner) = weak.upgrade() {
                inner.receive(data);
            }
        }));

        let weak = Arc::downgrade(&inner);
        driver.set_disconnect_listener(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.enqueue(Inbound::Disconnected);
            }
        }));

        let pump = runtime.spawn(Self::pump(Arc::downgrade(&inner), rx));

        Self { inner, pump }
    }

    async fn pump(inner: Weak<DeviceInner>, mut rx: mpsc::UnboundedReceiver<Inbound>) {
        while let Some(item) = rx.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            match item {
                Inbound::Packet { sequence, data } => inner.dispatch(Packet::decode(data), sequence),
                Inbound::Disconnected => inner.handle_disconnect(),
                Inbound::Barrier(done) => {
                    let _ = done.send(());
                }
            }
        }
    }

    /// Wait until everything the driver delivered so far has been handled
    async fn flush_inbound(&self) {
        let (done, handled) = oneshot::channel();
        if self.inner.enqueue(Inbound::Barrier(done)) {
            // errors out if the pump stopped before reaching the barrier
            let _ = handled.await;
        }
    }

    /// Driver connection id
    #[must_use]
    pub fn id(&self) -> String {
        self.inner.driver.id()
    }

    /// Advertised name
    #[must_use]
    pub fn name(&self) -> String {
        self.inner.driver.name()
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// Current connection state
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.status.get()
    }

    /// Check whether the device is connected
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Connection state changes, starting with the current state
    #[must_use]
    pub fn connection_status(&self) -> Subscription<ConnectionState> {
        self.inner.status.subscribe()
    }

    /// Decoded inbound messages, from now on
    #[must_use]
    pub fn notifications(&self) -> MessageStream {
        MessageStream {
            packets: self.inner.notifications.subscribe(),
        }
    }

    /// Raw inbound packets, from now on
    #[must_use]
    pub fn packets(&self) -> Subscription<Packet> {
        self.inner.notifications.subscribe()
    }

    /// Outbound packets that were written successfully
    #[must_use]
    pub fn writes(&self) -> Subscription<Packet> {
        self.inner.writes.subscribe()
    }

    /// Run `handler` on its own task for every inbound message
    pub fn on_message<F, Fut>(&self, mut handler: F) -> Listener<Packet>
    where
        F: FnMut(Message) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner
            .notifications
            .spawn_listener(&self.inner.runtime, move |packet| handler(decode_message(packet)))
    }

    /// Counters for this device
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Requests still waiting for a response
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending_len()
    }

    /// Connect the driver
    ///
    /// Returns `Ok(true)` without touching the driver when already connected,
    /// unless `force` is set.
    #[instrument(level = "debug", skip(self), fields(id = %self.inner.driver.id()))]
    pub async fn connect(&self, force: bool) -> Result<bool, TransportError> {
        // apply disconnects the driver already reported
        self.flush_inbound().await;
        if !force && self.is_connected() {
            return Ok(true);
        }

        self.inner.status.set(ConnectionState::Connecting);
        match self.inner.driver.connect().await {
            Ok(true) => {
                self.inner.status.set(ConnectionState::Connected);
                Ok(true)
            }
            Ok(false) => {
                debug!("driver refused connection");
                self.inner.status.set(ConnectionState::Disconnected);
                Ok(false)
            }
            Err(error) => {
                warn!(%error, "connect failed");
                self.inner.status.set(ConnectionState::Disconnected);
                Err(error)
            }
        }
    }

    /// Disconnect the driver; succeeds immediately if already disconnected
    ///
    /// The state only moves to disconnected (failing pending requests) when
    /// the driver confirms; `Ok(false)` or an error leave it untouched.
    #[instrument(level = "debug", skip(self), fields(id = %self.inner.driver.id()))]
    pub async fn disconnect(&self) -> Result<bool, TransportError> {
        if self.connection_state() == ConnectionState::Disconnected {
            return Ok(true);
        }

        tokio::time::sleep(self.inner.config.disconnect_settle).await;
        if !self.inner.driver.disconnect().await? {
            debug!("driver kept the link up");
            return Ok(false);
        }

        // behind any packets received before the link went down
        self.inner.enqueue(Inbound::Disconnected);
        self.flush_inbound().await;
        Ok(true)
    }

    /// Frame and write one command
    #[instrument(level = "trace", skip(self, payload), fields(len = payload.len()))]
    pub async fn send(&self, command_id: u8, payload: &[u8]) -> Result<(), TransportError> {
        let packet = Packet::from_command(command_id, payload);
        self.inner.driver.send(packet.as_bytes()).await?;
        self.inner.metrics.record_sent();
        trace!(%packet, "packet sent");
        self.inner.writes.publish(packet);
        Ok(())
    }

    /// Send a command and wait for the next packet with the same command id
    ///
    /// Concurrent requests for the same command id are answered in the order
    /// they were issued.
    #[instrument(level = "debug", skip(self, payload), fields(len = payload.len()))]
    pub async fn send_and_await(
        &self,
        command_id: u8,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Message, CorrelationError> {
        let pending = self.inner.correlator.register(command_id);
        self.send(command_id, payload).await?;

        match pending.wait(timeout).await {
            Ok(packet) => Ok(decode_message(packet)),
            Err(error) => {
                if matches!(error, CorrelationError::Timeout { .. }) {
                    self.inner.metrics.record_timeout();
                    warn!(?timeout, "no response");
                } else {
                    debug!(%error, "request failed");
                }
                Err(error)
            }
        }
    }

    /// [`send_and_await`](Self::send_and_await) with the configured timeout
    pub async fn request(&self, command_id: u8, payload: &[u8]) -> Result<Message, CorrelationError> {
        self.send_and_await(command_id, payload, self.inner.config.response_timeout)
            .await
    }

    /// Request and convert the response to a concrete payload type
    ///
    /// ```no_run
    /// # async fn run(device: &trainlib::transport::Device) -> Result<(), trainlib::transport::CorrelationError> {
    /// use trainlib::protocol::{VersionInfo, cmd};
    ///
    /// let version: VersionInfo = device.query(cmd::VERSION, &[]).await?;
    /// println!("firmware {}", version.fw_version);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn query<T>(&self, command_id: u8, payload: &[u8]) -> Result<T, CorrelationError>
    where
        T: TryFrom<Message, Error = protocol::Error>,
    {
        let message = self.request(command_id, payload).await?;
        Ok(T::try_from(message)?)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Decoded view of a packet subscription
pub struct MessageStream {
    packets: Subscription<Packet>,
}

impl MessageStream {
    /// Next message, or `None` once unsubscribed
    pub async fn recv(&mut self) -> Option<Message> {
        self.packets.recv().await.map(decode_message)
    }

    /// Next message if one is already queued
    pub fn try_recv(&mut self) -> Option<Message> {
        self.packets.try_recv().map(decode_message)
    }

    /// Handle for unsubscribing from elsewhere
    #[must_use]
    pub fn handle(&self) -> SubscriptionHandle<Packet> {
        self.packets.handle()
    }

    /// Stop delivery; idempotent
    pub fn unsubscribe(&self) {
        self.packets.unsubscribe();
    }
}

impl Stream for MessageStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        Pin::new(&mut self.packets)
            .poll_next(cx)
            .map(|packet| packet.map(decode_message))
    }
}
