use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;

use trainlib::protocol::{
    EventKind, MacAddress, Message, MovementDirection, Packet, VersionInfo, cmd,
};
use trainlib::transport::{
    BleDriver, ConnectionState, CorrelationError, Device, DeviceConfig, DisconnectListener,
    ReceiveListener, TransportError,
};

/// In-memory driver recording writes and exposing its callbacks
#[derive(Default)]
struct MockDriver {
    connected: AtomicBool,
    refuse_connect: AtomicBool,
    fail_writes: AtomicBool,
    keep_link: AtomicBool,
    connect_calls: Mutex<usize>,
    written: Mutex<Vec<Vec<u8>>>,
    receive: Mutex<Option<ReceiveListener>>,
    disconnect: Mutex<Option<DisconnectListener>>,
}

impl MockDriver {
    fn inject(&self, bytes: &[u8]) {
        if let Some(listener) = self.receive.lock().as_ref() {
            listener(bytes);
        }
    }

    fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(listener) = self.disconnect.lock().as_ref() {
            listener();
        }
    }

    fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }
}

#[async_trait]
impl BleDriver for MockDriver {
    fn id(&self) -> String {
        "AA:BB:CC:DD:EE:FF".to_string()
    }

    fn name(&self) -> String {
        "intelino train".to_string()
    }

    async fn connect(&self) -> Result<bool, TransportError> {
        *self.connect_calls.lock() += 1;
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("out of range".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(true)
    }

    async fn disconnect(&self) -> Result<bool, TransportError> {
        if self.keep_link.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(true)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Write("gatt error".to_string()));
        }
        self.written.lock().push(data.to_vec());
        Ok(())
    }

    fn set_receive_listener(&self, listener: ReceiveListener) {
        *self.receive.lock() = Some(listener);
    }

    fn set_disconnect_listener(&self, listener: DisconnectListener) {
        *self.disconnect.lock() = Some(listener);
    }
}

fn setup() -> (Arc<MockDriver>, Device) {
    let driver = Arc::new(MockDriver::default());
    let config = DeviceConfig::default()
        .with_response_timeout(Duration::from_millis(500))
        .with_disconnect_settle(Duration::ZERO);
    let device = Device::new(driver.clone(), config, Handle::current());
    (driver, device)
}

const MAC_RESPONSE: [u8; 8] = [0x42, 0x06, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_send_and_await_resolves_with_matching_packet() {
    let (driver, device) = setup();
    device.connect(false).await.unwrap();

    let responder = driver.clone();
    tokio::spawn(async move {
        settle().await;
        // unrelated traffic first
        responder.inject(&[0xE0, 0x05, 0x02, 0x00, 0x00, 0x00, 0x10]);
        responder.inject(&MAC_RESPONSE);
    });

    let mac: MacAddress = device.query(cmd::MAC_ADDRESS, &[]).await.unwrap();
    assert_eq!(mac.mac_address, "01:02:03:04:05:06");
    assert_eq!(driver.written(), vec![vec![0x42, 0x00]]);
    assert_eq!(device.pending_requests(), 0);
}

#[tokio::test]
async fn test_packet_received_before_request_does_not_answer_it() {
    let (driver, device) = setup();

    // delivered by the driver, not yet handled by the device
    driver.inject(&[0x42, 0x06, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA]);

    let responder = driver.clone();
    tokio::spawn(async move {
        settle().await;
        responder.inject(&[0x42, 0x06, 0xBB, 0xBB, 0xBB, 0xBB, 0xBB, 0xBB]);
    });

    let mac: MacAddress = device.query(cmd::MAC_ADDRESS, &[]).await.unwrap();
    assert_eq!(mac.mac_address, "bb:bb:bb:bb:bb:bb");
    assert_eq!(device.metrics().received_packets, 2);
}

#[tokio::test]
async fn test_response_queued_before_link_drop_still_resolves() {
    let (driver, device) = setup();
    device.connect(false).await.unwrap();
    let device = Arc::new(device);

    let request = {
        let device = Arc::clone(&device);
        tokio::spawn(async move { device.request(cmd::MAC_ADDRESS, &[]).await })
    };
    while device.pending_requests() < 1 {
        tokio::task::yield_now().await;
    }

    driver.inject(&MAC_RESPONSE);
    driver.drop_link();

    let message = request.await.unwrap().unwrap();
    assert_eq!(message.kind(), "mac-address");

    let mut status = device.connection_status();
    while status.recv().await != Some(ConnectionState::Disconnected) {}
    assert_eq!(device.pending_requests(), 0);
}

#[tokio::test]
async fn test_same_command_requests_resolve_fifo() {
    let (driver, device) = setup();
    let device = Arc::new(device);

    let first = {
        let device = Arc::clone(&device);
        tokio::spawn(async move { device.request(cmd::MAC_ADDRESS, &[]).await })
    };
    while device.pending_requests() < 1 {
        tokio::task::yield_now().await;
    }
    let second = {
        let device = Arc::clone(&device);
        tokio::spawn(async move { device.request(cmd::MAC_ADDRESS, &[]).await })
    };
    while device.pending_requests() < 2 {
        tokio::task::yield_now().await;
    }

    driver.inject(&[0x42, 0x06, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11]);
    driver.inject(&[0x42, 0x06, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22]);

    let first = MacAddress::try_from(first.await.unwrap().unwrap()).unwrap();
    let second = MacAddress::try_from(second.await.unwrap().unwrap()).unwrap();
    assert_eq!(first.mac_address, "11:11:11:11:11:11");
    assert_eq!(second.mac_address, "22:22:22:22:22:22");
}

#[tokio::test(start_paused = true)]
async fn test_timeout_removes_pending_request() {
    let (driver, device) = setup();

    let result = device
        .send_and_await(cmd::VERSION, &[], Duration::from_secs(3))
        .await;
    assert!(matches!(
        result,
        Err(CorrelationError::Timeout {
            command_id: cmd::VERSION,
            ..
        })
    ));
    assert_eq!(device.pending_requests(), 0);
    assert_eq!(device.metrics().correlation_timeouts, 1);

    // the late response is an ordinary notification
    let mut messages = device.notifications();
    driver.inject(&[0x07, 0x09, 0, 0, 0, 0, 1, 2, 3, 4, 5]);
    let message = messages.recv().await.unwrap();
    assert_eq!(message.kind(), "version-info");
}

#[tokio::test]
async fn test_write_failure_is_reported_immediately() {
    let (driver, device) = setup();
    driver.fail_writes.store(true, Ordering::SeqCst);

    let result = device.request(cmd::UUID, &[]).await;
    assert_eq!(
        result,
        Err(CorrelationError::TransportFailure(TransportError::Write(
            "gatt error".to_string()
        )))
    );
    assert_eq!(device.pending_requests(), 0);
    assert_eq!(device.metrics().sent_packets, 0);
}

#[tokio::test]
async fn test_query_rejects_other_message_kind() {
    let (driver, device) = setup();

    let responder = driver.clone();
    tokio::spawn(async move {
        settle().await;
        // version payload too short
        responder.inject(&[0x07, 0x01, 0x00]);
    });

    let result = device.query::<VersionInfo>(cmd::VERSION, &[]).await;
    assert!(matches!(
        result,
        Err(CorrelationError::UnexpectedMessage(
            trainlib::Error::UnexpectedMessage {
                expected: "version-info",
                found: "malformed",
            }
        ))
    ));
}

#[tokio::test]
async fn test_disconnect_fails_pending_requests() {
    let (driver, device) = setup();
    device.connect(false).await.unwrap();

    let dropper = driver.clone();
    tokio::spawn(async move {
        settle().await;
        dropper.drop_link();
    });

    let result = device.request(cmd::MOVEMENT, &[0x01]).await;
    assert_eq!(
        result,
        Err(CorrelationError::Disconnected {
            command_id: cmd::MOVEMENT
        })
    );
    assert_eq!(device.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connection_status_replays_and_dedups() {
    let (driver, device) = setup();
    let mut status = device.connection_status();
    assert_eq!(status.recv().await, Some(ConnectionState::Disconnected));

    assert!(device.connect(false).await.unwrap());
    assert_eq!(status.recv().await, Some(ConnectionState::Connecting));
    assert_eq!(status.recv().await, Some(ConnectionState::Connected));

    // already connected: no driver call, no transition
    assert!(device.connect(false).await.unwrap());
    assert_eq!(*driver.connect_calls.lock(), 1);

    driver.drop_link();
    driver.drop_link();
    assert_eq!(status.recv().await, Some(ConnectionState::Disconnected));
    assert_eq!(status.try_recv(), None);

    // late subscriber learns the current state
    let mut late = device.connection_status();
    assert_eq!(late.recv().await, Some(ConnectionState::Disconnected));
}

#[tokio::test]
async fn test_force_connect_reconnects() {
    let (driver, device) = setup();
    device.connect(false).await.unwrap();
    device.connect(true).await.unwrap();
    assert_eq!(*driver.connect_calls.lock(), 2);
    assert!(device.is_connected());
}

#[tokio::test]
async fn test_failed_connect_returns_to_disconnected() {
    let (driver, device) = setup();
    driver.refuse_connect.store(true, Ordering::SeqCst);

    let result = device.connect(false).await;
    assert!(matches!(result, Err(TransportError::Connect(_))));
    assert_eq!(device.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_when_disconnected_is_noop() {
    let (driver, device) = setup();
    assert!(device.disconnect().await.unwrap());

    device.connect(false).await.unwrap();
    assert!(device.disconnect().await.unwrap());
    assert!(!driver.is_connected());
    assert_eq!(device.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_refused_disconnect_keeps_connection() {
    let (driver, device) = setup();
    device.connect(false).await.unwrap();
    let device = Arc::new(device);

    let request = {
        let device = Arc::clone(&device);
        tokio::spawn(async move { device.request(cmd::MAC_ADDRESS, &[]).await })
    };
    while device.pending_requests() < 1 {
        tokio::task::yield_now().await;
    }

    driver.keep_link.store(true, Ordering::SeqCst);
    assert!(!device.disconnect().await.unwrap());
    assert_eq!(device.connection_state(), ConnectionState::Connected);
    assert_eq!(device.pending_requests(), 1);

    driver.inject(&MAC_RESPONSE);
    let message = request.await.unwrap().unwrap();
    assert_eq!(message.kind(), "mac-address");
}

#[tokio::test]
async fn test_notifications_fan_out_in_order() {
    let (driver, device) = setup();
    let mut first = device.notifications();
    let second = device.notifications();

    driver.inject(&[0xE0, 0x06, 0x01, 0x00, 0x00, 0x00, 0x01, 0x01]);
    driver.inject(&MAC_RESPONSE);
    driver.inject(&[0x99, 0x00]);

    let kinds: Vec<&str> = second
        .take(3)
        .map(|message| message.kind())
        .collect()
        .await;
    assert_eq!(kinds, vec!["event", "mac-address", "unknown"]);

    let Some(Message::Event(event)) = first.recv().await else {
        panic!("expected event");
    };
    assert_eq!(
        event.kind,
        EventKind::MovementDirectionChanged {
            direction: MovementDirection::Forward
        }
    );
    assert_eq!(first.recv().await.map(|m| m.kind()), Some("mac-address"));

    let metrics = device.metrics();
    assert_eq!(metrics.received_packets, 3);
    assert_eq!(metrics.events, 1);
    assert_eq!(metrics.unknown_messages, 1);
}

#[tokio::test]
async fn test_on_message_listener() {
    let (driver, device) = setup();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let listener = device.on_message(move |message| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(message.command_id());
        }
    });

    driver.inject(&MAC_RESPONSE);
    assert_eq!(rx.recv().await, Some(cmd::MAC_ADDRESS));

    listener.unsubscribe();
    driver.inject(&MAC_RESPONSE);
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn test_writes_stream_mirrors_sent_packets() {
    let (driver, device) = setup();
    let mut writes = device.writes();

    device.send(cmd::TOP_LED, &[0xFF, 0x00, 0x00]).await.unwrap();
    device.send(cmd::STOP, &[0x01]).await.unwrap();

    assert_eq!(
        writes.recv().await,
        Some(Packet::from_command(cmd::TOP_LED, &[0xFF, 0x00, 0x00]))
    );
    assert_eq!(writes.recv().await.map(|p| p.command_id()), Some(cmd::STOP));
    assert_eq!(driver.written()[0], vec![0xB1, 0x03, 0xFF, 0x00, 0x00]);
    assert_eq!(device.metrics().sent_packets, 2);
}

#[tokio::test]
async fn test_identity_passes_through() {
    let (_driver, device) = setup();
    assert_eq!(device.id(), "AA:BB:CC:DD:EE:FF");
    assert_eq!(device.name(), "intelino train");
}
