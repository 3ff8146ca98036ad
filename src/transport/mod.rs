//! Async device layer over a platform BLE driver

mod bus;
mod config;
mod connection;
mod correlator;
mod device;
mod driver;
mod error;

pub use bus::{Bus, Listener, Subscription, SubscriptionHandle};
pub use config::{DEFAULT_DISCONNECT_SETTLE, DEFAULT_RESPONSE_TIMEOUT, DeviceConfig};
pub use connection::{ConnectionState, ConnectionStatus};
pub use correlator::{Correlator, PendingResponse};
pub use device::{Device, MessageStream};
pub use driver::{
    BleDriver, COMMAND_CHARACTERISTIC, COMMAND_SERVICE, DisconnectListener, RESPONSE_CHARACTERISTIC,
    RESPONSE_SERVICE, ReceiveListener,
};
pub use error::{CorrelationError, TransportError};
