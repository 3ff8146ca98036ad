//! BLE driver abstraction
//!
//! The platform BLE stack (connect, characteristic writes, notifications) is
//! supplied from outside the crate. A driver writes outbound packets to the
//! command characteristic and hands every notification of the response
//! characteristic to the registered receive listener.
//!
//! Listeners may be invoked from any thread; the device layer funnels them
//! into its own ordered queue.

use async_trait::async_trait;
use uuid::Uuid;

use super::TransportError;

/// GATT service carrying the command characteristic
pub const COMMAND_SERVICE: Uuid = Uuid::from_u128(0x43df_d9e9_17e5_4860_803d_9df8_999b_0d7a);
/// Characteristic commands are written to (write with response)
pub const COMMAND_CHARACTERISTIC: Uuid = Uuid::from_u128(0x40c5_40d0_344c_4d0d_a1da_9cc2_60b8_2d43);
/// GATT service carrying the response characteristic
pub const RESPONSE_SERVICE: Uuid = Uuid::from_u128(0x4dad_4922_5c86_4ba7_a2e1_0f24_0537_bd08);
/// Characteristic responses and events are notified on
pub const RESPONSE_CHARACTERISTIC: Uuid = Uuid::from_u128(0xa4b8_0869_a84c_4160_a3e0_72fa_58ff_480e);

/// Callback receiving raw notification bytes
pub type ReceiveListener = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Callback invoked when the link drops out of band
pub type DisconnectListener = Box<dyn Fn() + Send + Sync>;

/// Platform BLE driver for one train
#[async_trait]
pub trait BleDriver: Send + Sync {
    /// Connection id / address
    fn id(&self) -> String;

    /// Advertised name
    fn name(&self) -> String;

    /// Connect and enable notifications
    ///
    /// `Ok(false)` means the stack refused without an error.
    async fn connect(&self) -> Result<bool, TransportError>;

    /// Disable notifications and disconnect
    async fn disconnect(&self) -> Result<bool, TransportError>;

    /// Check whether the link is up
    fn is_connected(&self) -> bool;

    /// Write one packet to the command characteristic
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Register the notification callback, replacing any previous one
    fn set_receive_listener(&self, listener: ReceiveListener);

    /// Register the disconnect callback, replacing any previous one
    fn set_disconnect_listener(&self, listener: DisconnectListener);
}
