//! Trainlib - protocol engine for BLE-controlled smart toy trains
//!
//! This library turns the byte stream exchanged over the train's command and
//! response characteristics into typed messages, and correlates outbound
//! commands with the responses they trigger.
//!
//! # Quick Start
//!
//! ```rust
//! use trainlib::{Message, Packet};
//! use trainlib::protocol::cmd;
//!
//! // Frame a command
//! let packet = Packet::from_command(cmd::MAC_ADDRESS, &[]);
//! assert_eq!(packet.as_bytes(), &[0x42, 0x00]);
//!
//! // Decode a notification
//! let message = Message::decode(vec![0x42, 0x06, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
//! assert_eq!(message.kind(), "mac-address");
//! ```
//!
//! Talking to a train needs a [`transport::BleDriver`] supplied by the
//! platform BLE stack:
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # async fn run(driver: Arc<dyn trainlib::transport::BleDriver>) -> Result<(), Box<dyn std::error::Error>> {
//! use trainlib::transport::{Device, DeviceConfig};
//! use trainlib::protocol::{MacAddress, cmd};
//!
//! let device = Device::new(driver, DeviceConfig::default(), tokio::runtime::Handle::current());
//! device.connect(false).await?;
//!
//! let mac: MacAddress = device.query(cmd::MAC_ADDRESS, &[]).await?;
//! println!("{}", mac.mac_address);
//!
//! let mut messages = device.notifications();
//! while let Some(message) = messages.recv().await {
//!     println!("{message}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Total decoding** - every packet maps to a message; bad payloads become `Malformed`
//! - **Multicast notifications** - independent unbounded queue per subscriber
//! - **FIFO correlation** - concurrent requests per command id resolve in order
//! - **`serde`** - optional derives for the protocol value types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod protocol;
pub mod transport;

pub use protocol::{Error, Message, Packet, Result, decode_message};
pub use transport::{CorrelationError, Device, DeviceConfig, TransportError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
