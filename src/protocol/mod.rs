//! Train protocol core implementation
//!
//! This module provides the packet framing, protocol enums, message model and
//! decoder. Everything here is synchronous and side-effect free.

mod decoder;
mod error;
mod message;
mod metrics;
mod packet;
mod types;

pub use decoder::{EVENT_HEADER_LEN, decode_message};
pub use error::{Error, Result};
pub use message::{
    Event, EventKind, LifetimeOdometer, MacAddress, Message, MovementStatus, SnapCommand,
    TrainUuid, Version, VersionInfo,
};
pub use metrics::{Metrics, MetricsSnapshot};
pub use packet::{HEADER_SIZE, HEX_DELIMITER, Packet};
pub use types::{
    ButtonPress, ColorSensor, EventId, LegacySteeringDecision, MovementDirection, SnapColor,
    SnapSignature, SteeringDecision,
};

/// Reserved command ids
///
/// Responses reuse the id of the request that triggered them.
pub mod cmd {
    /// Version information
    pub const VERSION: u8 = 0x07;
    /// Lifetime odometer
    pub const LIFETIME_ODOMETER: u8 = 0x3E;
    /// Snap command execution on/off
    pub const SNAP_EXECUTION: u8 = 0x41;
    /// MAC address
    pub const MAC_ADDRESS: u8 = 0x42;
    /// Train UUID
    pub const UUID: u8 = 0x43;
    /// Clear a custom snap command
    pub const CLEAR_CUSTOM_SNAP: u8 = 0x64;
    /// Snap feedback (sound/lights) configuration
    pub const SNAP_FEEDBACK: u8 = 0x65;
    /// Decouple wagon
    pub const DECOUPLE_WAGON: u8 = 0x80;
    /// Top LED color
    pub const TOP_LED: u8 = 0xB1;
    /// Headlight colors
    pub const HEADLIGHTS: u8 = 0xB4;
    /// Movement stream control and single query
    pub const MOVEMENT: u8 = 0xB7;
    /// Drive at a speed level
    pub const DRIVE_SPEED_LEVEL: u8 = 0xB8;
    /// Stop driving
    pub const STOP: u8 = 0xB9;
    /// Drive at a speed in cm/s
    pub const DRIVE_SPEED: u8 = 0xBA;
    /// Drive at a constant motor PWM
    pub const DRIVE_PWM: u8 = 0xBC;
    /// Pause driving
    pub const PAUSE: u8 = 0xBE;
    /// Steering decision for the next split
    pub const NEXT_SPLIT_DECISION: u8 = 0xBF;
    /// Event envelope
    pub const EVENT: u8 = 0xE0;
}
