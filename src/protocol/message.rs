//! Decoded train messages
//!
//! Every inbound [`Packet`] decodes to exactly one [`Message`]. All variants
//! keep the packet they were decoded from.

use std::fmt;

use super::{
    ButtonPress, ColorSensor, Error, EventId, MovementDirection, Packet, SnapColor, SnapSignature,
    SteeringDecision,
};

/// Typed interpretation of a packet
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Command id has no decoder
    Unknown(Packet),
    /// Payload did not fit the layout of its command
    Malformed(Packet),
    /// MAC address response
    MacAddress(MacAddress),
    /// Train UUID response
    Uuid(TrainUuid),
    /// Version information response
    VersionInfo(VersionInfo),
    /// Lifetime odometer response
    LifetimeOdometer(LifetimeOdometer),
    /// Movement status (single response or stream)
    Movement(MovementStatus),
    /// Asynchronous event
    Event(Event),
}

impl Message {
    /// Frame raw notification bytes and decode them
    #[must_use]
    pub fn decode(raw: impl Into<bytes::Bytes>) -> Self {
        super::decode_message(Packet::decode(raw))
    }

    /// Packet the message was decoded from
    #[must_use]
    pub fn raw_packet(&self) -> &Packet {
        match self {
            Self::Unknown(packet) | Self::Malformed(packet) => packet,
            Self::MacAddress(msg) => &msg.raw_packet,
            Self::Uuid(msg) => &msg.raw_packet,
            Self::VersionInfo(msg) => &msg.raw_packet,
            Self::LifetimeOdometer(msg) => &msg.raw_packet,
            Self::Movement(msg) => &msg.raw_packet,
            Self::Event(msg) => &msg.raw_packet,
        }
    }

    /// Command id of the originating packet
    #[must_use]
    pub fn command_id(&self) -> u8 {
        self.raw_packet().command_id()
    }

    /// Short name of the variant
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unknown(_) => "unknown",
            Self::Malformed(_) => "malformed",
            Self::MacAddress(_) => "mac-address",
            Self::Uuid(_) => "uuid",
            Self::VersionInfo(_) => "version-info",
            Self::LifetimeOdometer(_) => "lifetime-odometer",
            Self::Movement(_) => "movement-status",
            Self::Event(_) => "event",
        }
    }

    /// Event payload, if this is an event
    #[must_use]
    pub const fn as_event(&self) -> Option<&Event> {
        match self {
            Self::Event(event) => Some(event),
            _ => None,
        }
    }

    /// Check whether decoding failed
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event(event) => write!(f, "event {} [{}]", event.kind, event.raw_packet),
            other => write!(f, "{} [{}]", other.kind(), other.raw_packet()),
        }
    }
}

/// MAC address response (0x42)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacAddress {
    /// Originating packet
    pub raw_packet: Packet,
    /// Colon-delimited hex
    pub mac_address: String,
}

/// Train UUID response (0x43)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainUuid {
    /// Originating packet
    pub raw_packet: Packet,
    /// Colon-delimited hex
    pub uuid: String,
}

/// Version number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Version {
    /// Major
    pub major: u8,
    /// Minor
    pub minor: u8,
    /// Patch (firmware versions only)
    pub patch: Option<u8>,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.patch {
            Some(patch) => write!(f, "{}.{}.{patch}", self.major, self.minor),
            None => write!(f, "{}.{}", self.major, self.minor),
        }
    }
}

/// Version information response (0x07)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    /// Originating packet
    pub raw_packet: Packet,
    /// BLE API version (major, minor)
    pub ble_api_version: Version,
    /// Firmware version (major, minor, patch)
    pub fw_version: Version,
}

/// Lifetime odometer response (0x3E)
#[derive(Debug, Clone, PartialEq)]
pub struct LifetimeOdometer {
    /// Originating packet
    pub raw_packet: Packet,
    /// Distance in meters with centimeter precision, kept across power cycles
    pub lifetime_odometer_meters: f64,
}

/// Movement status (0xB7)
#[derive(Debug, Clone, PartialEq)]
pub struct MovementStatus {
    /// Originating packet
    pub raw_packet: Packet,
    /// Forward, backward or stopped
    pub direction: MovementDirection,
    /// Current speed in cm/s
    pub speed_cmps: f64,
    /// Motor duty from 0 (stopped) to 255 (full)
    pub pwm: u8,
    /// Speed control (PID) enabled
    pub speed_control: bool,
    /// Target speed of the speed control in cm/s
    pub desired_speed_cmps: f64,
    /// Remaining pause in ms, 0 when not paused
    pub pause_time_ms: u32,
    /// Decision for the next split; `NONE` means random or snap-driven
    pub next_split_decision: SteeringDecision,
    /// Distance in meters with centimeter precision
    pub lifetime_odometer_meters: f64,
}

/// Asynchronous event (0xE0 envelope)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Originating packet
    pub raw_packet: Packet,
    /// Device clock when the event happened
    pub timestamp_ms: u32,
    /// Event-specific data
    pub kind: EventKind,
}

/// Snap command data shared by the detected and executed events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapCommand {
    /// Rolling verification counter, wraps after 255
    pub counter: u8,
    /// Detected colors
    pub colors: SnapSignature,
}

/// Event kinds carried by the envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Direction changed or the train stopped
    MovementDirectionChanged {
        /// New direction
        direction: MovementDirection,
    },
    /// Battery voltage is low
    LowBattery,
    /// Train turned off on low battery
    BatteryCutOff,
    /// Charger connected or disconnected
    ChargingStateChanged {
        /// Charger connected
        is_charging: bool,
    },
    /// Button pressed; the press keeps its normal function
    ButtonPressDetected {
        /// Short or long
        press: ButtonPress,
    },
    /// Snap execution started (not sent while execution is off)
    SnapCommandExecuted(SnapCommand),
    /// Snap detected regardless of execution
    SnapCommandDetected(SnapCommand),
    /// Front sensor accepted a color
    FrontColorChanged {
        /// Accepted color
        color: SnapColor,
    },
    /// Back sensor accepted a color
    BackColorChanged {
        /// Accepted color
        color: SnapColor,
    },
    /// Steering decision made at a split
    SplitDecision {
        /// Taken direction
        decision: SteeringDecision,
    },
    /// Event id has no decoder
    Unknown {
        /// Raw event id
        event_id: u8,
    },
}

impl EventKind {
    /// Event id of this kind (`None` for unknown events)
    #[must_use]
    pub const fn event_id(&self) -> Option<EventId> {
        Some(match self {
            Self::MovementDirectionChanged { .. } => EventId::MovementDirectionChanged,
            Self::LowBattery => EventId::LowBattery,
            Self::BatteryCutOff => EventId::BatteryCutOff,
            Self::ChargingStateChanged { .. } => EventId::ChargingStateChanged,
            Self::ButtonPressDetected { .. } => EventId::ButtonPressDetected,
            Self::SnapCommandExecuted(_) => EventId::SnapCommandExecuted,
            Self::SnapCommandDetected(_) => EventId::SnapCommandDetected,
            Self::FrontColorChanged { .. } => EventId::FrontColorChanged,
            Self::BackColorChanged { .. } => EventId::BackColorChanged,
            Self::SplitDecision { .. } => EventId::SplitDecision,
            Self::Unknown { .. } => return None,
        })
    }

    /// Sensor and color of a color-changed event
    ///
    /// Lets one handler deal with both sensors.
    #[must_use]
    pub const fn sensor_color(&self) -> Option<(ColorSensor, SnapColor)> {
        match *self {
            Self::FrontColorChanged { color } => Some((ColorSensor::Front, color)),
            Self::BackColorChanged { color } => Some((ColorSensor::Back, color)),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MovementDirectionChanged { direction } => {
                write!(f, "movement-direction-changed {direction:?}")
            }
            Self::LowBattery => f.write_str("low-battery"),
            Self::BatteryCutOff => f.write_str("battery-cut-off"),
            Self::ChargingStateChanged { is_charging } => {
                write!(f, "charging-state-changed {is_charging}")
            }
            Self::ButtonPressDetected { press } => write!(f, "button-press {press:?}"),
            Self::SnapCommandExecuted(snap) => {
                write!(f, "snap-executed #{} {}", snap.counter, snap.colors)
            }
            Self::SnapCommandDetected(snap) => {
                write!(f, "snap-detected #{} {}", snap.counter, snap.colors)
            }
            Self::FrontColorChanged { color } => write!(f, "front-color-changed {color}"),
            Self::BackColorChanged { color } => write!(f, "back-color-changed {color}"),
            Self::SplitDecision { decision } => write!(f, "split-decision {decision}"),
            Self::Unknown { event_id } => write!(f, "unknown-event {event_id:#04x}"),
        }
    }
}

macro_rules! impl_try_from_message {
    ($($ty:ident => $variant:ident, $name:literal;)+) => {
        $(
            impl TryFrom<Message> for $ty {
                type Error = Error;

                fn try_from(message: Message) -> Result<Self, Error> {
                    match message {
                        Message::$variant(inner) => Ok(inner),
                        other => Err(Error::UnexpectedMessage {
                            expected: $name,
                            found: other.kind(),
                        }),
                    }
                }
            }
        )+
    };
}

impl_try_from_message! {
    MacAddress => MacAddress, "mac-address";
    TrainUuid => Uuid, "uuid";
    VersionInfo => VersionInfo, "version-info";
    LifetimeOdometer => LifetimeOdometer, "lifetime-odometer";
    MovementStatus => Movement, "movement-status";
    Event => Event, "event";
}
