//! Packet to message decoding
//!
//! Dispatch is two-level: the command id selects the response type, and the
//! event envelope (0xE0) is further dispatched on its event id. Every numeric
//! field is big-endian.
//!
//! # Event envelope
//!
//! ```text
//! +----------+-------------------+----------------------+
//! | event id | timestamp ms (BE) | event fields...      |
//! +----------+-------------------+----------------------+
//!      u8            u32
//! ```

use bytes::Buf;
use tracing::debug;

use super::message::{
    Event, EventKind, LifetimeOdometer, MacAddress, MovementStatus, SnapCommand, TrainUuid,
    Version, VersionInfo,
};
use super::{
    ButtonPress, Error, EventId, HEX_DELIMITER, LegacySteeringDecision, Message,
    MovementDirection, Packet, Result, SnapColor, SnapSignature, SteeringDecision, cmd,
};

/// Event id + timestamp
pub const EVENT_HEADER_LEN: usize = 5;

const MAC_ADDRESS_LEN: usize = 6;
const UUID_LEN: usize = 8;
const VERSION_LEN: usize = 9;
const ODOMETER_LEN: usize = 4;
const MOVEMENT_LEN: usize = 18;
const SNAP_LEN: usize = 5;
const COLOR_CHANGED_LEN: usize = 5;
const SPLIT_DECISION_LEN: usize = 5;

/// Odometer value reported when the train has no reading
const ODOMETER_NOT_AVAILABLE: u32 = 0xFFFF_FFFF;

/// Decode a packet into a message
///
/// Total: an unknown command id yields [`Message::Unknown`], a payload that
/// does not fit its layout yields [`Message::Malformed`].
#[must_use]
pub fn decode_message(packet: Packet) -> Message {
    match try_decode(&packet) {
        Ok(message) => message,
        Err(err) => {
            debug!(%packet, error = %err, "malformed packet");
            Message::Malformed(packet)
        }
    }
}

/// Decode, reporting layout failures instead of absorbing them
pub(crate) fn try_decode(packet: &Packet) -> Result<Message> {
    let reader = Reader::new(packet);

    let message = match packet.command_id() {
        cmd::EVENT => Message::Event(decode_event(packet, &reader)?),
        cmd::MAC_ADDRESS => {
            reader.layout(0, MAC_ADDRESS_LEN)?;
            Message::MacAddress(MacAddress {
                raw_packet: packet.clone(),
                mac_address: packet.to_hex_string(false, HEX_DELIMITER, true),
            })
        }
        cmd::UUID => {
            reader.layout(0, UUID_LEN)?;
            Message::Uuid(TrainUuid {
                raw_packet: packet.clone(),
                uuid: packet.to_hex_string(false, HEX_DELIMITER, true),
            })
        }
        cmd::VERSION => Message::VersionInfo(decode_version(packet, &reader)?),
        cmd::LIFETIME_ODOMETER => {
            let mut buf = reader.layout(0, ODOMETER_LEN)?;
            Message::LifetimeOdometer(LifetimeOdometer {
                raw_packet: packet.clone(),
                lifetime_odometer_meters: odometer_meters(buf.get_u32()),
            })
        }
        cmd::MOVEMENT => Message::Movement(decode_movement(packet, &reader)?),
        _ => Message::Unknown(packet.clone()),
    };

    Ok(message)
}

/// Bounds-checked view over a packet payload
struct Reader<'a> {
    command_id: u8,
    payload: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(packet: &'a Packet) -> Self {
        Self {
            command_id: packet.command_id(),
            payload: packet.payload(),
        }
    }

    /// Slice of `len` bytes at `offset`, failing if the payload is shorter
    fn layout(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let needed = offset + len;
        self.payload
            .get(offset..needed)
            .ok_or(Error::PayloadTooShort {
                command_id: self.command_id,
                needed,
                got: self.payload.len(),
            })
    }
}

fn odometer_meters(raw_cm: u32) -> f64 {
    let cm = if raw_cm == ODOMETER_NOT_AVAILABLE { 0 } else { raw_cm };
    f64::from(cm) / 100.0
}

fn direction(value: u8) -> Result<MovementDirection> {
    MovementDirection::from_u8(value).ok_or(Error::InvalidField {
        field: "direction",
        value,
    })
}

fn decode_version(packet: &Packet, reader: &Reader<'_>) -> Result<VersionInfo> {
    let raw = reader.layout(0, VERSION_LEN)?;

    Ok(VersionInfo {
        raw_packet: packet.clone(),
        ble_api_version: Version {
            major: raw[4],
            minor: raw[5],
            patch: None,
        },
        fw_version: Version {
            major: raw[6],
            minor: raw[7],
            patch: Some(raw[8]),
        },
    })
}

fn decode_movement(packet: &Packet, reader: &Reader<'_>) -> Result<MovementStatus> {
    let mut buf = reader.layout(0, MOVEMENT_LEN)?;

    let direction = direction(buf.get_u8())?;
    let speed_mmps = buf.get_u16();
    let pwm_inverted = buf.get_u8();
    let speed_control = buf.get_u8() != 0;
    let desired_speed_mmps = buf.get_u16();
    let pause_ds = buf.get_u8();
    let next_decision = LegacySteeringDecision::from_u8(buf.get_u8());
    // three reserved bytes
    buf.advance(3);
    let odometer_cm = buf.get_u32();

    Ok(MovementStatus {
        raw_packet: packet.clone(),
        direction,
        speed_cmps: f64::from(speed_mmps) / 10.0,
        pwm: u8::MAX - pwm_inverted,
        speed_control,
        desired_speed_cmps: f64::from(desired_speed_mmps) / 10.0,
        pause_time_ms: u32::from(pause_ds) * 10,
        next_split_decision: next_decision.into(),
        lifetime_odometer_meters: odometer_meters(odometer_cm),
    })
}

fn decode_event(packet: &Packet, reader: &Reader<'_>) -> Result<Event> {
    let mut header = reader.layout(0, EVENT_HEADER_LEN)?;
    let event_id = header.get_u8();
    let timestamp_ms = header.get_u32();

    let kind = match EventId::from_u8(event_id) {
        Some(EventId::MovementDirectionChanged) => {
            let raw = reader.layout(EVENT_HEADER_LEN, 1)?;
            EventKind::MovementDirectionChanged {
                direction: direction(raw[0])?,
            }
        }
        Some(EventId::LowBattery) => EventKind::LowBattery,
        Some(EventId::BatteryCutOff) => EventKind::BatteryCutOff,
        Some(EventId::ChargingStateChanged) => {
            let raw = reader.layout(EVENT_HEADER_LEN, 1)?;
            EventKind::ChargingStateChanged {
                is_charging: raw[0] != 0,
            }
        }
        Some(EventId::ButtonPressDetected) => {
            let raw = reader.layout(EVENT_HEADER_LEN, 1)?;
            let press = ButtonPress::from_u8(raw[0]).ok_or(Error::InvalidField {
                field: "button_press",
                value: raw[0],
            })?;
            EventKind::ButtonPressDetected { press }
        }
        Some(EventId::SnapCommandExecuted) => {
            EventKind::SnapCommandExecuted(decode_snap(reader)?)
        }
        Some(EventId::SnapCommandDetected) => {
            EventKind::SnapCommandDetected(decode_snap(reader)?)
        }
        Some(EventId::FrontColorChanged) => EventKind::FrontColorChanged {
            color: decode_sensor_color(reader)?,
        },
        Some(EventId::BackColorChanged) => EventKind::BackColorChanged {
            color: decode_sensor_color(reader)?,
        },
        Some(EventId::SplitDecision) => {
            let raw = reader.layout(EVENT_HEADER_LEN, SPLIT_DECISION_LEN)?;
            EventKind::SplitDecision {
                decision: SteeringDecision::from_bits(raw[0]),
            }
        }
        None => EventKind::Unknown { event_id },
    };

    Ok(Event {
        raw_packet: packet.clone(),
        timestamp_ms,
        kind,
    })
}

fn decode_snap(reader: &Reader<'_>) -> Result<SnapCommand> {
    let raw = reader.layout(EVENT_HEADER_LEN, SNAP_LEN)?;
    Ok(SnapCommand {
        counter: raw[0],
        colors: SnapSignature::from_raw([raw[1], raw[2], raw[3], raw[4]]),
    })
}

fn decode_sensor_color(reader: &Reader<'_>) -> Result<SnapColor> {
    // u32 sensor data precedes the accepted color
    let raw = reader.layout(EVENT_HEADER_LEN, COLOR_CHANGED_LEN)?;
    Ok(SnapColor::from_raw(raw[4]))
}
