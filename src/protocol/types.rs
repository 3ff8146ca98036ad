//! Protocol enumerations and value types

use std::fmt;
use std::ops::BitOr;

use super::Error;

/// Single snap color
///
/// The lattice colors are bitwise combinations of the three primaries
/// (`RED | BLUE == MAGENTA`). [`SnapColor::Unknown`] sits outside the lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SnapColor {
    /// No color (also pads short snap sequences)
    Black = 0b000,
    /// Red primary
    Red = 0b001,
    /// Green primary
    Green = 0b010,
    /// Red + green
    Yellow = 0b011,
    /// Blue primary
    Blue = 0b100,
    /// Red + blue
    Magenta = 0b101,
    /// Green + blue
    Cyan = 0b110,
    /// All primaries
    White = 0b111,
    /// Color could not be recognized
    Unknown = 0b1000,
}

impl SnapColor {
    /// Bits of the primary color lattice
    pub const LATTICE_MASK: u8 = 0b111;

    /// All lattice colors in bit order
    pub const LATTICE: [Self; 8] = [
        Self::Black,
        Self::Red,
        Self::Green,
        Self::Yellow,
        Self::Blue,
        Self::Magenta,
        Self::Cyan,
        Self::White,
    ];

    /// Interpret a raw color byte
    ///
    /// `0b1000` is the unknown sentinel; anything else is masked to the
    /// three primary bits.
    #[must_use]
    pub const fn from_raw(value: u8) -> Self {
        if value == Self::Unknown as u8 {
            return Self::Unknown;
        }
        Self::LATTICE[(value & Self::LATTICE_MASK) as usize]
    }

    /// Convert to byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// RGB triple with every set primary at full intensity
    #[must_use]
    pub const fn to_rgb_bytes(self) -> (u8, u8, u8) {
        let bits = self.as_u8();
        (
            channel(bits, Self::Red),
            channel(bits, Self::Green),
            channel(bits, Self::Blue),
        )
    }
}

const fn channel(bits: u8, primary: SnapColor) -> u8 {
    if bits & primary.as_u8() != 0 { 0xFF } else { 0x00 }
}

impl BitOr for SnapColor {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        if self == Self::Unknown || rhs == Self::Unknown {
            return Self::Unknown;
        }
        Self::from_raw(self.as_u8() | rhs.as_u8())
    }
}

impl fmt::Display for SnapColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Black => "BLACK",
            Self::Red => "RED",
            Self::Green => "GREEN",
            Self::Yellow => "YELLOW",
            Self::Blue => "BLUE",
            Self::Magenta => "MAGENTA",
            Self::Cyan => "CYAN",
            Self::White => "WHITE",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Sequence of 4 colors identifying a snap command
///
/// Shorter sequences are right-padded with black, so a signature compares
/// equal to `[White, Red]` when it holds `[White, Red, Black, Black]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SnapSignature([SnapColor; 4]);

impl SnapSignature {
    /// Number of colors in a signature
    pub const LEN: usize = 4;

    /// Build a signature, padding with black
    ///
    /// Returns `None` for more than [`SnapSignature::LEN`] colors.
    #[must_use]
    pub fn new(colors: &[SnapColor]) -> Option<Self> {
        if colors.len() > Self::LEN {
            return None;
        }
        let mut padded = [SnapColor::Black; Self::LEN];
        padded[..colors.len()].copy_from_slice(colors);
        Some(Self(padded))
    }

    /// Build from raw color bytes
    #[must_use]
    pub const fn from_raw(raw: [u8; 4]) -> Self {
        Self([
            SnapColor::from_raw(raw[0]),
            SnapColor::from_raw(raw[1]),
            SnapColor::from_raw(raw[2]),
            SnapColor::from_raw(raw[3]),
        ])
    }

    /// All 4 colors
    #[must_use]
    pub const fn colors(&self) -> &[SnapColor; 4] {
        &self.0
    }

    /// Iterate over the colors
    pub fn iter(&self) -> impl Iterator<Item = SnapColor> + '_ {
        self.0.iter().copied()
    }

    /// Prefix match
    #[must_use]
    pub fn starts_with(&self, prefix: &[SnapColor]) -> bool {
        self.0.starts_with(prefix)
    }

    fn eq_padded(&self, other: &[SnapColor]) -> bool {
        Self::new(other).is_some_and(|other| other == *self)
    }
}

impl From<[SnapColor; 4]> for SnapSignature {
    fn from(colors: [SnapColor; 4]) -> Self {
        Self(colors)
    }
}

impl PartialEq<[SnapColor]> for SnapSignature {
    fn eq(&self, other: &[SnapColor]) -> bool {
        self.eq_padded(other)
    }
}

impl PartialEq<&[SnapColor]> for SnapSignature {
    fn eq(&self, other: &&[SnapColor]) -> bool {
        self.eq_padded(other)
    }
}

impl<const N: usize> PartialEq<[SnapColor; N]> for SnapSignature {
    fn eq(&self, other: &[SnapColor; N]) -> bool {
        self.eq_padded(other)
    }
}

impl fmt::Display for SnapSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "({a}, {b}, {c}, {d})")
    }
}

/// Movement direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MovementDirection {
    /// Keep the current direction
    Current = 0,
    /// Forward
    Forward = 1,
    /// Backward
    Backward = 2,
    /// Stopped
    Stop = 3,
    /// Invert the current direction
    Invert = 4,
}

impl MovementDirection {
    /// Convert from byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Current),
            1 => Some(Self::Forward),
            2 => Some(Self::Backward),
            3 => Some(Self::Stop),
            4 => Some(Self::Invert),
            _ => None,
        }
    }

    /// Convert to byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Steering decision at a split track
///
/// A bit set over left/right/straight: [`SteeringDecision::NONE`] means the
/// train picks randomly or follows the directional snap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SteeringDecision(u8);

impl SteeringDecision {
    /// No decision
    pub const NONE: Self = Self(0);
    /// Turn left
    pub const LEFT: Self = Self(0b001);
    /// Turn right
    pub const RIGHT: Self = Self(0b010);
    /// Go straight
    pub const STRAIGHT: Self = Self(0b100);
    /// Left or right
    pub const STEER: Self = Self(0b011);
    /// Any direction
    pub const ALL: Self = Self(0b111);

    /// Create from raw bits (masked to the valid bits)
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Return the underlying bit representation
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Check whether all bits of `other` are set
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SteeringDecision {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for SteeringDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Self::LEFT) {
            parts.push("LEFT");
        }
        if self.contains(Self::RIGHT) {
            parts.push("RIGHT");
        }
        if self.contains(Self::STRAIGHT) {
            parts.push("STRAIGHT");
        }
        if parts.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", parts.join(" | "))
        }
    }
}

/// Steering decision as encoded by older firmware
///
/// Still used by the movement stream and the next-split command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LegacySteeringDecision {
    /// No decision
    None = 0b00,
    /// Turn left
    Left = 0b01,
    /// Turn right
    Right = 0b10,
    /// Go straight
    Center = 0b11,
}

impl LegacySteeringDecision {
    /// Convert from byte; values outside the table read as `None`
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0b01 => Self::Left,
            0b10 => Self::Right,
            0b11 => Self::Center,
            _ => Self::None,
        }
    }

    /// Convert to byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<LegacySteeringDecision> for SteeringDecision {
    fn from(decision: LegacySteeringDecision) -> Self {
        match decision {
            LegacySteeringDecision::None => Self::NONE,
            LegacySteeringDecision::Left => Self::LEFT,
            LegacySteeringDecision::Right => Self::RIGHT,
            LegacySteeringDecision::Center => Self::STRAIGHT,
        }
    }
}

impl TryFrom<SteeringDecision> for LegacySteeringDecision {
    type Error = Error;

    fn try_from(decision: SteeringDecision) -> Result<Self, Error> {
        match decision {
            SteeringDecision::LEFT => Ok(Self::Left),
            SteeringDecision::RIGHT => Ok(Self::Right),
            SteeringDecision::STRAIGHT => Ok(Self::Center),
            other => Err(Error::UnsupportedSteering(other.to_string())),
        }
    }
}

/// Button press kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ButtonPress {
    /// Short press (start/stop driving)
    Short = 1,
    /// Long press; the train turns off afterwards
    Long = 2,
}

impl ButtonPress {
    /// Convert from byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Short),
            2 => Some(Self::Long),
            _ => None,
        }
    }
}

/// Color sensor position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ColorSensor {
    /// Front sensor
    Front = 1,
    /// Back sensor
    Back = 2,
}

/// Event id inside the event envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventId {
    /// Direction changed or the train stopped
    MovementDirectionChanged = 0x01,
    /// Battery voltage is low
    LowBattery = 0x02,
    /// Train turned off on low battery
    BatteryCutOff = 0x03,
    /// Charger connected or disconnected
    ChargingStateChanged = 0x04,
    /// Button pressed
    ButtonPressDetected = 0x05,
    /// Snap command execution started
    SnapCommandExecuted = 0x06,
    /// Front sensor accepted a new color
    FrontColorChanged = 0x07,
    /// Back sensor accepted a new color
    BackColorChanged = 0x08,
    /// Snap sequence detected
    SnapCommandDetected = 0x09,
    /// Steering decision made at a split
    SplitDecision = 0x0A,
}

impl EventId {
    /// Convert from byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::MovementDirectionChanged),
            0x02 => Some(Self::LowBattery),
            0x03 => Some(Self::BatteryCutOff),
            0x04 => Some(Self::ChargingStateChanged),
            0x05 => Some(Self::ButtonPressDetected),
            0x06 => Some(Self::SnapCommandExecuted),
            0x07 => Some(Self::FrontColorChanged),
            0x08 => Some(Self::BackColorChanged),
            0x09 => Some(Self::SnapCommandDetected),
            0x0A => Some(Self::SplitDecision),
            _ => None,
        }
    }

    /// Convert to byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SnapColor::{Black, Blue, Cyan, Green, Magenta, Red, Unknown, White, Yellow};

    #[test]
    fn test_color_composition() {
        assert_eq!(Red | Blue, Magenta);
        assert_eq!(Red | Green, Yellow);
        assert_eq!(Green | Blue, Cyan);
        assert_eq!(Red | Green | Blue, White);
        assert_eq!(Black | Red, Red);
        assert_eq!(Unknown | Red, Unknown);
    }

    #[test]
    fn test_color_rgb() {
        assert_eq!(Magenta.to_rgb_bytes(), (255, 0, 255));
        assert_eq!(White.to_rgb_bytes(), (255, 255, 255));
        assert_eq!(Black.to_rgb_bytes(), (0, 0, 0));
        assert_eq!(Unknown.to_rgb_bytes(), (0, 0, 0));
    }

    #[test]
    fn test_color_from_raw() {
        assert_eq!(SnapColor::from_raw(0x05), Magenta);
        assert_eq!(SnapColor::from_raw(0x08), Unknown);
        // stray high bits are dropped
        assert_eq!(SnapColor::from_raw(0xF1), Red);
    }

    #[test]
    fn test_signature_padding() {
        let signature = SnapSignature::from([White, Red, Black, Black]);

        assert_eq!(signature, [White, Red]);
        assert_eq!(signature, [White, Red, Black, Black]);
        assert_ne!(signature, [White, Red, Blue]);
        assert_ne!(signature, [White, Red, Black, Black, Black]);
        assert!(signature.starts_with(&[White, Red]));
        assert!(signature.starts_with(&[White]));
        assert!(!signature.starts_with(&[Cyan]));
        assert_eq!(signature.to_string(), "(WHITE, RED, BLACK, BLACK)");
    }

    #[test]
    fn test_steering_conversion() {
        let decision: SteeringDecision = LegacySteeringDecision::Center.into();
        assert_eq!(decision, SteeringDecision::STRAIGHT);
        assert_eq!(
            LegacySteeringDecision::try_from(SteeringDecision::STRAIGHT),
            Ok(LegacySteeringDecision::Center)
        );
        assert!(LegacySteeringDecision::try_from(SteeringDecision::STEER).is_err());
        assert!(LegacySteeringDecision::try_from(SteeringDecision::NONE).is_err());
        assert_eq!(LegacySteeringDecision::from_u8(0x07), LegacySteeringDecision::None);
    }

    #[test]
    fn test_steering_display() {
        assert_eq!(SteeringDecision::NONE.to_string(), "NONE");
        assert_eq!(SteeringDecision::STEER.to_string(), "LEFT | RIGHT");
        assert_eq!(
            (SteeringDecision::LEFT | SteeringDecision::STRAIGHT).to_string(),
            "LEFT | STRAIGHT"
        );
    }

    #[test]
    fn test_event_id_roundtrip() {
        for raw in 0x01..=0x0A {
            assert_eq!(EventId::from_u8(raw).map(EventId::as_u8), Some(raw));
        }
        assert_eq!(EventId::from_u8(0x00), None);
        assert_eq!(EventId::from_u8(0x0B), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&SnapColor::Magenta).unwrap(), "\"Magenta\"");
        let signature: SnapSignature = serde_json::from_str(
            r#"["Red","Blue","Black","Black"]"#,
        )
        .unwrap();
        assert!(signature.starts_with(&[SnapColor::Red, SnapColor::Blue]));
    }
}
