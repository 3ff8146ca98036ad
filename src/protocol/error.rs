//! Protocol error types

use thiserror::Error;

/// Protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Command id does not fit in a single byte
    #[error("invalid command id: {value} (expected 0..=255)")]
    InvalidCommandId {
        /// Offending value
        value: i64,
    },

    /// Hex string contained a token that is not a byte
    #[error("invalid hex token {token:?} at position {position}")]
    InvalidHex {
        /// Offending token
        token: String,
        /// Token index in the delimited string
        position: usize,
    },

    /// Payload shorter than the fixed layout of its command
    #[error("payload too short for command {command_id:#04x}: need {needed} bytes, got {got}")]
    PayloadTooShort {
        /// Command id of the packet
        command_id: u8,
        /// Required payload length
        needed: usize,
        /// Actual payload length
        got: usize,
    },

    /// A field byte has no meaning in its enumeration
    #[error("invalid value {value:#04x} for field `{field}`")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Raw byte
        value: u8,
    },

    /// Strict accessor asked for a different message kind
    #[error("unexpected message: expected {expected}, got {found}")]
    UnexpectedMessage {
        /// Requested kind
        expected: &'static str,
        /// Decoded kind
        found: &'static str,
    },

    /// Steering decision has no legacy wire encoding
    #[error("steering decision {0} is not supported by the legacy encoding")]
    UnsupportedSteering(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
