//! Transport-level error types covering driver failures and request correlation.

use std::time::Duration;

use thiserror::Error;

use crate::protocol;

/// Errors reported by a BLE driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Operation requires a connection
    #[error("device not connected")]
    NotConnected,

    /// Connection attempt failed
    #[error("connect failed: {0}")]
    Connect(String),

    /// Characteristic write failed
    #[error("write failed: {0}")]
    Write(String),

    /// Other driver failure
    #[error("driver error: {0}")]
    Other(String),
}

/// Errors surfaced by `send_and_await`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    /// No matching packet arrived in time
    #[error("no response to command {command_id:#04x} within {timeout:?}")]
    Timeout {
        /// Command id of the request
        command_id: u8,
        /// Configured timeout
        timeout: Duration,
    },

    /// Sending the request failed; nothing was awaited
    #[error("transport failure: {0}")]
    TransportFailure(#[from] TransportError),

    /// Device disconnected while the request was pending
    #[error("disconnected while awaiting command {command_id:#04x}")]
    Disconnected {
        /// Command id of the request
        command_id: u8,
    },

    /// Response decoded to a different message kind than requested
    #[error(transparent)]
    UnexpectedMessage(#[from] protocol::Error),
}
