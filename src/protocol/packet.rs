//! Raw packet framing
//!
//! Every buffer exchanged with the train, in either direction, is framed the
//! same way:
//!
//! ```text
//! +------------+--------+---------------------------+
//! | command id | length | payload (length bytes)... |
//! +------------+--------+---------------------------+
//!      u8         u8
//! ```
//!
//! The length byte is advisory. The payload is whatever follows the header,
//! the declared length is only used to cut trailing garbage when rendering.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::{Error, Message, Result, decode_message};

/// Header size in bytes (command id + length)
pub const HEADER_SIZE: usize = 2;

/// Default delimiter of the hex debug representation
pub const HEX_DELIMITER: &str = ":";

/// One framed command/response buffer
///
/// Cloning is cheap: the underlying buffer is reference counted and never
/// mutated after construction.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Packet {
    data: Bytes,
}

impl Packet {
    /// Build a packet whose length byte is the payload length (truncated to a byte)
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_command(command_id: u8, payload: &[u8]) -> Self {
        Self::with_length(command_id, payload, payload.len() as u8)
    }

    /// Build a packet with an explicit length byte
    #[must_use]
    pub fn with_length(command_id: u8, payload: &[u8], length: u8) -> Self {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        buf.put_u8(command_id);
        buf.put_u8(length);
        buf.put_slice(payload);
        Self { data: buf.freeze() }
    }

    /// Build a packet from loosely typed values
    ///
    /// Payload values (and an explicit length) are masked to their low byte,
    /// which the device tolerates. The command id must be a valid byte.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_values<I>(command_id: i64, payload: I, length: Option<i64>) -> Result<Self>
    where
        I: IntoIterator<Item = i64>,
    {
        let command = u8::try_from(command_id)
            .map_err(|_| Error::InvalidCommandId { value: command_id })?;
        let payload: Vec<u8> = payload.into_iter().map(|value| (value & 0xFF) as u8).collect();

        Ok(match length {
            Some(length) => Self::with_length(command, &payload, (length & 0xFF) as u8),
            None => Self::from_command(command, &payload),
        })
    }

    /// Wrap a raw buffer received from (or destined to) the device
    ///
    /// Never fails: an empty buffer has command id 0 and a buffer shorter than
    /// the header has an empty payload.
    #[must_use]
    pub fn decode(raw: impl Into<Bytes>) -> Self {
        Self { data: raw.into() }
    }

    /// Command id (0 for an empty buffer)
    #[must_use]
    pub fn command_id(&self) -> u8 {
        self.data.first().copied().unwrap_or(0)
    }

    /// Length byte as declared by the sender (0 if missing)
    #[must_use]
    pub fn declared_length(&self) -> u8 {
        self.data.get(1).copied().unwrap_or(0)
    }

    /// Payload bytes following the header
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.data.get(HEADER_SIZE..).unwrap_or_default()
    }

    /// Whole buffer including the header
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the packet, returning the shared buffer
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// Total buffer length
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check whether the buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Render as delimited lowercase hex
    ///
    /// With `truncate_to_declared_length` the payload part is cut to the
    /// declared length byte; the header (if included) is always rendered.
    #[must_use]
    pub fn to_hex_string(
        &self,
        with_header: bool,
        delimiter: &str,
        truncate_to_declared_length: bool,
    ) -> String {
        let mut payload = self.payload();
        if truncate_to_declared_length {
            let declared = usize::from(self.declared_length());
            payload = &payload[..payload.len().min(declared)];
        }

        let header: &[u8] = if with_header {
            &self.data[..self.data.len().min(HEADER_SIZE)]
        } else {
            &[]
        };

        join_hex(header.iter().chain(payload), delimiter)
    }

    /// Parse a colon-delimited hex string such as `06:02:ba:be`
    pub fn from_hex_string(s: &str) -> Result<Self> {
        let data = s
            .split(HEX_DELIMITER)
            .enumerate()
            .map(|(position, token)| {
                let token = token.trim();
                let invalid = || Error::InvalidHex {
                    token: token.to_string(),
                    position,
                };
                // from_str_radix alone would take a sign prefix
                if token.is_empty()
                    || token.len() > 2
                    || !token.bytes().all(|byte| byte.is_ascii_hexdigit())
                {
                    return Err(invalid());
                }
                u8::from_str_radix(token, 16).map_err(|_| invalid())
            })
            .collect::<Result<Vec<u8>>>()?;

        Ok(Self::decode(data))
    }

    /// Decoded interpretation of this packet
    ///
    /// Total: falls back to [`Message::Unknown`] or [`Message::Malformed`].
    #[must_use]
    pub fn message(&self) -> Message {
        decode_message(self.clone())
    }

    /// Decode and convert to a specific message payload
    ///
    /// Unlike [`Packet::message`], a malformed packet or a different message
    /// kind is reported as an error.
    pub fn interpret<T>(&self) -> Result<T>
    where
        T: TryFrom<Message, Error = Error>,
    {
        T::try_from(super::decoder::try_decode(self)?)
    }
}

fn join_hex<'a>(bytes: impl Iterator<Item = &'a u8>, delimiter: &str) -> String {
    let mut out = String::new();
    for (idx, byte) in bytes.enumerate() {
        if idx > 0 {
            out.push_str(delimiter);
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_hex(self.data.iter(), HEX_DELIMITER))
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Packet({self})")
    }
}

impl From<Vec<u8>> for Packet {
    fn from(data: Vec<u8>) -> Self {
        Self::decode(data)
    }
}

impl From<&[u8]> for Packet {
    fn from(data: &[u8]) -> Self {
        Self::decode(Bytes::copy_from_slice(data))
    }
}

impl From<Bytes> for Packet {
    fn from(data: Bytes) -> Self {
        Self::decode(data)
    }
}
