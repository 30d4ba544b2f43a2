//! Command and response frames.
//!
//! Frames are encoded exactly as they travel on the bus, checksum included.
//! Decoding verifies the checksum before anything else is looked at; a frame
//! that fails the check is never partially interpreted.

use bytes::Bytes;

use crate::{
    command::{Command, ResponseCode},
    crc::{Crc16X25, checksum},
    errors::{ProtocolError, Result},
    secret::sealed,
};

/// Length of the trailing checksum.
pub const CRC_LEN: usize = 2;

/// Largest payload the element buffer accepts.
pub const MAX_PAYLOAD: usize = 507;

/// A command frame: command code header, payload, checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    header: u8,
    payload: Bytes,
}

impl CommandFrame {
    /// Smallest encoded frame (header and checksum, no payload).
    pub const MIN_LEN: usize = 1 + CRC_LEN;

    /// Build a frame for `command`.
    pub fn new(command: Command, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge { size: payload.len(), max: MAX_PAYLOAD });
        }
        Ok(Self { header: command.to_u8(), payload })
    }

    /// Raw header byte.
    pub fn header(&self) -> u8 {
        self.header
    }

    /// Command named by the header.
    pub fn command(&self) -> Result<Command> {
        Command::try_from(self.header)
    }

    /// Frame payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Checksum over header and payload.
    pub fn checksum(&self) -> u16 {
        checksum(self.header, &self.payload)
    }

    /// Number of bytes [`CommandFrame::encode`] appends.
    pub fn encoded_len(&self) -> usize {
        1 + self.payload.len() + CRC_LEN
    }

    /// Append the wire form to `dst`.
    pub fn encode(&self, dst: &mut Vec<u8>) {
        dst.reserve(self.encoded_len());
        dst.push(self.header);
        dst.extend_from_slice(&self.payload);
        dst.extend_from_slice(&self.checksum().to_be_bytes());
    }

    /// Parse and verify a complete command frame.
    ///
    /// The header byte is not required to be a known command; the element
    /// answers unknown codes with a status rather than dropping the frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::MIN_LEN {
            return Err(ProtocolError::Truncated { expected: Self::MIN_LEN, actual: bytes.len() });
        }

        let (body, crc) = bytes.split_at(bytes.len() - CRC_LEN);
        let (header, payload) = (body[0], &body[1..]);
        verify(header, payload, crc)?;

        if payload.len() > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge { size: payload.len(), max: MAX_PAYLOAD });
        }

        Ok(Self { header, payload: sealed(payload) })
    }
}

/// A response frame: status header, length-prefixed data, checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    status: ResponseCode,
    data: Bytes,
}

impl ResponseFrame {
    /// Status byte plus the big-endian length field.
    pub const PREFIX_LEN: usize = 3;

    /// Successful response carrying `data`.
    pub fn ok(data: impl Into<Bytes>) -> Result<Self> {
        Self::new(ResponseCode::OK, data)
    }

    /// Failed response with no data.
    pub fn error(status: ResponseCode) -> Self {
        Self { status, data: Bytes::new() }
    }

    /// Response with explicit status and data.
    pub fn new(status: ResponseCode, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.len() > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge { size: data.len(), max: MAX_PAYLOAD });
        }
        Ok(Self { status, data })
    }

    /// Status reported by the element.
    pub fn status(&self) -> ResponseCode {
        self.status
    }

    /// Response data.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Consume the frame, keeping the data.
    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Checksum over status, length field and data.
    pub fn checksum(&self) -> u16 {
        let mut crc = Crc16X25::new();
        crc.update_byte(self.status.0);
        crc.update(&(self.data.len() as u16).to_be_bytes());
        crc.update(&self.data);
        crc.finish()
    }

    /// Number of bytes [`ResponseFrame::encode`] appends.
    pub fn encoded_len(&self) -> usize {
        Self::PREFIX_LEN + self.data.len() + CRC_LEN
    }

    /// Append the wire form to `dst`.
    pub fn encode(&self, dst: &mut Vec<u8>) {
        dst.reserve(self.encoded_len());
        dst.push(self.status.0);
        dst.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        dst.extend_from_slice(&self.data);
        dst.extend_from_slice(&self.checksum().to_be_bytes());
    }

    /// Bytes still to read after the prefix: data plus checksum.
    ///
    /// Lets a transport read the prefix first and size the second read.
    pub fn remaining_len(prefix: &[u8; Self::PREFIX_LEN]) -> Result<usize> {
        let declared = usize::from(u16::from_be_bytes([prefix[1], prefix[2]]));
        if declared > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge { size: declared, max: MAX_PAYLOAD });
        }
        Ok(declared + CRC_LEN)
    }

    /// Parse and verify a complete response frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let min = Self::PREFIX_LEN + CRC_LEN;
        if bytes.len() < min {
            return Err(ProtocolError::Truncated { expected: min, actual: bytes.len() });
        }

        let (body, crc) = bytes.split_at(bytes.len() - CRC_LEN);
        let (status, payload) = (body[0], &body[1..]);
        verify(status, payload, crc)?;

        let declared = usize::from(u16::from_be_bytes([payload[0], payload[1]]));
        let data = &payload[2..];
        if declared != data.len() {
            return Err(ProtocolError::LengthMismatch { declared, actual: data.len() });
        }

        Self::new(ResponseCode(status), sealed(data))
    }
}

fn verify(header: u8, payload: &[u8], crc: &[u8]) -> Result<()> {
    let computed = checksum(header, payload);
    let received = u16::from_be_bytes([crc[0], crc[1]]);
    if computed != received {
        return Err(ProtocolError::ChecksumMismatch { computed, received });
    }
    Ok(())
}
