//! Command codes, query tags and response status codes.

use std::{fmt, time::Duration};

use crate::errors::ProtocolError;

/// Command codes carried in the header byte of a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Loop data back through the element
    Echo = 0x00,
    /// Draw bytes from the element's true RNG
    GenerateRandom = 0x02,
    /// Read from a data partition zone
    Read = 0x05,
    /// Write into a data partition zone
    Update = 0x06,
    /// Wrap an envelope under a local envelope key
    WrapLocalEnvelope = 0x0E,
    /// Unwrap an envelope under a local envelope key
    UnwrapLocalEnvelope = 0x0F,
    /// Write an attribute (host key slot)
    PutAttribute = 0x10,
    /// Generate a key inside the element
    GenerateKey = 0x11,
    /// Query element state
    Query = 0x14,
}

impl Command {
    /// Convert to wire byte.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => Self::Echo,
            0x02 => Self::GenerateRandom,
            0x05 => Self::Read,
            0x06 => Self::Update,
            0x0E => Self::WrapLocalEnvelope,
            0x0F => Self::UnwrapLocalEnvelope,
            0x10 => Self::PutAttribute,
            0x11 => Self::GenerateKey,
            0x14 => Self::Query,
            _ => return None,
        })
    }

    /// Time the element needs before the response can be read.
    pub fn processing_time(self) -> Duration {
        let ms = match self {
            Self::Echo | Self::Query => 1,
            Self::GenerateRandom | Self::Read => 3,
            Self::Update | Self::WrapLocalEnvelope | Self::UnwrapLocalEnvelope => 5,
            Self::PutAttribute => 10,
            Self::GenerateKey => 20,
        };
        Duration::from_millis(ms)
    }

    /// Stable name for logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::GenerateRandom => "generate_random",
            Self::Read => "read",
            Self::Update => "update",
            Self::WrapLocalEnvelope => "wrap_local_envelope",
            Self::UnwrapLocalEnvelope => "unwrap_local_envelope",
            Self::PutAttribute => "put_attribute",
            Self::GenerateKey => "generate_key",
            Self::Query => "query",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or(ProtocolError::UnknownCommand(value))
    }
}

/// Tags selecting what a `Query`, `PutAttribute` or `GenerateKey` addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum QueryTag {
    /// Local envelope key table (two slots)
    LocalEnvelopeKeyTable = 0x07,
    /// Host MAC/cipher key slot
    HostKeySlot = 0x17,
}

impl TryFrom<u8> for QueryTag {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x07 => Ok(Self::LocalEnvelopeKeyTable),
            0x17 => Ok(Self::HostKeySlot),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

/// Random number flavour requested from the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
#[non_exhaustive]
pub enum RandomKind {
    /// Fresh output of the TRNG, not retained by the element
    #[default]
    Ephemeral = 0x00,
}

/// Symmetric key types the element can hold in an envelope slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum KeyType {
    /// AES with a 128-bit key
    #[default]
    Aes128 = 0x00,
    /// AES with a 256-bit key
    Aes256 = 0x01,
}

impl KeyType {
    /// Key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes256 => 32,
        }
    }
}

impl TryFrom<u8> for KeyType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Aes128),
            0x01 => Ok(Self::Aes256),
            other => Err(ProtocolError::UnknownKeyType(other)),
        }
    }
}

/// Status byte of a response frame.
///
/// Only [`ResponseCode::OK`] means success. The host treats every other
/// value as an opaque failure except [`ResponseCode::KEY_SLOT_OCCUPIED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode(pub u8);

impl ResponseCode {
    /// Command completed
    pub const OK: Self = Self(0x00);
    /// Command code not supported
    pub const UNSUPPORTED_COMMAND: Self = Self(0x01);
    /// Command frame failed the element's checksum
    pub const COMMUNICATION_ERROR: Self = Self(0x02);
    /// Parameters out of range or malformed
    pub const INVALID_PARAMETER: Self = Self(0x03);
    /// Attribute or key slot already populated
    pub const KEY_SLOT_OCCUPIED: Self = Self(0x08);
    /// Referenced key slot is empty
    pub const KEY_NOT_FOUND: Self = Self(0x09);
    /// Element refused the operation for an internal reason
    pub const INTERNAL_ERROR: Self = Self(0x0F);

    /// True for [`ResponseCode::OK`].
    pub fn is_ok(self) -> bool {
        self == Self::OK
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}
