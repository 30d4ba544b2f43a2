//! Typed request payloads and response data layouts.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    command::{Command, KeyType, QueryTag, RandomKind},
    errors::{ProtocolError, Result},
    frame::{CommandFrame, MAX_PAYLOAD},
    secret,
};

/// A request to the element, before framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Loop `data` back
    Echo {
        /// Bytes to echo
        data: Bytes,
    },
    /// Draw `len` random bytes
    GenerateRandom {
        /// RNG flavour
        kind: RandomKind,
        /// Number of bytes
        len: u8,
    },
    /// Read `len` bytes of data zone `zone` starting at `offset`
    Read {
        /// Zone index
        zone: u8,
        /// Byte offset within the zone
        offset: u16,
        /// Number of bytes
        len: u16,
    },
    /// Write `data` into data zone `zone` at `offset`
    Update {
        /// Zone index
        zone: u8,
        /// Byte offset within the zone
        offset: u16,
        /// Bytes to write
        data: Bytes,
    },
    /// Wrap `data` under envelope key `slot`
    WrapLocalEnvelope {
        /// Envelope key slot
        slot: u8,
        /// Plaintext envelope
        data: Bytes,
    },
    /// Unwrap `data` under envelope key `slot`
    UnwrapLocalEnvelope {
        /// Envelope key slot
        slot: u8,
        /// Wrapped envelope
        data: Bytes,
    },
    /// Write attribute `tag`
    PutAttribute {
        /// Attribute being written
        tag: QueryTag,
        /// Attribute value
        data: Bytes,
    },
    /// Generate a local envelope key in `slot`
    GenerateKey {
        /// Envelope key slot
        slot: u8,
        /// Key type to generate
        key_type: KeyType,
    },
    /// Query element state for `tag`
    Query {
        /// What to query
        tag: QueryTag,
    },
}

impl Request {
    /// Command code for this request.
    pub fn command(&self) -> Command {
        match self {
            Self::Echo { .. } => Command::Echo,
            Self::GenerateRandom { .. } => Command::GenerateRandom,
            Self::Read { .. } => Command::Read,
            Self::Update { .. } => Command::Update,
            Self::WrapLocalEnvelope { .. } => Command::WrapLocalEnvelope,
            Self::UnwrapLocalEnvelope { .. } => Command::UnwrapLocalEnvelope,
            Self::PutAttribute { .. } => Command::PutAttribute,
            Self::GenerateKey { .. } => Command::GenerateKey,
            Self::Query { .. } => Command::Query,
        }
    }

    /// Encode into a command frame.
    pub fn to_frame(&self) -> Result<CommandFrame> {
        let mut buf = BytesMut::with_capacity(MAX_PAYLOAD);
        match self {
            Self::Echo { data } => buf.put_slice(data),
            Self::GenerateRandom { kind, len } => {
                buf.put_u8(*kind as u8);
                buf.put_u8(*len);
            },
            Self::Read { zone, offset, len } => {
                buf.put_u8(*zone);
                buf.put_u16(*offset);
                buf.put_u16(*len);
            },
            Self::Update { zone, offset, data } => {
                buf.put_u8(*zone);
                buf.put_u16(*offset);
                buf.put_slice(data);
            },
            Self::WrapLocalEnvelope { slot, data } | Self::UnwrapLocalEnvelope { slot, data } => {
                buf.put_u8(*slot);
                buf.put_slice(data);
            },
            Self::PutAttribute { tag, data } => {
                buf.put_u8(*tag as u8);
                buf.put_slice(data);
            },
            Self::GenerateKey { slot, key_type } => {
                buf.put_u8(QueryTag::LocalEnvelopeKeyTable as u8);
                buf.put_u8(*slot);
                buf.put_u8(*key_type as u8);
            },
            Self::Query { tag } => buf.put_u8(*tag as u8),
        }
        let payload = if self.carries_secret() { secret::seal(buf) } else { buf.freeze() };
        CommandFrame::new(self.command(), payload)
    }

    /// Whether the payload holds key material or envelope plaintext.
    pub fn carries_secret(&self) -> bool {
        matches!(
            self,
            Self::PutAttribute { .. }
                | Self::WrapLocalEnvelope { .. }
                | Self::UnwrapLocalEnvelope { .. }
        )
    }

    /// Decode a verified command frame.
    pub fn from_frame(frame: &CommandFrame) -> Result<Self> {
        let command = frame.command()?;
        let p = frame.payload();

        let malformed =
            |reason| ProtocolError::MalformedPayload { command: command.name(), reason };
        let need = |n: usize| {
            if p.len() < n {
                Err(ProtocolError::Truncated { expected: n, actual: p.len() })
            } else {
                Ok(())
            }
        };

        Ok(match command {
            Command::Echo => Self::Echo { data: p.clone() },
            Command::GenerateRandom => {
                need(2)?;
                if p[0] != RandomKind::Ephemeral as u8 {
                    return Err(malformed("unsupported random kind"));
                }
                Self::GenerateRandom { kind: RandomKind::Ephemeral, len: p[1] }
            },
            Command::Read => {
                need(5)?;
                Self::Read {
                    zone: p[0],
                    offset: u16::from_be_bytes([p[1], p[2]]),
                    len: u16::from_be_bytes([p[3], p[4]]),
                }
            },
            Command::Update => {
                need(3)?;
                Self::Update {
                    zone: p[0],
                    offset: u16::from_be_bytes([p[1], p[2]]),
                    data: p.slice(3..),
                }
            },
            Command::WrapLocalEnvelope => {
                need(1)?;
                Self::WrapLocalEnvelope { slot: p[0], data: p.slice(1..) }
            },
            Command::UnwrapLocalEnvelope => {
                need(1)?;
                Self::UnwrapLocalEnvelope { slot: p[0], data: p.slice(1..) }
            },
            Command::PutAttribute => {
                need(1)?;
                Self::PutAttribute { tag: QueryTag::try_from(p[0])?, data: p.slice(1..) }
            },
            Command::GenerateKey => {
                need(3)?;
                if QueryTag::try_from(p[0])? != QueryTag::LocalEnvelopeKeyTable {
                    return Err(malformed("only envelope keys can be generated"));
                }
                Self::GenerateKey { slot: p[1], key_type: KeyType::try_from(p[2])? }
            },
            Command::Query => {
                need(1)?;
                Self::Query { tag: QueryTag::try_from(p[0])? }
            },
        })
    }
}

/// One row of the local envelope key table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeKeyEntry {
    /// Slot number
    pub slot: u8,
    /// Whether a key is present
    pub present: bool,
    /// Key type (meaningful only when present)
    pub key_type: KeyType,
}

/// Response data for `Query { tag: HostKeySlot }`.
pub fn encode_host_key_slot(present: bool) -> Vec<u8> {
    vec![u8::from(present)]
}

/// Parse response data for `Query { tag: HostKeySlot }`.
pub fn decode_host_key_slot(data: &[u8]) -> Result<bool> {
    match data.first() {
        Some(&flag) => Ok(flag != 0),
        None => Err(ProtocolError::Truncated { expected: 1, actual: 0 }),
    }
}

/// Response data for `Query { tag: LocalEnvelopeKeyTable }`.
pub fn encode_envelope_key_table(entries: &[EnvelopeKeyEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + entries.len() * 3);
    out.push(entries.len() as u8);
    for entry in entries {
        out.extend_from_slice(&[entry.slot, u8::from(entry.present), entry.key_type as u8]);
    }
    out
}

/// Parse response data for `Query { tag: LocalEnvelopeKeyTable }`.
pub fn decode_envelope_key_table(data: &[u8]) -> Result<Vec<EnvelopeKeyEntry>> {
    let Some((&count, rows)) = data.split_first() else {
        return Err(ProtocolError::Truncated { expected: 1, actual: 0 });
    };

    let expected = usize::from(count) * 3;
    if rows.len() != expected {
        return Err(ProtocolError::LengthMismatch { declared: expected, actual: rows.len() });
    }

    rows.chunks_exact(3)
        .map(|row| {
            Ok(EnvelopeKeyEntry {
                slot: row[0],
                present: row[1] != 0,
                key_type: KeyType::try_from(row[2])?,
            })
        })
        .collect()
}
