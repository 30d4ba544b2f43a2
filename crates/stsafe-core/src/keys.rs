//! Key material, slot snapshots and envelopes.
//!
//! Secret-bearing types ([`HostKeyPair`], [`PlaintextEnvelope`]) are zeroized
//! when dropped and never print their bytes through `Debug`.

use std::fmt;

use stsafe_proto::KeyType;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Length of each host key.
pub const HOST_KEY_LEN: usize = 16;

/// Length of the MAC-then-cipher attribute written to the element.
pub const HOST_KEY_ATTRIBUTE_LEN: usize = 2 * HOST_KEY_LEN;

/// Bytes the element adds when wrapping an envelope.
pub const ENVELOPE_OVERHEAD: usize = 8;

/// Smallest envelope the element wraps.
pub const MIN_ENVELOPE_LEN: usize = 16;

/// Largest envelope the element wraps.
pub const MAX_ENVELOPE_LEN: usize = 480;

/// Host MAC and cipher keys shared with the element.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct HostKeyPair {
    mac_key: [u8; HOST_KEY_LEN],
    cipher_key: [u8; HOST_KEY_LEN],
}

impl HostKeyPair {
    /// Pair from explicit keys.
    pub fn new(mac_key: [u8; HOST_KEY_LEN], cipher_key: [u8; HOST_KEY_LEN]) -> Self {
        Self { mac_key, cipher_key }
    }

    /// Pair from two slices; `None` unless both are exactly [`HOST_KEY_LEN`].
    pub fn from_slices(mac_key: &[u8], cipher_key: &[u8]) -> Option<Self> {
        Some(Self { mac_key: mac_key.try_into().ok()?, cipher_key: cipher_key.try_into().ok()? })
    }

    /// Split a 32-byte attribute into MAC key then cipher key.
    pub fn from_attribute(attribute: &[u8; HOST_KEY_ATTRIBUTE_LEN]) -> Self {
        let (mac, cipher) = attribute.split_at(HOST_KEY_LEN);
        let mut pair = Self { mac_key: [0; HOST_KEY_LEN], cipher_key: [0; HOST_KEY_LEN] };
        pair.mac_key.copy_from_slice(mac);
        pair.cipher_key.copy_from_slice(cipher);
        pair
    }

    /// MAC key.
    pub fn mac_key(&self) -> &[u8; HOST_KEY_LEN] {
        &self.mac_key
    }

    /// Cipher key.
    pub fn cipher_key(&self) -> &[u8; HOST_KEY_LEN] {
        &self.cipher_key
    }

    /// MAC key followed by cipher key, scrubbed when dropped.
    pub fn to_attribute(&self) -> Zeroizing<[u8; HOST_KEY_ATTRIBUTE_LEN]> {
        let mut attribute = Zeroizing::new([0u8; HOST_KEY_ATTRIBUTE_LEN]);
        attribute[..HOST_KEY_LEN].copy_from_slice(&self.mac_key);
        attribute[HOST_KEY_LEN..].copy_from_slice(&self.cipher_key);
        attribute
    }
}

impl fmt::Debug for HostKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostKeyPair").finish_non_exhaustive()
    }
}

/// Snapshot of the host key slot. Always re-queried, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySlotStatus {
    /// Slot index reported by the element
    pub slot_index: u8,
    /// Whether host keys are present
    pub present: bool,
}

/// One of the two local envelope key slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EnvelopeSlot {
    /// Slot 0
    #[default]
    Slot0,
    /// Slot 1
    Slot1,
}

impl EnvelopeSlot {
    /// Slot number on the wire.
    pub fn index(self) -> u8 {
        match self {
            Self::Slot0 => 0,
            Self::Slot1 => 1,
        }
    }

    /// Slot from its wire number.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Slot0),
            1 => Some(Self::Slot1),
            _ => None,
        }
    }
}

/// Status of an element-resident envelope key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalEnvelopeKeySlot {
    /// Which slot
    pub slot: EnvelopeSlot,
    /// Whether a key is present
    pub present: bool,
    /// Key type (meaningful only when present)
    pub key_type: KeyType,
}

/// Secret blob to be wrapped by the element.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PlaintextEnvelope(Vec<u8>);

impl PlaintextEnvelope {
    /// Take ownership of `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Envelope bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Envelope length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PlaintextEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaintextEnvelope").field("len", &self.0.len()).finish_non_exhaustive()
    }
}

/// Envelope as returned by the element's wrap operation.
///
/// Always [`ENVELOPE_OVERHEAD`] bytes longer than the plaintext it wraps; the
/// extra bytes are opaque to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedEnvelope(Vec<u8>);

impl WrappedEnvelope {
    /// Take ownership of `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Wrapped bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Wrapped length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Give back the bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}
