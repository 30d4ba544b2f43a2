//! Command facade for the secure element.
//!
//! The pairing state machine and the envelope verifier only talk to the
//! element through [`SecureElement`]. [`crate::Session`] implements it over a
//! real bus; tests can implement it directly when the wire is not the point.

use stsafe_proto::{KeyType, RandomKind};

use crate::{
    error::ElementError,
    keys::{
        EnvelopeSlot, HOST_KEY_ATTRIBUTE_LEN, KeySlotStatus, LocalEnvelopeKeySlot,
        PlaintextEnvelope, WrappedEnvelope,
    },
};

/// Request/response primitives offered by the element.
///
/// Every call blocks until the element has answered. Any non-success status
/// is an opaque failure; the only status callers branch on is
/// [`ElementError::SlotOccupied`].
pub trait SecureElement {
    /// Loop `data` through the element and return what came back.
    fn echo(&mut self, data: &[u8]) -> Result<Vec<u8>, ElementError>;

    /// `len` bytes from the element's true RNG.
    fn generate_random(&mut self, kind: RandomKind, len: usize) -> Result<Vec<u8>, ElementError>;

    /// Current state of the host key slot.
    fn query_host_key_slot(&mut self) -> Result<KeySlotStatus, ElementError>;

    /// Write the MAC-then-cipher attribute into the host key slot.
    ///
    /// Fails with [`ElementError::SlotOccupied`] if keys are already present;
    /// the element never overwrites them.
    fn put_host_key_attribute(
        &mut self,
        attribute: &[u8; HOST_KEY_ATTRIBUTE_LEN],
    ) -> Result<(), ElementError>;

    /// Status of both local envelope key slots, slot 0 first.
    fn query_local_envelope_key_slots(
        &mut self,
    ) -> Result<(LocalEnvelopeKeySlot, LocalEnvelopeKeySlot), ElementError>;

    /// Generate a fresh envelope key of `key_type` in `slot`.
    fn generate_local_envelope_key(
        &mut self,
        slot: EnvelopeSlot,
        key_type: KeyType,
    ) -> Result<(), ElementError>;

    /// Wrap `plaintext` under the key in `slot`.
    fn wrap_local_envelope(
        &mut self,
        slot: EnvelopeSlot,
        plaintext: &PlaintextEnvelope,
    ) -> Result<WrappedEnvelope, ElementError>;

    /// Unwrap `wrapped` under the key in `slot`.
    fn unwrap_local_envelope(
        &mut self,
        slot: EnvelopeSlot,
        wrapped: &WrappedEnvelope,
    ) -> Result<PlaintextEnvelope, ElementError>;

    /// Read `len` bytes of data partition `zone` at `offset`.
    fn read_data_partition(
        &mut self,
        zone: u8,
        offset: u16,
        len: u16,
    ) -> Result<Vec<u8>, ElementError>;

    /// Overwrite data partition `zone` at `offset` with `data`.
    fn update_data_partition(
        &mut self,
        zone: u8,
        offset: u16,
        data: &[u8],
    ) -> Result<(), ElementError>;
}
