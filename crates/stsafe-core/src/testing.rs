//! In-crate fakes for unit tests that do not care about the wire.

use stsafe_proto::{Command, KeyType, RandomKind, ResponseCode};

use crate::{
    element::SecureElement,
    error::{ElementError, StorageOp},
    keys::{
        ENVELOPE_OVERHEAD, EnvelopeSlot, HOST_KEY_ATTRIBUTE_LEN, KeySlotStatus,
        LocalEnvelopeKeySlot, PlaintextEnvelope, WrappedEnvelope,
    },
    observer::PairingObserver,
    pairing::PairingState,
    storage::{ERASED_BYTE, KeyStorage, StorageError},
};

/// Element held entirely in memory. Records the name of every call.
pub(crate) struct FakeElement {
    pub host_key: Option<[u8; HOST_KEY_ATTRIBUTE_LEN]>,
    pub envelope_keys: [Option<KeyType>; 2],
    pub calls: Vec<&'static str>,
    pub fail_on: Option<&'static str>,
    pub occupy_on_put: bool,
    pub flip_wrapped_bit: Option<usize>,
    counter: u8,
}

impl FakeElement {
    pub fn new() -> Self {
        Self {
            host_key: None,
            envelope_keys: [None, None],
            calls: Vec::new(),
            fail_on: None,
            occupy_on_put: false,
            flip_wrapped_bit: None,
            counter: 0,
        }
    }

    fn call(&mut self, name: &'static str, command: Command) -> Result<(), ElementError> {
        self.calls.push(name);
        if self.fail_on == Some(name) {
            return Err(ElementError::Response { command, code: ResponseCode::INTERNAL_ERROR });
        }
        Ok(())
    }

    fn require_key(&self, slot: EnvelopeSlot, command: Command) -> Result<u8, ElementError> {
        match self.envelope_keys[usize::from(slot.index())] {
            Some(_) => Ok(0xA5 ^ slot.index()),
            None => Err(ElementError::Response { command, code: ResponseCode::KEY_NOT_FOUND }),
        }
    }
}

impl SecureElement for FakeElement {
    fn echo(&mut self, data: &[u8]) -> Result<Vec<u8>, ElementError> {
        self.call("echo", Command::Echo)?;
        Ok(data.to_vec())
    }

    fn generate_random(&mut self, _kind: RandomKind, len: usize) -> Result<Vec<u8>, ElementError> {
        self.call("generate_random", Command::GenerateRandom)?;
        Ok((0..len)
            .map(|_| {
                self.counter = self.counter.wrapping_add(0x3D);
                self.counter
            })
            .collect())
    }

    fn query_host_key_slot(&mut self) -> Result<KeySlotStatus, ElementError> {
        self.call("query_host", Command::Query)?;
        Ok(KeySlotStatus { slot_index: 0, present: self.host_key.is_some() })
    }

    fn put_host_key_attribute(
        &mut self,
        attribute: &[u8; HOST_KEY_ATTRIBUTE_LEN],
    ) -> Result<(), ElementError> {
        self.call("put_host_key", Command::PutAttribute)?;
        if self.occupy_on_put || self.host_key.is_some() {
            return Err(ElementError::SlotOccupied);
        }
        self.host_key = Some(*attribute);
        Ok(())
    }

    fn query_local_envelope_key_slots(
        &mut self,
    ) -> Result<(LocalEnvelopeKeySlot, LocalEnvelopeKeySlot), ElementError> {
        self.call("query_envelope", Command::Query)?;
        let entry = |slot: EnvelopeSlot| {
            let key_type = self.envelope_keys[usize::from(slot.index())];
            LocalEnvelopeKeySlot {
                slot,
                present: key_type.is_some(),
                key_type: key_type.unwrap_or(KeyType::Aes128),
            }
        };
        Ok((entry(EnvelopeSlot::Slot0), entry(EnvelopeSlot::Slot1)))
    }

    fn generate_local_envelope_key(
        &mut self,
        slot: EnvelopeSlot,
        key_type: KeyType,
    ) -> Result<(), ElementError> {
        self.call("generate_envelope_key", Command::GenerateKey)?;
        self.envelope_keys[usize::from(slot.index())] = Some(key_type);
        Ok(())
    }

    fn wrap_local_envelope(
        &mut self,
        slot: EnvelopeSlot,
        plaintext: &PlaintextEnvelope,
    ) -> Result<WrappedEnvelope, ElementError> {
        self.call("wrap", Command::WrapLocalEnvelope)?;
        let mask = self.require_key(slot, Command::WrapLocalEnvelope)?;

        let mut wrapped = vec![slot.index(); ENVELOPE_OVERHEAD];
        wrapped.extend(plaintext.as_bytes().iter().map(|b| b ^ mask));
        if let Some(bit) = self.flip_wrapped_bit {
            let index = ENVELOPE_OVERHEAD + bit / 8 % plaintext.len();
            wrapped[index] ^= 1 << (bit % 8);
        }
        Ok(WrappedEnvelope::new(wrapped))
    }

    fn unwrap_local_envelope(
        &mut self,
        slot: EnvelopeSlot,
        wrapped: &WrappedEnvelope,
    ) -> Result<PlaintextEnvelope, ElementError> {
        self.call("unwrap", Command::UnwrapLocalEnvelope)?;
        let mask = self.require_key(slot, Command::UnwrapLocalEnvelope)?;

        let body = wrapped.as_bytes().get(ENVELOPE_OVERHEAD..).ok_or(ElementError::Response {
            command: Command::UnwrapLocalEnvelope,
            code: ResponseCode::INVALID_PARAMETER,
        })?;
        Ok(PlaintextEnvelope::new(body.iter().map(|b| b ^ mask).collect()))
    }

    fn read_data_partition(
        &mut self,
        _zone: u8,
        _offset: u16,
        len: u16,
    ) -> Result<Vec<u8>, ElementError> {
        self.call("read", Command::Read)?;
        Ok(vec![0; usize::from(len)])
    }

    fn update_data_partition(
        &mut self,
        _zone: u8,
        _offset: u16,
        _data: &[u8],
    ) -> Result<(), ElementError> {
        self.call("update", Command::Update)
    }
}

/// Flat byte array with a per-operation failure switch.
pub(crate) struct MemoryStorage {
    pub bytes: Vec<u8>,
    pub fail: Option<StorageOp>,
    pub erases: usize,
    pub programs: usize,
    pub synced: bool,
}

impl MemoryStorage {
    pub fn new(size: usize) -> Self {
        Self { bytes: vec![ERASED_BYTE; size], fail: None, erases: 0, programs: 0, synced: false }
    }

    fn check(&self, op: StorageOp) -> Result<(), StorageError> {
        if self.fail == Some(op) {
            return Err(StorageError::Device(format!("{op} injected")));
        }
        Ok(())
    }
}

impl KeyStorage for MemoryStorage {
    fn size(&self) -> u32 {
        self.bytes.len() as u32
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        self.check(StorageOp::Read)?;
        let start = offset as usize;
        buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        Ok(())
    }

    fn erase(&mut self, offset: u32, len: u32) -> Result<(), StorageError> {
        self.check(StorageOp::Erase)?;
        self.erases += 1;
        let start = offset as usize;
        self.bytes[start..start + len as usize].fill(ERASED_BYTE);
        Ok(())
    }

    fn program(&mut self, offset: u32, data: &[u8]) -> Result<(), StorageError> {
        self.check(StorageOp::Program)?;
        self.programs += 1;
        let start = offset as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        self.check(StorageOp::Sync)?;
        self.synced = true;
        Ok(())
    }
}

/// Observer that keeps every target state.
#[derive(Default)]
pub(crate) struct Recorder {
    pub states: Vec<PairingState>,
}

impl PairingObserver for Recorder {
    fn on_transition(&mut self, _from: PairingState, to: PairingState) {
        self.states.push(to);
    }
}
