//! Element session: the command facade over a real bus.
//!
//! A [`Session`] is the explicitly owned replacement for a process-wide
//! handle and scratch buffer. It is created by [`Session::init`], owns its
//! [`FramedTransport`] (and through it the scratch buffer), and is torn down
//! by dropping it or calling [`Session::into_bus`]. Independent sessions over
//! independent buses never share state.

use bytes::Bytes;
use stsafe_proto::{
    Command, KeyType, QueryTag, RandomKind, Request, ResponseCode, payloads, sealed,
};

use crate::{
    element::SecureElement,
    error::ElementError,
    keys::{
        EnvelopeSlot, HOST_KEY_ATTRIBUTE_LEN, KeySlotStatus, LocalEnvelopeKeySlot,
        PlaintextEnvelope, WrappedEnvelope,
    },
    transport::{Bus, FramedTransport},
};

/// Default I2C address of the STSAFE-A110.
pub const DEFAULT_ADDRESS: u8 = 0x20;

/// Slot index reported for the single host key slot.
const HOST_KEY_SLOT_INDEX: u8 = 0;

/// Bytes looped through the element when probing the link.
const PROBE_PATTERN: [u8; 4] = [0xA5, 0x5A, 0x0F, 0xF0];

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device address on the bus
    pub address: u8,
    /// Echo a probe pattern during `init` to confirm the link
    pub probe_on_init: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { address: DEFAULT_ADDRESS, probe_on_init: true }
    }
}

/// Live session with one secure element.
#[derive(Debug)]
pub struct Session<B> {
    transport: FramedTransport<B>,
}

impl<B: Bus> Session<B> {
    /// Open a session over `bus`.
    ///
    /// # Errors
    ///
    /// Fails if the probe echo does not come back intact.
    pub fn init(bus: B, config: SessionConfig) -> Result<Self, ElementError> {
        let mut session = Self { transport: FramedTransport::new(bus, config.address) };

        if config.probe_on_init {
            let echoed = session.echo(&PROBE_PATTERN)?;
            if echoed != PROBE_PATTERN {
                return Err(ElementError::MalformedResponse {
                    command: Command::Echo,
                    reason: "probe pattern came back altered".to_string(),
                });
            }
        }

        tracing::debug!(address = config.address, "secure element session open");
        Ok(session)
    }

    /// Underlying bus.
    pub fn bus(&self) -> &B {
        self.transport.bus()
    }

    /// Underlying bus, mutably.
    pub fn bus_mut(&mut self) -> &mut B {
        self.transport.bus_mut()
    }

    /// Close the session and hand back the bus.
    pub fn into_bus(self) -> B {
        self.transport.into_bus()
    }

    fn execute(&mut self, request: &Request) -> Result<Bytes, ElementError> {
        let command = request.command();
        let frame = request.to_frame().map_err(ElementError::InvalidRequest)?;

        let response = self
            .transport
            .transact(&frame)
            .map_err(|source| ElementError::Transport { command, source })?;

        let code = response.status();
        if !code.is_ok() {
            tracing::debug!(%command, status = %code, "element rejected command");
            return Err(ElementError::Response { command, code });
        }

        Ok(response.into_data())
    }
}

fn malformed(command: Command, reason: impl ToString) -> ElementError {
    ElementError::MalformedResponse { command, reason: reason.to_string() }
}

impl<B: Bus> SecureElement for Session<B> {
    fn echo(&mut self, data: &[u8]) -> Result<Vec<u8>, ElementError> {
        let data = self.execute(&Request::Echo { data: Bytes::copy_from_slice(data) })?;
        Ok(data.to_vec())
    }

    fn generate_random(&mut self, kind: RandomKind, len: usize) -> Result<Vec<u8>, ElementError> {
        let requested = u8::try_from(len).map_err(|_| {
            ElementError::InvalidRequest(stsafe_proto::ProtocolError::PayloadTooLarge {
                size: len,
                max: usize::from(u8::MAX),
            })
        })?;

        let data = self.execute(&Request::GenerateRandom { kind, len: requested })?;
        if data.len() != len {
            return Err(malformed(
                Command::GenerateRandom,
                format!("asked for {len} bytes, got {}", data.len()),
            ));
        }
        Ok(data.to_vec())
    }

    fn query_host_key_slot(&mut self) -> Result<KeySlotStatus, ElementError> {
        let data = self.execute(&Request::Query { tag: QueryTag::HostKeySlot })?;
        let present =
            payloads::decode_host_key_slot(&data).map_err(|e| malformed(Command::Query, e))?;
        Ok(KeySlotStatus { slot_index: HOST_KEY_SLOT_INDEX, present })
    }

    fn put_host_key_attribute(
        &mut self,
        attribute: &[u8; HOST_KEY_ATTRIBUTE_LEN],
    ) -> Result<(), ElementError> {
        let request = Request::PutAttribute {
            tag: QueryTag::HostKeySlot,
            data: sealed(attribute),
        };

        match self.execute(&request) {
            Err(ElementError::Response { code: ResponseCode::KEY_SLOT_OCCUPIED, .. }) => {
                Err(ElementError::SlotOccupied)
            },
            other => other.map(|_| ()),
        }
    }

    fn query_local_envelope_key_slots(
        &mut self,
    ) -> Result<(LocalEnvelopeKeySlot, LocalEnvelopeKeySlot), ElementError> {
        let data = self.execute(&Request::Query { tag: QueryTag::LocalEnvelopeKeyTable })?;
        let entries =
            payloads::decode_envelope_key_table(&data).map_err(|e| malformed(Command::Query, e))?;

        let find = |slot: EnvelopeSlot| {
            entries
                .iter()
                .find(|entry| entry.slot == slot.index())
                .map(|entry| LocalEnvelopeKeySlot {
                    slot,
                    present: entry.present,
                    key_type: entry.key_type,
                })
                .ok_or_else(|| {
                    malformed(Command::Query, format!("envelope slot {} missing", slot.index()))
                })
        };

        Ok((find(EnvelopeSlot::Slot0)?, find(EnvelopeSlot::Slot1)?))
    }

    fn generate_local_envelope_key(
        &mut self,
        slot: EnvelopeSlot,
        key_type: KeyType,
    ) -> Result<(), ElementError> {
        self.execute(&Request::GenerateKey { slot: slot.index(), key_type })?;
        tracing::info!(slot = slot.index(), ?key_type, "generated local envelope key");
        Ok(())
    }

    fn wrap_local_envelope(
        &mut self,
        slot: EnvelopeSlot,
        plaintext: &PlaintextEnvelope,
    ) -> Result<WrappedEnvelope, ElementError> {
        let data = self.execute(&Request::WrapLocalEnvelope {
            slot: slot.index(),
            data: sealed(plaintext.as_bytes()),
        })?;
        Ok(WrappedEnvelope::new(data.to_vec()))
    }

    fn unwrap_local_envelope(
        &mut self,
        slot: EnvelopeSlot,
        wrapped: &WrappedEnvelope,
    ) -> Result<PlaintextEnvelope, ElementError> {
        let data = self.execute(&Request::UnwrapLocalEnvelope {
            slot: slot.index(),
            data: Bytes::copy_from_slice(wrapped.as_bytes()),
        })?;
        Ok(PlaintextEnvelope::new(data.to_vec()))
    }

    fn read_data_partition(
        &mut self,
        zone: u8,
        offset: u16,
        len: u16,
    ) -> Result<Vec<u8>, ElementError> {
        let data = self.execute(&Request::Read { zone, offset, len })?;
        if data.len() != usize::from(len) {
            return Err(malformed(
                Command::Read,
                format!("asked for {len} bytes, got {}", data.len()),
            ));
        }
        Ok(data.to_vec())
    }

    fn update_data_partition(
        &mut self,
        zone: u8,
        offset: u16,
        data: &[u8],
    ) -> Result<(), ElementError> {
        self.execute(&Request::Update { zone, offset, data: Bytes::copy_from_slice(data) })?;
        Ok(())
    }
}
