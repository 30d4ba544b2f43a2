//! Bus-level simulated STSAFE-A110.
//!
//! The simulator sits behind [`Bus`], so everything above it (framing,
//! checksums, the command facade, pairing) runs exactly as it would against
//! hardware. It decodes each written command frame with the same codec the
//! host uses, executes it against in-memory state and queues the encoded
//! response for the following reads.
//!
//! All randomness comes from a [`ChaCha8Rng`] seeded at construction, so a
//! seed fully determines generated keys, wrapped envelopes and random output.
//!
//! Envelope wrapping is a keystream XOR with a random 8-byte IV prefix. It
//! has the element's shape (output is input plus 8 bytes, unwrap inverts
//! wrap) and no authentication, so a corrupted wrap output comes back from
//! unwrap as different plaintext rather than as an error.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use stsafe_core::{
    Bus, BusError, HostKeyPair,
    keys::{ENVELOPE_OVERHEAD, HOST_KEY_ATTRIBUTE_LEN, MAX_ENVELOPE_LEN, MIN_ENVELOPE_LEN},
    session::DEFAULT_ADDRESS,
};
use stsafe_proto::{
    Command, CommandFrame, EnvelopeKeyEntry, KeyType, ProtocolError, QueryTag, Request,
    ResponseCode, ResponseFrame, payloads,
};

/// Number of data partition zones.
pub const ZONE_COUNT: usize = 8;

/// Size of each data partition zone.
pub const ZONE_SIZE: usize = 128;

/// Bytes prepended to every wrapped envelope.
const IV_LEN: usize = ENVELOPE_OVERHEAD;

/// A generated local envelope key.
#[derive(Debug, Clone)]
struct EnvelopeKey {
    key_type: KeyType,
    material: Vec<u8>,
}

/// One-shot faults armed by tests.
#[derive(Debug, Default)]
struct Faults {
    nack_next_write: bool,
    corrupt_next_response: bool,
    fail_next: Option<(Command, ResponseCode)>,
    corrupt_wrapped_bit: Option<usize>,
}

/// Simulated secure element.
#[derive(Debug)]
pub struct SimElement {
    address: u8,
    rng: ChaCha8Rng,
    host_keys: Option<[u8; HOST_KEY_ATTRIBUTE_LEN]>,
    envelope_keys: [Option<EnvelopeKey>; 2],
    zones: Vec<Vec<u8>>,
    outbox: VecDeque<u8>,
    faults: Faults,
    commands: Vec<Command>,
    elapsed: Duration,
}

impl SimElement {
    /// Blank element at the default address.
    pub fn new(seed: u64) -> Self {
        Self::with_address(seed, DEFAULT_ADDRESS)
    }

    /// Blank element answering on `address`.
    pub fn with_address(seed: u64, address: u8) -> Self {
        Self {
            address,
            rng: ChaCha8Rng::seed_from_u64(seed),
            host_keys: None,
            envelope_keys: [None, None],
            zones: vec![vec![0; ZONE_SIZE]; ZONE_COUNT],
            outbox: VecDeque::new(),
            faults: Faults::default(),
            commands: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Host keys currently in the element.
    pub fn host_keys(&self) -> Option<HostKeyPair> {
        self.host_keys.as_ref().map(HostKeyPair::from_attribute)
    }

    /// Key type in envelope slot `slot`, if one was generated.
    pub fn envelope_key(&self, slot: u8) -> Option<KeyType> {
        self.envelope_keys.get(usize::from(slot))?.as_ref().map(|key| key.key_type)
    }

    /// Every command decoded so far, in order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// How many times `command` was received.
    pub fn count(&self, command: Command) -> usize {
        self.commands.iter().filter(|c| **c == command).count()
    }

    /// Forget the command log.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Total processing delay the host waited for.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Contents of data partition `zone`.
    pub fn zone(&self, zone: u8) -> Option<&[u8]> {
        self.zones.get(usize::from(zone)).map(Vec::as_slice)
    }

    /// Wipe keys and data partitions.
    pub fn factory_reset(&mut self) {
        self.host_keys = None;
        self.envelope_keys = [None, None];
        for zone in &mut self.zones {
            zone.fill(0);
        }
        self.outbox.clear();
        tracing::debug!("simulated element factory reset");
    }

    /// Refuse the next bus write with a NACK.
    pub fn nack_next_write(&mut self) {
        self.faults.nack_next_write = true;
    }

    /// Flip one bit of the next encoded response.
    pub fn corrupt_next_response(&mut self) {
        self.faults.corrupt_next_response = true;
    }

    /// Answer the next `command` with `code` instead of executing it.
    pub fn fail_next(&mut self, command: Command, code: ResponseCode) {
        self.faults.fail_next = Some((command, code));
    }

    /// Flip `bit` of the ciphertext in the next wrap output.
    ///
    /// The index wraps around the ciphertext length; the IV is never touched.
    pub fn corrupt_wrapped_bit(&mut self, bit: usize) {
        self.faults.corrupt_wrapped_bit = Some(bit);
    }

    fn handle(&mut self, bytes: &[u8]) -> ResponseFrame {
        let frame = match CommandFrame::decode(bytes) {
            Ok(frame) => frame,
            Err(ProtocolError::ChecksumMismatch { computed, received }) => {
                tracing::debug!(computed, received, "simulated element rejected command checksum");
                return ResponseFrame::error(ResponseCode::COMMUNICATION_ERROR);
            },
            Err(_) => return ResponseFrame::error(ResponseCode::INVALID_PARAMETER),
        };

        let Ok(command) = frame.command() else {
            return ResponseFrame::error(ResponseCode::UNSUPPORTED_COMMAND);
        };
        self.commands.push(command);

        if let Some((target, code)) = self.faults.fail_next
            && target == command
        {
            self.faults.fail_next = None;
            return ResponseFrame::error(code);
        }

        let result = match Request::from_frame(&frame) {
            Ok(request) => self.execute(request),
            Err(_) => Err(ResponseCode::INVALID_PARAMETER),
        };

        tracing::trace!(%command, ok = result.is_ok(), "simulated element executed command");
        match result {
            Ok(data) => ResponseFrame::ok(data)
                .unwrap_or_else(|_| ResponseFrame::error(ResponseCode::INVALID_PARAMETER)),
            Err(code) => ResponseFrame::error(code),
        }
    }

    fn execute(&mut self, request: Request) -> Result<Vec<u8>, ResponseCode> {
        match request {
            Request::Echo { data } => Ok(data.to_vec()),
            Request::GenerateRandom { len, .. } => {
                let mut out = vec![0; usize::from(len)];
                self.rng.fill_bytes(&mut out);
                Ok(out)
            },
            Request::Read { zone, offset, len } => {
                let range = self.zone_range(zone, offset, usize::from(len))?;
                Ok(self.zones[usize::from(zone)][range].to_vec())
            },
            Request::Update { zone, offset, data } => {
                let range = self.zone_range(zone, offset, data.len())?;
                self.zones[usize::from(zone)][range].copy_from_slice(&data);
                Ok(Vec::new())
            },
            Request::Query { tag: QueryTag::HostKeySlot } => {
                Ok(payloads::encode_host_key_slot(self.host_keys.is_some()))
            },
            Request::Query { tag: QueryTag::LocalEnvelopeKeyTable } => {
                let entries: Vec<_> = (0u8..)
                    .zip(&self.envelope_keys)
                    .map(|(slot, key)| EnvelopeKeyEntry {
                        slot,
                        present: key.is_some(),
                        key_type: key.as_ref().map_or(KeyType::Aes128, |k| k.key_type),
                    })
                    .collect();
                Ok(payloads::encode_envelope_key_table(&entries))
            },
            Request::PutAttribute { tag: QueryTag::HostKeySlot, data } => {
                let attribute =
                    <[u8; HOST_KEY_ATTRIBUTE_LEN]>::try_from(&data[..])
                        .map_err(|_| ResponseCode::INVALID_PARAMETER)?;
                if self.host_keys.is_some() {
                    return Err(ResponseCode::KEY_SLOT_OCCUPIED);
                }
                self.host_keys = Some(attribute);
                Ok(Vec::new())
            },
            Request::PutAttribute { .. } => Err(ResponseCode::INVALID_PARAMETER),
            Request::GenerateKey { slot, key_type } => {
                let entry = self
                    .envelope_keys
                    .get_mut(usize::from(slot))
                    .ok_or(ResponseCode::INVALID_PARAMETER)?;
                if entry.is_some() {
                    return Err(ResponseCode::KEY_SLOT_OCCUPIED);
                }

                let mut material = vec![0; key_type.key_len()];
                self.rng.fill_bytes(&mut material);
                *entry = Some(EnvelopeKey { key_type, material });
                Ok(Vec::new())
            },
            Request::WrapLocalEnvelope { slot, data } => self.wrap_envelope(slot, &data),
            Request::UnwrapLocalEnvelope { slot, data } => self.unwrap_envelope(slot, &data),
        }
    }

    fn zone_range(
        &self,
        zone: u8,
        offset: u16,
        len: usize,
    ) -> Result<std::ops::Range<usize>, ResponseCode> {
        let size = self.zones.get(usize::from(zone)).ok_or(ResponseCode::INVALID_PARAMETER)?.len();
        let start = usize::from(offset);
        let end = start + len;
        if end > size {
            return Err(ResponseCode::INVALID_PARAMETER);
        }
        Ok(start..end)
    }

    fn envelope_material(&self, slot: u8) -> Result<Vec<u8>, ResponseCode> {
        self.envelope_keys
            .get(usize::from(slot))
            .ok_or(ResponseCode::INVALID_PARAMETER)?
            .as_ref()
            .map(|key| key.material.clone())
            .ok_or(ResponseCode::KEY_NOT_FOUND)
    }

    fn wrap_envelope(&mut self, slot: u8, plaintext: &[u8]) -> Result<Vec<u8>, ResponseCode> {
        check_envelope_len(plaintext.len())?;
        let key = self.envelope_material(slot)?;

        let mut iv = [0u8; IV_LEN];
        self.rng.fill_bytes(&mut iv);

        let mut wrapped = Vec::with_capacity(IV_LEN + plaintext.len());
        wrapped.extend_from_slice(&iv);
        let stream = keystream(&key, &iv, plaintext.len());
        wrapped.extend(plaintext.iter().zip(stream).map(|(p, k)| p ^ k));

        if let Some(bit) = self.faults.corrupt_wrapped_bit.take() {
            let bit = bit % (plaintext.len() * 8);
            wrapped[IV_LEN + bit / 8] ^= 1 << (bit % 8);
        }
        Ok(wrapped)
    }

    fn unwrap_envelope(&self, slot: u8, wrapped: &[u8]) -> Result<Vec<u8>, ResponseCode> {
        if wrapped.len() < IV_LEN {
            return Err(ResponseCode::INVALID_PARAMETER);
        }
        let (iv, ciphertext) = wrapped.split_at(IV_LEN);
        check_envelope_len(ciphertext.len())?;
        let key = self.envelope_material(slot)?;

        let mut iv_bytes = [0u8; IV_LEN];
        iv_bytes.copy_from_slice(iv);
        Ok(ciphertext
            .iter()
            .zip(keystream(&key, &iv_bytes, ciphertext.len()))
            .map(|(c, k)| c ^ k)
            .collect())
    }

    fn queue_response(&mut self, response: &ResponseFrame) {
        let mut encoded = Vec::with_capacity(response.encoded_len());
        response.encode(&mut encoded);

        if std::mem::take(&mut self.faults.corrupt_next_response) {
            let index = if response.data().is_empty() {
                encoded.len() - 1
            } else {
                ResponseFrame::PREFIX_LEN
            };
            encoded[index] ^= 0x01;
        }

        self.outbox.clear();
        self.outbox.extend(encoded);
    }
}

impl Bus for SimElement {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        if address != self.address || std::mem::take(&mut self.faults.nack_next_write) {
            return Err(BusError::Nack { address });
        }

        let response = self.handle(bytes);
        self.queue_response(&response);
        Ok(())
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError> {
        if address != self.address || self.outbox.len() < buf.len() {
            return Err(BusError::Nack { address });
        }

        let len = buf.len();
        for (dst, src) in buf.iter_mut().zip(self.outbox.drain(..len)) {
            *dst = src;
        }
        Ok(())
    }

    fn delay(&mut self, duration: Duration) {
        self.elapsed += duration;
    }
}

fn check_envelope_len(len: usize) -> Result<(), ResponseCode> {
    if (MIN_ENVELOPE_LEN..=MAX_ENVELOPE_LEN).contains(&len) && len % 8 == 0 {
        Ok(())
    } else {
        Err(ResponseCode::INVALID_PARAMETER)
    }
}

fn keystream(key: &[u8], iv: &[u8; IV_LEN], len: usize) -> Vec<u8> {
    let mut seed = [0u8; 32];
    for (i, b) in key.iter().enumerate() {
        seed[i % 32] ^= b;
    }
    for (i, b) in iv.iter().enumerate() {
        seed[32 - IV_LEN + i] ^= b;
    }

    let mut stream = vec![0; len];
    ChaCha8Rng::from_seed(seed).fill_bytes(&mut stream);
    stream
}

/// Simulated element shared between a session and the test driving it.
///
/// The session owns one clone as its bus; the test keeps another to arm
/// faults and inspect state while the session is alive.
#[derive(Debug, Clone)]
pub struct SharedSimElement(Arc<Mutex<SimElement>>);

impl SharedSimElement {
    /// Share `element`.
    pub fn new(element: SimElement) -> Self {
        Self(Arc::new(Mutex::new(element)))
    }

    /// Lock the element.
    ///
    /// A panicking test thread leaves the state usable for the next lock.
    pub fn lock(&self) -> MutexGuard<'_, SimElement> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Bus for SharedSimElement {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        self.lock().write(address, bytes)
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError> {
        self.lock().read(address, buf)
    }

    fn delay(&mut self, duration: Duration) {
        self.lock().delay(duration);
    }
}
