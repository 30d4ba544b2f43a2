//! Bus abstraction and checksummed framing.
//!
//! [`Bus`] is the thin I/O edge: raw writes and reads to a device address plus
//! a blocking delay. Production wires it to an I2C peripheral, tests wire it to
//! the simulated element in `stsafe-harness`.
//!
//! [`FramedTransport`] sits on top and is the only place frames are encoded,
//! checksummed and verified. A response whose checksum does not match is
//! reported as [`TransportError::Integrity`] and never handed to the caller.

use std::time::Duration;

use stsafe_proto::{CommandFrame, ProtocolError, ResponseFrame};
use thiserror::Error;
use zeroize::Zeroize;

/// Errors raised by the raw bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Device did not acknowledge its address
    #[error("device {address:#04x} did not acknowledge")]
    Nack {
        /// Device address
        address: u8,
    },

    /// Transfer did not complete in time
    #[error("bus transfer timed out")]
    Timeout,

    /// Any other controller-level failure
    #[error("bus fault: {0}")]
    Other(String),
}

/// Errors raised while exchanging a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Raw bus failure
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Received frame failed its checksum
    #[error("frame checksum mismatch: computed {computed:#06x}, received {received:#06x}")]
    Integrity {
        /// Checksum computed over the received bytes
        computed: u16,
        /// Checksum carried by the frame
        received: u16,
    },

    /// Received frame is structurally invalid
    #[error("malformed frame: {0}")]
    Malformed(ProtocolError),
}

impl From<ProtocolError> for TransportError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::ChecksumMismatch { computed, received } => {
                Self::Integrity { computed, received }
            },
            other => Self::Malformed(other),
        }
    }
}

/// Raw bus primitives.
pub trait Bus {
    /// Write `bytes` to the device at `address`.
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError>;

    /// Fill `buf` from the device at `address`.
    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError>;

    /// Block for `duration`.
    fn delay(&mut self, duration: Duration);
}

impl<B: Bus + ?Sized> Bus for &mut B {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        (**self).write(address, bytes)
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError> {
        (**self).read(address, buf)
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration);
    }
}

impl<B: Bus + ?Sized> Bus for Box<B> {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        (**self).write(address, bytes)
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError> {
        (**self).read(address, buf)
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration);
    }
}

/// Checksummed frame exchange with one device.
///
/// Owns the scratch buffer every frame is encoded into and read back through.
/// The buffer is wiped after every send and receive, since frames carry host
/// keys and envelope plaintext.
#[derive(Debug)]
pub struct FramedTransport<B> {
    bus: B,
    address: u8,
    scratch: Vec<u8>,
}

impl<B: Bus> FramedTransport<B> {
    /// Transport talking to `address` over `bus`.
    pub fn new(bus: B, address: u8) -> Self {
        Self { bus, address, scratch: Vec::with_capacity(512) }
    }

    /// Device address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Underlying bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Underlying bus, mutably.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Release the bus.
    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Encode `frame`, append its checksum and write it.
    pub fn send(&mut self, frame: &CommandFrame) -> Result<(), TransportError> {
        self.scratch.clear();
        frame.encode(&mut self.scratch);

        tracing::trace!(
            address = self.address,
            header = frame.header(),
            len = self.scratch.len(),
            "sending frame"
        );
        let written = self.bus.write(self.address, &self.scratch);
        self.scratch.zeroize();
        written?;
        Ok(())
    }

    /// Read one response frame and verify its checksum.
    ///
    /// The fixed prefix is read first so the second read is sized by the
    /// frame's own length field.
    pub fn receive(&mut self) -> Result<ResponseFrame, TransportError> {
        let mut prefix = [0u8; ResponseFrame::PREFIX_LEN];
        self.bus.read(self.address, &mut prefix)?;
        let remaining = ResponseFrame::remaining_len(&prefix)?;

        self.scratch.clear();
        self.scratch.extend_from_slice(&prefix);
        self.scratch.resize(ResponseFrame::PREFIX_LEN + remaining, 0);
        let decoded = self
            .bus
            .read(self.address, &mut self.scratch[ResponseFrame::PREFIX_LEN..])
            .map_err(TransportError::from)
            .and_then(|()| ResponseFrame::decode(&self.scratch).map_err(TransportError::from));
        self.scratch.zeroize();

        let frame = decoded.inspect_err(|err| {
            tracing::debug!(address = self.address, error = %err, "rejected response frame");
        })?;

        tracing::trace!(
            address = self.address,
            status = %frame.status(),
            len = frame.data().len(),
            "received frame"
        );
        Ok(frame)
    }

    /// Block for `duration` through the bus.
    pub fn delay(&mut self, duration: Duration) {
        self.bus.delay(duration);
    }

    /// Send `frame`, wait for the element to process it, read the response.
    pub fn transact(&mut self, frame: &CommandFrame) -> Result<ResponseFrame, TransportError> {
        self.send(frame)?;
        if let Ok(command) = frame.command() {
            self.delay(command.processing_time());
        }
        self.receive()
    }
}
