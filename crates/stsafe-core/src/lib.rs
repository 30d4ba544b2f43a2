//! STSAFE-A110 host pairing core.
//!
//! Host-side logic for provisioning the MAC/cipher key pair shared with the
//! secure element, and for checking that a local envelope key actually
//! round-trips before anything is wrapped under it.
//!
//! # Architecture
//!
//! ```text
//! Pairing / EnvelopeVerifier
//!            │  SecureElement (command facade)
//!            ▼
//!        Session ── FramedTransport ── checksum every frame
//!            │
//!            ▼
//!           Bus (I2C, simulator, ...)
//! ```
//!
//! Everything is synchronous and blocking. A [`Session`] owns its transport
//! and scratch buffer and takes `&mut self` for every command, so at most one
//! command is ever in flight. Callers sharing a session across threads put it
//! behind a mutex.
//!
//! # Components
//!
//! - [`transport`]: Bus abstraction and checksummed framing
//! - [`element`]: Command facade trait
//! - [`session`]: Facade implementation over a bus
//! - [`keys`]: Host key pair, slot and envelope types
//! - [`storage`]: Persistent storage collaborator and key backup layout
//! - [`pairing`]: Host key pairing state machine
//! - [`envelope`]: Envelope wrap/unwrap self-test
//! - [`observer`]: Transition event sink
//! - [`error`]: Element errors and fault classification

pub mod element;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod observer;
pub mod pairing;
pub mod session;
pub mod storage;
pub mod transport;

#[cfg(test)]
mod testing;

pub use element::SecureElement;
pub use envelope::{EnvelopeVerifier, VerifierConfig, VerifyError};
pub use error::{ElementError, Fault, StorageOp};
pub use keys::{
    EnvelopeSlot, HostKeyPair, KeySlotStatus, LocalEnvelopeKeySlot, PlaintextEnvelope,
    WrappedEnvelope,
};
pub use observer::{PairingObserver, TracingObserver};
pub use pairing::{
    EnvelopeKeyStatus, FailureReason, HostKeySource, Pairing, PairingConfig, PairingError,
    PairingOutcome, PairingReport, PairingState, is_paired,
};
pub use session::{Session, SessionConfig};
pub use storage::{KeyBackup, KeyStorage, StorageError};
pub use transport::{Bus, BusError, FramedTransport, TransportError};
