//! Local envelope wrap/unwrap self-test.
//!
//! Run after pairing generated a new envelope key. Random bytes are wrapped
//! and unwrapped under the key and must come back exactly. A failing element
//! call and a round trip that returns different bytes are reported as
//! different errors: the first says the element is unreachable or refused,
//! the second says the key cannot be trusted.

use stsafe_proto::RandomKind;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::{
    element::SecureElement,
    error::{ElementError, Fault},
    keys::{
        ENVELOPE_OVERHEAD, EnvelopeSlot, MAX_ENVELOPE_LEN, MIN_ENVELOPE_LEN, PlaintextEnvelope,
    },
};

/// Largest single random draw the element serves.
const RANDOM_CHUNK: usize = u8::MAX as usize;

/// Verifier configuration
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Envelope key slot under test
    pub slot: EnvelopeSlot,
    /// Plaintext length; a multiple of 8 in `16..=480`
    pub length: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self { slot: EnvelopeSlot::Slot0, length: 32 }
    }
}

/// Step of the self-test an element call belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStage {
    /// Drawing the random plaintext
    Generate,
    /// Wrapping
    Wrap,
    /// Unwrapping
    Unwrap,
}

/// Self-test failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Configured length cannot be wrapped
    #[error("envelope length {length} must be a multiple of 8 between 16 and 480")]
    InvalidLength {
        /// Rejected length
        length: usize,
    },

    /// An element call failed
    #[error("element call failed during {stage:?}: {source}")]
    Element {
        /// Step that failed
        stage: VerifyStage,
        /// Element error
        #[source]
        source: ElementError,
    },

    /// Wrapped output has the wrong size
    #[error("wrapped envelope is {actual} bytes, expected {expected}")]
    WrappedLength {
        /// Plaintext length plus overhead
        expected: usize,
        /// Length returned
        actual: usize,
    },

    /// Unwrapped bytes differ from the original plaintext
    #[error("unwrapped envelope differs from plaintext at offset {offset}")]
    IntegrityMismatch {
        /// First differing offset, or the shorter length if one is a prefix
        offset: usize,
    },
}

impl VerifyError {
    /// Classify this error.
    pub fn fault(&self) -> Fault {
        match self {
            Self::InvalidLength { .. } => Fault::Configuration,
            Self::Element { source, .. } => source.fault(),
            Self::WrappedLength { .. } | Self::IntegrityMismatch { .. } => Fault::Verification,
        }
    }
}

/// Envelope wrap/unwrap self-test.
#[derive(Debug, Clone)]
pub struct EnvelopeVerifier {
    config: VerifierConfig,
}

impl EnvelopeVerifier {
    /// Verifier for `config`.
    ///
    /// # Errors
    ///
    /// [`VerifyError::InvalidLength`] if the length is outside `16..=480` or
    /// not a multiple of 8.
    pub fn new(config: VerifierConfig) -> Result<Self, VerifyError> {
        let length = config.length;
        if !(MIN_ENVELOPE_LEN..=MAX_ENVELOPE_LEN).contains(&length) || length % 8 != 0 {
            return Err(VerifyError::InvalidLength { length });
        }
        Ok(Self { config })
    }

    /// Configuration
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Run the round trip once.
    ///
    /// # Errors
    ///
    /// [`VerifyError::Element`] when a call fails,
    /// [`VerifyError::WrappedLength`] or [`VerifyError::IntegrityMismatch`]
    /// when the element answered but the round trip is wrong.
    pub fn verify<E: SecureElement + ?Sized>(&self, element: &mut E) -> Result<(), VerifyError> {
        let VerifierConfig { slot, length } = self.config;
        let plaintext = random_plaintext(element, length)
            .map_err(element_error(VerifyStage::Generate))?;

        let wrapped = element
            .wrap_local_envelope(slot, &plaintext)
            .map_err(element_error(VerifyStage::Wrap))?;
        let expected = length + ENVELOPE_OVERHEAD;
        if wrapped.len() != expected {
            return Err(VerifyError::WrappedLength { expected, actual: wrapped.len() });
        }

        let unwrapped = element
            .unwrap_local_envelope(slot, &wrapped)
            .map_err(element_error(VerifyStage::Unwrap))?;

        if let Some(offset) = first_difference(plaintext.as_bytes(), unwrapped.as_bytes()) {
            tracing::warn!(slot = slot.index(), offset, "envelope round trip mismatch");
            return Err(VerifyError::IntegrityMismatch { offset });
        }

        tracing::debug!(slot = slot.index(), length, "envelope round trip verified");
        Ok(())
    }
}

fn random_plaintext<E: SecureElement + ?Sized>(
    element: &mut E,
    length: usize,
) -> Result<PlaintextEnvelope, ElementError> {
    let mut bytes = Vec::with_capacity(length);
    while bytes.len() < length {
        let chunk = (length - bytes.len()).min(RANDOM_CHUNK);
        let random = Zeroizing::new(element.generate_random(RandomKind::Ephemeral, chunk)?);
        bytes.extend_from_slice(&random);
    }
    Ok(PlaintextEnvelope::new(bytes))
}

fn element_error(stage: VerifyStage) -> impl FnOnce(ElementError) -> VerifyError {
    move |source| VerifyError::Element { stage, source }
}

fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .or_else(|| (a.len() != b.len()).then(|| a.len().min(b.len())))
}
