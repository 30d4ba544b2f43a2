//! Error types for frame and payload decoding.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding frames and payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Buffer is shorter than the smallest valid frame or payload.
    #[error("truncated input: need at least {expected} bytes, got {actual}")]
    Truncated {
        /// Minimum number of bytes required
        expected: usize,
        /// Number of bytes available
        actual: usize,
    },

    /// Received checksum does not match the one computed over the frame.
    #[error("checksum mismatch: computed {computed:#06x}, received {received:#06x}")]
    ChecksumMismatch {
        /// Checksum computed locally
        computed: u16,
        /// Checksum carried by the frame
        received: u16,
    },

    /// Payload exceeds the element's buffer.
    #[error("payload of {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge {
        /// Payload length
        size: usize,
        /// Maximum supported length
        max: usize,
    },

    /// Response length field disagrees with the bytes present.
    #[error("length field says {declared} bytes, frame carries {actual}")]
    LengthMismatch {
        /// Length declared in the frame
        declared: usize,
        /// Length actually present
        actual: usize,
    },

    /// Header byte is not a known command code.
    #[error("unknown command code {0:#04x}")]
    UnknownCommand(u8),

    /// Query tag is not recognised.
    #[error("unknown query tag {0:#04x}")]
    UnknownTag(u8),

    /// Key type byte is not recognised.
    #[error("unknown key type {0:#04x}")]
    UnknownKeyType(u8),

    /// Payload is structurally invalid for its command.
    #[error("malformed {command} payload: {reason}")]
    MalformedPayload {
        /// Command whose payload failed to parse
        command: &'static str,
        /// What was wrong
        reason: &'static str,
    },
}
