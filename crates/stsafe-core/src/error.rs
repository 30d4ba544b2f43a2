//! Element errors and fault classification.

use std::fmt;

use stsafe_proto::{Command, ProtocolError, ResponseCode};
use thiserror::Error;

use crate::transport::TransportError;

/// Broad class of a failure, independent of which layer raised it.
///
/// Callers deciding whether to retry, re-pair or give up look at this rather
/// than matching individual error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Bus-level send/receive failure
    Transport,
    /// Element answered with a non-success status
    Element,
    /// Received frame failed its checksum
    Integrity,
    /// Host-local storage operation failed
    Storage(StorageOp),
    /// Wrap/unwrap round trip produced different bytes
    Verification,
    /// Host-side configuration cannot work with this device
    Configuration,
}

/// Storage operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOp {
    /// Reading back the backup region
    Read,
    /// Erasing the backup region
    Erase,
    /// Programming the key pair
    Program,
    /// Flushing the write
    Sync,
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Erase => "erase",
            Self::Program => "program",
            Self::Sync => "sync",
        })
    }
}

/// Failure of a single command facade call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElementError {
    /// Frame exchange failed
    #[error("{command} failed in transport: {source}")]
    Transport {
        /// Command being exchanged
        command: Command,
        /// Underlying transport error
        #[source]
        source: TransportError,
    },

    /// Element returned a non-success status
    #[error("{command} rejected by element with status {code}")]
    Response {
        /// Rejected command
        command: Command,
        /// Status returned
        code: ResponseCode,
    },

    /// Host key slot already holds keys
    #[error("host key slot already populated")]
    SlotOccupied,

    /// Request could not be encoded
    #[error("invalid request: {0}")]
    InvalidRequest(#[source] ProtocolError),

    /// Response data does not have the expected shape
    #[error("malformed {command} response: {reason}")]
    MalformedResponse {
        /// Command whose response was malformed
        command: Command,
        /// What was wrong
        reason: String,
    },
}

impl ElementError {
    /// Classify this error.
    pub fn fault(&self) -> Fault {
        match self {
            Self::Transport { source: TransportError::Integrity { .. }, .. } => Fault::Integrity,
            Self::Transport { .. } => Fault::Transport,
            Self::InvalidRequest(_) => Fault::Configuration,
            Self::Response { .. } | Self::SlotOccupied | Self::MalformedResponse { .. } => {
                Fault::Element
            },
        }
    }

    /// Status code returned by the element, if the element answered at all.
    pub fn response_code(&self) -> Option<ResponseCode> {
        match self {
            Self::Response { code, .. } => Some(*code),
            Self::SlotOccupied => Some(ResponseCode::KEY_SLOT_OCCUPIED),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::BusError;

    #[test]
    fn checksum_failure_is_integrity_not_transport() {
        let err = ElementError::Transport {
            command: Command::Query,
            source: TransportError::Integrity { computed: 1, received: 2 },
        };
        assert_eq!(err.fault(), Fault::Integrity);

        let err = ElementError::Transport {
            command: Command::Query,
            source: TransportError::Bus(BusError::Nack { address: 0x20 }),
        };
        assert_eq!(err.fault(), Fault::Transport);
    }

    #[test]
    fn status_codes_are_element_faults() {
        let err =
            ElementError::Response { command: Command::PutAttribute, code: ResponseCode(0x42) };
        assert_eq!(err.fault(), Fault::Element);
        assert_eq!(err.response_code(), Some(ResponseCode(0x42)));
        assert_eq!(ElementError::SlotOccupied.fault(), Fault::Element);
    }
}
