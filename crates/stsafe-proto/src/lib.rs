//! Wire format for the STSAFE-A110 host link.
//!
//! Every command sent to the secure element and every response read back is a
//! short frame protected by a CRC-16/X.25 checksum. The checksum is computed
//! over a one-byte header (the command code going out, the status code coming
//! back) followed by the frame payload, and must match the element's own
//! computation bit-for-bit or the frame is rejected.
//!
//! # Layout
//!
//! ```text
//! command:   ┌────────┬─────────────────┬─────────┐
//!            │ cmd u8 │ payload         │ crc u16 │
//!            └────────┴─────────────────┴─────────┘
//! response:  ┌───────────┬─────────┬──────────┬─────────┐
//!            │ status u8 │ len u16 │ data     │ crc u16 │
//!            └───────────┴─────────┴──────────┴─────────┘
//! ```
//!
//! Both the host session and the simulated element in the test harness use
//! the typed request/response encoders in [`payloads`], so a mismatch in one
//! direction shows up immediately in the other.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod crc;
pub mod errors;
pub mod frame;
pub mod payloads;
pub mod secret;

pub use command::{Command, KeyType, QueryTag, RandomKind, ResponseCode};
pub use crc::{Crc16X25, TableStrategy, checksum};
pub use errors::{ProtocolError, Result};
pub use frame::{CommandFrame, ResponseFrame};
pub use payloads::{EnvelopeKeyEntry, Request};
pub use secret::sealed;
