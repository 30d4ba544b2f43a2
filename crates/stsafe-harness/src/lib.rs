//! Deterministic test harness for STSAFE-A110 host pairing.
//!
//! A simulated element behind the [`stsafe_core::Bus`] trait, an in-memory
//! flash behind [`stsafe_core::KeyStorage`] and a recording pairing observer.
//! Each has one-shot fault injection so integration tests can drive the
//! pairing state machine and envelope verifier through every failure path
//! with reproducible results.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod flash;
pub mod observer;
pub mod sim_element;

pub use flash::MemoryFlash;
pub use observer::RecordingObserver;
pub use sim_element::{SharedSimElement, SimElement};
