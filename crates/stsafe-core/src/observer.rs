//! Transition event sink for the pairing state machine.
//!
//! The state machine reports every transition here instead of logging
//! directly. [`TracingObserver`] is the default and emits structured
//! `tracing` events; tests swap in a recorder.

use crate::pairing::PairingState;

/// Receives pairing state transitions in order.
pub trait PairingObserver {
    /// Called after the state machine moved from `from` to `to`.
    fn on_transition(&mut self, from: PairingState, to: PairingState);
}

impl<O: PairingObserver + ?Sized> PairingObserver for &mut O {
    fn on_transition(&mut self, from: PairingState, to: PairingState) {
        (**self).on_transition(from, to);
    }
}

/// Observer that logs transitions through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PairingObserver for TracingObserver {
    fn on_transition(&mut self, from: PairingState, to: PairingState) {
        match to {
            PairingState::Failed(reason) => {
                tracing::warn!(?from, ?reason, "pairing failed");
            },
            PairingState::Paired => tracing::info!(?from, "pairing complete"),
            _ => tracing::debug!(?from, ?to, "pairing transition"),
        }
    }
}
