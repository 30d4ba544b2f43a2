//! Pairing observer that records transitions for assertions.

use stsafe_core::{PairingObserver, PairingState};

/// Records every transition in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    transitions: Vec<(PairingState, PairingState)>,
}

impl RecordingObserver {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// `(from, to)` pairs seen so far.
    pub fn transitions(&self) -> &[(PairingState, PairingState)] {
        &self.transitions
    }

    /// Target states only.
    pub fn states(&self) -> Vec<PairingState> {
        self.transitions.iter().map(|(_, to)| *to).collect()
    }

    /// Forget recorded transitions.
    pub fn clear(&mut self) {
        self.transitions.clear();
    }
}

impl PairingObserver for RecordingObserver {
    fn on_transition(&mut self, from: PairingState, to: PairingState) {
        tracing::trace!(?from, ?to, "recorded transition");
        self.transitions.push((from, to));
    }
}
