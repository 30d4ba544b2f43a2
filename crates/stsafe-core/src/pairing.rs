//! Host key pairing state machine.
//!
//! Provisions the MAC/cipher key pair shared between host and element, once,
//! and backs it up to host storage.
//!
//! # State Machine
//!
//! ```text
//! ┌───────┐   ┌───────────────────┐   ┌────────────────┐   ┌─────────┐   ┌────────┐
//! │ Start │──>│ EnsureEnvelopeKey │──>│ EnsureHostKeys │──>│ Persist │──>│ Paired │
//! └───────┘   └───────────────────┘   └────────────────┘   └─────────┘   └────────┘
//!     │  pending backup, keys still in element                 ↑
//!     └────────────────────────────────────────────────────────┘
//!
//!              any step ──> Failed(reason)
//! ```
//!
//! # Rules
//!
//! - Steps run strictly in order; the first failure stops the run and no
//!   later element command is issued.
//! - An element that already holds host keys is never written again. Calling
//!   [`Pairing::pair`] on a paired device is a no-op that only checks the
//!   local backup exists.
//! - Storage failures after the element write are reported with their own
//!   error (`erase`, `program` or `sync`) even though the element side
//!   succeeded. The keys are kept as a pending backup so the next call on the
//!   same [`Pairing`] resumes at `Persist` without touching the element.
//! - Before new keys go into the element, any record left in the backup
//!   region is erased and synced. A leftover record from an earlier pairing
//!   would otherwise pass for a backup of the new keys.
//! - A fresh [`Pairing`] (for instance after a restart) finding keys in the
//!   element but no backup reports [`PairingError::BackupMissing`]. The keys
//!   cannot be read back out of the element, so there is nothing to resume.

use stsafe_proto::{Command, KeyType, RandomKind};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::{
    element::SecureElement,
    error::{ElementError, Fault, StorageOp},
    keys::{EnvelopeSlot, HOST_KEY_LEN, HostKeyPair},
    observer::{PairingObserver, TracingObserver},
    storage::{KeyBackup, KeyStorage, PersistError, StorageError},
};

/// Where the host key pair comes from when the element has none.
#[derive(Debug, Clone, Default)]
pub enum HostKeySource {
    /// Draw both keys from the element's RNG
    #[default]
    GenerateLocally,
    /// Use keys supplied by an external provisioning tool
    Supplied(HostKeyPair),
}

/// Pairing configuration
#[derive(Debug, Clone, Default)]
pub struct PairingConfig {
    /// Source of new host keys
    pub host_keys: HostKeySource,
    /// Skip envelope key provisioning and rely on host storage only
    pub force_default_storage: bool,
    /// Offset of the backup record on the storage device
    pub backup_offset: u32,
}

/// Pairing state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    /// Not started, or about to restart
    Start,
    /// Checking / generating envelope key slot 0
    EnsureEnvelopeKey,
    /// Checking / writing the host key slot
    EnsureHostKeys,
    /// Backing keys up to storage
    Persist,
    /// Element and storage both hold the keys
    Paired,
    /// Last run stopped here
    Failed(FailureReason),
}

/// Why a run ended in [`PairingState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// An element call failed
    Element(Fault),
    /// A backup storage operation failed
    Storage(StorageOp),
    /// Backup region does not fit the storage device
    StorageTooSmall,
    /// Element holds keys that were never backed up
    BackupMissing,
}

/// What a successful run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingOutcome {
    /// Keys were written to the element and backed up
    NewlyPaired,
    /// Element already held keys and a backup exists
    AlreadyPaired,
    /// Finished the backup of keys written by an earlier run
    ResumedBackup,
}

/// State of envelope key slot 0 as seen by this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKeyStatus {
    /// `force_default_storage` is set
    Skipped,
    /// A key was already there
    Present,
    /// A key was generated; run the envelope self-test before using it
    Generated,
    /// Run resumed at `Persist` and did not look
    NotChecked,
}

/// Summary of a successful pairing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingReport {
    /// What happened to the host keys
    pub outcome: PairingOutcome,
    /// What happened to the envelope key
    pub envelope_key: EnvelopeKeyStatus,
}

/// Errors that end a pairing run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    /// An element call failed
    #[error("element call failed during {state:?}: {source}")]
    Element {
        /// State in which the call was made
        state: PairingState,
        /// Element error
        #[source]
        source: ElementError,
    },

    /// Backup region does not fit the storage device
    #[error("host key backup does not fit: {0}")]
    StorageTooSmall(#[source] StorageError),

    /// Element was paired but the backup could not be written
    #[error("element paired but backup {op} failed: {source}")]
    Storage {
        /// Storage step that failed
        op: StorageOp,
        /// Device error
        #[source]
        source: StorageError,
    },

    /// Existing backup could not be read
    #[error("reading host key backup failed: {0}")]
    BackupUnreadable(#[source] StorageError),

    /// Element holds host keys but storage has no backup
    #[error("element holds host keys but no local backup exists")]
    BackupMissing,
}

impl PairingError {
    /// Classify this error.
    pub fn fault(&self) -> Fault {
        match self {
            Self::Element { source, .. } => source.fault(),
            Self::StorageTooSmall(_) => Fault::Configuration,
            Self::Storage { op, .. } => Fault::Storage(*op),
            Self::BackupUnreadable(_) | Self::BackupMissing => Fault::Storage(StorageOp::Read),
        }
    }

    /// Reason recorded in [`PairingState::Failed`].
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Element { source, .. } => FailureReason::Element(source.fault()),
            Self::StorageTooSmall(_) => FailureReason::StorageTooSmall,
            Self::Storage { op, .. } => FailureReason::Storage(*op),
            Self::BackupUnreadable(_) => FailureReason::Storage(StorageOp::Read),
            Self::BackupMissing => FailureReason::BackupMissing,
        }
    }
}

impl From<PersistError> for PairingError {
    fn from(err: PersistError) -> Self {
        Self::Storage { op: err.op, source: err.source }
    }
}

/// Host key pairing state machine.
pub struct Pairing<O = TracingObserver> {
    config: PairingConfig,
    observer: O,
    state: PairingState,
    pending_backup: Option<HostKeyPair>,
}

impl Pairing<TracingObserver> {
    /// State machine logging through `tracing`.
    pub fn new(config: PairingConfig) -> Self {
        Self::with_observer(config, TracingObserver)
    }
}

impl<O: PairingObserver> Pairing<O> {
    /// State machine reporting transitions to `observer`.
    pub fn with_observer(config: PairingConfig, observer: O) -> Self {
        Self { config, observer, state: PairingState::Start, pending_backup: None }
    }

    /// Current state
    pub fn state(&self) -> PairingState {
        self.state
    }

    /// Configuration
    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    /// Observer
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// True when keys are in the element but their backup has not been
    /// written yet.
    pub fn has_pending_backup(&self) -> bool {
        self.pending_backup.is_some()
    }

    /// Run the pairing sequence.
    ///
    /// # Errors
    ///
    /// Returns the first failure. See the module docs for which failures
    /// leave the element paired.
    pub fn pair<E, S>(
        &mut self,
        element: &mut E,
        storage: &mut S,
    ) -> Result<PairingReport, PairingError>
    where
        E: SecureElement + ?Sized,
        S: KeyStorage + ?Sized,
    {
        if self.state != PairingState::Start {
            self.transition(PairingState::Start);
        }

        match self.run(element, storage) {
            Ok(report) => {
                self.transition(PairingState::Paired);
                Ok(report)
            },
            Err(err) => {
                self.transition(PairingState::Failed(err.reason()));
                Err(err)
            },
        }
    }

    fn run<E, S>(&mut self, element: &mut E, storage: &mut S) -> Result<PairingReport, PairingError>
    where
        E: SecureElement + ?Sized,
        S: KeyStorage + ?Sized,
    {
        let backup = KeyBackup::new(self.config.backup_offset);
        backup.check_fits(storage).map_err(PairingError::StorageTooSmall)?;

        if self.pending_backup.is_some() {
            let slot = element.query_host_key_slot().map_err(|e| self.element_error(e))?;
            if slot.present {
                self.transition(PairingState::Persist);
                self.persist(&backup, storage)?;
                return Ok(PairingReport {
                    outcome: PairingOutcome::ResumedBackup,
                    envelope_key: EnvelopeKeyStatus::NotChecked,
                });
            }

            tracing::warn!("host keys vanished from element before backup; pairing again");
            self.pending_backup = None;
        }

        self.transition(PairingState::EnsureEnvelopeKey);
        let envelope_key = self.ensure_envelope_key(element)?;

        self.transition(PairingState::EnsureHostKeys);
        let slot = element.query_host_key_slot().map_err(|e| self.element_error(e))?;
        if slot.present {
            return match backup.load(storage) {
                Ok(Some(_)) => {
                    Ok(PairingReport { outcome: PairingOutcome::AlreadyPaired, envelope_key })
                },
                Ok(None) => Err(PairingError::BackupMissing),
                Err(err) => Err(PairingError::BackupUnreadable(err)),
            };
        }

        match backup.load(storage) {
            Ok(None) => {},
            Ok(Some(_)) => {
                tracing::warn!("element has no host keys; erasing stale backup record");
                backup.invalidate(storage)?;
            },
            Err(err) => return Err(PairingError::BackupUnreadable(err)),
        }

        let keys = self.host_keys(element)?;
        element
            .put_host_key_attribute(&keys.to_attribute())
            .map_err(|e| self.element_error(e))?;
        self.pending_backup = Some(keys);

        self.transition(PairingState::Persist);
        self.persist(&backup, storage)?;

        Ok(PairingReport { outcome: PairingOutcome::NewlyPaired, envelope_key })
    }

    fn ensure_envelope_key<E>(&mut self, element: &mut E) -> Result<EnvelopeKeyStatus, PairingError>
    where
        E: SecureElement + ?Sized,
    {
        if self.config.force_default_storage {
            return Ok(EnvelopeKeyStatus::Skipped);
        }

        let (slot0, _) =
            element.query_local_envelope_key_slots().map_err(|e| self.element_error(e))?;
        if slot0.present {
            return Ok(EnvelopeKeyStatus::Present);
        }

        element
            .generate_local_envelope_key(EnvelopeSlot::Slot0, KeyType::Aes128)
            .map_err(|e| self.element_error(e))?;
        Ok(EnvelopeKeyStatus::Generated)
    }

    fn host_keys<E>(&self, element: &mut E) -> Result<HostKeyPair, PairingError>
    where
        E: SecureElement + ?Sized,
    {
        match &self.config.host_keys {
            HostKeySource::Supplied(keys) => Ok(keys.clone()),
            HostKeySource::GenerateLocally => {
                let mac = Zeroizing::new(
                    element
                        .generate_random(RandomKind::Ephemeral, HOST_KEY_LEN)
                        .map_err(|e| self.element_error(e))?,
                );
                let cipher = Zeroizing::new(
                    element
                        .generate_random(RandomKind::Ephemeral, HOST_KEY_LEN)
                        .map_err(|e| self.element_error(e))?,
                );

                HostKeyPair::from_slices(&mac, &cipher).ok_or_else(|| {
                    self.element_error(ElementError::MalformedResponse {
                        command: Command::GenerateRandom,
                        reason: "random output is not a host key length".to_string(),
                    })
                })
            },
        }
    }

    /// Write the pending backup. On failure the keys stay pending.
    fn persist<S>(&mut self, backup: &KeyBackup, storage: &mut S) -> Result<(), PairingError>
    where
        S: KeyStorage + ?Sized,
    {
        let Some(keys) = self.pending_backup.as_ref() else {
            return Ok(());
        };

        backup.persist(storage, keys)?;
        self.pending_backup = None;
        Ok(())
    }

    fn element_error(&self, source: ElementError) -> PairingError {
        PairingError::Element { state: self.state, source }
    }

    fn transition(&mut self, to: PairingState) {
        let from = std::mem::replace(&mut self.state, to);
        self.observer.on_transition(from, to);
    }
}

/// Whether the element holds host keys right now.
///
/// Always asks the element; a factory reset can clear the slot at any time.
pub fn is_paired<E: SecureElement + ?Sized>(element: &mut E) -> Result<bool, ElementError> {
    Ok(element.query_host_key_slot()?.present)
}
