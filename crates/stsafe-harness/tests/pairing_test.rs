//! End-to-end pairing against the simulated element.
//!
//! Every test drives the real `Session` over the bus-level simulator, so the
//! frames, checksums and processing delays are the same ones hardware sees.

use hex_literal::hex;
use stsafe_core::{
    EnvelopeKeyStatus, EnvelopeVerifier, HostKeyPair, HostKeySource, KeyBackup, Pairing,
    PairingConfig, PairingError, PairingOutcome, PairingState, Session, SessionConfig, StorageOp,
    VerifierConfig, is_paired,
};
use stsafe_harness::{MemoryFlash, RecordingObserver, SharedSimElement, SimElement};
use stsafe_proto::{Command, KeyType};

const FLASH_SIZE: usize = 4096;

fn counting_keys() -> HostKeyPair {
    HostKeyPair::new(
        hex!("00112233445566778899aabbccddeeff"),
        hex!("11223344556677881122334455667788"),
    )
}

fn supplied(keys: HostKeyPair) -> PairingConfig {
    PairingConfig { host_keys: HostKeySource::Supplied(keys), ..PairingConfig::default() }
}

#[test]
fn fresh_device_is_paired_and_backed_up() {
    let mut sim = SimElement::new(1);
    let mut flash = MemoryFlash::new(FLASH_SIZE);
    let mut session = Session::init(&mut sim, SessionConfig::default()).expect("session");
    let mut pairing = Pairing::new(PairingConfig::default());

    let report = pairing.pair(&mut session, &mut flash).expect("pairing");

    assert_eq!(report.outcome, PairingOutcome::NewlyPaired);
    assert_eq!(report.envelope_key, EnvelopeKeyStatus::Generated);
    assert_eq!(pairing.state(), PairingState::Paired);
    assert!(is_paired(&mut session).expect("query"));

    EnvelopeVerifier::new(VerifierConfig::default())
        .expect("config")
        .verify(&mut session)
        .expect("envelope round trip");
    drop(session);

    let in_element = sim.host_keys().expect("host keys written");
    flash.power_cycle();
    let backed_up = KeyBackup::new(0).load(&mut flash).expect("read").expect("backup present");
    assert_eq!(in_element, backed_up);
    assert_eq!(sim.envelope_key(0), Some(KeyType::Aes128));
    assert_eq!(sim.count(Command::GenerateRandom), 2 + 1);
}

#[test]
fn supplied_keys_written_verbatim() {
    let mut sim = SimElement::new(2);
    let mut flash = MemoryFlash::new(FLASH_SIZE);
    let mut session = Session::init(&mut sim, SessionConfig::default()).expect("session");

    Pairing::new(supplied(counting_keys())).pair(&mut session, &mut flash).expect("pairing");
    drop(session);

    assert_eq!(sim.host_keys(), Some(counting_keys()));
    assert_eq!(sim.count(Command::GenerateRandom), 0);
    assert_eq!(&flash.contents()[..16], &hex!("00112233445566778899aabbccddeeff"));
}

#[test]
fn backup_honours_configured_offset() {
    let mut sim = SimElement::new(3);
    let mut flash = MemoryFlash::new(FLASH_SIZE);
    let mut session = Session::init(&mut sim, SessionConfig::default()).expect("session");
    let config = PairingConfig { backup_offset: 1024, ..supplied(counting_keys()) };

    Pairing::new(config).pair(&mut session, &mut flash).expect("pairing");

    assert!(flash.contents()[..1024].iter().all(|&b| b == 0xFF));
    assert_eq!(KeyBackup::new(1024).load(&mut flash).expect("read"), Some(counting_keys()));
}

#[test]
fn repeated_pairing_never_rewrites() {
    let mut sim = SimElement::new(4);
    let mut flash = MemoryFlash::new(FLASH_SIZE);
    let mut session = Session::init(&mut sim, SessionConfig::default()).expect("session");
    let mut pairing = Pairing::new(PairingConfig::default());

    pairing.pair(&mut session, &mut flash).expect("first");
    let keys = session.bus().host_keys();
    let backup = flash.contents().to_vec();
    session.bus_mut().clear_commands();

    for _ in 0..3 {
        let report = pairing.pair(&mut session, &mut flash).expect("repeat");
        assert_eq!(report.outcome, PairingOutcome::AlreadyPaired);
        assert_eq!(report.envelope_key, EnvelopeKeyStatus::Present);
    }

    assert_eq!(session.bus().count(Command::PutAttribute), 0);
    assert_eq!(session.bus().count(Command::GenerateKey), 0);
    assert_eq!(session.bus().count(Command::GenerateRandom), 0);
    assert_eq!(session.bus().host_keys(), keys);
    assert_eq!(flash.contents(), backup.as_slice());
}

#[test]
fn restarted_host_sees_existing_pairing() {
    let mut sim = SimElement::new(5);
    let mut flash = MemoryFlash::new(FLASH_SIZE);

    {
        let mut session = Session::init(&mut sim, SessionConfig::default()).expect("session");
        Pairing::new(PairingConfig::default()).pair(&mut session, &mut flash).expect("pairing");
    }
    flash.power_cycle();

    let mut session = Session::init(&mut sim, SessionConfig::default()).expect("session");
    let report =
        Pairing::new(PairingConfig::default()).pair(&mut session, &mut flash).expect("restart");

    assert_eq!(report.outcome, PairingOutcome::AlreadyPaired);
}

#[test]
fn forced_default_storage_leaves_envelope_keys_alone() {
    let mut sim = SimElement::new(6);
    let mut flash = MemoryFlash::new(FLASH_SIZE);
    let mut session = Session::init(&mut sim, SessionConfig::default()).expect("session");
    let config = PairingConfig { force_default_storage: true, ..supplied(counting_keys()) };

    let report = Pairing::new(config).pair(&mut session, &mut flash).expect("pairing");
    drop(session);

    assert_eq!(report.envelope_key, EnvelopeKeyStatus::Skipped);
    assert_eq!(sim.count(Command::GenerateKey), 0);
    assert_eq!(sim.count(Command::Query), 1, "only the host key slot is queried");
    assert_eq!(sim.envelope_key(0), None);
    assert_eq!(sim.host_keys(), Some(counting_keys()));
}

#[test]
fn program_failure_resumes_without_second_element_write() {
    let sim = SharedSimElement::new(SimElement::new(7));
    let mut flash = MemoryFlash::new(FLASH_SIZE);
    let mut session = Session::init(sim.clone(), SessionConfig::default()).expect("session");
    let mut pairing = Pairing::new(supplied(counting_keys()));

    flash.fail_next(StorageOp::Program);
    let err = pairing.pair(&mut session, &mut flash).expect_err("program fails");

    assert!(matches!(err, PairingError::Storage { op: StorageOp::Program, .. }));
    assert!(is_paired(&mut session).expect("query"));
    assert!(pairing.has_pending_backup());
    assert_eq!(sim.lock().count(Command::PutAttribute), 1);

    let report = pairing.pair(&mut session, &mut flash).expect("resume");

    assert_eq!(report.outcome, PairingOutcome::ResumedBackup);
    assert_eq!(sim.lock().count(Command::PutAttribute), 1);
    assert_eq!(KeyBackup::new(0).load(&mut flash).expect("read"), Some(counting_keys()));
}

#[test]
fn lost_sync_then_restart_reports_missing_backup() {
    let mut sim = SimElement::new(8);
    let mut flash = MemoryFlash::new(FLASH_SIZE);

    {
        let mut session = Session::init(&mut sim, SessionConfig::default()).expect("session");
        flash.fail_next(StorageOp::Sync);
        let err = Pairing::new(PairingConfig::default())
            .pair(&mut session, &mut flash)
            .expect_err("sync fails");
        assert!(matches!(err, PairingError::Storage { op: StorageOp::Sync, .. }));
    }
    flash.power_cycle();

    let mut session = Session::init(&mut sim, SessionConfig::default()).expect("session");
    let mut pairing = Pairing::new(PairingConfig::default());
    let err = pairing.pair(&mut session, &mut flash).expect_err("gap detected");

    assert_eq!(err, PairingError::BackupMissing);
    assert_eq!(session.bus().count(Command::PutAttribute), 1);
}

#[test]
fn factory_reset_between_attempts_pairs_again() {
    let sim = SharedSimElement::new(SimElement::new(9));
    let mut flash = MemoryFlash::new(FLASH_SIZE);
    let mut session = Session::init(sim.clone(), SessionConfig::default()).expect("session");
    let mut pairing = Pairing::new(PairingConfig::default());

    flash.fail_next(StorageOp::Erase);
    pairing.pair(&mut session, &mut flash).expect_err("erase fails");
    let first = sim.lock().host_keys();

    sim.lock().factory_reset();
    let report = pairing.pair(&mut session, &mut flash).expect("pairing");

    assert_eq!(report.outcome, PairingOutcome::NewlyPaired);
    assert_eq!(report.envelope_key, EnvelopeKeyStatus::Generated);
    let second = sim.lock().host_keys();
    assert_ne!(first, second);
    assert_eq!(KeyBackup::new(0).load(&mut flash).expect("read"), second);
}

#[test]
fn stale_backup_left_by_failed_erase_is_never_trusted() {
    let sim = SharedSimElement::new(SimElement::new(13));
    let mut flash = MemoryFlash::new(FLASH_SIZE);
    let mut session = Session::init(sim.clone(), SessionConfig::default()).expect("session");
    Pairing::new(supplied(counting_keys())).pair(&mut session, &mut flash).expect("first pairing");

    sim.lock().factory_reset();
    flash.fail_next(StorageOp::Erase);
    let err = Pairing::new(PairingConfig::default())
        .pair(&mut session, &mut flash)
        .expect_err("erase fails");

    assert!(matches!(err, PairingError::Storage { op: StorageOp::Erase, .. }));
    assert!(!is_paired(&mut session).expect("query"), "element untouched");
    assert_eq!(sim.lock().count(Command::PutAttribute), 1);

    flash.power_cycle();
    let report =
        Pairing::new(PairingConfig::default()).pair(&mut session, &mut flash).expect("restart");

    assert_eq!(report.outcome, PairingOutcome::NewlyPaired);
    let in_element = sim.lock().host_keys().expect("host keys written");
    assert_ne!(in_element, counting_keys());
    assert_eq!(KeyBackup::new(0).load(&mut flash).expect("read"), Some(in_element));
}

#[test]
fn restart_after_repair_with_lost_backup_reports_gap() {
    let sim = SharedSimElement::new(SimElement::new(14));
    let mut flash = MemoryFlash::new(FLASH_SIZE);
    let mut session = Session::init(sim.clone(), SessionConfig::default()).expect("session");
    Pairing::new(supplied(counting_keys())).pair(&mut session, &mut flash).expect("first pairing");

    sim.lock().factory_reset();
    flash.fail_next(StorageOp::Program);
    Pairing::new(PairingConfig::default())
        .pair(&mut session, &mut flash)
        .expect_err("program fails");
    assert!(is_paired(&mut session).expect("query"));

    flash.power_cycle();
    assert_eq!(KeyBackup::new(0).load(&mut flash).expect("read"), None);

    let err = Pairing::new(PairingConfig::default())
        .pair(&mut session, &mut flash)
        .expect_err("old record must not count");
    assert_eq!(err, PairingError::BackupMissing);
}

#[test]
fn is_paired_tracks_the_element() {
    let sim = SharedSimElement::new(SimElement::new(10));
    let mut session = Session::init(sim.clone(), SessionConfig::default()).expect("session");

    assert!(!is_paired(&mut session).expect("query"));
    Pairing::new(PairingConfig::default())
        .pair(&mut session, &mut MemoryFlash::new(64))
        .expect("pairing");
    assert!(is_paired(&mut session).expect("query"));

    sim.lock().factory_reset();
    assert!(!is_paired(&mut session).expect("query"));
}

#[test]
fn observer_sees_transitions_in_order() {
    let mut sim = SimElement::new(11);
    let mut flash = MemoryFlash::new(FLASH_SIZE);
    let mut session = Session::init(&mut sim, SessionConfig::default()).expect("session");
    let mut observer = RecordingObserver::new();

    Pairing::with_observer(PairingConfig::default(), &mut observer)
        .pair(&mut session, &mut flash)
        .expect("pairing");

    assert_eq!(observer.transitions(), &[
        (PairingState::Start, PairingState::EnsureEnvelopeKey),
        (PairingState::EnsureEnvelopeKey, PairingState::EnsureHostKeys),
        (PairingState::EnsureHostKeys, PairingState::Persist),
        (PairingState::Persist, PairingState::Paired),
    ]);
}

#[test]
fn undersized_flash_rejected_before_any_command() {
    let mut sim = SimElement::new(12);
    let mut flash = MemoryFlash::new(16);
    let mut session = Session::init(&mut sim, SessionConfig::default()).expect("session");
    session.bus_mut().clear_commands();

    let err =
        Pairing::new(PairingConfig::default()).pair(&mut session, &mut flash).expect_err("small");

    assert!(matches!(err, PairingError::StorageTooSmall(_)));
    assert!(session.bus().commands().is_empty());
    assert!(flash.ops().is_empty());
}
