//! End-to-end sessions against the simulated controller.

use hpm_core::protocol::{VDM_SELECTOR, parse_custom_words};
use hpm_core::transport::STATUS_NOT_PERMITTED;
use hpm_core::{
    Channel, CommandTag, Connection, HpmError, HpmSession, KnownVdm, Mode, ModeController,
    SessionConfig, SimulatedHpm, SimulatedProvider, StaticIdentity, VdmRequestKind,
};

const BOARD: &str = "J314sAP";

fn provider_with(rid: u32, hpm: &SimulatedHpm) -> SimulatedProvider {
    SimulatedProvider::new().with_instance(rid, hpm.clone())
}

#[test]
fn reboot_enters_and_leaves_diagnostic_mode() {
    let hpm = SimulatedHpm::new(BOARD);
    let mut session = HpmSession::new(
        SessionConfig::default(),
        provider_with(0, &hpm),
        StaticIdentity::new(BOARD),
    );

    session
        .run(&VdmRequestKind::Known(KnownVdm::Reboot))
        .unwrap();

    let expected: Vec<u8> = [0x05AC_8012u32, 0x105, 0x8000_0000]
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect();
    assert_eq!(hpm.vdms(), vec![expected]);
    assert_eq!(
        hpm.commands(),
        vec![CommandTag::LOCK, CommandTag::DBMA, CommandTag::DBMA]
    );
    assert_eq!(hpm.mode(), Mode::Application);
    assert!(hpm.is_closed());
}

#[test]
fn rejected_unlock_recovers_after_reset() {
    let hpm = SimulatedHpm::new(BOARD);
    hpm.reject_unlocks(1);
    let mut session = HpmSession::new(
        SessionConfig::default(),
        provider_with(0, &hpm),
        StaticIdentity::new(BOARD),
    );

    session.run(&VdmRequestKind::Known(KnownVdm::Dfu)).unwrap();

    assert_eq!(
        &hpm.commands()[..3],
        &[CommandTag::LOCK, CommandTag::GAID, CommandTag::LOCK]
    );
    assert_eq!(hpm.vdms().len(), 1);
}

#[test]
fn second_unlock_rejection_is_fatal() {
    let hpm = SimulatedHpm::new(BOARD);
    hpm.reject_unlocks(2);
    let mut session = HpmSession::new(
        SessionConfig::default(),
        provider_with(0, &hpm),
        StaticIdentity::new(BOARD),
    );

    let err = session
        .run(&VdmRequestKind::Known(KnownVdm::Reboot))
        .unwrap_err();

    assert!(matches!(err, HpmError::UnlockFailed { .. }));
    assert_eq!(err.raw_code(), Some(STATUS_NOT_PERMITTED));
    assert!(hpm.vdms().is_empty());
    assert_eq!(hpm.mode(), Mode::Application);
    assert!(hpm.is_closed());
}

#[test]
fn wrong_board_key_cannot_unlock() {
    let hpm = SimulatedHpm::new(BOARD);
    let mut session = HpmSession::new(
        SessionConfig::default(),
        provider_with(0, &hpm),
        StaticIdentity::new("J413AP"),
    );

    let err = session
        .run(&VdmRequestKind::Known(KnownVdm::Reboot))
        .unwrap_err();
    assert!(matches!(err, HpmError::UnlockFailed { .. }));
    assert!(!hpm.is_unlocked());
}

#[test]
fn empty_port_is_reported_with_rid() {
    let hpm = SimulatedHpm::new(BOARD);
    hpm.set_connection_status(0x00);
    let config = SessionConfig {
        rid: 1,
        ..SessionConfig::default()
    };
    let mut session = HpmSession::new(config, provider_with(1, &hpm), StaticIdentity::new(BOARD));

    let err = session
        .run(&VdmRequestKind::Known(KnownVdm::Reboot))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "No connection found; is a device connected to port 1?"
    );
    assert!(hpm.commands().is_empty());
}

#[test]
fn unknown_rid_is_not_found() {
    let hpm = SimulatedHpm::new(BOARD);
    let config = SessionConfig {
        rid: 7,
        ..SessionConfig::default()
    };
    let mut session = HpmSession::new(config, provider_with(0, &hpm), StaticIdentity::new(BOARD));

    let err = session
        .run(&VdmRequestKind::Known(KnownVdm::Reboot))
        .unwrap_err();
    assert!(matches!(err, HpmError::NotFound { rid: 7 }));
}

#[test]
fn custom_words_are_sent_verbatim() {
    let hpm = SimulatedHpm::new(BOARD);
    let words = parse_custom_words(&["0x5ac8012", "4606", "-1"]).unwrap();
    let mut session = HpmSession::new(
        SessionConfig::default(),
        provider_with(0, &hpm),
        StaticIdentity::new(BOARD),
    );

    session.run(&VdmRequestKind::Raw(words.clone())).unwrap();

    let sent = hpm.vdms();
    assert_eq!(sent[0].len(), 4 * words.len());
    let decoded: Vec<u32> = sent[0]
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(decoded, vec![0x05AC_8012, 0x4606, 0xFFFF_FFFF]);
}

#[test]
fn vdm_outside_diagnostic_mode_is_refused_by_controller() {
    let hpm = SimulatedHpm::new(BOARD);
    let body = KnownVdm::List.encode().unwrap();
    assert!(
        hpm.send_vdm(0, VDM_SELECTOR, body.as_bytes(), 0)
            .is_err()
    );

    // The mode controller path is the one that gets it through
    let mut conn = Connection::open(&provider_with(0, &hpm), 0).unwrap();
    let identity = StaticIdentity::new(BOARD);
    let mut ctl = ModeController::new(&mut conn, &identity);
    ctl.send_vdm(0, &body).unwrap();
    assert_eq!(hpm.vdms(), vec![body.as_bytes().to_vec()]);
    conn.close();
}
