//! HPM Session - High-level orchestrator for one VDM action.

use std::cell::Cell;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::connection::{Connection, open_channel};
use crate::error::HpmError;
use crate::events::{HpmEvent, HpmObserver, HpmPhase, TracingObserver, TransferKind};
use crate::identity::PlatformIdentity;
use crate::protocol::constants::{DEFAULT_CHIP, DFU_PORT_RID};
use crate::protocol::{CommandTag, ConnectionType, KnownVdm, Mode, VdmBody};
use crate::state::ModeController;
use crate::transport::{Channel, ChannelProvider, TransportError};

/// Configuration for an HPM session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Port identifier of the controller instance. RID 0 is the DFU port.
    pub rid: u32,
    /// Chip index the VDM is sent on.
    pub chip: u64,
    /// Return to application mode after the VDM.
    pub restore_app_mode: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rid: DFU_PORT_RID,
            chip: DEFAULT_CHIP,
            restore_app_mode: true,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// The VDM a session sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VdmRequestKind {
    /// One of the catalogued actions.
    Known(KnownVdm),
    /// Caller-supplied words, sent verbatim.
    Raw(Vec<u32>),
}

impl VdmRequestKind {
    pub fn encode(&self) -> Result<VdmBody, HpmError> {
        match self {
            VdmRequestKind::Known(known) => known.encode(),
            VdmRequestKind::Raw(words) if words.is_empty() => Err(HpmError::EmptyBody),
            VdmRequestKind::Raw(words) => VdmBody::from_words(words),
        }
    }
}

/// HPM Session - connects to one port and sends one VDM.
///
/// Sequence: open, check that something is attached, enter DBMa (unlocking
/// ACE), send the VDM, optionally return to application mode, close. Any
/// failure aborts the sequence; the connection is still closed.
pub struct HpmSession<P: ChannelProvider, I: PlatformIdentity, O: HpmObserver = TracingObserver> {
    config: SessionConfig,
    provider: P,
    identity: I,
    observer: Arc<O>,
    phase: Cell<HpmPhase>,
}

impl<P: ChannelProvider, I: PlatformIdentity> HpmSession<P, I, TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(config: SessionConfig, provider: P, identity: I) -> Self {
        Self::with_observer(config, provider, identity, Arc::new(TracingObserver))
    }
}

impl<P: ChannelProvider, I: PlatformIdentity, O: HpmObserver + 'static> HpmSession<P, I, O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: SessionConfig, provider: P, identity: I, observer: Arc<O>) -> Self {
        Self {
            config,
            provider,
            identity,
            observer,
            phase: Cell::new(HpmPhase::Opening),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> HpmPhase {
        self.phase.get()
    }

    fn set_phase(&self, to: HpmPhase) {
        let from = self.phase.replace(to);
        if from != to {
            self.observer.on_event(&HpmEvent::PhaseChanged { from, to });
        }
    }

    /// Run the complete session.
    #[instrument(skip(self), fields(rid = self.config.rid))]
    pub fn run(&mut self, request: &VdmRequestKind) -> Result<(), HpmError> {
        self.phase.set(HpmPhase::Opening);
        let result = self.run_inner(request);

        match &result {
            Ok(()) => {
                self.set_phase(HpmPhase::Complete);
                self.observer.on_event(&HpmEvent::Complete);
            }
            Err(e) => {
                self.set_phase(HpmPhase::Error);
                self.observer.on_event(&HpmEvent::Error {
                    code: e.raw_code(),
                    message: e.to_string(),
                });
            }
        }
        result
    }

    fn run_inner(&self, request: &VdmRequestKind) -> Result<(), HpmError> {
        // Reject a malformed body before touching the controller
        let body = request.encode()?;
        let rid = self.config.rid;

        let channel = open_channel(&self.provider, rid)?;
        let observable = ObservableChannel {
            inner: channel,
            observer: Arc::clone(&self.observer),
        };
        let mut conn = Connection::new(observable, rid);
        self.observer.on_event(&HpmEvent::Opened { rid });

        let result = self.drive(&mut conn, &body);

        conn.close();
        self.observer.on_event(&HpmEvent::Closed { rid });
        result
    }

    fn drive<C: Channel>(&self, conn: &mut Connection<C>, body: &VdmBody) -> Result<(), HpmError> {
        self.set_phase(HpmPhase::CheckingConnection);
        let connection = conn.connection_type(DEFAULT_CHIP);
        self.observer
            .on_event(&HpmEvent::ConnectionState { connection });
        match connection {
            ConnectionType::Error => return Err(HpmError::ConnectionQueryFailed),
            ConnectionType::None => {
                return Err(HpmError::ConnectionAbsent {
                    rid: self.config.rid,
                });
            }
            _ => {}
        }

        let mut ctl = ModeController::new(conn, &self.identity);

        self.set_phase(HpmPhase::EnteringDiagnostic);
        ctl.ensure_diagnostic()?;
        self.observer.on_event(&HpmEvent::ModeObserved {
            mode: Mode::Diagnostic,
        });

        self.set_phase(HpmPhase::SendingVdm);
        ctl.send_vdm(self.config.chip, body)?;
        info!(vdm = %body.preview(), "VDM sent");
        self.observer.on_event(&HpmEvent::VdmSent {
            words: body.words(),
        });

        if self.config.restore_app_mode {
            self.set_phase(HpmPhase::ExitingDiagnostic);
            ctl.exit_diagnostic()?;
            self.observer.on_event(&HpmEvent::ModeObserved {
                mode: Mode::Application,
            });
        }
        Ok(())
    }
}

/// Channel wrapper that emits transfer events.
struct ObservableChannel<C: Channel, O: HpmObserver> {
    inner: C,
    observer: Arc<O>,
}

impl<C: Channel, O: HpmObserver> ObservableChannel<C, O> {
    fn emit(&self, kind: TransferKind, address: Option<u8>, data: &[u8]) {
        self.observer.on_event(&HpmEvent::Transfer {
            kind,
            address,
            length: data.len(),
            data: Some(data.to_vec()),
        });
    }
}

impl<C: Channel, O: HpmObserver> Channel for ObservableChannel<C, O> {
    fn read(
        &self,
        chip: u64,
        address: u8,
        max_len: usize,
        flags: u32,
    ) -> Result<Vec<u8>, TransportError> {
        let res = self.inner.read(chip, address, max_len, flags);
        if let Ok(data) = &res {
            self.emit(TransferKind::Read, Some(address), data);
        }
        res
    }

    fn write(&self, chip: u64, address: u8, data: &[u8], flags: u32) -> Result<(), TransportError> {
        let res = self.inner.write(chip, address, data, flags);
        if res.is_ok() {
            self.emit(TransferKind::Write, Some(address), data);
        }
        res
    }

    fn command(&self, chip: u64, tag: CommandTag, flags: u32) -> Result<(), TransportError> {
        let res = self.inner.command(chip, tag, flags);
        if res.is_ok() {
            self.emit(TransferKind::Command, None, &tag.value().to_be_bytes());
        }
        res
    }

    fn send_vdm(
        &self,
        chip: u64,
        selector: u32,
        body: &[u8],
        flags: u32,
    ) -> Result<(), TransportError> {
        let res = self.inner.send_vdm(chip, selector, body, flags);
        if res.is_ok() {
            self.emit(TransferKind::SendVdm, None, body);
        }
        res
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NullObserver, RecordingObserver};
    use crate::identity::StaticIdentity;
    use crate::protocol::constants::{REG_CONNECTION_STATUS, REG_DATA, REG_MODE};
    use crate::transport::{MockChannel, SimulatedHpm, SimulatedProvider};

    /// Serves one scripted channel on RID 0.
    struct MockProvider(MockChannel);

    impl ChannelProvider for MockProvider {
        type Channel = MockChannel;

        fn open(&self, rid: u32) -> Result<MockChannel, TransportError> {
            match rid {
                0 => Ok(self.0.clone()),
                _ => Err(TransportError::NotFound { rid }),
            }
        }
    }

    fn mock_session(
        mock: &MockChannel,
    ) -> HpmSession<MockProvider, StaticIdentity, RecordingObserver> {
        HpmSession::with_observer(
            SessionConfig::default(),
            MockProvider(mock.clone()),
            StaticIdentity::new("J314sAP"),
            Arc::new(RecordingObserver::new()),
        )
    }

    fn session(
        hpm: &SimulatedHpm,
        config: SessionConfig,
    ) -> HpmSession<SimulatedProvider, StaticIdentity, RecordingObserver> {
        let provider = SimulatedProvider::new().with_instance(config.rid, hpm.clone());
        HpmSession::with_observer(
            config,
            provider,
            StaticIdentity::new("J314sAP"),
            Arc::new(RecordingObserver::new()),
        )
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.rid, 0);
        assert_eq!(config.chip, 0);
        assert!(config.restore_app_mode);
    }

    #[test]
    fn test_config_roundtrip_through_file() {
        let path = std::env::temp_dir().join(format!("hpm-session-{}.toml", std::process::id()));
        let config = SessionConfig {
            rid: 2,
            chip: 1,
            restore_app_mode: false,
        };
        config.save_to_file(&path).unwrap();
        let loaded = SessionConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_partial_file_uses_defaults() {
        let config: SessionConfig = toml::from_str("rid = 3").unwrap();
        assert_eq!(config.rid, 3);
        assert!(config.restore_app_mode);
    }

    #[test]
    fn test_run_reboot_restores_application_mode() {
        let hpm = SimulatedHpm::new("J314sAP");
        let mut session = session(&hpm, SessionConfig::default());

        session
            .run(&VdmRequestKind::Known(KnownVdm::Reboot))
            .unwrap();

        assert_eq!(session.phase(), HpmPhase::Complete);
        assert_eq!(hpm.vdms(), vec![KnownVdm::Reboot.encode().unwrap().as_bytes().to_vec()]);
        assert_eq!(hpm.mode(), Mode::Application);
        assert!(hpm.is_closed());
    }

    #[test]
    fn test_run_without_restore_stays_in_diagnostic() {
        let hpm = SimulatedHpm::new("J314sAP");
        let config = SessionConfig {
            restore_app_mode: false,
            ..SessionConfig::default()
        };
        let mut session = session(&hpm, config);

        session.run(&VdmRequestKind::Known(KnownVdm::Dfu)).unwrap();
        assert_eq!(hpm.mode(), Mode::Diagnostic);
    }

    #[test]
    fn test_run_aborts_when_port_empty() {
        let hpm = SimulatedHpm::new("J314sAP");
        hpm.set_connection_status(0x00);
        let mut session = session(&hpm, SessionConfig::default());

        let err = session
            .run(&VdmRequestKind::Known(KnownVdm::Reboot))
            .unwrap_err();
        assert!(matches!(err, HpmError::ConnectionAbsent { rid: 0 }));
        assert_eq!(session.phase(), HpmPhase::Error);
        assert!(hpm.commands().is_empty());
        assert!(hpm.is_closed());
    }

    #[test]
    fn test_failed_connection_query_aborts() {
        let mock = MockChannel::new();
        mock.queue_read_failure(REG_CONNECTION_STATUS, 0xE000_02BC);
        let mut session = mock_session(&mock);

        let err = session
            .run(&VdmRequestKind::Known(KnownVdm::Reboot))
            .unwrap_err();
        assert!(matches!(err, HpmError::ConnectionQueryFailed));
        assert_eq!(err.to_string(), "Failed to get connection type");
        assert!(mock.commands().is_empty());
        assert!(mock.is_closed());
    }

    #[test]
    fn test_failed_exit_is_reported_after_vdm() {
        let mock = MockChannel::new();
        mock.set_register(REG_CONNECTION_STATUS, &[0x01]);
        mock.set_register(REG_DATA, &[0x00]);
        mock.queue_reply(REG_MODE, b"APP ");
        mock.set_register(REG_MODE, b"DBMa");
        let mut session = mock_session(&mock);

        let err = session
            .run(&VdmRequestKind::Known(KnownVdm::Reboot))
            .unwrap_err();
        assert!(matches!(
            err,
            HpmError::ModeTransitionFailed {
                expected: Mode::Application,
                actual: Mode::Diagnostic
            }
        ));
        // The VDM went out and is not retracted
        assert_eq!(
            mock.vdm_bodies(),
            vec![KnownVdm::Reboot.encode().unwrap().as_bytes().to_vec()]
        );
        assert_eq!(
            mock.commands(),
            vec![CommandTag::LOCK, CommandTag::DBMA, CommandTag::DBMA]
        );
        assert_eq!(session.phase(), HpmPhase::Error);
        assert!(mock.is_closed());
    }

    #[test]
    fn test_empty_raw_request_rejected_before_open() {
        let hpm = SimulatedHpm::new("J314sAP");
        let mut session = session(&hpm, SessionConfig::default());

        let err = session.run(&VdmRequestKind::Raw(Vec::new())).unwrap_err();
        assert!(matches!(err, HpmError::EmptyBody));
        assert!(!hpm.is_closed());
    }

    #[test]
    fn test_events_follow_phases() {
        let hpm = SimulatedHpm::new("J314sAP");
        let observer = Arc::new(RecordingObserver::new());
        let provider = SimulatedProvider::new().with_instance(0, hpm.clone());
        let mut session = HpmSession::with_observer(
            SessionConfig::default(),
            provider,
            StaticIdentity::new("J314sAP"),
            Arc::clone(&observer),
        );
        session
            .run(&VdmRequestKind::Known(KnownVdm::DebugUsb))
            .unwrap();

        let phases: Vec<HpmPhase> = observer
            .events()
            .iter()
            .filter_map(|e| match e {
                HpmEvent::PhaseChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                HpmPhase::CheckingConnection,
                HpmPhase::EnteringDiagnostic,
                HpmPhase::SendingVdm,
                HpmPhase::ExitingDiagnostic,
                HpmPhase::Complete,
            ]
        );
        assert!(observer.events().iter().any(|e| matches!(
            e,
            HpmEvent::Transfer {
                kind: TransferKind::SendVdm,
                length: 8,
                ..
            }
        )));
        assert!(matches!(observer.events().last(), Some(HpmEvent::Complete)));
    }

    #[test]
    fn test_null_observer_session() {
        let hpm = SimulatedHpm::new("J314sAP");
        let provider = SimulatedProvider::new().with_instance(0, hpm.clone());
        let mut session = HpmSession::with_observer(
            SessionConfig::default(),
            provider,
            StaticIdentity::new("J314sAP"),
            Arc::new(NullObserver),
        );
        session
            .run(&VdmRequestKind::Raw(vec![0x05AC_8010]))
            .unwrap();
        assert_eq!(hpm.vdms(), vec![0x05AC_8010u32.to_le_bytes().to_vec()]);
    }
}
