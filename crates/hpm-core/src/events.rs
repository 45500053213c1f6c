//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other front end) to follow a session without tight
//! coupling to the protocol logic.

use std::fmt;

use crate::protocol::{ConnectionType, Mode};

/// Session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HpmPhase {
    /// Locating and opening the controller instance.
    Opening,
    /// Checking that a device is attached to the port.
    CheckingConnection,
    /// Unlocking ACE and switching to diagnostic mode.
    EnteringDiagnostic,
    /// Sending the VDM.
    SendingVdm,
    /// Returning to application mode.
    ExitingDiagnostic,
    /// Session finished successfully.
    Complete,
    /// Session aborted.
    Error,
}

impl fmt::Display for HpmPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HpmPhase::Opening => write!(f, "Opening"),
            HpmPhase::CheckingConnection => write!(f, "Checking Connection"),
            HpmPhase::EnteringDiagnostic => write!(f, "Entering DBMa"),
            HpmPhase::SendingVdm => write!(f, "Sending VDM"),
            HpmPhase::ExitingDiagnostic => write!(f, "Exiting DBMa"),
            HpmPhase::Complete => write!(f, "Complete"),
            HpmPhase::Error => write!(f, "Error"),
        }
    }
}

/// Channel operation kinds reported in `Transfer` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Read,
    Write,
    Command,
    SendVdm,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Read => write!(f, "READ"),
            TransferKind::Write => write!(f, "WRITE"),
            TransferKind::Command => write!(f, "CMD"),
            TransferKind::SendVdm => write!(f, "VDM"),
        }
    }
}

/// Events emitted by an HPM session.
#[derive(Debug, Clone)]
pub enum HpmEvent {
    /// Controller instance opened.
    Opened { rid: u32 },
    /// Controller instance released.
    Closed { rid: u32 },
    /// Phase changed.
    PhaseChanged { from: HpmPhase, to: HpmPhase },
    /// Connection state of the port.
    ConnectionState { connection: ConnectionType },
    /// Controller mode observed after a transition.
    ModeObserved { mode: Mode },
    /// One channel operation completed.
    Transfer {
        kind: TransferKind,
        address: Option<u8>,
        length: usize,
        data: Option<Vec<u8>>,
    },
    /// VDM handed to the controller.
    VdmSent { words: Vec<u32> },
    /// Error occurred.
    Error { code: Option<u32>, message: String },
    /// Session completed successfully.
    Complete,
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait HpmObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &HpmEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl HpmObserver for NullObserver {
    fn on_event(&self, _event: &HpmEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl HpmObserver for TracingObserver {
    fn on_event(&self, event: &HpmEvent) {
        match event {
            HpmEvent::Opened { rid } => {
                tracing::info!(rid, "HPM opened");
            }
            HpmEvent::Closed { rid } => {
                tracing::debug!(rid, "HPM closed");
            }
            HpmEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            HpmEvent::ConnectionState { connection } => {
                tracing::info!(connection = %connection, "Connection state");
            }
            HpmEvent::ModeObserved { mode } => {
                tracing::info!(mode = %mode, "Controller mode");
            }
            HpmEvent::Transfer {
                kind,
                address,
                length,
                data,
            } => {
                tracing::trace!(
                    kind = %kind,
                    address = ?address,
                    len = length,
                    data = %data.as_deref().map(hex::encode).unwrap_or_default(),
                    "Transfer"
                );
            }
            HpmEvent::VdmSent { words } => {
                tracing::info!(words = ?words, "VDM sent");
            }
            HpmEvent::Error { code, message } => match code {
                Some(code) => tracing::error!(code = %format!("{:#x}", code), "Error: {}", message),
                None => tracing::error!("Error: {}", message),
            },
            HpmEvent::Complete => {
                tracing::info!("Operation complete");
            }
        }
    }
}

/// Observer that records every event, for tests and replay.
#[derive(Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<HpmEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HpmEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl HpmObserver for RecordingObserver {
    fn on_event(&self, event: &HpmEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
