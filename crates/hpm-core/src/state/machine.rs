//! Mode state machine: application mode <-> diagnostic (DBMa) mode.

use std::fmt;

use tracing::{debug, info, instrument};

use super::unlock::unlock_ace;
use crate::connection::Connection;
use crate::error::HpmError;
use crate::identity::PlatformIdentity;
use crate::protocol::constants::{ARG_DBMA_ENTER, ARG_DBMA_EXIT, DEFAULT_CHIP};
use crate::protocol::{CommandTag, Mode, VdmBody};
use crate::transport::Channel;

/// Controller state as tracked by the mode controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HpmState {
    /// Normal application firmware.
    #[default]
    Application,
    /// Diagnostic mode; VDMs are accepted.
    Diagnostic,
    /// A transition failed; the controller state is not known.
    Error,
}

impl HpmState {
    fn from_mode(mode: Mode) -> Self {
        match mode {
            Mode::Diagnostic => HpmState::Diagnostic,
            Mode::Application | Mode::Unknown => HpmState::Application,
        }
    }
}

impl fmt::Display for HpmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HpmState::Application => write!(f, "APPLICATION"),
            HpmState::Diagnostic => write!(f, "DIAGNOSTIC"),
            HpmState::Error => write!(f, "ERROR"),
        }
    }
}

/// Drives ACE unlock and mode transitions on one connection.
///
/// This is the only path that sends VDMs in a session, which is how the
/// diagnostic-mode precondition is guaranteed.
pub struct ModeController<'a, C: Channel, I: PlatformIdentity + ?Sized> {
    conn: &'a mut Connection<C>,
    identity: &'a I,
    state: HpmState,
}

impl<'a, C: Channel, I: PlatformIdentity + ?Sized> ModeController<'a, C, I> {
    pub fn new(conn: &'a mut Connection<C>, identity: &'a I) -> Self {
        Self {
            conn,
            identity,
            state: HpmState::default(),
        }
    }

    pub fn state(&self) -> HpmState {
        self.state
    }

    pub fn connection(&self) -> &Connection<C> {
        &*self.conn
    }

    fn goto_state(&mut self, new_state: HpmState) {
        if self.state != new_state {
            info!(from = %self.state, to = %new_state, "State transition");
        }
        self.state = new_state;
    }

    /// Query the controller and update the tracked state.
    pub fn refresh(&mut self) -> Result<Mode, HpmError> {
        let mode = self.conn.mode(DEFAULT_CHIP)?;
        self.goto_state(HpmState::from_mode(mode));
        Ok(mode)
    }

    /// Unlock ACE, with its single reset-and-retry.
    pub fn unlock(&mut self) -> Result<(), HpmError> {
        unlock_ace(&mut *self.conn, self.identity)
    }

    /// Enter diagnostic mode unless the controller is already there.
    ///
    /// Returns whether a transition was performed.
    #[instrument(skip(self), fields(rid = self.conn.rid()))]
    pub fn ensure_diagnostic(&mut self) -> Result<bool, HpmError> {
        let result = self.enter_diagnostic();
        if result.is_err() {
            self.goto_state(HpmState::Error);
        }
        result
    }

    fn enter_diagnostic(&mut self) -> Result<bool, HpmError> {
        if self.refresh()? == Mode::Diagnostic {
            debug!("Already in DBMa mode");
            return Ok(false);
        }

        self.unlock()?;
        self.conn
            .run_command(DEFAULT_CHIP, CommandTag::DBMA, &[ARG_DBMA_ENTER])?;

        let mode = self.refresh()?;
        if mode != Mode::Diagnostic {
            return Err(HpmError::ModeTransitionFailed {
                expected: Mode::Diagnostic,
                actual: mode,
            });
        }
        Ok(true)
    }

    /// Return to application mode.
    #[instrument(skip(self), fields(rid = self.conn.rid()))]
    pub fn exit_diagnostic(&mut self) -> Result<(), HpmError> {
        let result = self.leave_diagnostic();
        if result.is_err() {
            self.goto_state(HpmState::Error);
        }
        result
    }

    fn leave_diagnostic(&mut self) -> Result<(), HpmError> {
        self.conn
            .run_command(DEFAULT_CHIP, CommandTag::DBMA, &[ARG_DBMA_EXIT])?;

        let mode = self.refresh()?;
        if mode == Mode::Diagnostic {
            return Err(HpmError::ModeTransitionFailed {
                expected: Mode::Application,
                actual: mode,
            });
        }
        Ok(())
    }

    /// Send a VDM, entering diagnostic mode first if needed.
    pub fn send_vdm(&mut self, chip: u64, body: &VdmBody) -> Result<(), HpmError> {
        if self.state != HpmState::Diagnostic {
            self.ensure_diagnostic()?;
        }
        self.conn.send_vdm(chip, body)
    }
}
