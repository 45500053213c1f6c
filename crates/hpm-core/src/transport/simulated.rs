//! Simulated HPM controller.
//!
//! A stateful model of one controller instance: mode register, ACE lock,
//! argument register and connection status. Commands and VDMs are only
//! honored in the states real hardware accepts them, so whole sessions can be
//! exercised without a device.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use super::traits::{
    Channel, ChannelProvider, STATUS_BAD_ARGUMENT, STATUS_ERROR, STATUS_NOT_PERMITTED,
    TransportError,
};
use crate::protocol::constants::{
    ARG_DBMA_ENTER, ARG_DBMA_EXIT, REG_CONNECTION_STATUS, REG_DATA, REG_MODE, VDM_BODY_CAPACITY,
    VDM_SELECTOR, VDM_WORD_SIZE,
};
use crate::protocol::{CommandTag, Mode};
use crate::state::UnlockKey;

#[derive(Debug)]
struct SimState {
    mode: Mode,
    unlocked: bool,
    key: [u8; 4],
    data: Vec<u8>,
    connection_status: u8,
    /// Number of upcoming LOCK commands to reject regardless of key.
    lock_rejections: u32,
    vdms: Vec<Vec<u8>>,
    commands: Vec<CommandTag>,
    closed: bool,
}

/// Simulated controller instance. Clones share state.
#[derive(Debug, Clone)]
pub struct SimulatedHpm {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedHpm {
    /// Controller in application mode with a source connection, unlocked by
    /// the key derived from `board_name`.
    pub fn new(board_name: &str) -> Self {
        let key = UnlockKey::from_board_name(board_name)
            .map(|k| k.to_bytes())
            .unwrap_or_default();
        Self {
            state: Arc::new(Mutex::new(SimState {
                mode: Mode::Application,
                unlocked: false,
                key,
                data: Vec::new(),
                connection_status: 0x01,
                lock_rejections: 0,
                vdms: Vec::new(),
                commands: Vec::new(),
                closed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_connection_status(&self, status: u8) {
        self.lock().connection_status = status;
    }

    pub fn set_mode(&self, mode: Mode) {
        self.lock().mode = mode;
    }

    /// Reject the next `count` unlock attempts.
    pub fn reject_unlocks(&self, count: u32) {
        self.lock().lock_rejections = count;
    }

    pub fn mode(&self) -> Mode {
        self.lock().mode
    }

    pub fn is_unlocked(&self) -> bool {
        self.lock().unlocked
    }

    /// VDM bodies accepted so far.
    pub fn vdms(&self) -> Vec<Vec<u8>> {
        self.lock().vdms.clone()
    }

    /// Commands executed so far, including rejected ones.
    pub fn commands(&self) -> Vec<CommandTag> {
        self.lock().commands.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl SimState {
    fn execute(&mut self, tag: CommandTag) -> Result<u8, u32> {
        match tag {
            CommandTag::LOCK => {
                if self.lock_rejections > 0 {
                    self.lock_rejections -= 1;
                    return Err(STATUS_NOT_PERMITTED);
                }
                if self.data.get(..4) != Some(&self.key[..]) {
                    return Err(STATUS_NOT_PERMITTED);
                }
                self.unlocked = true;
                Ok(0)
            }
            CommandTag::GAID => {
                self.unlocked = false;
                Ok(0)
            }
            CommandTag::DBMA => match self.data.first().copied() {
                Some(ARG_DBMA_ENTER) if self.unlocked => {
                    self.mode = Mode::Diagnostic;
                    Ok(0)
                }
                Some(ARG_DBMA_ENTER) => Err(STATUS_NOT_PERMITTED),
                Some(ARG_DBMA_EXIT) => {
                    self.mode = Mode::Application;
                    Ok(0)
                }
                _ => Err(STATUS_BAD_ARGUMENT),
            },
            _ => Err(STATUS_ERROR),
        }
    }
}

impl Channel for SimulatedHpm {
    fn read(
        &self,
        _chip: u64,
        address: u8,
        max_len: usize,
        _flags: u32,
    ) -> Result<Vec<u8>, TransportError> {
        let state = self.lock();
        let mut bytes = match address {
            REG_MODE => match state.mode {
                Mode::Application => b"APP ".to_vec(),
                Mode::Diagnostic => b"DBMa".to_vec(),
                Mode::Unknown => b"BOOT".to_vec(),
            },
            REG_DATA => state.data.clone(),
            REG_CONNECTION_STATUS => vec![state.connection_status],
            _ => {
                return Err(TransportError::ReadFailed {
                    address,
                    code: STATUS_BAD_ARGUMENT,
                });
            }
        };
        bytes.truncate(max_len);
        Ok(bytes)
    }

    fn write(&self, _chip: u64, address: u8, data: &[u8], _flags: u32) -> Result<(), TransportError> {
        if address != REG_DATA {
            return Err(TransportError::WriteFailed {
                address,
                code: STATUS_BAD_ARGUMENT,
            });
        }
        self.lock().data = data.to_vec();
        Ok(())
    }

    fn command(&self, _chip: u64, tag: CommandTag, _flags: u32) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.commands.push(tag);
        match state.execute(tag) {
            Ok(result) => {
                debug!(tag = %tag, mode = %state.mode, "Simulated command complete");
                state.data = vec![result];
                Ok(())
            }
            Err(code) => {
                state.data.clear();
                Err(TransportError::CommandFailed { tag, code })
            }
        }
    }

    fn send_vdm(
        &self,
        _chip: u64,
        selector: u32,
        body: &[u8],
        _flags: u32,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.mode != Mode::Diagnostic {
            return Err(TransportError::SendVdmFailed {
                code: STATUS_NOT_PERMITTED,
            });
        }
        if selector != VDM_SELECTOR
            || body.is_empty()
            || body.len() > VDM_BODY_CAPACITY
            || body.len() % VDM_WORD_SIZE != 0
        {
            return Err(TransportError::SendVdmFailed {
                code: STATUS_BAD_ARGUMENT,
            });
        }
        info!(body = %hex::encode(body), "Simulated VDM accepted");
        state.vdms.push(body.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        self.lock().closed = true;
    }
}

/// Provider serving simulated controllers by RID.
#[derive(Debug, Clone, Default)]
pub struct SimulatedProvider {
    instances: HashMap<u32, SimulatedHpm>,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider with one controller on the DFU port (RID 0).
    pub fn single(board_name: &str) -> Self {
        Self::new().with_instance(0, SimulatedHpm::new(board_name))
    }

    pub fn with_instance(mut self, rid: u32, hpm: SimulatedHpm) -> Self {
        self.instances.insert(rid, hpm);
        self
    }

    pub fn instance(&self, rid: u32) -> Option<&SimulatedHpm> {
        self.instances.get(&rid)
    }
}

impl ChannelProvider for SimulatedProvider {
    type Channel = SimulatedHpm;

    fn open(&self, rid: u32) -> Result<SimulatedHpm, TransportError> {
        self.instances
            .get(&rid)
            .cloned()
            .ok_or(TransportError::NotFound { rid })
    }
}
