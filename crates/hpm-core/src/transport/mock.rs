//! Mock channel for testing protocol logic.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::traits::{Channel, STATUS_NOT_READY, TransportError};
use crate::protocol::CommandTag;

/// One operation observed by the mock, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOp {
    Read {
        chip: u64,
        address: u8,
    },
    Write {
        chip: u64,
        address: u8,
        data: Vec<u8>,
    },
    Command {
        chip: u64,
        tag: CommandTag,
    },
    SendVdm {
        chip: u64,
        selector: u32,
        body: Vec<u8>,
    },
}

/// Scripted reply for a register read.
type ScriptedRead = Result<Vec<u8>, u32>;

#[derive(Default)]
struct MockState {
    /// Queued read results per address, consumed first.
    replies: HashMap<u8, VecDeque<ScriptedRead>>,
    /// Values returned when an address has no queued reply.
    registers: HashMap<u8, Vec<u8>>,
    /// Queued command outcomes; commands succeed when empty.
    command_results: VecDeque<Result<(), u32>>,
    write_failures: VecDeque<u32>,
    vdm_failures: VecDeque<u32>,
    ops: Vec<ChannelOp>,
    closed: bool,
}

/// Mock channel for unit testing command and state machine logic.
///
/// Clones share state, so a test can keep a handle while a connection owns
/// another.
#[derive(Clone, Default)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a reply to be returned by the next read of `address`.
    pub fn queue_reply(&self, address: u8, bytes: &[u8]) {
        self.lock()
            .replies
            .entry(address)
            .or_default()
            .push_back(Ok(bytes.to_vec()));
    }

    /// Queue a failed read of `address`.
    pub fn queue_read_failure(&self, address: u8, code: u32) {
        self.lock()
            .replies
            .entry(address)
            .or_default()
            .push_back(Err(code));
    }

    /// Set the value returned whenever `address` has no queued reply.
    pub fn set_register(&self, address: u8, bytes: &[u8]) {
        self.lock().registers.insert(address, bytes.to_vec());
    }

    /// Queue the outcome of the next command.
    pub fn queue_command_result(&self, result: Result<(), u32>) {
        self.lock().command_results.push_back(result);
    }

    pub fn fail_next_write(&self, code: u32) {
        self.lock().write_failures.push_back(code);
    }

    pub fn fail_next_vdm(&self, code: u32) {
        self.lock().vdm_failures.push_back(code);
    }

    /// Get all captured operations.
    pub fn ops(&self) -> Vec<ChannelOp> {
        self.lock().ops.clone()
    }

    /// Get the tags of all captured commands.
    pub fn commands(&self) -> Vec<CommandTag> {
        self.lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                ChannelOp::Command { tag, .. } => Some(*tag),
                _ => None,
            })
            .collect()
    }

    /// Get all captured VDM bodies.
    pub fn vdm_bodies(&self) -> Vec<Vec<u8>> {
        self.lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                ChannelOp::SendVdm { body, .. } => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clear captured operations.
    pub fn clear_ops(&self) {
        self.lock().ops.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Channel for MockChannel {
    fn read(
        &self,
        chip: u64,
        address: u8,
        _max_len: usize,
        _flags: u32,
    ) -> Result<Vec<u8>, TransportError> {
        let mut state = self.lock();
        state.ops.push(ChannelOp::Read { chip, address });

        let scripted = state
            .replies
            .get_mut(&address)
            .and_then(VecDeque::pop_front);
        let result = match scripted {
            Some(result) => result,
            None => state
                .registers
                .get(&address)
                .cloned()
                .ok_or(STATUS_NOT_READY),
        };

        // Replies longer than max_len are passed through so callers can check bounds
        result.map_err(|code| TransportError::ReadFailed { address, code })
    }

    fn write(&self, chip: u64, address: u8, data: &[u8], _flags: u32) -> Result<(), TransportError> {
        let mut state = self.lock();
        if let Some(code) = state.write_failures.pop_front() {
            return Err(TransportError::WriteFailed { address, code });
        }
        state.ops.push(ChannelOp::Write {
            chip,
            address,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn command(&self, chip: u64, tag: CommandTag, _flags: u32) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.ops.push(ChannelOp::Command { chip, tag });
        match state.command_results.pop_front() {
            Some(Err(code)) => Err(TransportError::CommandFailed { tag, code }),
            _ => Ok(()),
        }
    }

    fn send_vdm(
        &self,
        chip: u64,
        selector: u32,
        body: &[u8],
        _flags: u32,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        if let Some(code) = state.vdm_failures.pop_front() {
            return Err(TransportError::SendVdmFailed { code });
        }
        state.ops.push(ChannelOp::SendVdm {
            chip,
            selector,
            body: body.to_vec(),
        });
        Ok(())
    }

    fn close(&mut self) {
        self.lock().closed = true;
    }
}
