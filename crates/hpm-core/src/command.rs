//! Command engine.
//!
//! Every controller command follows the same pattern: stage the argument
//! bytes in `REG_DATA`, fire the four-character tag, then read `REG_DATA` back
//! and take the low nibble of the first byte as the result.

use std::fmt;

use tracing::{debug, instrument, warn};

use crate::error::{CommandError, HpmError};
use crate::protocol::constants::{COMMAND_RESULT_MASK, NO_FLAGS, REG_DATA};
use crate::protocol::{CommandTag, register};
use crate::transport::Channel;

/// Result nibble reported by the controller after a command completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus(u8);

impl CommandStatus {
    pub fn from_reply_byte(byte: u8) -> Self {
        Self(byte & COMMAND_RESULT_MASK)
    }

    pub fn code(&self) -> u8 {
        self.0
    }

    pub fn is_success(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Run one command against `chip`.
///
/// An empty `args` slice skips the staging write. A failed or zero-length
/// reply read is reported as `NoReply`, separately from a failed fire.
/// Transport success is what counts as success; a non-zero result nibble is
/// returned to the caller and logged.
#[instrument(skip(channel, args), fields(tag = %tag, args = %hex::encode(args)))]
pub fn run_command<C: Channel + ?Sized>(
    channel: &C,
    chip: u64,
    tag: CommandTag,
    args: &[u8],
) -> Result<CommandStatus, CommandError> {
    if !args.is_empty() {
        register::write(channel, chip, REG_DATA, args, NO_FLAGS)
            .map_err(|source| CommandError::ArgWriteFailed { tag, source })?;
    }

    register::fire(channel, chip, tag, NO_FLAGS)
        .map_err(|source| CommandError::FireFailed { tag, source })?;

    let reply = match register::read(channel, chip, REG_DATA, NO_FLAGS) {
        Ok(reply) => reply,
        Err(HpmError::Transport(source)) => {
            return Err(CommandError::NoReply {
                tag,
                source: Some(source),
            });
        }
        Err(e) => {
            warn!(error = %e, "Unusable command reply");
            return Err(CommandError::NoReply { tag, source: None });
        }
    };

    let status = reply
        .first()
        .map(CommandStatus::from_reply_byte)
        .ok_or(CommandError::NoReply { tag, source: None })?;

    if status.is_success() {
        debug!(status = %status, "Command complete");
    } else {
        warn!(status = %status, "Command completed with non-zero result");
    }
    Ok(status)
}
