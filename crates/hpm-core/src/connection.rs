//! Connection handle bound to one controller instance.

use tracing::{info, instrument, warn};

use crate::command::{self, CommandStatus};
use crate::error::HpmError;
use crate::identity::PlatformIdentity;
use crate::protocol::constants::{NO_FLAGS, REG_CONNECTION_STATUS, REG_MODE};
use crate::protocol::{CommandTag, ConnectionType, KnownVdm, Mode, Reply, VdmBody, register};
use crate::state::UnlockKey;
use crate::transport::{Channel, ChannelProvider, TransportError};
use crate::vdm;

/// Open the channel for `rid`, mapping a missing instance to `NotFound`.
pub fn open_channel<P: ChannelProvider>(provider: &P, rid: u32) -> Result<P::Channel, HpmError> {
    provider.open(rid).map_err(|e| match e {
        TransportError::NotFound { rid } => HpmError::NotFound { rid },
        other => HpmError::Transport(other),
    })
}

/// Exclusive handle to one HPM instance.
///
/// `close` consumes the handle, so it cannot be used after release. A handle
/// dropped without `close` still releases its channel. Callers must not share
/// a connection between threads: a command's staging write and reply read
/// assume nobody else touches the argument register in between.
pub struct Connection<C: Channel> {
    channel: C,
    rid: u32,
    unlock_key: Option<UnlockKey>,
}

impl<C: Channel> Connection<C> {
    /// Open the controller instance with the given RID.
    #[instrument(level = "info", skip(provider))]
    pub fn open<P: ChannelProvider<Channel = C>>(provider: &P, rid: u32) -> Result<Self, HpmError> {
        let channel = open_channel(provider, rid)?;
        info!(rid, "Opened HPM client");
        Ok(Self::new(channel, rid))
    }

    /// Wrap an already opened channel.
    pub fn new(channel: C, rid: u32) -> Self {
        Self {
            channel,
            rid,
            unlock_key: None,
        }
    }

    pub fn rid(&self) -> u32 {
        self.rid
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Release the underlying transport.
    pub fn close(self) {
        drop(self);
    }

    pub fn read(&self, chip: u64, address: u8) -> Result<Reply, HpmError> {
        register::read(&self.channel, chip, address, NO_FLAGS)
    }

    pub fn run_command(
        &self,
        chip: u64,
        tag: CommandTag,
        args: &[u8],
    ) -> Result<CommandStatus, HpmError> {
        Ok(command::run_command(&self.channel, chip, tag, args)?)
    }

    /// Query the physical connection state.
    ///
    /// Failures are logged and reported as `ConnectionType::Error` rather than
    /// raised, since callers poll this to detect an empty port.
    pub fn connection_type(&self, chip: u64) -> ConnectionType {
        match self.read(chip, REG_CONNECTION_STATUS) {
            Ok(reply) => match reply.first() {
                Some(byte) => ConnectionType::from_status(byte),
                None => {
                    warn!("Failed to get connection type: empty reply");
                    ConnectionType::Error
                }
            },
            Err(e) => {
                warn!(error = %e, "Failed to get connection type");
                ConnectionType::Error
            }
        }
    }

    /// Query the current operating mode.
    pub fn mode(&self, chip: u64) -> Result<Mode, HpmError> {
        let reply = self.read(chip, REG_MODE)?;
        Mode::from_reply(reply.as_bytes())
    }

    pub fn send_vdm(&self, chip: u64, body: &VdmBody) -> Result<(), HpmError> {
        vdm::transmit(&self.channel, chip, body)
    }

    pub fn send_known_vdm(&self, chip: u64, known: KnownVdm) -> Result<(), HpmError> {
        vdm::send_known(&self.channel, chip, known)
    }

    pub fn send_raw_vdm(&self, chip: u64, words: &[u32]) -> Result<(), HpmError> {
        vdm::send_raw(&self.channel, chip, words)
    }

    /// Unlock key for this platform, derived on first use and cached.
    ///
    /// A failed derivation leaves the cache empty so a later call can retry.
    pub fn unlock_key<I: PlatformIdentity + ?Sized>(
        &mut self,
        identity: &I,
    ) -> Result<UnlockKey, HpmError> {
        if let Some(key) = self.unlock_key {
            return Ok(key);
        }
        let key = UnlockKey::from_board_name(&identity.board_name()?)?;
        self.unlock_key = Some(key);
        Ok(key)
    }
}

impl<C: Channel> Drop for Connection<C> {
    fn drop(&mut self) {
        self.channel.close();
        info!(rid = self.rid, "Closed HPM client");
    }
}
