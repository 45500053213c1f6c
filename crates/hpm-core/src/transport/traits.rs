//! Controller transport abstraction.
//!
//! Defines the `Channel` trait for register-addressed access to one HPM
//! instance, and `ChannelProvider` for locating and opening instances by RID.
//! Allows different implementations (hardware backends, mock, simulated).

use crate::protocol::CommandTag;
use thiserror::Error;

// Status codes reported by transports, in the controller's native numbering
pub const STATUS_ERROR: u32 = 0xE000_02BC;
pub const STATUS_BAD_ARGUMENT: u32 = 0xE000_02C2;
pub const STATUS_NOT_PERMITTED: u32 = 0xE000_02E2;
pub const STATUS_NOT_READY: u32 = 0xE000_02D8;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No HPM instance found for RID {rid}")]
    NotFound { rid: u32 },

    #[error("Read failed at address 0x{address:02X} (code {code:#x})")]
    ReadFailed { address: u8, code: u32 },

    #[error("Write failed at address 0x{address:02X} (code {code:#x})")]
    WriteFailed { address: u8, code: u32 },

    #[error("Command {tag} failed (code {code:#x})")]
    CommandFailed { tag: CommandTag, code: u32 },

    #[error("VDM send failed (code {code:#x})")]
    SendVdmFailed { code: u32 },

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl TransportError {
    /// Raw status code reported by the transport, if any.
    pub fn code(&self) -> Option<u32> {
        match self {
            TransportError::ReadFailed { code, .. }
            | TransportError::WriteFailed { code, .. }
            | TransportError::CommandFailed { code, .. }
            | TransportError::SendVdmFailed { code } => Some(*code),
            _ => None,
        }
    }
}

/// Register-addressed interface to one HPM controller instance.
///
/// Every call is a blocking round trip. Implementations are not required to
/// serialize concurrent callers: the protocol assumes exclusive use of the
/// argument register between a staging write and its reply read.
pub trait Channel: Send + Sync {
    /// Read up to `max_len` bytes from `address` on `chip`.
    ///
    /// A successful read may return zero bytes.
    fn read(
        &self,
        chip: u64,
        address: u8,
        max_len: usize,
        flags: u32,
    ) -> Result<Vec<u8>, TransportError>;

    /// Write `data` to `address` on `chip`.
    fn write(&self, chip: u64, address: u8, data: &[u8], flags: u32) -> Result<(), TransportError>;

    /// Trigger execution of a four-character command.
    fn command(&self, chip: u64, tag: CommandTag, flags: u32) -> Result<(), TransportError>;

    /// Hand a VDM body to the controller for transmission.
    fn send_vdm(
        &self,
        chip: u64,
        selector: u32,
        body: &[u8],
        flags: u32,
    ) -> Result<(), TransportError>;

    /// Release transport resources. Called once when the owning connection closes.
    fn close(&mut self) {}
}

/// Locates and opens controller instances by port identifier (RID).
pub trait ChannelProvider {
    type Channel: Channel;

    /// Open the instance whose RID matches `rid`.
    fn open(&self, rid: u32) -> Result<Self::Channel, TransportError>;
}
