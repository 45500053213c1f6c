//! Register-level primitives on top of a `Channel`.
//!
//! Parameter staging (`write`) and execution (`fire`) are separate register
//! operations on the controller. `REG_DATA` carries staged arguments in and the
//! completion result out.

use tracing::{debug, instrument};

use crate::error::HpmError;
use crate::protocol::CommandTag;
use crate::protocol::bounded::Reply;
use crate::protocol::constants::REPLY_CAPACITY;
use crate::transport::{Channel, TransportError};

/// Bounded read of `address` on `chip`.
///
/// Returns whatever length the channel reports, which may be zero.
#[instrument(level = "trace", skip(channel), fields(address = %format!("0x{:02X}", address)))]
pub fn read<C: Channel + ?Sized>(
    channel: &C,
    chip: u64,
    address: u8,
    flags: u32,
) -> Result<Reply, HpmError> {
    let bytes = channel.read(chip, address, REPLY_CAPACITY, flags)?;
    debug!(len = bytes.len(), data = %hex::encode(&bytes), "Register read");
    Reply::from_vec(bytes)
}

/// Stage bytes at `address` on `chip`.
#[instrument(level = "trace", skip(channel, data), fields(address = %format!("0x{:02X}", address), len = data.len()))]
pub fn write<C: Channel + ?Sized>(
    channel: &C,
    chip: u64,
    address: u8,
    data: &[u8],
    flags: u32,
) -> Result<(), TransportError> {
    channel.write(chip, address, data, flags)
}

/// Trigger execution of a previously staged command.
#[instrument(level = "trace", skip(channel), fields(tag = %tag))]
pub fn fire<C: Channel + ?Sized>(
    channel: &C,
    chip: u64,
    tag: CommandTag,
    flags: u32,
) -> Result<(), TransportError> {
    channel.command(chip, tag, flags)
}
