//! VDM transmission.
//!
//! VDMs are fire-and-forget: the body is handed to the controller's send-VDM
//! primitive and no reply is read.

use tracing::{debug, instrument};

use crate::error::HpmError;
use crate::protocol::constants::{NO_FLAGS, VDM_SELECTOR};
use crate::protocol::{KnownVdm, VdmBody};
use crate::transport::Channel;

/// Send an encoded body.
#[instrument(skip(channel, body), fields(words = body.word_count()))]
pub fn transmit<C: Channel + ?Sized>(
    channel: &C,
    chip: u64,
    body: &VdmBody,
) -> Result<(), HpmError> {
    debug!(body = %body.preview(), "Sending VDM");
    channel.send_vdm(chip, VDM_SELECTOR, body.as_bytes(), NO_FLAGS)?;
    Ok(())
}

/// Send one of the known VDM sequences.
pub fn send_known<C: Channel + ?Sized>(
    channel: &C,
    chip: u64,
    vdm: KnownVdm,
) -> Result<(), HpmError> {
    debug!(vdm = %vdm, "Sending known VDM");
    transmit(channel, chip, &vdm.encode()?)
}

/// Send caller-supplied words verbatim.
pub fn send_raw<C: Channel + ?Sized>(
    channel: &C,
    chip: u64,
    words: &[u32],
) -> Result<(), HpmError> {
    if words.is_empty() {
        return Err(HpmError::EmptyBody);
    }
    transmit(channel, chip, &VdmBody::from_words(words)?)
}
