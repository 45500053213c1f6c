//! Protocol module - HPM register and VDM definitions.

pub mod bounded;
pub mod constants;
pub mod register;
pub mod status;
pub mod tag;
pub mod vdm;

pub use bounded::{Bounded, Reply};
pub use constants::*;
pub use status::{ConnectionType, Mode};
pub use tag::CommandTag;
pub use vdm::{KnownVdm, VdmBody, VdmFlags, VdmRequest, parse_custom_words, parse_hex_word};
