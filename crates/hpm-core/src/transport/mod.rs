//! Transport layer module.

pub mod mock;
pub mod simulated;
pub mod traits;

pub use mock::{ChannelOp, MockChannel};
pub use simulated::{SimulatedHpm, SimulatedProvider};
pub use traits::{
    Channel, ChannelProvider, STATUS_BAD_ARGUMENT, STATUS_ERROR, STATUS_NOT_PERMITTED,
    STATUS_NOT_READY, TransportError,
};
