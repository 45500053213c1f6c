//! HPM-Core: USB-C Power Delivery controller (HPM) command protocol in Rust.
//!
//! This crate drives the vendor command protocol exposed by the HPM
//! controller: register reads and writes, four-character commands, ACE
//! unlock, application/diagnostic mode switching and Vendor-Defined
//! Messages (VDMs) that reboot the attached device, send it to DFU or pull
//! up its debug USB transport.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Transport**: `Channel` abstraction over the controller interface (mock, simulated)
//! - **Protocol**: Constants, command tags, bounded reply/body buffers, VDM encoding
//! - **Command**: Stage-fire-read command engine
//! - **Connection**: Handle bound to one controller instance (RID)
//! - **State**: ACE unlock handshake and mode state machine
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use hpm_core::identity::DeviceTreeIdentity;
//! use hpm_core::protocol::KnownVdm;
//! use hpm_core::session::{HpmSession, SessionConfig, VdmRequestKind};
//! use hpm_core::transport::SimulatedProvider;
//!
//! let provider = SimulatedProvider::single("J314");
//! let identity = DeviceTreeIdentity::default();
//! let mut session = HpmSession::new(SessionConfig::default(), provider, identity);
//! session.run(&VdmRequestKind::Known(KnownVdm::Reboot)).expect("VDM failed");
//! ```

pub mod command;
pub mod connection;
pub mod error;
pub mod events;
pub mod identity;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;
pub mod vdm;

// Re-exports for convenience
pub use command::{CommandStatus, run_command};
pub use connection::Connection;
pub use error::{CommandError, HpmError};
pub use events::{HpmEvent, HpmObserver, HpmPhase, NullObserver, TracingObserver};
pub use identity::{DeviceTreeIdentity, PlatformIdentity, StaticIdentity};
pub use protocol::{CommandTag, ConnectionType, KnownVdm, Mode, Reply, VdmBody};
pub use session::{HpmSession, SessionConfig, VdmRequestKind};
pub use state::{HpmState, ModeController, UnlockKey};
pub use transport::{
    Channel, ChannelProvider, MockChannel, SimulatedHpm, SimulatedProvider, TransportError,
};
