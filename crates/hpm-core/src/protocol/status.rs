//! Connection type and operating mode decoding.

use std::fmt;

use crate::error::HpmError;
use crate::protocol::constants::{CONNECTION_TYPE_MASK, MODE_TAG_APP, MODE_TAG_DBMA, MODE_TAG_LEN};

/// Physical connection state of a port, from the low two bits of the
/// connection status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    /// Status could not be read.
    Error,
    /// No physical connection.
    None,
    /// Source connection; the expected state with a device attached.
    Source,
    /// Sink connection. Defined by the controller but not observed in practice.
    Sink,
    /// Masked value with no known meaning (currently only 2).
    Unrecognized(u8),
}

impl ConnectionType {
    /// Decode a connection status byte.
    pub fn from_status(byte: u8) -> Self {
        match byte & CONNECTION_TYPE_MASK {
            0 => ConnectionType::None,
            1 => ConnectionType::Source,
            3 => ConnectionType::Sink,
            other => ConnectionType::Unrecognized(other),
        }
    }

    /// Whether a peer is physically attached.
    pub fn is_connected(&self) -> bool {
        !matches!(self, ConnectionType::Error | ConnectionType::None)
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionType::Error => write!(f, "ERROR"),
            ConnectionType::None => write!(f, "NONE"),
            ConnectionType::Source => write!(f, "SOURCE"),
            ConnectionType::Sink => write!(f, "SINK"),
            ConnectionType::Unrecognized(v) => write!(f, "UNRECOGNIZED({})", v),
        }
    }
}

/// Controller operating mode, from the mode register tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Normal application firmware ("APP").
    Application,
    /// Diagnostic mode ("DBMa"); required before VDMs are honored.
    Diagnostic,
    /// Any other tag. Not an error: newer firmware may report other states.
    Unknown,
}

impl Mode {
    /// Classify a mode register reply. Needs at least four bytes.
    pub fn from_reply(bytes: &[u8]) -> Result<Self, HpmError> {
        if bytes.len() < MODE_TAG_LEN {
            return Err(HpmError::ShortReply {
                expected: MODE_TAG_LEN,
                actual: bytes.len(),
            });
        }

        if bytes.starts_with(MODE_TAG_APP) {
            Ok(Mode::Application)
        } else if bytes.starts_with(MODE_TAG_DBMA) {
            Ok(Mode::Diagnostic)
        } else {
            Ok(Mode::Unknown)
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Application => write!(f, "APP"),
            Mode::Diagnostic => write!(f, "DBMa"),
            Mode::Unknown => write!(f, "UNKNOWN"),
        }
    }
}
