use thiserror::Error;

use crate::protocol::{CommandTag, Mode};
use crate::transport::TransportError;

/// Failure of one stage of a composite stage-fire-read command.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to write arguments for {tag}: {source}")]
    ArgWriteFailed {
        tag: CommandTag,
        #[source]
        source: TransportError,
    },

    #[error("Failed to issue command {tag}: {source}")]
    FireFailed {
        tag: CommandTag,
        #[source]
        source: TransportError,
    },

    #[error("No reply to command {tag}")]
    NoReply {
        tag: CommandTag,
        #[source]
        source: Option<TransportError>,
    },
}

impl CommandError {
    pub fn tag(&self) -> CommandTag {
        match self {
            CommandError::ArgWriteFailed { tag, .. }
            | CommandError::FireFailed { tag, .. }
            | CommandError::NoReply { tag, .. } => *tag,
        }
    }

    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            CommandError::ArgWriteFailed { source, .. } | CommandError::FireFailed { source, .. } => {
                Some(source)
            }
            CommandError::NoReply { source, .. } => source.as_ref(),
        }
    }
}

/// The primary error type for the `hpm-core` library.
#[derive(Error, Debug)]
pub enum HpmError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("No HPM instance found for RID {rid}")]
    NotFound { rid: u32 },

    #[error("Short reply: expected at least {expected} bytes, got {actual}")]
    ShortReply { expected: usize, actual: usize },

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Mode transition failed: expected {expected}, controller reports {actual}")]
    ModeTransitionFailed { expected: Mode, actual: Mode },

    #[error("Failed to unlock ACE: {source}")]
    UnlockFailed {
        #[source]
        source: Box<HpmError>,
    },

    #[error("Invalid length: {actual} bytes exceeds capacity of {capacity}")]
    InvalidLength { capacity: usize, actual: usize },

    #[error("VDM body length {len} is not a whole number of words")]
    UnalignedBody { len: usize },

    #[error("VDM body is empty")]
    EmptyBody,

    #[error("Invalid hex word: {0:?}")]
    InvalidWord(String),

    #[error("Too many VDM words: at most {max} allowed, got {actual}")]
    TooManyWords { max: usize, actual: usize },

    #[error("Platform identity unavailable: {0}")]
    Identity(String),

    #[error("Failed to get connection type")]
    ConnectionQueryFailed,

    #[error("No connection found; is a device connected to port {rid}?")]
    ConnectionAbsent { rid: u32 },
}

impl HpmError {
    /// Raw status code from the transport at the root of this error, if any.
    pub fn raw_code(&self) -> Option<u32> {
        match self {
            HpmError::Transport(e) => e.code(),
            HpmError::Command(e) => e.transport().and_then(TransportError::code),
            HpmError::UnlockFailed { source } => source.raw_code(),
            _ => None,
        }
    }
}
