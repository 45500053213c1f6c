//! Four-character command tags.
//!
//! Commands understood by the controller's command register are identified by
//! four ASCII characters packed big-endian into a `u32` (`'DBMa'` is
//! `0x44424D61`).

use std::fmt;

/// Four-character command tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandTag(u32);

impl CommandTag {
    /// Enter/exit DBMa (diagnostic) mode.
    pub const DBMA: CommandTag = CommandTag::from_ascii(b"DBMa");
    /// Reset nudge used before retrying an ACE unlock.
    pub const GAID: CommandTag = CommandTag::from_ascii(b"Gaid");
    /// Unlock ACE.
    pub const LOCK: CommandTag = CommandTag::from_ascii(b"LOCK");

    /// Pack four ASCII characters into a tag.
    pub const fn from_ascii(chars: &[u8; 4]) -> Self {
        Self(u32::from_be_bytes(*chars))
    }

    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    /// Raw packed value.
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Get ASCII representation, with non-printable bytes shown as '.'.
    pub fn as_ascii(&self) -> String {
        self.0
            .to_be_bytes()
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
            .collect()
    }
}

impl fmt::Debug for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandTag({:08X} '{}')", self.0, self.as_ascii())
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ascii())
    }
}
