//! Vendor-Defined Message body encoding.
//!
//! A VDM body is a main opcode word followed by up to two parameter words.
//! Words are transmitted in the controller's native (little-endian) order.

use std::fmt;
use std::io::Cursor;
use std::ops::{BitOr, BitOrAssign};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::HpmError;
use crate::protocol::bounded::Bounded;
use crate::protocol::constants::*;

/// Encoded VDM body, at most `VDM_BODY_CAPACITY` bytes, always whole words.
#[derive(Clone, PartialEq, Eq)]
pub struct VdmBody {
    bytes: Bounded<VDM_BODY_CAPACITY>,
}

impl VdmBody {
    /// Encode words into a body.
    pub fn from_words(words: &[u32]) -> Result<Self, HpmError> {
        let mut bytes = Bounded::new();
        for word in words {
            bytes.extend_from_slice(&word.to_le_bytes())?;
        }
        Ok(Self { bytes })
    }

    /// Wrap raw body bytes. The length must be a multiple of the word size.
    pub fn from_bytes(data: &[u8]) -> Result<Self, HpmError> {
        if data.len() % VDM_WORD_SIZE != 0 {
            return Err(HpmError::UnalignedBody { len: data.len() });
        }
        Ok(Self {
            bytes: Bounded::from_slice(data)?,
        })
    }

    /// Decode the body back into words.
    pub fn words(&self) -> Vec<u32> {
        let mut cursor = Cursor::new(self.bytes.as_bytes());
        let mut words = Vec::with_capacity(self.word_count());
        while let Ok(word) = cursor.read_u32::<LittleEndian>() {
            words.push(word);
        }
        words
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.bytes.len() / VDM_WORD_SIZE
    }

    /// Comma-separated hex rendering of the body words, for logs.
    pub fn preview(&self) -> String {
        self.words()
            .iter()
            .map(|w| format!("{:#x}", w))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Debug for VdmBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VdmBody([{}])", self.preview())
    }
}

/// Flag bits OR-ed into a perform-action word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VdmFlags(u32);

impl VdmFlags {
    pub const NONE: VdmFlags = VdmFlags(0);
    /// Map line 1.
    pub const LINE1: VdmFlags = VdmFlags(VDM_FLAG_LINE1);
    /// Exit conflicting modes if possible.
    pub const GRACEFUL: VdmFlags = VdmFlags(VDM_FLAG_GRACEFUL);
    /// Persist through soft reset.
    pub const PERSIST: VdmFlags = VdmFlags(VDM_FLAG_PERSIST);
    /// Exit the mode instead of entering it.
    pub const EXIT: VdmFlags = VdmFlags(VDM_FLAG_EXIT);

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: VdmFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for VdmFlags {
    type Output = VdmFlags;

    fn bitor(self, rhs: VdmFlags) -> VdmFlags {
        VdmFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for VdmFlags {
    fn bitor_assign(&mut self, rhs: VdmFlags) {
        self.0 |= rhs.0;
    }
}

/// Structured VDM request, one per main opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VdmRequest {
    /// List supported actions.
    List,
    /// Get info for an action.
    Info { action: u32 },
    /// Perform an action, with flags OR-ed into the action word.
    Perform {
        action: u32,
        flags: VdmFlags,
        param: Option<u32>,
    },
}

impl VdmRequest {
    pub fn words(&self) -> Vec<u32> {
        match self {
            VdmRequest::List => vec![VDM_CMD_LIST],
            VdmRequest::Info { action } => vec![VDM_CMD_INFO, *action],
            VdmRequest::Perform {
                action,
                flags,
                param,
            } => {
                let mut words = vec![VDM_CMD_ACTION, flags.bits() | *action];
                words.extend(param);
                words
            }
        }
    }

    pub fn encode(&self) -> Result<VdmBody, HpmError> {
        VdmBody::from_words(&self.words())
    }
}

/// VDM sequences with a fixed, known encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownVdm {
    /// List supported VDM actions.
    List,
    /// Reboot the device.
    Reboot,
    /// Send the device to DFU.
    Dfu,
    /// Pull up debug USB.
    DebugUsb,
}

impl KnownVdm {
    pub fn request(&self) -> VdmRequest {
        match self {
            KnownVdm::List => VdmRequest::List,
            KnownVdm::Reboot => VdmRequest::Perform {
                action: VDM_ACTION_REBOOT,
                flags: VdmFlags::NONE,
                param: Some(VDM_REBOOT_PARAM),
            },
            KnownVdm::Dfu => VdmRequest::Perform {
                action: VDM_ACTION_DFU,
                flags: VdmFlags::NONE,
                param: Some(VDM_DFU_PARAM),
            },
            KnownVdm::DebugUsb => VdmRequest::Perform {
                action: VDM_ACTION_DEBUG_USB,
                flags: VdmFlags::GRACEFUL | VdmFlags::LINE1,
                param: None,
            },
        }
    }

    pub fn encode(&self) -> Result<VdmBody, HpmError> {
        self.request().encode()
    }
}

impl fmt::Display for KnownVdm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnownVdm::List => write!(f, "list"),
            KnownVdm::Reboot => write!(f, "reboot"),
            KnownVdm::Dfu => write!(f, "dfu"),
            KnownVdm::DebugUsb => write!(f, "debug-usb"),
        }
    }
}

/// Parse one hexadecimal word. A single leading sign is accepted and the
/// value wraps into 32 bits, so "-1" is 0xFFFFFFFF. The "0x" prefix is
/// optional.
///
/// Parsing is strict: anything but hex digits after the sign and prefix is
/// rejected, as are words wider than 64 bits (they are not saturated).
pub fn parse_hex_word(text: &str) -> Result<u32, HpmError> {
    let invalid = || HpmError::InvalidWord(text.to_string());

    let trimmed = text.trim();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits = rest
        .strip_prefix("0x")
        .or_else(|| rest.strip_prefix("0X"))
        .unwrap_or(rest);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let value = u64::from_str_radix(digits, 16).map_err(|_| invalid())? as u32;
    Ok(if negative { value.wrapping_neg() } else { value })
}

/// Parse caller-supplied words for a raw VDM.
///
/// At most `MAX_CUSTOM_WORDS` words are accepted; more is an error rather
/// than a silent drop.
pub fn parse_custom_words<S: AsRef<str>>(args: &[S]) -> Result<Vec<u32>, HpmError> {
    if args.is_empty() {
        return Err(HpmError::EmptyBody);
    }
    if args.len() > MAX_CUSTOM_WORDS {
        return Err(HpmError::TooManyWords {
            max: MAX_CUSTOM_WORDS,
            actual: args.len(),
        });
    }
    args.iter().map(|a| parse_hex_word(a.as_ref())).collect()
}
