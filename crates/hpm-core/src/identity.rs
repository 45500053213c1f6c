//! Platform identity used to derive the ACE unlock key.
//!
//! The key comes from the first four characters of the machine's board name
//! (for example "J314" on a 14-inch MacBook Pro).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::HpmError;

/// Default device-tree compatible node on Apple silicon Linux systems.
pub const DEVICE_TREE_COMPATIBLE: &str = "/proc/device-tree/compatible";

const APPLE_VENDOR: &str = "apple";

/// Source of the platform's board name.
pub trait PlatformIdentity {
    fn board_name(&self) -> Result<String, HpmError>;
}

impl<T: PlatformIdentity + ?Sized> PlatformIdentity for Box<T> {
    fn board_name(&self) -> Result<String, HpmError> {
        (**self).board_name()
    }
}

/// Fixed board name, for tests and for overriding detection.
#[derive(Debug, Clone)]
pub struct StaticIdentity(String);

impl StaticIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl PlatformIdentity for StaticIdentity {
    fn board_name(&self) -> Result<String, HpmError> {
        Ok(self.0.clone())
    }
}

/// Board name read from the device tree `compatible` property.
///
/// The first entry has the form `apple,<board>`; the board code is returned
/// uppercased ("apple,j314s" gives "J314S").
#[derive(Debug, Clone)]
pub struct DeviceTreeIdentity {
    path: PathBuf,
}

impl DeviceTreeIdentity {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Default for DeviceTreeIdentity {
    fn default() -> Self {
        Self::new(DEVICE_TREE_COMPATIBLE)
    }
}

impl PlatformIdentity for DeviceTreeIdentity {
    fn board_name(&self) -> Result<String, HpmError> {
        let raw = fs::read(&self.path).map_err(|e| {
            HpmError::Identity(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        let board = board_from_compatible(&raw)?;
        debug!(path = %self.path.display(), board = %board, "Read platform identity");
        Ok(board)
    }
}

/// Extract the board code from a NUL-separated `compatible` list.
pub fn board_from_compatible(raw: &[u8]) -> Result<String, HpmError> {
    let first = raw.split(|&b| b == 0).next().unwrap_or_default();
    let first = std::str::from_utf8(first)
        .map_err(|e| HpmError::Identity(format!("compatible is not UTF-8: {}", e)))?;

    let (vendor, board) = first
        .split_once(',')
        .ok_or_else(|| HpmError::Identity(format!("malformed compatible entry {:?}", first)))?;
    if vendor != APPLE_VENDOR {
        return Err(HpmError::Identity(format!(
            "host is not an Apple silicon system: {:?}",
            first
        )));
    }
    Ok(board.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_from_compatible() {
        let raw = b"apple,j314s\0apple,t6000\0apple,arm-platform\0";
        assert_eq!(board_from_compatible(raw).unwrap(), "J314S");
    }

    #[test]
    fn test_non_apple_rejected() {
        assert!(matches!(
            board_from_compatible(b"raspberrypi,4-model-b\0brcm,bcm2711\0"),
            Err(HpmError::Identity(_))
        ));
        assert!(board_from_compatible(b"").is_err());
    }

    #[test]
    fn test_boxed_identity_delegates() {
        let identity: Box<dyn PlatformIdentity> = Box::new(StaticIdentity::new("J314sAP"));
        assert_eq!(identity.board_name().unwrap(), "J314sAP");
    }

    #[test]
    fn test_device_tree_identity_reads_file() {
        let path = std::env::temp_dir().join(format!("hpm-compatible-{}", std::process::id()));
        fs::write(&path, b"apple,j413\0apple,t8112\0").unwrap();

        let identity = DeviceTreeIdentity::new(&path);
        assert_eq!(identity.board_name().unwrap(), "J413");

        fs::remove_file(&path).unwrap();
        assert!(identity.board_name().is_err());
    }
}
