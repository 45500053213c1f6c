//! ACE unlock handshake.

use std::fmt;

use tracing::{info, instrument, warn};

use crate::connection::Connection;
use crate::error::HpmError;
use crate::identity::PlatformIdentity;
use crate::protocol::CommandTag;
use crate::protocol::constants::{DEFAULT_CHIP, UNLOCK_KEY_LEN};
use crate::transport::Channel;

/// Per-platform ACE unlock key.
///
/// The first four board-name characters are packed big-endian into a word,
/// and the word is staged in the controller's native little-endian order, so
/// "J314" is staged as `b"413J"`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UnlockKey(u32);

impl UnlockKey {
    pub fn from_board_name(name: &str) -> Result<Self, HpmError> {
        let prefix: [u8; UNLOCK_KEY_LEN] = name
            .as_bytes()
            .get(..UNLOCK_KEY_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| HpmError::Identity(format!("board name {:?} is too short", name)))?;
        Ok(Self(u32::from_be_bytes(prefix)))
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Bytes as staged in the argument register.
    pub fn to_bytes(&self) -> [u8; UNLOCK_KEY_LEN] {
        self.0.to_le_bytes()
    }
}

impl fmt::Debug for UnlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnlockKey({:08X})", self.0)
    }
}

fn unlock_failed(source: HpmError) -> HpmError {
    HpmError::UnlockFailed {
        source: Box::new(source),
    }
}

/// Unlock ACE.
///
/// The controller sometimes rejects the first attempt; one GAID reset
/// followed by a single retry recovers it. The retry's outcome is final.
#[instrument(skip_all, fields(rid = conn.rid()))]
pub fn unlock_ace<C: Channel, I: PlatformIdentity + ?Sized>(
    conn: &mut Connection<C>,
    identity: &I,
) -> Result<(), HpmError> {
    let key = conn.unlock_key(identity).map_err(unlock_failed)?;

    match conn.run_command(DEFAULT_CHIP, CommandTag::LOCK, &key.to_bytes()) {
        Ok(_) => {
            info!("ACE unlocked");
            return Ok(());
        }
        Err(e) => warn!(error = %e, "ACE unlock rejected, resetting and retrying"),
    }

    conn.run_command(DEFAULT_CHIP, CommandTag::GAID, &[])
        .map_err(unlock_failed)?;
    conn.run_command(DEFAULT_CHIP, CommandTag::LOCK, &key.to_bytes())
        .map_err(unlock_failed)?;

    info!("ACE unlocked after retry");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentity;
    use crate::protocol::constants::REG_DATA;
    use crate::transport::mock::{ChannelOp, MockChannel};

    fn setup() -> (MockChannel, Connection<MockChannel>, StaticIdentity) {
        let mock = MockChannel::new();
        mock.set_register(REG_DATA, &[0x00]);
        let conn = Connection::new(mock.clone(), 0);
        (mock, conn, StaticIdentity::new("J314sAP"))
    }

    #[test]
    fn test_key_packing() {
        let key = UnlockKey::from_board_name("J314sAP").unwrap();
        assert_eq!(key.value(), 0x4A33_3134);
        assert_eq!(&key.to_bytes(), b"413J");
        assert!(UnlockKey::from_board_name("J31").is_err());
    }

    #[test]
    fn test_first_attempt_succeeds() {
        let (mock, mut conn, identity) = setup();
        unlock_ace(&mut conn, &identity).unwrap();
        assert_eq!(mock.commands(), vec![CommandTag::LOCK]);
        assert!(mock.ops().contains(&ChannelOp::Write {
            chip: 0,
            address: REG_DATA,
            data: b"413J".to_vec()
        }));
    }

    #[test]
    fn test_retry_path_issues_three_commands() {
        let (mock, mut conn, identity) = setup();
        mock.queue_command_result(Err(0xE000_02E2));
        mock.queue_command_result(Ok(()));
        mock.queue_command_result(Ok(()));

        unlock_ace(&mut conn, &identity).unwrap();
        assert_eq!(
            mock.commands(),
            vec![CommandTag::LOCK, CommandTag::GAID, CommandTag::LOCK]
        );
    }

    #[test]
    fn test_retry_failure_is_final() {
        let (mock, mut conn, identity) = setup();
        mock.queue_command_result(Err(0xE000_02E2));
        mock.queue_command_result(Ok(()));
        mock.queue_command_result(Err(0xE000_02E2));

        let err = unlock_ace(&mut conn, &identity).unwrap_err();
        assert!(matches!(err, HpmError::UnlockFailed { .. }));
        assert_eq!(err.raw_code(), Some(0xE000_02E2));
        assert_eq!(mock.commands().len(), 3);
    }

    #[test]
    fn test_reset_failure_propagates() {
        let (mock, mut conn, identity) = setup();
        mock.queue_command_result(Err(0xE000_02E2));
        mock.queue_command_result(Err(0xE000_02BC));

        let err = unlock_ace(&mut conn, &identity).unwrap_err();
        assert_eq!(err.raw_code(), Some(0xE000_02BC));
        assert_eq!(mock.commands(), vec![CommandTag::LOCK, CommandTag::GAID]);
    }

    #[test]
    fn test_identity_failure_is_unlock_failure() {
        let (mock, mut conn, _) = setup();
        let err = unlock_ace(&mut conn, &StaticIdentity::new("J3")).unwrap_err();
        assert!(matches!(err, HpmError::UnlockFailed { .. }));
        assert!(mock.commands().is_empty());
    }
}
