//! Capacity-checked byte buffers for replies and VDM bodies.

use std::fmt;

use crate::error::HpmError;
use crate::protocol::constants::REPLY_CAPACITY;

/// Byte sequence that never holds more than `N` bytes.
///
/// Construction fails with `InvalidLength` instead of truncating.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Bounded<const N: usize> {
    data: Vec<u8>,
}

impl<const N: usize> Bounded<N> {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn from_vec(data: Vec<u8>) -> Result<Self, HpmError> {
        if data.len() > N {
            return Err(HpmError::InvalidLength {
                capacity: N,
                actual: data.len(),
            });
        }
        Ok(Self { data })
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, HpmError> {
        Self::from_vec(data.to_vec())
    }

    /// Append bytes, failing if the result would exceed capacity.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<(), HpmError> {
        let actual = self.data.len() + bytes.len();
        if actual > N {
            return Err(HpmError::InvalidLength { capacity: N, actual });
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn first(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// Borrow the first `len` bytes, or fail with `ShortReply`.
    pub fn require(&self, len: usize) -> Result<&[u8], HpmError> {
        self.data.get(..len).ok_or(HpmError::ShortReply {
            expected: len,
            actual: self.data.len(),
        })
    }
}

impl<const N: usize> fmt::Debug for Bounded<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bounded<{}>({})", N, hex::encode(&self.data))
    }
}

/// Reply read back from a controller register.
pub type Reply = Bounded<REPLY_CAPACITY>;
