//! State machine module.

pub mod machine;
pub mod unlock;

pub use machine::{HpmState, ModeController};
pub use unlock::{UnlockKey, unlock_ace};
