//! Error definitions for the mapping module

use thiserror::Error;

/// Errors raised while building a profile mapping
#[derive(Debug, Error)]
pub enum MappingError {
    /// A keymap entry is unusable
    #[error("Invalid keymap entry for code 0x{code:02X}: {reason}")]
    InvalidKeymap { code: u8, reason: String },

    /// The same code appears twice in the keymap
    #[error("Duplicate keymap entry for code 0x{0:02X}")]
    DuplicateCode(u8),

    /// Profile name not recognised
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),
}
