//! Profile mapping: canonical input state to output reports
//!
//! One [`MappingStrategy`] is selected at startup from the configured
//! [`Profile`] and stays fixed for the process lifetime. Strategies are pure:
//! the same state always yields the same bytes and no I/O happens here.
//!
//! ```text
//! CanonicalInputState ──► [Strategy] ──► OutputReport ──► transport
//! ```

pub mod error;
pub mod gamepad;
pub mod keyboard;
pub mod media;
pub mod strategy;

pub use error::MappingError;
pub use keyboard::{HeldKeys, KeyMap, KeyMapEntry};
pub use media::MediaCommand;
pub use strategy::{MappingStrategy, Profile};

use std::fmt;

/// Report id of the gamepad input report
pub const GAMEPAD_REPORT_ID: u8 = 0x01;
/// Report id of the keyboard input report
pub const KEYBOARD_REPORT_ID: u8 = 0x01;
/// Report id of the media (consumer control) report
pub const MEDIA_REPORT_ID: u8 = 0x02;

/// Length of a gamepad report: id, buttons low, buttons high, pot, fsr
pub const GAMEPAD_REPORT_LEN: usize = 5;
/// Length of a keyboard report: id, modifier, reserved, six keys
pub const KEYBOARD_REPORT_LEN: usize = 9;
/// Length of a media report: id, command bits, padding
pub const MEDIA_REPORT_LEN: usize = 3;

/// Fixed-size report handed to the transport, built fresh per emission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputReport {
    Gamepad([u8; GAMEPAD_REPORT_LEN]),
    Keyboard([u8; KEYBOARD_REPORT_LEN]),
    Media([u8; MEDIA_REPORT_LEN]),
}

impl OutputReport {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            OutputReport::Gamepad(bytes) => bytes,
            OutputReport::Keyboard(bytes) => bytes,
            OutputReport::Media(bytes) => bytes,
        }
    }

    pub fn report_id(&self) -> u8 {
        self.as_bytes()[0]
    }

    pub fn is_media(&self) -> bool {
        matches!(self, OutputReport::Media(_))
    }
}

impl fmt::Display for OutputReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            OutputReport::Gamepad(_) => "gamepad",
            OutputReport::Keyboard(_) => "keyboard",
            OutputReport::Media(_) => "media",
        };
        write!(f, "{} [", kind)?;
        for (i, byte) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_display_is_hex() {
        let report = OutputReport::Gamepad([0x01, 0x01, 0x00, 10, 0]);
        assert_eq!(report.to_string(), "gamepad [01 01 00 0A 00]");
        assert_eq!(report.report_id(), GAMEPAD_REPORT_ID);
        assert!(!report.is_media());
    }
}
