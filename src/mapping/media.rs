//! Keyboard profile with one-shot media commands
//!
//! Behaves like the keyboard profile for buttons and force levels. A
//! directional potentiometer step additionally produces a volume command on
//! the media report id; the report processor releases it again after a
//! short window.

use crate::controller::events::PotDirection;
use crate::controller::state::CanonicalInputState;
use crate::mapping::keyboard::{KeyMap, KeyboardStrategy};
use crate::mapping::{MappingStrategy, OutputReport, Profile, MEDIA_REPORT_ID};
use serde::{Deserialize, Serialize};

/// Consumer-control bits of the media report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaCommand {
    VolumeUp = 0x01,
    VolumeDown = 0x02,
}

impl MediaCommand {
    pub fn bits(self) -> u8 {
        self as u8
    }
}

impl From<PotDirection> for MediaCommand {
    fn from(direction: PotDirection) -> Self {
        match direction {
            PotDirection::Increase => MediaCommand::VolumeUp,
            PotDirection::Decrease => MediaCommand::VolumeDown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyboardMediaStrategy {
    keyboard: KeyboardStrategy,
}

impl KeyboardMediaStrategy {
    pub fn new(keymap: KeyMap) -> Self {
        Self {
            keyboard: KeyboardStrategy::new(keymap),
        }
    }
}

impl MappingStrategy for KeyboardMediaStrategy {
    fn map(&self, state: &CanonicalInputState) -> OutputReport {
        KeyboardStrategy::keyboard_report(state)
    }

    fn key_bindings(&self, code: u8) -> Option<&[u8]> {
        self.keyboard.key_bindings(code)
    }

    fn media_command(&self, direction: PotDirection) -> Option<MediaCommand> {
        Some(direction.into())
    }

    fn media_report(&self, command: Option<MediaCommand>) -> Option<OutputReport> {
        let bits = command.map(MediaCommand::bits).unwrap_or(0);
        Some(OutputReport::Media([MEDIA_REPORT_ID, bits, 0x00]))
    }

    fn profile(&self) -> Profile {
        Profile::KeyboardMedia
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::gamepad::GamepadStrategy;

    #[test]
    fn media_press_and_release_reports() {
        let strategy = KeyboardMediaStrategy::new(KeyMap::default());
        let up = strategy.media_command(PotDirection::Increase);
        assert_eq!(up, Some(MediaCommand::VolumeUp));
        assert_eq!(
            strategy.media_report(up).unwrap().as_bytes(),
            &[0x02, 0x01, 0x00]
        );
        assert_eq!(
            strategy.media_report(None).unwrap().as_bytes(),
            &[0x02, 0x00, 0x00]
        );
    }

    #[test]
    fn other_profiles_have_no_media_channel() {
        let gamepad = GamepadStrategy::new();
        assert_eq!(gamepad.media_command(PotDirection::Decrease), None);
        assert_eq!(gamepad.media_report(Some(MediaCommand::VolumeDown)), None);
    }

    #[test]
    fn primary_report_is_the_keyboard_report() {
        let mut state = CanonicalInputState::default();
        state.held_keys.press(0x04);
        let strategy = KeyboardMediaStrategy::new(KeyMap::default());
        assert_eq!(
            strategy.map(&state),
            KeyboardStrategy::keyboard_report(&state)
        );
    }
}
