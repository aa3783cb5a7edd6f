//! Strategy trait and profile selection

use crate::controller::detector::PotMode;
use crate::controller::events::PotDirection;
use crate::controller::state::CanonicalInputState;
use crate::mapping::gamepad::GamepadStrategy;
use crate::mapping::keyboard::{KeyMap, KeyboardStrategy};
use crate::mapping::media::{KeyboardMediaStrategy, MediaCommand};
use crate::mapping::{MappingError, OutputReport};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};
use std::str::FromStr;
use tracing::info;

/// Output profile, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// 12 buttons plus pot and fsr bytes
    #[default]
    Gamepad,

    /// Held-key keyboard report
    Keyboard,

    /// Keyboard plus one-shot volume commands from the potentiometer
    KeyboardMedia,
}

impl Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Gamepad => write!(f, "Gamepad"),
            Profile::Keyboard => write!(f, "Keyboard"),
            Profile::KeyboardMedia => write!(f, "KeyboardMedia"),
        }
    }
}

impl FromStr for Profile {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "gamepad" => Ok(Profile::Gamepad),
            "keyboard" => Ok(Profile::Keyboard),
            "keyboard_media" | "keyboardmedia" => Ok(Profile::KeyboardMedia),
            other => Err(MappingError::UnknownProfile(other.to_string())),
        }
    }
}

impl Profile {
    /// Builds the strategy for this profile
    ///
    /// The keymap is validated even for the gamepad profile so a broken
    /// config file is reported regardless of which profile is active.
    pub fn create_strategy(
        &self,
        keymap: KeyMap,
    ) -> Result<Box<dyn MappingStrategy>, MappingError> {
        keymap.validate()?;
        info!("Creating {} mapping strategy", self);

        let strategy: Box<dyn MappingStrategy> = match self {
            Profile::Gamepad => Box::new(GamepadStrategy::new()),
            Profile::Keyboard => Box::new(KeyboardStrategy::new(keymap)),
            Profile::KeyboardMedia => Box::new(KeyboardMediaStrategy::new(keymap)),
        };
        Ok(strategy)
    }

    /// How the potentiometer is reported under this profile
    pub fn pot_mode(&self) -> PotMode {
        match self {
            Profile::Gamepad | Profile::Keyboard => PotMode::absolute(),
            Profile::KeyboardMedia => PotMode::directional(),
        }
    }
}

/// Maps canonical state to reports for one profile
///
/// `map` must be a pure function of the state. The optional hooks let the
/// event processor maintain level-based state (held keys, queued media
/// commands) without knowing which profile is active.
pub trait MappingStrategy: Debug + Send + Sync + 'static {
    /// Builds the primary report for the current state
    fn map(&self, state: &CanonicalInputState) -> OutputReport;

    /// Output keys bound to a code; `None` when the profile does not track
    /// held keys
    fn key_bindings(&self, _code: u8) -> Option<&[u8]> {
        None
    }

    /// Media command triggered by a directional pot step, if the profile
    /// has a media channel
    fn media_command(&self, _direction: PotDirection) -> Option<MediaCommand> {
        None
    }

    /// Report for a media command; `None` builds the release report
    fn media_report(&self, _command: Option<MediaCommand>) -> Option<OutputReport> {
        None
    }

    fn profile(&self) -> Profile;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_names_parse() {
        assert_eq!("gamepad".parse::<Profile>().unwrap(), Profile::Gamepad);
        assert_eq!("Keyboard".parse::<Profile>().unwrap(), Profile::Keyboard);
        assert_eq!(
            "keyboard-media".parse::<Profile>().unwrap(),
            Profile::KeyboardMedia
        );
        assert!("joystick".parse::<Profile>().is_err());
    }

    #[test]
    fn strategy_matches_profile() {
        for profile in [Profile::Gamepad, Profile::Keyboard, Profile::KeyboardMedia] {
            let strategy = profile.create_strategy(KeyMap::default()).unwrap();
            assert_eq!(strategy.profile(), profile);
        }
    }

    #[test]
    fn only_media_profile_reports_pot_direction() {
        assert_eq!(Profile::Gamepad.pot_mode(), PotMode::absolute());
        assert_eq!(Profile::KeyboardMedia.pot_mode(), PotMode::directional());
    }
}
