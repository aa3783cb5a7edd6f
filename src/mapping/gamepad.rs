//! Gamepad profile: button bitmask plus two analog bytes

use crate::controller::state::CanonicalInputState;
use crate::mapping::{MappingStrategy, OutputReport, Profile, GAMEPAD_REPORT_ID};

/// 1:1 gamepad mapping, no held-key tracking
#[derive(Debug, Clone, Default)]
pub struct GamepadStrategy;

impl GamepadStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl MappingStrategy for GamepadStrategy {
    fn map(&self, state: &CanonicalInputState) -> OutputReport {
        OutputReport::Gamepad([
            GAMEPAD_REPORT_ID,
            (state.buttons & 0xFF) as u8,
            ((state.buttons >> 8) & 0x0F) as u8,
            state.pot,
            state.fsr,
        ])
    }

    fn profile(&self) -> Profile {
        Profile::Gamepad
    }
}
