//! Canonical input state and the aggregator that owns it
//!
//! Only the event processor task holds a [`StateAggregator`], so the state
//! needs no locking beyond the bus queues.

use crate::controller::bus::Drained;
use crate::controller::events::{AxisEvent, ButtonEvent, Edge, FsrLevel};
use crate::mapping::{HeldKeys, MappingStrategy, MediaCommand};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Maximum number of digital buttons
pub const MAX_BUTTONS: usize = 12;

/// Snapshot of all button and axis state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalInputState {
    /// Bit i set while logical button i is held
    pub buttons: u16,
    /// Last reported potentiometer value
    pub pot: u8,
    /// Force value of the current press, 0 when released
    pub fsr: u8,
    /// Level of the current force press
    pub fsr_level: Option<FsrLevel>,
    /// Output keys held, for level-based profiles
    pub held_keys: HeldKeys,
    /// Set whenever an event was applied since the last emission
    pub dirty: bool,
}

impl CanonicalInputState {
    pub fn is_held(&self, bit: u8) -> bool {
        self.buttons & (1 << bit) != 0
    }
}

/// Canonical code-to-bit encoding
///
/// The logical bit of a button is its position in the configured button
/// table, whatever its code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonMap {
    codes: Vec<u8>,
}

impl ButtonMap {
    pub fn new(codes: Vec<u8>) -> Self {
        Self { codes }
    }

    pub fn bit_for(&self, code: u8) -> Option<u8> {
        self.codes
            .iter()
            .take(MAX_BUTTONS)
            .position(|&c| c == code)
            .map(|index| index as u8)
    }

    pub fn codes(&self) -> &[u8] {
        &self.codes
    }
}

/// Applies drained events to the canonical state
#[derive(Debug)]
pub struct StateAggregator {
    state: CanonicalInputState,
    button_map: ButtonMap,
    pending_media: VecDeque<MediaCommand>,
}

impl StateAggregator {
    pub fn new(button_map: ButtonMap) -> Self {
        Self {
            state: CanonicalInputState::default(),
            button_map,
            pending_media: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &CanonicalInputState {
        &self.state
    }

    /// Applies a drained batch, buttons before axes; returns the number of
    /// events that changed the state
    pub fn apply_batch(&mut self, batch: &Drained, strategy: &dyn MappingStrategy) -> usize {
        let mut applied = 0;
        for event in &batch.buttons {
            if self.apply_button(event, strategy) {
                applied += 1;
            }
        }
        for event in &batch.axes {
            if self.apply_axis(event, strategy) {
                applied += 1;
            }
        }
        applied
    }

    pub fn apply_button(&mut self, event: &ButtonEvent, strategy: &dyn MappingStrategy) -> bool {
        let Some(bit) = self.button_map.bit_for(event.code) else {
            warn!("Ignoring event for unknown button code 0x{:02X}", event.code);
            return false;
        };

        let mask = 1u16 << bit;
        match event.edge {
            Edge::Pressed => self.state.buttons |= mask,
            Edge::Released => self.state.buttons &= !mask,
        }
        self.track_keys(event.code, event.edge, strategy);

        debug!(
            "Button 0x{:02X} {:?} -> mask {:#06x}",
            event.code, event.edge, self.state.buttons
        );
        self.state.dirty = true;
        true
    }

    pub fn apply_axis(&mut self, event: &AxisEvent, strategy: &dyn MappingStrategy) -> bool {
        match *event {
            AxisEvent::Pot { value } => self.state.pot = value,
            AxisEvent::PotStep { direction, value } => {
                self.state.pot = value;
                if let Some(command) = strategy.media_command(direction) {
                    debug!("Queued media command {:?}", command);
                    self.pending_media.push_back(command);
                }
            }
            AxisEvent::ForcePressed { level, value } => {
                self.state.fsr = value;
                self.state.fsr_level = Some(level);
                self.track_keys(level.code(), Edge::Pressed, strategy);
            }
            AxisEvent::ForceReleased { level } => {
                if self.state.fsr_level != Some(level) {
                    warn!(
                        "Force release for {:?} while {:?} is held",
                        level, self.state.fsr_level
                    );
                }
                self.state.fsr = 0;
                self.state.fsr_level = None;
                self.track_keys(level.code(), Edge::Released, strategy);
            }
        }

        debug!("Axis event applied: {}", event);
        self.state.dirty = true;
        true
    }

    /// Updates the held keys for `code`; expects the button bit or force
    /// level to already reflect the edge
    fn track_keys(&mut self, code: u8, edge: Edge, strategy: &dyn MappingStrategy) {
        let Some(keys) = strategy.key_bindings(code) else {
            return;
        };
        match edge {
            Edge::Pressed => {
                for &key in keys {
                    self.state.held_keys.press(key);
                }
            }
            Edge::Released => {
                let held_codes = self.held_codes();
                for &key in keys {
                    let still_bound = held_codes.iter().any(|&other| {
                        strategy
                            .key_bindings(other)
                            .is_some_and(|bound| bound.contains(&key))
                    });
                    if !still_bound {
                        self.state.held_keys.release(key);
                    }
                }
                // keys dropped at capacity get the freed slots
                for other in held_codes {
                    for &key in strategy.key_bindings(other).unwrap_or_default() {
                        if self.state.held_keys.is_full() {
                            return;
                        }
                        self.state.held_keys.press(key);
                    }
                }
            }
        }
    }

    /// Codes currently held: buttons in table order, then the force level
    fn held_codes(&self) -> Vec<u8> {
        let buttons = self
            .button_map
            .codes()
            .iter()
            .take(MAX_BUTTONS)
            .enumerate()
            .filter(|(bit, _)| self.state.is_held(*bit as u8))
            .map(|(_, &code)| code);
        buttons
            .chain(self.state.fsr_level.map(FsrLevel::code))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.state.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.state.dirty = false;
    }

    pub fn take_media(&mut self) -> Option<MediaCommand> {
        self.pending_media.pop_front()
    }

    /// Puts back a command that could not be sent yet
    pub fn requeue_media(&mut self, command: MediaCommand) {
        self.pending_media.push_front(command);
    }

    pub fn has_pending_media(&self) -> bool {
        !self.pending_media.is_empty()
    }

    /// Drops queued media commands, e.g. while no host is connected
    pub fn discard_media(&mut self) -> usize {
        let dropped = self.pending_media.len();
        self.pending_media.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::events::PotDirection;
    use crate::mapping::keyboard::usage;
    use crate::mapping::{KeyMap, KeyMapEntry, Profile};

    fn stock_map() -> ButtonMap {
        ButtonMap::new(vec![
            0x01, 0x02, 0x03, 0x04, 0x05, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
        ])
    }

    #[test]
    fn bit_is_position_in_the_table() {
        let map = stock_map();
        assert_eq!(map.bit_for(0x01), Some(0));
        assert_eq!(map.bit_for(0x05), Some(4));
        assert_eq!(map.bit_for(0x09), Some(5));
        assert_eq!(map.bit_for(0x0F), Some(11));
        assert_eq!(map.bit_for(0x06), None);
    }

    #[test]
    fn bit_follows_last_edge() {
        let strategy = Profile::Gamepad.create_strategy(KeyMap::default()).unwrap();
        let mut aggregator = StateAggregator::new(stock_map());

        aggregator.apply_button(&ButtonEvent::pressed(0x0F), strategy.as_ref());
        aggregator.apply_button(&ButtonEvent::pressed(0x01), strategy.as_ref());
        assert_eq!(aggregator.state().buttons, 0b1000_0000_0001);

        aggregator.apply_button(&ButtonEvent::released(0x0F), strategy.as_ref());
        assert_eq!(aggregator.state().buttons, 0b1);
        assert!(aggregator.is_dirty());
        // gamepad does not track keys
        assert!(aggregator.state().held_keys.is_empty());
    }

    #[test]
    fn unknown_code_leaves_state_untouched() {
        let strategy = Profile::Gamepad.create_strategy(KeyMap::default()).unwrap();
        let mut aggregator = StateAggregator::new(stock_map());
        assert!(!aggregator.apply_button(&ButtonEvent::pressed(0x42), strategy.as_ref()));
        assert_eq!(aggregator.state(), &CanonicalInputState::default());
    }

    #[test]
    fn batch_applies_buttons_before_axes() {
        let strategy = Profile::Keyboard.create_strategy(KeyMap::default()).unwrap();
        let mut aggregator = StateAggregator::new(stock_map());
        let batch = Drained {
            buttons: vec![ButtonEvent::pressed(0x01)],
            axes: vec![AxisEvent::ForcePressed {
                level: FsrLevel::Light,
                value: 12,
            }],
            closed: false,
        };

        assert_eq!(aggregator.apply_batch(&batch, strategy.as_ref()), 2);
        assert_eq!(
            aggregator.state().held_keys.as_slice(),
            &[usage::A, usage::W, usage::E]
        );
        assert_eq!(aggregator.state().fsr, 12);
        assert_eq!(aggregator.state().fsr_level, Some(FsrLevel::Light));
    }

    #[test]
    fn releasing_a_button_compacts_the_held_keys() {
        let strategy = Profile::Keyboard.create_strategy(KeyMap::default()).unwrap();
        let mut aggregator = StateAggregator::new(stock_map());
        aggregator.apply_button(&ButtonEvent::pressed(0x01), strategy.as_ref());
        aggregator.apply_axis(
            &AxisEvent::ForcePressed {
                level: FsrLevel::Light,
                value: 10,
            },
            strategy.as_ref(),
        );
        aggregator.apply_button(&ButtonEvent::released(0x01), strategy.as_ref());
        assert_eq!(
            aggregator.state().held_keys.as_slice(),
            &[usage::W, usage::E]
        );

        aggregator.apply_axis(
            &AxisEvent::ForceReleased {
                level: FsrLevel::Light,
            },
            strategy.as_ref(),
        );
        assert!(aggregator.state().held_keys.is_empty());
        assert_eq!(aggregator.state().fsr_level, None);
    }

    #[test]
    fn shared_key_stays_held_while_another_code_binds_it() {
        let keymap = KeyMap::new(vec![
            KeyMapEntry::new(0x01, &[usage::A]),
            KeyMapEntry::new(0x02, &[usage::A, usage::S]),
        ]);
        let strategy = Profile::Keyboard.create_strategy(keymap).unwrap();
        let mut aggregator = StateAggregator::new(stock_map());

        aggregator.apply_button(&ButtonEvent::pressed(0x01), strategy.as_ref());
        aggregator.apply_button(&ButtonEvent::pressed(0x02), strategy.as_ref());
        assert_eq!(aggregator.state().held_keys.as_slice(), &[usage::A, usage::S]);

        aggregator.apply_button(&ButtonEvent::released(0x02), strategy.as_ref());
        assert_eq!(aggregator.state().held_keys.as_slice(), &[usage::A]);

        aggregator.apply_button(&ButtonEvent::released(0x01), strategy.as_ref());
        assert!(aggregator.state().held_keys.is_empty());
    }

    #[test]
    fn key_dropped_at_capacity_returns_when_a_slot_frees() {
        let strategy = Profile::Keyboard.create_strategy(KeyMap::default()).unwrap();
        let mut aggregator = StateAggregator::new(stock_map());
        for code in [0x01, 0x02, 0x03, 0x04, 0x05, 0x09, 0x0A] {
            aggregator.apply_button(&ButtonEvent::pressed(code), strategy.as_ref());
        }
        assert!(!aggregator.state().held_keys.contains(usage::ARROW_DOWN));

        aggregator.apply_button(&ButtonEvent::released(0x02), strategy.as_ref());
        assert_eq!(
            aggregator.state().held_keys.as_slice(),
            &[
                usage::A,
                usage::D,
                usage::F,
                usage::SPACE,
                usage::ARROW_UP,
                usage::ARROW_DOWN
            ]
        );
    }

    #[test]
    fn pot_steps_queue_media_only_for_media_profile() {
        let step = AxisEvent::PotStep {
            direction: PotDirection::Decrease,
            value: 80,
        };

        let keyboard = Profile::Keyboard.create_strategy(KeyMap::default()).unwrap();
        let mut aggregator = StateAggregator::new(stock_map());
        aggregator.apply_axis(&step, keyboard.as_ref());
        assert!(!aggregator.has_pending_media());

        let media = Profile::KeyboardMedia
            .create_strategy(KeyMap::default())
            .unwrap();
        let mut aggregator = StateAggregator::new(stock_map());
        aggregator.apply_axis(&step, media.as_ref());
        assert_eq!(aggregator.state().pot, 80);
        assert_eq!(aggregator.take_media(), Some(MediaCommand::VolumeDown));
        assert_eq!(aggregator.take_media(), None);
    }
}
