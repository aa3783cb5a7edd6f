//! Keyboard profile
//!
//! Every input code is looked up in a static [`KeyMap`] yielding one or two
//! HID usage codes. Pressed keys are collected in [`HeldKeys`], an ordered
//! set of at most six entries which becomes the key array of the report.

use crate::controller::state::CanonicalInputState;
use crate::mapping::{MappingError, MappingStrategy, OutputReport, Profile, KEYBOARD_REPORT_ID};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Keys per report (boot keyboard rollover)
pub const MAX_HELD_KEYS: usize = 6;

/// Output keys a single code may produce
pub const MAX_KEYS_PER_CODE: usize = 2;

/// HID keyboard usage codes used by the default keymap
pub mod usage {
    pub const A: u8 = 0x04;
    pub const D: u8 = 0x07;
    pub const E: u8 = 0x08;
    pub const F: u8 = 0x09;
    pub const R: u8 = 0x15;
    pub const S: u8 = 0x16;
    pub const T: u8 = 0x17;
    pub const W: u8 = 0x1A;
    pub const ENTER: u8 = 0x28;
    pub const ESCAPE: u8 = 0x29;
    pub const TAB: u8 = 0x2B;
    pub const SPACE: u8 = 0x2C;
    pub const ARROW_RIGHT: u8 = 0x4F;
    pub const ARROW_LEFT: u8 = 0x50;
    pub const ARROW_DOWN: u8 = 0x51;
    pub const ARROW_UP: u8 = 0x52;
}

/// Ordered set of currently held output keys
///
/// Insertion order is kept, a key already held is ignored on press, and a
/// release compacts the remaining keys without reordering them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeldKeys {
    keys: [u8; MAX_HELD_KEYS],
    len: usize,
}

impl HeldKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key; returns false if it was already held or the set is full
    pub fn press(&mut self, key: u8) -> bool {
        if key == 0 || self.contains(key) {
            return false;
        }
        if self.is_full() {
            warn!("Held key set full, dropping key 0x{:02X}", key);
            return false;
        }
        self.keys[self.len] = key;
        self.len += 1;
        true
    }

    /// Removes a key; returns false if it was not held
    pub fn release(&mut self, key: u8) -> bool {
        let Some(position) = self.as_slice().iter().position(|&k| k == key) else {
            return false;
        };
        self.keys.copy_within(position + 1..self.len, position);
        self.len -= 1;
        self.keys[self.len] = 0;
        true
    }

    pub fn contains(&self, key: u8) -> bool {
        self.as_slice().contains(&key)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.keys[..self.len]
    }

    /// Report layout: held keys first, zero padded
    pub fn slots(&self) -> [u8; MAX_HELD_KEYS] {
        self.keys
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == MAX_HELD_KEYS
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// One keymap row: input code to up to two output keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMapEntry {
    pub code: u8,
    pub keys: Vec<u8>,
}

impl KeyMapEntry {
    pub fn new(code: u8, keys: &[u8]) -> Self {
        Self {
            code,
            keys: keys.to_vec(),
        }
    }
}

/// Static code-to-keys table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyMap {
    entries: Vec<KeyMapEntry>,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self::default_config()
    }
}

impl KeyMap {
    pub fn new(entries: Vec<KeyMapEntry>) -> Self {
        Self { entries }
    }

    /// Keymap for the stock 12-button stick plus the three force levels
    pub fn default_config() -> Self {
        Self::new(vec![
            KeyMapEntry::new(0x01, &[usage::A]),
            KeyMapEntry::new(0x02, &[usage::S]),
            KeyMapEntry::new(0x03, &[usage::D]),
            KeyMapEntry::new(0x04, &[usage::F]),
            KeyMapEntry::new(0x05, &[usage::SPACE]),
            // force sensor levels
            KeyMapEntry::new(0x06, &[usage::W, usage::E]),
            KeyMapEntry::new(0x07, &[usage::R]),
            KeyMapEntry::new(0x08, &[usage::T]),
            KeyMapEntry::new(0x09, &[usage::ARROW_UP]),
            KeyMapEntry::new(0x0A, &[usage::ARROW_DOWN]),
            KeyMapEntry::new(0x0B, &[usage::ARROW_LEFT]),
            KeyMapEntry::new(0x0C, &[usage::ARROW_RIGHT]),
            KeyMapEntry::new(0x0D, &[usage::ENTER]),
            KeyMapEntry::new(0x0E, &[usage::ESCAPE]),
            KeyMapEntry::new(0x0F, &[usage::TAB]),
        ])
    }

    pub fn validate(&self) -> Result<(), MappingError> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.code) {
                return Err(MappingError::DuplicateCode(entry.code));
            }
            if entry.keys.is_empty() || entry.keys.len() > MAX_KEYS_PER_CODE {
                return Err(MappingError::InvalidKeymap {
                    code: entry.code,
                    reason: format!(
                        "expected 1 to {} keys, got {}",
                        MAX_KEYS_PER_CODE,
                        entry.keys.len()
                    ),
                });
            }
            if entry.keys.contains(&0) {
                return Err(MappingError::InvalidKeymap {
                    code: entry.code,
                    reason: "key code 0 is reserved".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, code: u8) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|entry| entry.code == code)
            .map(|entry| entry.keys.as_slice())
    }

    pub fn entries(&self) -> &[KeyMapEntry] {
        &self.entries
    }
}

/// Held-key keyboard mapping
#[derive(Debug, Clone)]
pub struct KeyboardStrategy {
    keymap: KeyMap,
}

impl KeyboardStrategy {
    pub fn new(keymap: KeyMap) -> Self {
        Self { keymap }
    }

    pub fn keyboard_report(state: &CanonicalInputState) -> OutputReport {
        let keys = state.held_keys.slots();
        OutputReport::Keyboard([
            KEYBOARD_REPORT_ID,
            0x00, // modifier
            0x00, // reserved
            keys[0],
            keys[1],
            keys[2],
            keys[3],
            keys[4],
            keys[5],
        ])
    }
}

impl MappingStrategy for KeyboardStrategy {
    fn map(&self, state: &CanonicalInputState) -> OutputReport {
        Self::keyboard_report(state)
    }

    fn key_bindings(&self, code: u8) -> Option<&[u8]> {
        self.keymap.get(code)
    }

    fn profile(&self) -> Profile {
        Profile::Keyboard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_keeps_insertion_order_and_ignores_duplicates() {
        let mut held = HeldKeys::new();
        assert!(held.press(usage::W));
        assert!(held.press(usage::A));
        assert!(!held.press(usage::W));
        assert_eq!(held.as_slice(), &[usage::W, usage::A]);
    }

    #[test]
    fn releasing_one_of_a_pair_compacts_and_keeps_order() {
        let mut held = HeldKeys::new();
        let pair = KeyMap::default_config().get(0x06).unwrap().to_vec();
        assert_eq!(pair.len(), 2);
        held.press(usage::A);
        for key in &pair {
            held.press(*key);
        }
        held.press(usage::S);

        assert!(held.release(pair[0]));
        assert_eq!(held.as_slice(), &[usage::A, pair[1], usage::S]);
        assert_eq!(held.slots(), [usage::A, pair[1], usage::S, 0, 0, 0]);

        assert!(!held.release(pair[0]));
    }

    #[test]
    fn seventh_key_is_dropped() {
        let mut held = HeldKeys::new();
        for key in 1..=6 {
            assert!(held.press(key + 0x10));
        }
        assert!(!held.press(0x30));
        assert_eq!(held.len(), MAX_HELD_KEYS);
        held.release(0x11);
        assert!(held.press(0x30));
        assert_eq!(held.as_slice(), &[0x12, 0x13, 0x14, 0x15, 0x16, 0x30]);
    }

    #[test]
    fn default_keymap_is_valid() {
        assert!(KeyMap::default_config().validate().is_ok());
    }

    #[test]
    fn keymap_rejects_three_keys_and_duplicates() {
        let too_many = KeyMap::new(vec![KeyMapEntry::new(1, &[4, 5, 6])]);
        assert!(matches!(
            too_many.validate(),
            Err(MappingError::InvalidKeymap { code: 1, .. })
        ));

        let duplicate = KeyMap::new(vec![
            KeyMapEntry::new(1, &[4]),
            KeyMapEntry::new(1, &[5]),
        ]);
        assert!(matches!(
            duplicate.validate(),
            Err(MappingError::DuplicateCode(1))
        ));
    }

    #[test]
    fn report_carries_held_keys() {
        let mut state = CanonicalInputState::default();
        state.held_keys.press(usage::W);
        state.held_keys.press(usage::E);
        let report = KeyboardStrategy::new(KeyMap::default()).map(&state);
        assert_eq!(
            report.as_bytes(),
            &[0x01, 0, 0, usage::W, usage::E, 0, 0, 0, 0]
        );
    }
}
