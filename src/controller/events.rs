//! Event types carried over the event bus
//!
//! Producers (one task per physical input) emit [`ButtonEvent`]s and
//! [`AxisEvent`]s; the event processor is the only consumer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a button transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edge {
    Pressed,
    Released,
}

/// One real level transition of a button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub code: u8,
    pub edge: Edge,
}

impl ButtonEvent {
    pub fn pressed(code: u8) -> Self {
        Self {
            code,
            edge: Edge::Pressed,
        }
    }

    pub fn released(code: u8) -> Self {
        Self {
            code,
            edge: Edge::Released,
        }
    }
}

/// Analog channel identifiers, as used on the serial wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisId {
    Pot = 0,
    Fsr = 6,
}

impl AxisId {
    pub const ALL: [AxisId; 2] = [AxisId::Pot, AxisId::Fsr];

    pub fn wire_id(self) -> u8 {
        self as u8
    }
}

/// Discrete pressure level of the force sensor
///
/// The discriminant is the code the level is reported under, so a press and
/// its matching release always carry the same code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FsrLevel {
    Light = 0x06,
    Medium = 0x07,
    Firm = 0x08,
}

/// Upper bound (exclusive) of [`FsrLevel::Light`]
pub const FSR_LIGHT_LIMIT: u8 = 0x1D;
/// Upper bound (exclusive) of [`FsrLevel::Medium`]
pub const FSR_MEDIUM_LIMIT: u8 = 0x30;

impl FsrLevel {
    pub const ALL: [FsrLevel; 3] = [FsrLevel::Light, FsrLevel::Medium, FsrLevel::Firm];

    /// Buckets a conditioned 0..255 force value
    pub fn from_value(value: u8) -> Self {
        if value < FSR_LIGHT_LIMIT {
            FsrLevel::Light
        } else if value < FSR_MEDIUM_LIMIT {
            FsrLevel::Medium
        } else {
            FsrLevel::Firm
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PotDirection {
    Increase,
    Decrease,
}

/// Event produced by an analog axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisEvent {
    /// Absolute potentiometer position (0..255)
    Pot { value: u8 },
    /// Directional potentiometer movement, used for media control
    PotStep { direction: PotDirection, value: u8 },
    /// Force sensor pressed, settled at `level`
    ForcePressed { level: FsrLevel, value: u8 },
    /// Force sensor released; `level` is the level of the matching press
    ForceReleased { level: FsrLevel },
}

impl AxisEvent {
    pub fn axis(&self) -> AxisId {
        match self {
            AxisEvent::Pot { .. } | AxisEvent::PotStep { .. } => AxisId::Pot,
            AxisEvent::ForcePressed { .. } | AxisEvent::ForceReleased { .. } => AxisId::Fsr,
        }
    }

    /// Value as carried on the serial wire; a release reads as 0
    pub fn wire_value(&self) -> i16 {
        match self {
            AxisEvent::Pot { value } => *value as i16,
            AxisEvent::PotStep { value, .. } => *value as i16,
            AxisEvent::ForcePressed { value, .. } => *value as i16,
            AxisEvent::ForceReleased { .. } => 0,
        }
    }
}

impl fmt::Display for AxisEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisEvent::Pot { value } => write!(f, "pot={}", value),
            AxisEvent::PotStep { direction, value } => {
                write!(f, "pot {:?} (now {})", direction, value)
            }
            AxisEvent::ForcePressed { level, value } => {
                write!(f, "fsr pressed {:?} (0x{:02X}) value={}", level, level.code(), value)
            }
            AxisEvent::ForceReleased { level } => {
                write!(f, "fsr released {:?} (0x{:02X})", level, level.code())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fsr_levels_bucket_at_documented_limits() {
        assert_eq!(FsrLevel::from_value(0), FsrLevel::Light);
        assert_eq!(FsrLevel::from_value(0x1C), FsrLevel::Light);
        assert_eq!(FsrLevel::from_value(0x1D), FsrLevel::Medium);
        assert_eq!(FsrLevel::from_value(0x2F), FsrLevel::Medium);
        assert_eq!(FsrLevel::from_value(0x30), FsrLevel::Firm);
        assert_eq!(FsrLevel::from_value(255), FsrLevel::Firm);
    }

    #[test]
    fn release_reads_as_zero_on_the_wire() {
        let release = AxisEvent::ForceReleased {
            level: FsrLevel::Firm,
        };
        assert_eq!(release.axis(), AxisId::Fsr);
        assert_eq!(release.wire_value(), 0);
        assert_eq!(FsrLevel::Firm.code(), 0x08);
    }
}
