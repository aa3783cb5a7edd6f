//! Signal conditioning for analog channels
//!
//! Each axis keeps an 8-sample moving average and converts the average
//! through a fixed curve into a 0..255 (or -255..255) value. There is no
//! error path: out-of-range samples are clamped.

use serde::{Deserialize, Serialize};

/// Window length of the moving average
pub const WINDOW_SIZE: usize = 8;

/// Full scale of the 12-bit ADC
pub const ADC_MAX: u16 = 4095;

/// Midpoint of a centered (joystick-style) axis
pub const ADC_CENTER: i32 = 2048;

/// Default deadzone of a centered axis, in conditioned units
pub const JOYSTICK_DEADZONE: i16 = 30;

/// Raw reading below which the force sensor reads as 0
pub const FSR_FLOOR: u16 = 300;

/// Simple moving average over the last [`WINDOW_SIZE`] samples
///
/// The buffer starts zero-filled, so the first averages ramp up towards the
/// real level.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    buffer: [u16; WINDOW_SIZE],
    sum: u32,
    index: usize,
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self::new()
    }
}

impl MovingAverage {
    pub fn new() -> Self {
        Self {
            buffer: [0; WINDOW_SIZE],
            sum: 0,
            index: 0,
        }
    }

    /// Pushes a sample and returns the new average
    pub fn push(&mut self, raw: u16) -> u16 {
        let raw = raw.min(ADC_MAX);
        self.sum -= self.buffer[self.index] as u32;
        self.buffer[self.index] = raw;
        self.sum += raw as u32;
        self.index = (self.index + 1) % WINDOW_SIZE;
        self.average()
    }

    pub fn average(&self) -> u16 {
        (self.sum / WINDOW_SIZE as u32) as u16
    }
}

/// Conversion curve from an averaged raw reading to a conditioned value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Curve {
    /// Centered axis, -255..255 with a symmetric deadzone
    Joystick { deadzone: i16 },
    /// Force sensor, 0 below `floor`, then linear to 255
    Force { floor: u16 },
    /// Linear 0..255, no deadzone
    Potentiometer,
}

impl Curve {
    pub fn joystick() -> Self {
        Curve::Joystick {
            deadzone: JOYSTICK_DEADZONE,
        }
    }

    pub fn force() -> Self {
        Curve::Force { floor: FSR_FLOOR }
    }

    /// Converts a raw reading; the result is always inside [`Curve::range`]
    pub fn convert(&self, raw: u16) -> i16 {
        let raw = raw.min(ADC_MAX) as i32;
        match *self {
            Curve::Joystick { deadzone } => {
                let v = ((raw - ADC_CENTER) * 255 / ADC_CENTER).clamp(-255, 255) as i16;
                if v.abs() < deadzone {
                    0
                } else {
                    v
                }
            }
            Curve::Force { floor } => {
                let floor = floor.min(ADC_MAX - 1) as i32;
                if raw < floor {
                    0
                } else {
                    ((raw - floor) * 255 / (ADC_MAX as i32 - floor)).clamp(0, 255) as i16
                }
            }
            Curve::Potentiometer => (raw * 255 / ADC_MAX as i32).clamp(0, 255) as i16,
        }
    }

    pub fn range(&self) -> (i16, i16) {
        match self {
            Curve::Joystick { .. } => (-255, 255),
            Curve::Force { .. } | Curve::Potentiometer => (0, 255),
        }
    }
}

/// Moving average plus conversion curve for one axis
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    window: MovingAverage,
    curve: Curve,
}

impl SignalConditioner {
    pub fn new(curve: Curve) -> Self {
        Self {
            window: MovingAverage::new(),
            curve,
        }
    }

    /// Feeds one raw sample and returns the conditioned value of the new average
    pub fn push(&mut self, raw: u16) -> i16 {
        let average = self.window.push(raw);
        self.curve.convert(average)
    }

    /// Same as [`SignalConditioner::push`], narrowed to the unsigned range
    pub fn push_unsigned(&mut self, raw: u16) -> u8 {
        self.push(raw).clamp(0, 255) as u8
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }
}
