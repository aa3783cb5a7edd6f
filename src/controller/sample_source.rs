//! Raw sample access
//!
//! Register-level GPIO/ADC access lives outside this crate; the collector
//! only sees the [`SampleSource`] trait.

use crate::controller::conditioner::ADC_MAX;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

/// Number of digital lines a [`SimulatedSource`] exposes
pub const SIM_LINES: usize = 32;

/// Number of ADC channels a [`SimulatedSource`] exposes
pub const SIM_ADC_CHANNELS: usize = 4;

/// Periodic raw reads from the hardware
///
/// Implementations are shared between all producer tasks, so reads take
/// `&self`.
pub trait SampleSource: std::fmt::Debug + Send + Sync + 'static {
    /// Electrical level of a digital line (`true` = high)
    fn read_level(&self, line: u8) -> bool;

    /// 12-bit sample of an ADC channel
    fn read_adc(&self, channel: u8) -> u16;
}

/// In-memory sample source
///
/// Lines idle high, matching buttons wired to ground with pull-ups; ADC
/// channels idle at 0. Unknown lines read high and unknown channels read 0.
#[derive(Debug)]
pub struct SimulatedSource {
    lines: [AtomicBool; SIM_LINES],
    adc: [AtomicU16; SIM_ADC_CHANNELS],
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSource {
    pub fn new() -> Self {
        Self {
            lines: std::array::from_fn(|_| AtomicBool::new(true)),
            adc: std::array::from_fn(|_| AtomicU16::new(0)),
        }
    }

    pub fn set_level(&self, line: u8, high: bool) {
        if let Some(slot) = self.lines.get(line as usize) {
            slot.store(high, Ordering::Relaxed);
        }
    }

    /// Pulls an active-low line to ground
    pub fn press(&self, line: u8) {
        self.set_level(line, false);
    }

    pub fn release(&self, line: u8) {
        self.set_level(line, true);
    }

    pub fn set_adc(&self, channel: u8, raw: u16) {
        if let Some(slot) = self.adc.get(channel as usize) {
            slot.store(raw.min(ADC_MAX), Ordering::Relaxed);
        }
    }
}

impl SampleSource for SimulatedSource {
    fn read_level(&self, line: u8) -> bool {
        self.lines
            .get(line as usize)
            .map(|slot| slot.load(Ordering::Relaxed))
            .unwrap_or(true)
    }

    fn read_adc(&self, channel: u8) -> u16 {
        self.adc
            .get(channel as usize)
            .map(|slot| slot.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_lines_idle_high() {
        let source = SimulatedSource::new();
        assert!(source.read_level(9));
        source.press(9);
        assert!(!source.read_level(9));
        source.release(9);
        assert!(source.read_level(9));
        assert!(source.read_level(200));
    }

    #[test]
    fn simulated_adc_is_clamped_to_twelve_bits() {
        let source = SimulatedSource::new();
        source.set_adc(2, 9000);
        assert_eq!(source.read_adc(2), ADC_MAX);
        assert_eq!(source.read_adc(42), 0);
    }
}
