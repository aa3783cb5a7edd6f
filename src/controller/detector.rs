//! Edge and threshold detection
//!
//! Turns sampled levels and conditioned values into discrete events. The
//! detectors are plain state machines; timing (poll cadence, the force
//! sensor's settle delay) is owned by the collector tasks that drive them.

use crate::controller::events::{AxisEvent, Edge, FsrLevel, PotDirection};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Change the absolute potentiometer mode must exceed before reporting
pub const POT_REPORT_THRESHOLD: u8 = 2;

/// Change the directional (media) potentiometer mode must exceed
pub const POT_MEDIA_THRESHOLD: u8 = 5;

/// Debounced level comparator for one button
///
/// A new level is accepted after `stable_samples` consecutive samples that
/// disagree with the current debounced level; exactly one [`Edge`] is
/// reported per accepted transition.
#[derive(Debug, Clone)]
pub struct ButtonDebouncer {
    pressed: bool,
    counter: u8,
    stable_samples: u8,
}

impl ButtonDebouncer {
    pub fn new(stable_samples: u8) -> Self {
        Self {
            pressed: false,
            counter: 0,
            stable_samples: stable_samples.max(1),
        }
    }

    /// Feeds one logical sample (`true` = pressed)
    pub fn update(&mut self, pressed: bool) -> Option<Edge> {
        if pressed == self.pressed {
            self.counter = 0;
            return None;
        }

        self.counter += 1;
        if self.counter < self.stable_samples {
            return None;
        }

        self.counter = 0;
        self.pressed = pressed;
        Some(if pressed { Edge::Pressed } else { Edge::Released })
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }
}

/// What to do when the force reading has dropped back to zero by the end of
/// the settle window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlePolicy {
    /// Emit the press anyway, bucketed from the settled value
    #[default]
    Commit,
    /// Drop the press and return to idle
    Swallow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FsrPhase {
    Idle,
    Settling,
    Pressed(FsrLevel),
}

/// Result of feeding a regular sample into the [`FsrDetector`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsrStep {
    /// Nothing to report
    Idle,
    /// Rising edge seen; the caller waits out the settle period, re-samples
    /// and calls [`FsrDetector::settle`]
    BeginSettle,
    /// Event ready to send
    Emit(AxisEvent),
}

/// Force sensor press/release detector with a settle period
#[derive(Debug, Clone)]
pub struct FsrDetector {
    phase: FsrPhase,
    policy: SettlePolicy,
}

impl FsrDetector {
    pub fn new(policy: SettlePolicy) -> Self {
        Self {
            phase: FsrPhase::Idle,
            policy,
        }
    }

    /// Feeds a conditioned force value from the regular poll
    pub fn sample(&mut self, value: u8) -> FsrStep {
        match self.phase {
            FsrPhase::Idle if value > 0 => {
                self.phase = FsrPhase::Settling;
                FsrStep::BeginSettle
            }
            FsrPhase::Pressed(level) if value == 0 => {
                self.phase = FsrPhase::Idle;
                FsrStep::Emit(AxisEvent::ForceReleased { level })
            }
            // a regular sample while settling means the caller skipped settle()
            FsrPhase::Settling => FsrStep::BeginSettle,
            _ => FsrStep::Idle,
        }
    }

    /// Feeds the value re-sampled after the settle period
    pub fn settle(&mut self, value: u8) -> Option<AxisEvent> {
        if self.phase != FsrPhase::Settling {
            return None;
        }

        if value == 0 && self.policy == SettlePolicy::Swallow {
            debug!("Force dropped to zero during settle, press swallowed");
            self.phase = FsrPhase::Idle;
            return None;
        }

        let level = FsrLevel::from_value(value);
        self.phase = FsrPhase::Pressed(level);
        Some(AxisEvent::ForcePressed { level, value })
    }

    /// Level of the press currently held, if any
    pub fn held_level(&self) -> Option<FsrLevel> {
        match self.phase {
            FsrPhase::Pressed(level) => Some(level),
            _ => None,
        }
    }
}

/// How potentiometer movement is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum PotMode {
    /// Report the value when it moved more than `threshold` away from the
    /// last reported value
    Absolute { threshold: u8 },
    /// Report a direction when consecutive samples differ by more than
    /// `threshold`
    Directional { threshold: u8 },
}

impl PotMode {
    pub fn absolute() -> Self {
        PotMode::Absolute {
            threshold: POT_REPORT_THRESHOLD,
        }
    }

    pub fn directional() -> Self {
        PotMode::Directional {
            threshold: POT_MEDIA_THRESHOLD,
        }
    }
}

/// Change detector for the potentiometer
#[derive(Debug, Clone)]
pub struct PotDetector {
    mode: PotMode,
    baseline: Option<u8>,
}

impl PotDetector {
    pub fn new(mode: PotMode) -> Self {
        Self {
            mode,
            baseline: None,
        }
    }

    pub fn sample(&mut self, value: u8) -> Option<AxisEvent> {
        match self.mode {
            PotMode::Absolute { threshold } => match self.baseline {
                Some(last) if value.abs_diff(last) <= threshold => None,
                _ => {
                    self.baseline = Some(value);
                    Some(AxisEvent::Pot { value })
                }
            },
            PotMode::Directional { threshold } => {
                let previous = self.baseline.replace(value)?;
                if value.abs_diff(previous) <= threshold {
                    return None;
                }
                let direction = if value > previous {
                    PotDirection::Increase
                } else {
                    PotDirection::Decrease
                };
                Some(AxisEvent::PotStep { direction, value })
            }
        }
    }

    pub fn mode(&self) -> PotMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sustained_level_yields_one_edge() {
        let mut button = ButtonDebouncer::new(1);
        assert_eq!(button.update(false), None);
        assert_eq!(button.update(true), Some(Edge::Pressed));
        for _ in 0..50 {
            assert_eq!(button.update(true), None);
        }
        assert_eq!(button.update(false), Some(Edge::Released));
        assert_eq!(button.update(false), None);
    }

    #[test]
    fn bounce_shorter_than_window_is_ignored() {
        let mut button = ButtonDebouncer::new(3);
        assert_eq!(button.update(true), None);
        assert_eq!(button.update(false), None);
        assert_eq!(button.update(true), None);
        assert_eq!(button.update(true), None);
        assert_eq!(button.update(true), Some(Edge::Pressed));
        assert!(button.is_pressed());
    }

    #[test]
    fn fsr_press_and_release_share_the_level() {
        let mut fsr = FsrDetector::new(SettlePolicy::Commit);
        assert_eq!(fsr.sample(0), FsrStep::Idle);
        assert_eq!(fsr.sample(40), FsrStep::BeginSettle);
        assert_eq!(
            fsr.settle(127),
            Some(AxisEvent::ForcePressed {
                level: FsrLevel::Firm,
                value: 127
            })
        );
        // held pressure does not repeat the press
        assert_eq!(fsr.sample(127), FsrStep::Idle);
        assert_eq!(fsr.sample(20), FsrStep::Idle);
        assert_eq!(
            fsr.sample(0),
            FsrStep::Emit(AxisEvent::ForceReleased {
                level: FsrLevel::Firm
            })
        );
        assert_eq!(fsr.held_level(), None);
    }

    #[test]
    fn commit_policy_keeps_a_press_that_vanished_while_settling() {
        let mut fsr = FsrDetector::new(SettlePolicy::Commit);
        assert_eq!(fsr.sample(10), FsrStep::BeginSettle);
        assert_eq!(
            fsr.settle(0),
            Some(AxisEvent::ForcePressed {
                level: FsrLevel::Light,
                value: 0
            })
        );
        assert_eq!(
            fsr.sample(0),
            FsrStep::Emit(AxisEvent::ForceReleased {
                level: FsrLevel::Light
            })
        );
    }

    #[test]
    fn swallow_policy_drops_a_press_that_vanished_while_settling() {
        let mut fsr = FsrDetector::new(SettlePolicy::Swallow);
        assert_eq!(fsr.sample(10), FsrStep::BeginSettle);
        assert_eq!(fsr.settle(0), None);
        assert_eq!(fsr.held_level(), None);
        // no release for a press that was never reported
        assert_eq!(fsr.sample(0), FsrStep::Idle);
    }

    #[test]
    fn settle_without_rising_edge_is_ignored() {
        let mut fsr = FsrDetector::new(SettlePolicy::Commit);
        assert_eq!(fsr.settle(100), None);
    }

    #[test]
    fn absolute_pot_needs_more_than_two_counts() {
        let mut pot = PotDetector::new(PotMode::absolute());
        assert_eq!(pot.sample(100), Some(AxisEvent::Pot { value: 100 }));
        // cumulative 1, 2 from the reported baseline: silent
        assert_eq!(pot.sample(101), None);
        assert_eq!(pot.sample(102), None);
        // cumulative 3: reported
        assert_eq!(pot.sample(103), Some(AxisEvent::Pot { value: 103 }));
        assert_eq!(pot.sample(101), None);
        assert_eq!(pot.sample(100), Some(AxisEvent::Pot { value: 100 }));
    }

    #[test]
    fn directional_pot_compares_consecutive_samples() {
        let mut pot = PotDetector::new(PotMode::directional());
        assert_eq!(pot.sample(100), None);
        assert_eq!(pot.sample(105), None);
        // slow drift never accumulates because the baseline follows every sample
        assert_eq!(pot.sample(110), None);
        assert_eq!(
            pot.sample(116),
            Some(AxisEvent::PotStep {
                direction: PotDirection::Increase,
                value: 116
            })
        );
        assert_eq!(
            pot.sample(100),
            Some(AxisEvent::PotStep {
                direction: PotDirection::Decrease,
                value: 100
            })
        );
    }
}
