// src/epoch/pedometer.rs
//! Step detection from the per-sample magnitude stream
//!
//! An envelope follower tracks the signal min/max with fast attack and
//! slow decay. When the peak-to-peak level clears the activity floor, a
//! low-then-high threshold crossing separated by a plausible interval
//! counts as one step.

use crate::config::constants::pedometer::{
    PED_MAX_STEP_INTERVAL, PED_MIN_ACTIVITY_LEVEL, PED_MIN_STEP_INTERVAL,
};

/// Threshold-crossing phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    None,
    LowDetected,
}

#[derive(Debug, Clone, Default)]
pub struct Pedometer {
    /// Lifetime step count, survives window resets
    total: u32,
    /// Steps since the last window drain
    steps: u32,
    interval: u16,
    min: i16,
    max: i16,
    t_min: i16,
    t_max: i16,
    level: i16,
    phase: Phase,
}

impl Pedometer {
    /// Start with both envelope edges at the current amplitude
    pub fn new(initialiser: i16) -> Self {
        Self {
            min: initialiser,
            max: initialiser,
            ..Self::default()
        }
    }

    /// Process one amplitude sample
    pub fn task(&mut self, amplitude: i16) {
        // Envelope decay rate grows with activity level
        let decay = (1 + self.level) >> 3;
        self.max -= decay;
        self.min += decay;
        if self.max <= amplitude {
            self.max = amplitude;
        }
        if self.min >= amplitude {
            self.min = amplitude;
        }

        self.level = self.max - self.min;

        if self.level > PED_MIN_ACTIVITY_LEVEL {
            // Lower threshold at 25 % of the range
            self.t_min = self.min + (self.level >> 2);
            if amplitude < self.t_min {
                self.phase = Phase::LowDetected;
            } else if self.phase == Phase::LowDetected {
                // Upper threshold at 75 % of the range
                self.t_max = self.max - (self.level >> 2);
                if amplitude > self.t_max && self.interval > PED_MIN_STEP_INTERVAL {
                    self.interval = 0;
                    self.phase = Phase::None;
                    self.total += 1;
                    self.steps += 1;
                }
            }
            // Interval watchdog: too long since the last candidate
            self.interval += 1;
            if self.interval > PED_MAX_STEP_INTERVAL {
                self.interval = PED_MIN_STEP_INTERVAL;
                self.phase = Phase::None;
            }
        }
    }

    /// Drain the per-window step count
    pub fn reset_steps(&mut self) -> u16 {
        let steps = self.steps.min(u16::MAX as u32) as u16;
        self.steps = 0;
        steps
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Restart the lifetime count at a goal period boundary
    pub fn reset_total(&mut self) {
        self.total = 0;
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn level(&self) -> i16 {
        self.level
    }
}
