// src/epoch/window.rs
//! Logging window alignment
//!
//! Windows close on multiples of the epoch period, shifted by the user
//! offset. After a clock change or period change the current window is
//! stretched or shrunk once so later windows land back on the grid, and
//! the span length records how many seconds the window really covered.

use crate::config::constants::epoch::INVALID_TIME;

/// Close time and true span of the current logging window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochWindow {
    /// Second at which the current window closes; [`INVALID_TIME`]
    /// while the logger is stopped
    pub close_time: u32,
    /// Seconds the current window actually spans
    pub span_len: u32,
}

impl Default for EpochWindow {
    fn default() -> Self {
        Self {
            close_time: INVALID_TIME,
            span_len: 0,
        }
    }
}

impl EpochWindow {
    /// Stop the window so no close ever triggers
    pub fn invalidate(&mut self) {
        self.close_time = INVALID_TIME;
    }

    pub fn is_active(&self) -> bool {
        self.close_time != INVALID_TIME
    }

    pub fn due(&self, now: u32) -> bool {
        now >= self.close_time
    }

    /// Re-align the window to the period grid
    ///
    /// Signed 64-bit arithmetic keeps the invalid sentinel and clock
    /// jumps in the recompute branch instead of wrapping.
    pub fn recalculate(&mut self, now: u32, period: u32, offset_setting: i32) {
        let offset =
            (now as i64 + offset_setting as i64).rem_euclid(period as i64);
        let remaining = self.close_time as i64 - now as i64;
        let delta = offset - remaining;
        if remaining > period as i64 {
            // Stopped or jumped: the sample in flight is unusable, take
            // a fixed partial window to the next grid point
            self.close_time = (now as i64 + period as i64 - offset) as u32;
            self.span_len = (period as i64 - offset) as u32;
        } else if delta == 0 {
            if remaining <= 0 {
                // On the grid and the window just closed
                self.close_time = now.wrapping_add(period);
                self.span_len = period;
            }
            // Otherwise mid-window and already aligned
        } else {
            // Drifted off the grid, stretch or shrink this window once
            self.close_time = (now as i64 + period as i64 - offset) as u32;
            self.span_len = (self.span_len as i64 + delta).max(0) as u32;
        }
    }
}
