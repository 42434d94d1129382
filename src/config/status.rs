// src/config/status.rs
//! Volatile device status, reset on every boot

use crate::config::constants::accel::{ACCEL_DEFAULT_RANGE, ACCEL_DEFAULT_RATE};
use crate::config::constants::epoch::{EPOCH_BLOCK_INDEX_INVALID, EPOCH_LENGTH_DEFAULT};
use crate::epoch::window::EpochWindow;

/// Top-level application mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Shutting down after the exit countdown
    Exit,
    /// Battery too depleted to log
    LowBattery,
    /// Waiting to start logging
    Ready,
    /// Logger running
    Logging,
}

/// Live device state, never persisted
#[derive(Debug, Clone)]
pub struct Status {
    /// Current logging window boundary and true span
    pub window: EpochWindow,
    /// Block index the retrieval cursor reads next
    pub epoch_read_index: u16,
    /// Next scheduled vibration cue time
    pub cueing_next_time: u32,
    /// Remaining vibration cues
    pub cueing_count: u32,
    /// Countdown used by timed state transitions, seconds
    pub app_counter: i32,
    pub app_state: AppState,
    pub goal_complete: bool,
    /// Command channel unlocked
    pub authenticated: bool,
    /// 0 off, 1 raw stream, 2 debug text, 3 custom rate/range stream
    pub stream_mode: u8,
    /// Sensor overrides applied at the next logger start
    pub accel_rate: u16,
    pub accel_range: u8,
}

impl Default for Status {
    fn default() -> Self {
        let mut window = EpochWindow::default();
        window.span_len = EPOCH_LENGTH_DEFAULT;
        Self {
            window,
            epoch_read_index: EPOCH_BLOCK_INDEX_INVALID,
            cueing_next_time: 0,
            cueing_count: 0,
            app_counter: 0,
            app_state: AppState::Ready,
            goal_complete: false,
            authenticated: false,
            stream_mode: 0,
            accel_rate: ACCEL_DEFAULT_RATE,
            accel_range: ACCEL_DEFAULT_RANGE,
        }
    }
}
