// src/app/hardware.rs
//! Timed LED and motor control
//!
//! Each output channel packs its setting into one byte: bit 0 on, bit 1
//! pulse, bits 2..=7 a downcount in control-task ticks. The control task
//! runs at 8 Hz, decrementing the count and deriving the pin level, so a
//! channel set once flashes or buzzes for its programmed duration and
//! then turns itself off.

use crate::hal::traits::Outputs;

/// Channel value meaning "on until explicitly cleared"
pub const HW_CTRL_FORCE_ON: u8 = 0xFF;

/// Pack an output setting: on flag, pulse flag, duration in ticks
pub const fn hw_mode(on: bool, pulse: bool, ticks: u8) -> u8 {
    (on as u8) | ((pulse as u8) << 1) | (ticks << 2)
}

/// Pending output channel settings, decoded each control tick
#[derive(Debug, Clone, Copy, Default)]
pub struct HwControl {
    pub led2: u8,
    pub led3: u8,
    pub motor: u8,
}

impl HwControl {
    /// Turn every channel off immediately
    pub fn clear(&mut self, outputs: &mut dyn Outputs) {
        self.led2 = 0;
        self.led3 = 0;
        self.motor = 0;
        outputs.led2(false);
        outputs.led3(false);
        outputs.motor(false);
    }

    /// One 8 Hz pass: decrement counts and drive the pins
    pub fn tick(&mut self, phase: u8, outputs: &mut dyn Outputs) {
        let led2 = Self::step_channel(&mut self.led2, phase);
        outputs.led2(led2);
        let led3 = Self::step_channel(&mut self.led3, phase);
        outputs.led3(led3);
        // Motor has no force-on mode
        let motor = if self.motor < 0x04 {
            self.motor = 0;
            false
        } else {
            self.motor -= 4;
            Self::decode(self.motor, phase)
        };
        outputs.motor(motor);
    }

    fn step_channel(ctrl: &mut u8, phase: u8) -> bool {
        if *ctrl < 0x04 {
            *ctrl = 0;
            false
        } else if *ctrl == HW_CTRL_FORCE_ON {
            true
        } else {
            *ctrl -= 4;
            Self::decode(*ctrl, phase)
        }
    }

    /// Pulse channels alternate with the phase counter; steady channels
    /// just follow their on bit
    fn decode(ctrl: u8, phase: u8) -> bool {
        let state = ((ctrl >> 1) & phase) ^ ctrl;
        state & 0x01 != 0
    }
}
