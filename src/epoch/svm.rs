// src/epoch/svm.rs
//! Per-sample signal vector magnitude and the epoch accumulator
//!
//! Each accelerometer sample is high-pass filtered by subtracting a
//! slow exponential DC tracker per axis, squared, summed and square
//! rooted. The magnitudes integrate into a running epoch sum alongside
//! a sample count so the logger can close a window at any second.

use crate::config::constants::epoch::{EE_LPF_SHIFT, SVM_PED_CLAMP};
use crate::epoch::pedometer::Pedometer;
use crate::hal::types::AccelSample;

/// Integer square root with arithmetic rounding to nearest
///
/// `sqrt_rounded(6) == 2`, `sqrt_rounded(7) == 3`.
pub fn sqrt_rounded(input: u32) -> u32 {
    let mut op = input;
    let mut res = 0u32;
    // Highest power of four at or below the argument
    let mut one = 1u32 << 30;
    while one > op {
        one >>= 2;
    }
    while one != 0 {
        if op >= res + one {
            op -= res + one;
            res += 2 * one;
        }
        res >>= 1;
        one >>= 2;
    }
    if op > res {
        res += 1;
    }
    res
}

/// Energy-expenditure integrator over one logging window
#[derive(Debug, Clone)]
pub struct EpochAccumulator {
    x_dc: i32,
    y_dc: i32,
    z_dc: i32,
    sample_count: u32,
    sum: u64,
}

impl EpochAccumulator {
    /// Seed the DC trackers from the current rest sample so the filter
    /// starts converged instead of ringing through the first window
    pub fn new(current: AccelSample) -> Self {
        Self {
            x_dc: (current.x as i32) << EE_LPF_SHIFT,
            y_dc: (current.y as i32) << EE_LPF_SHIFT,
            z_dc: (current.z as i32) << EE_LPF_SHIFT,
            sample_count: 0,
            sum: 0,
        }
    }

    /// Restart integration without disturbing the DC trackers
    pub fn reset(&mut self) {
        self.sample_count = 0;
        self.sum = 0;
    }

    /// High-pass filter one sample and return its vector magnitude
    pub fn calc_svm(&mut self, data: AccelSample) -> u32 {
        self.x_dc = self.x_dc - (self.x_dc >> EE_LPF_SHIFT) + data.x as i32;
        self.y_dc = self.y_dc - (self.y_dc >> EE_LPF_SHIFT) + data.y as i32;
        self.z_dc = self.z_dc - (self.z_dc >> EE_LPF_SHIFT) + data.z as i32;
        // Squares widen to i64 so a full-range swing against a stale
        // DC estimate cannot overflow
        let x = (data.x as i32 - (self.x_dc >> EE_LPF_SHIFT)) as i64;
        let y = (data.y as i32 - (self.y_dc >> EE_LPF_SHIFT)) as i64;
        let z = (data.z as i32 - (self.z_dc >> EE_LPF_SHIFT)) as i64;
        let temp = (x * x + y * y + z * z).min(u32::MAX as i64) as u32;
        sqrt_rounded(temp)
    }

    /// Integrate one sample and drive the pedometer; returns the new
    /// sample count so the caller can spot an over-full window
    pub fn add(&mut self, data: AccelSample, pedometer: &mut Pedometer) -> u32 {
        let svm = self.calc_svm(data);
        self.sum += svm as u64;
        self.sample_count += 1;
        // Pedometer amplitude is a clamped i16 view of the magnitude
        let amplitude = svm.min(SVM_PED_CLAMP) as i16;
        pedometer.task(amplitude);
        self.sample_count
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn sum(&self) -> u64 {
        self.sum
    }
}
