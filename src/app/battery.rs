// src/app/battery.rs
//! Battery gauge and temperature conversions
//!
//! Raw ADC readings map through a discharge-curve table to percent,
//! then a one-percent-per-sample slew removes transients. A consecutive
//! below-threshold counter debounces the low-battery state change.

use crate::config::constants::battery::{
    ADC_REFERENCE_VOLTAGE_MV, ADC_SCALING_FACTOR, BATTERY_LOW_THRESHOLD,
};

/// Table covers raw readings 471..=590 inclusive
const BATT_TABLE_OFFSET: u16 = 471;
const BATT_TABLE_MAX: u16 = 590;

/// Capacity curve for the cell behind a 50 % divider at 1.2 V reference
#[rustfmt::skip]
const BATT_CAPACITY: [u8; 120] = [
     2,  3,  3,  3,  3,  3,  3,  3,  3,  3,  3,  3,  3,  3,  3,  3,
     3,  4,  4,  4,  4,  4,  4,  4,  4,  4,  4,  4,  5,  5,  5,  5,
     5,  5,  5,  5,  6,  6,  6,  6,  6,  6,  7,  7,  7,  7,  8,  8,
    10, 12, 13, 14, 16, 17, 18, 20, 22, 24, 27, 30, 33, 37, 40, 43,
    45, 48, 50, 52, 54, 56, 57, 59, 60, 62, 63, 64, 65, 66, 68, 69,
    70, 71, 72, 73, 74, 75, 76, 77, 78, 79, 80, 81, 82, 83, 84, 85,
    86, 87, 87, 88, 89, 90, 90, 91, 92, 93, 94, 94, 95, 96, 96, 97,
    97, 98, 98, 98, 99, 99, 99, 99,
];

/// Direct table lookup without smoothing
pub fn raw_to_percent(sample: u16) -> u8 {
    if sample > BATT_TABLE_MAX {
        100
    } else if sample < BATT_TABLE_OFFSET {
        0
    } else {
        BATT_CAPACITY[(sample - BATT_TABLE_OFFSET) as usize]
    }
}

/// Convert a raw 10-bit reading to millivolts at the input
pub fn adc_to_millivolt(adc_val: u16) -> u16 {
    ((adc_val as u32 * ADC_REFERENCE_VOLTAGE_MV * ADC_SCALING_FACTOR) >> 10) as u16
}

/// Die temperature units are 0.25 degC steps
pub fn temp_celsius(temp_raw: i16) -> i8 {
    (temp_raw >> 2) as i8
}

/// Fixed-point rendering, quarter-degree resolution
pub fn temp_string(temp_raw: i16) -> String {
    let negative = temp_raw < 0;
    let magnitude = if negative { -temp_raw } else { temp_raw };
    let whole = magnitude >> 2;
    let frac = match magnitude & 0x3 {
        0 => "00",
        1 => "25",
        2 => "50",
        _ => "75",
    };
    if negative {
        format!("-{whole}.{frac}")
    } else {
        format!("{whole}.{frac}")
    }
}

/// Smoothed gauge with the low-battery debounce counter
#[derive(Debug, Clone)]
pub struct BatteryMonitor {
    percent: u8,
    low_count: u8,
    /// Threshold percent the debounce counter compares against;
    /// raised after a low-battery trip to give restart hysteresis
    pub min_threshold: u8,
}

impl Default for BatteryMonitor {
    fn default() -> Self {
        Self {
            percent: 0,
            low_count: 0,
            min_threshold: BATTERY_LOW_THRESHOLD,
        }
    }
}

impl BatteryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one raw reading and return the smoothed percent
    pub fn sample(&mut self, raw: u16) -> u8 {
        let calculated = raw_to_percent(raw);
        if self.percent == 0 {
            // First sample, accept directly
            self.percent = calculated;
        } else if calculated > self.percent {
            self.percent += 1;
        } else if calculated < self.percent {
            self.percent -= 1;
        }
        if calculated < self.min_threshold {
            self.low_count = self.low_count.saturating_add(1);
        } else {
            self.low_count = 0;
        }
        self.percent
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Consecutive samples measured below the threshold
    pub fn low_count(&self) -> u8 {
        self.low_count
    }

    /// Battery healthy: above threshold with no pending low streak
    pub fn healthy(&self) -> bool {
        self.percent > self.min_threshold && self.low_count == 0
    }
}
