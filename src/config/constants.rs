// src/config/constants.rs
//! System-wide firmware constants

/// Epoch logging constants
pub mod epoch {
    /// Default epoch window length, seconds
    pub const EPOCH_LENGTH_DEFAULT: u32 = 60;
    /// Shortest configurable epoch window, seconds
    pub const EPOCH_LENGTH_MIN: u32 = 15;
    /// Longest configurable epoch window, seconds (2 hours)
    pub const EPOCH_LENGTH_MAX: u32 = 7200;

    /// Flash region reserved for epoch data, bytes
    pub const EPOCH_NVM_SIZE_TOTAL: usize = 64 * 1024;
    /// Size of one epoch data block
    pub const EPOCH_NVM_BLOCK_SIZE: usize = 512;
    /// Number of block slots in the flash region
    pub const EPOCH_NVM_BLOCK_COUNT: u16 = (EPOCH_NVM_SIZE_TOTAL / EPOCH_NVM_BLOCK_SIZE) as u16;

    /// Block header: sequence number, entry count, first-entry timestamp
    pub const EPOCH_BLOCK_INFO_SIZE: usize = 8;
    /// Format tag + period + reserved metadata between header and samples
    pub const EPOCH_BLOCK_META_SIZE: usize = 22;
    /// Trailing 16-bit checksum
    pub const EPOCH_BLOCK_CHECK_SIZE: usize = 2;
    /// One packed epoch sample
    pub const EPOCH_SAMPLE_SIZE: usize = 8;
    /// Samples held by a full block
    pub const EPOCH_BLOCK_DATA_COUNT: usize = (EPOCH_NVM_BLOCK_SIZE
        - EPOCH_BLOCK_INFO_SIZE
        - EPOCH_BLOCK_META_SIZE
        - EPOCH_BLOCK_CHECK_SIZE)
        / EPOCH_SAMPLE_SIZE;

    /// Highest valid block sequence number; numbering wraps to 0 past this
    pub const EPOCH_BLOCK_NUMBER_LAST: u16 = 0xFFFE;
    /// Marker for an unset/invalid slot index
    pub const EPOCH_BLOCK_INDEX_INVALID: u16 = 0xFFFF;

    /// Original single-purpose data format
    pub const BLOCK_FORMAT_EPOCH_DATA: u16 = 0;
    /// Adds the epoch period to the block metadata
    pub const BLOCK_FORMAT_EPOCH_DATA_V2: u16 = 1;

    /// Sentinel close time meaning "logger not running"
    pub const INVALID_TIME: u32 = u32::MAX;

    /// DC tracker averages 2^6 = 64 samples
    pub const EE_LPF_SHIFT: u32 = 6;
    /// SVM values above this are clamped before pedometer tracking
    pub const SVM_PED_CLAMP: u32 = 0x7FFF;
}

/// Pedometer step-detection constants (scaled for 8 g range at 50 Hz)
pub mod pedometer {
    use super::accel::ACCEL_DEFAULT_RATE;

    /// Counts per 1 g at the default 8 g range
    pub const PED_ONE_G_VALUE: i16 = 4096;
    /// Minimum peak-to-peak amplitude treated as activity, 0.25 g
    pub const PED_MIN_ACTIVITY_LEVEL: i16 = PED_ONE_G_VALUE / 4;
    /// Step debounce, 300 ms in samples
    pub const PED_MIN_STEP_INTERVAL: u16 = (3 * ACCEL_DEFAULT_RATE as u32 / 10) as u16;
    /// Longest believable inter-step gap, 2 s in samples
    pub const PED_MAX_STEP_INTERVAL: u16 = (2 * ACCEL_DEFAULT_RATE as u32) as u16;
}

/// Accelerometer defaults
pub mod accel {
    /// Default full-scale range, g
    pub const ACCEL_DEFAULT_RANGE: u8 = 8;
    /// Default output data rate, Hz
    pub const ACCEL_DEFAULT_RATE: u16 = 50;
    /// FIFO depth that raises the watermark interrupt
    pub const ACCEL_FIFO_WATERMARK: usize = 25;
}

/// Battery management thresholds, percent
pub mod battery {
    /// Stop the logger once depleted to this level
    pub const BATTERY_LOW_THRESHOLD: u8 = 5;
    /// Restart only after recharging past this level
    pub const BATTERY_LOW_THRESHOLD_START: u8 = 10;
    /// Consecutive below-threshold samples before the state change
    pub const LOW_BATT_THRESHOLD_COUNT: u8 = 5;
    /// Low-battery indicator flash interval, seconds
    pub const LOW_BATT_FLASH_INTERVAL: i32 = 10;
    /// Ready-state wait flash interval, seconds
    pub const LOG_WAIT_FLASH_INTERVAL: i32 = 10;

    /// ADC reference, millivolts
    pub const ADC_REFERENCE_VOLTAGE_MV: u32 = 1200;
    /// Input divider compensation
    pub const ADC_SCALING_FACTOR: u32 = 3;
}

/// Vibration cue reminder settings, seconds
pub mod cueing {
    pub const CUE_INTERVAL_DEFAULT: u32 = 60;
    pub const CUE_INTERVAL_MIN: u32 = 5;
    pub const CUE_INTERVAL_MAX: u32 = 300;
}

/// Wireless link connection interval presets, milliseconds
pub mod link {
    pub const CONN_INTERVAL_LOW_POWER_MS: u32 = 500;
    pub const CONN_INTERVAL_HIGH_SPEED_MS: u32 = 40;
}

/// Serial command channel settings
pub mod protocol {
    /// Maximum receive/transmit working buffer length
    pub const SERIAL_CMD_LEN: usize = 64;
    /// Outgoing text queue capacity, bytes
    pub const SERIAL_OUT_QUEUE_LEN: usize = 1200;
    /// Incoming command queue capacity, bytes
    pub const SERIAL_IN_QUEUE_LEN: usize = 64;
}

/// Scheduler and timing settings
pub mod scheduler {
    /// Bounded event queue depth
    pub const SCHED_QUEUE_SIZE: usize = 20;
    /// Hardware control task rate, Hz (power of two)
    pub const HARDWARE_TASK_RATE: u8 = 8;
    /// Seconds the logger waits before (re)starting
    pub const APP_START_DELAY_SECS: i32 = 5;
}
