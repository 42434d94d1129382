// src/config/mod.rs
//! Device constants, the persisted settings record and volatile status

pub mod constants;
pub mod settings;
pub mod status;

pub use settings::{Settings, SettingsStore, KEY_LEN, SETTINGS_RECORD_SIZE};
pub use status::{AppState, Status};

use serde::{Deserialize, Serialize};

use crate::hal::sim::SimAccelConfig;

/// Host-run simulation profile, loadable from a TOML file
///
/// Describes the simulated environment a firmware instance boots into:
/// the motion fed to the sensor, starting battery and temperature raw
/// readings and the wall clock at power-on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimProfile {
    pub accel: SimAccelConfig,
    /// Raw battery reading; 590 is full, 471 is empty
    pub battery_raw: u16,
    pub temperature_raw: i16,
    /// Seconds since the device epoch at boot
    pub start_time: u32,
}

impl Default for SimProfile {
    fn default() -> Self {
        Self {
            accel: SimAccelConfig::default(),
            battery_raw: 585,
            temperature_raw: 84,
            start_time: 0,
        }
    }
}

impl SimProfile {
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
