// src/config/settings.rs
//! Persisted device settings record
//!
//! One fixed-layout binary record lives in its own NVM page. At boot the
//! stored device address is compared with the hardware address; a
//! mismatch means erased or foreign flash and the record is regenerated
//! from defaults. Every mutating command saves the record back, with the
//! write completing asynchronously.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::constants::cueing::CUE_INTERVAL_DEFAULT;
use crate::config::constants::epoch::EPOCH_LENGTH_DEFAULT;
use crate::error::{BandResult, Fault, FaultCode};
use crate::hal::traits::BlockStorage;
use crate::hal::types::StorageEvent;

/// Length of a key, characters
pub const KEY_LEN: usize = 6;
/// Serialized record length, bytes
pub const SETTINGS_RECORD_SIZE: usize = 73;

/// Device settings, persisted as one NVM record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Hardware device address, used to detect foreign flash
    pub address: [u8; 6],
    /// Twelve hex characters derived from the address
    pub serial_number: String,
    /// Factory password, last six serial characters
    pub master_key: [u8; KEY_LEN],
    /// User password, equals the master key until changed
    pub security_key: [u8; KEY_LEN],
    /// Signed adjustment applied to the window grid, seconds
    pub epoch_offset: i32,
    /// Logging window length, seconds
    pub epoch_period: u32,
    /// Absolute stop time for the logger, u32::MAX for never
    pub epoch_stop: u32,
    /// Offset applied to the goal schedule, seconds
    pub goal_time_offset: u32,
    /// Period on which the goal progress resets, seconds
    pub goal_period: u32,
    /// Step target, u32::MAX disables the goal
    pub goal_step_count: u32,
    /// Vibration cue spacing, seconds
    pub cueing_period: u32,
    /// Lifetime battery discharge cycles
    pub cycles_battery: u32,
    /// Lifetime resets
    pub cycles_reset: u32,
    /// Lifetime completed erase operations
    pub cycles_erase: u32,
}

impl Settings {
    /// Regenerate everything from the hardware address
    pub fn defaults(device_address: [u8; 6]) -> Self {
        // Top address bits forced for address compliance, printed
        // high byte first
        let serial_number = format!(
            "{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            device_address[5] | 0xC0,
            device_address[4],
            device_address[3],
            device_address[2],
            device_address[1],
            device_address[0]
        );
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&serial_number.as_bytes()[6..12]);
        Self {
            address: device_address,
            serial_number,
            master_key: key,
            security_key: key,
            epoch_offset: 0,
            epoch_period: EPOCH_LENGTH_DEFAULT,
            epoch_stop: u32::MAX,
            goal_time_offset: 0,
            goal_period: 24 * 60 * 60,
            goal_step_count: u32::MAX,
            cueing_period: CUE_INTERVAL_DEFAULT,
            cycles_battery: 0,
            cycles_reset: 0,
            cycles_erase: 0,
        }
    }

    /// No password set while the user key still equals the factory key
    pub fn key_is_default(&self) -> bool {
        self.security_key == self.master_key
    }

    pub fn to_bytes(&self) -> [u8; SETTINGS_RECORD_SIZE] {
        let mut out = [0u8; SETTINGS_RECORD_SIZE];
        out[0..6].copy_from_slice(&self.address);
        let serial = self.serial_number.as_bytes();
        let serial_len = serial.len().min(12);
        out[6..6 + serial_len].copy_from_slice(&serial[..serial_len]);
        out[19..25].copy_from_slice(&self.master_key);
        out[26..32].copy_from_slice(&self.security_key);
        out[33..37].copy_from_slice(&self.epoch_offset.to_le_bytes());
        out[37..41].copy_from_slice(&self.epoch_period.to_le_bytes());
        out[41..45].copy_from_slice(&self.epoch_stop.to_le_bytes());
        out[45..49].copy_from_slice(&self.goal_time_offset.to_le_bytes());
        out[49..53].copy_from_slice(&self.goal_period.to_le_bytes());
        out[53..57].copy_from_slice(&self.goal_step_count.to_le_bytes());
        out[57..61].copy_from_slice(&self.cueing_period.to_le_bytes());
        out[61..65].copy_from_slice(&self.cycles_battery.to_le_bytes());
        out[65..69].copy_from_slice(&self.cycles_reset.to_le_bytes());
        out[69..73].copy_from_slice(&self.cycles_erase.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; SETTINGS_RECORD_SIZE]) -> Self {
        let mut address = [0u8; 6];
        address.copy_from_slice(&bytes[0..6]);
        let serial_raw = &bytes[6..18];
        let serial_number = String::from_utf8_lossy(serial_raw)
            .trim_end_matches('\0')
            .to_string();
        let mut master_key = [0u8; KEY_LEN];
        master_key.copy_from_slice(&bytes[19..25]);
        let mut security_key = [0u8; KEY_LEN];
        security_key.copy_from_slice(&bytes[26..32]);
        let le32 = |start: usize| {
            u32::from_le_bytes([bytes[start], bytes[start + 1], bytes[start + 2], bytes[start + 3]])
        };
        Self {
            address,
            serial_number,
            master_key,
            security_key,
            epoch_offset: le32(33) as i32,
            epoch_period: le32(37),
            epoch_stop: le32(41),
            goal_time_offset: le32(45),
            goal_period: le32(49),
            goal_step_count: le32(53),
            cueing_period: le32(57),
            cycles_battery: le32(61),
            cycles_reset: le32(65),
            cycles_erase: le32(69),
        }
    }
}

/// NVM page holding the settings record, written asynchronously
pub struct SettingsStore {
    storage: Box<dyn BlockStorage>,
}

impl SettingsStore {
    pub fn new(storage: Box<dyn BlockStorage>) -> Self {
        Self { storage }
    }

    /// Load the stored record, regenerating defaults when the stored
    /// address does not match the hardware. Returns the settings and
    /// whether defaults were restored.
    pub fn load(&mut self, device_address: [u8; 6]) -> BandResult<(Settings, bool)> {
        let mut raw = [0u8; SETTINGS_RECORD_SIZE];
        self.storage.read(0, 0, &mut raw).map_err(|err| {
            Fault::new(FaultCode::StorageRead, format!("settings record read: {err}"))
        })?;
        let stored = Settings::from_bytes(&raw);
        if stored.address != device_address {
            // Newly programmed or foreign flash
            warn!("stored address mismatch, restoring default settings");
            let defaults = Settings::defaults(device_address);
            self.save(&defaults)?;
            return Ok((defaults, true));
        }
        info!(serial = %stored.serial_number, "settings loaded");
        Ok((stored, false))
    }

    /// Queue the record for its NVM page
    pub fn save(&mut self, settings: &Settings) -> BandResult<()> {
        let record = settings.to_bytes();
        let mut page = vec![0u8; self.storage.slot_size()];
        page[..SETTINGS_RECORD_SIZE].copy_from_slice(&record);
        self.storage.write(0, &page).map_err(|err| {
            Fault::new(FaultCode::SettingsSave, format!("settings write request: {err}"))
        })
    }

    /// Drain one completion event; a failed write is fatal
    pub fn service(&mut self) -> BandResult<()> {
        match self.storage.poll() {
            Some(StorageEvent::WriteDone { ok: false }) => Err(Fault::new(
                FaultCode::SettingsSave,
                "settings record write failed",
            )),
            _ => Ok(()),
        }
    }
}
