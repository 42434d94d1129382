// src/protocol/mod.rs
//! Serial command channel
//!
//! Single-letter ASCII commands arrive over the wireless serial
//! service; replies are short text lines. Only the serial-number query
//! and the unlock command work before authentication, everything else
//! answers "!" until the channel is unlocked. Any received traffic
//! cancels an active stream before the command is interpreted.

pub mod hex;

use tracing::{debug, info, warn};

use crate::app::hardware::{hw_mode, HW_CTRL_FORCE_ON};
use crate::app::Band;
use crate::config::constants::battery::BATTERY_LOW_THRESHOLD;
use crate::config::constants::cueing::{
    CUE_INTERVAL_DEFAULT, CUE_INTERVAL_MAX, CUE_INTERVAL_MIN,
};
use crate::config::constants::epoch::{
    EPOCH_LENGTH_DEFAULT, EPOCH_LENGTH_MAX, EPOCH_LENGTH_MIN, EPOCH_NVM_BLOCK_COUNT,
    EPOCH_NVM_BLOCK_SIZE,
};
use crate::config::constants::link::{CONN_INTERVAL_HIGH_SPEED_MS, CONN_INTERVAL_LOW_POWER_MS};
use crate::config::constants::protocol::SERIAL_CMD_LEN;
use crate::config::settings::KEY_LEN;
use crate::config::{AppState, Settings};
use crate::error::BandResult;
use crate::protocol::hex::{read_hex, write_hex};

/// Bytes of one block read segment before hex encoding
const READ_SEGMENT_SIZE: usize = SERIAL_CMD_LEN / 2;

impl Band {
    /// Handle one pending command packet; returns false when no input
    /// was waiting
    pub(crate) fn serial_tasks(&mut self) -> BandResult<bool> {
        let mut buf = [0u8; SERIAL_CMD_LEN];
        let result = self.link.receive(&mut buf);
        if result == 0 {
            return Ok(false);
        }
        // Any traffic stops an active stream first
        if self.status.stream_mode != 0 {
            self.stop_streaming_and_restart_logger()?;
        }
        self.handle_command(&buf[..result])?;
        Ok(true)
    }

    fn handle_command(&mut self, packet: &[u8]) -> BandResult<()> {
        let result = packet.len();
        let mut buf = [0u8; SERIAL_CMD_LEN];
        buf[..result.min(SERIAL_CMD_LEN)].copy_from_slice(&packet[..result.min(SERIAL_CMD_LEN)]);
        // Arguments as text, control characters stripped from the tail
        let arg_text: String = String::from_utf8_lossy(&buf[1..result.min(SERIAL_CMD_LEN)])
            .trim_end_matches(['\r', '\n', '\0'])
            .to_string();
        debug!(command = %(buf[0] as char), "serial command");

        match buf[0].to_ascii_uppercase() {
            b'#' => {
                let reply = format!("#:{}\r\n", self.settings.serial_number);
                self.reply(&reply);
            }
            b'U' => {
                self.status.authenticated =
                    result >= 7 && buf[1..7] == self.settings.security_key;
                if self.status.authenticated {
                    info!("command channel unlocked");
                    self.reply("Authenticated\r\n");
                } else {
                    self.reply("!\r\n");
                }
            }
            b'P' => {
                if !self.status.authenticated || result < 7 {
                    self.reply("!\r\n");
                    return Ok(());
                }
                if !buf[1..7].iter().all(|ch| ch.is_ascii_alphanumeric()) {
                    self.reply("Error?\r\n");
                    return Ok(());
                }
                self.settings.security_key.copy_from_slice(&buf[1..7]);
                self.save_settings()?;
                let key = String::from_utf8_lossy(&self.settings.security_key).to_string();
                self.reply(&format!("P:{key}\r\n"));
            }
            b'E' => self.command_erase(&buf, result)?,
            b'0' | b'O' => {
                if !self.require_auth() {
                    return Ok(());
                }
                self.reply("OFF\r\n");
                self.hw.clear(self.outputs.as_mut());
                self.battery.min_threshold = BATTERY_LOW_THRESHOLD;
            }
            b'1' => {
                if !self.require_auth() {
                    return Ok(());
                }
                self.reply("MOT\r\n");
                self.hw.motor = hw_mode(true, false, 16);
            }
            b'2' => {
                if !self.require_auth() {
                    return Ok(());
                }
                self.reply("LED2\r\n");
                self.hw.led2 = hw_mode(true, false, 8);
            }
            b'3' => {
                if !self.require_auth() {
                    return Ok(());
                }
                self.reply("LED3\r\n");
                self.hw.led3 = hw_mode(true, false, 8);
            }
            b'M' => {
                if !self.require_auth() {
                    return Ok(());
                }
                self.reply("MOT\r\n");
                self.hw.motor = hw_mode(true, true, 8);
            }
            b'B' => {
                if !self.require_auth() {
                    return Ok(());
                }
                let reply = format!("B:{}%\r\n", self.battery.percent());
                self.reply(&reply);
            }
            b'A' => {
                if !self.require_auth() {
                    return Ok(());
                }
                let sample = self.accel.read_sample().unwrap_or_default();
                let reply = format!(
                    "A:{},{},{},{:02X}\r\n",
                    sample.x, sample.y, sample.z, self.last_events.int1_src
                );
                self.reply(&reply);
            }
            b'T' => {
                if !self.require_auth() {
                    return Ok(());
                }
                if result > 1 && buf[1] != b'?' {
                    let mut raw = [0u8; 4];
                    if read_hex(&mut raw, &arg_text) > 0 {
                        let new_time = u32::from_le_bytes(raw);
                        self.clock.set(new_time);
                        // Scheduled activity keys off absolute time
                        self.status.cueing_count = 0;
                        self.status.window.recalculate(
                            new_time,
                            self.settings.epoch_period,
                            self.settings.epoch_offset,
                        );
                    }
                }
                let reply = format!("T:{}\r\n", self.clock.now());
                self.reply(&reply);
            }
            b'H' => {
                if !self.require_auth() {
                    return Ok(());
                }
                if result > 1 && buf[1] != b'?' {
                    let mut raw = [0u8; 4];
                    if read_hex(&mut raw, &arg_text) > 0 {
                        self.settings.epoch_stop = u32::from_le_bytes(raw);
                        self.save_settings()?;
                    }
                }
                let reply = format!("H:{}\r\n", self.settings.epoch_stop);
                self.reply(&reply);
            }
            b'N' => {
                if !self.require_auth() {
                    return Ok(());
                }
                if result > 1 && buf[1] != b'?' {
                    let mut raw = [0u8; 4];
                    if read_hex(&mut raw, &arg_text) > 0 {
                        let mut period = u32::from_le_bytes(raw);
                        if !(EPOCH_LENGTH_MIN..=EPOCH_LENGTH_MAX).contains(&period) {
                            period = EPOCH_LENGTH_DEFAULT;
                        }
                        self.settings.epoch_period = period;
                        // Pause count restarts the logger on the new period
                        self.status.app_counter = 5;
                        self.save_settings()?;
                    }
                }
                let reply = format!("N:{}\r\n", self.settings.epoch_period);
                self.reply(&reply);
            }
            b'L' => {
                if !self.require_auth() {
                    return Ok(());
                }
                self.link.request_conn_interval(CONN_INTERVAL_LOW_POWER_MS);
                self.reply("LP\r\n");
            }
            b'F' => {
                if !self.require_auth() {
                    return Ok(());
                }
                self.link.request_conn_interval(CONN_INTERVAL_HIGH_SPEED_MS);
                self.reply("HP\r\n");
            }
            b'V' => {
                if !self.require_auth() {
                    return Ok(());
                }
                if result > 2 && buf[1] != b'?' {
                    let mut raw = [0u8; 4];
                    if read_hex(&mut raw, &arg_text) > 0 {
                        let mut value = u32::from_le_bytes(raw);
                        if value < CONN_INTERVAL_HIGH_SPEED_MS >> 2
                            || value > CONN_INTERVAL_LOW_POWER_MS << 2
                        {
                            value = CONN_INTERVAL_HIGH_SPEED_MS;
                        }
                        self.link.request_conn_interval(value);
                    }
                }
                let value = self.link.conn_interval().unwrap_or(0);
                let reply = format!("V:{value}ms\r\n");
                self.reply(&reply);
            }
            b'C' => {
                if !self.require_auth() {
                    return Ok(());
                }
                if !(result > 1 && buf[1] == b'?') {
                    if result > 1 {
                        let mut raw = [0u8; 2];
                        if read_hex(&mut raw, &arg_text) > 0 {
                            self.settings.cueing_period = u32::from(u16::from_le_bytes(raw));
                        }
                        if !(CUE_INTERVAL_MIN..=CUE_INTERVAL_MAX)
                            .contains(&self.settings.cueing_period)
                        {
                            self.settings.cueing_period = CUE_INTERVAL_DEFAULT;
                        }
                        self.save_settings()?;
                        self.status.cueing_count = 0;
                    }
                    // Toggle cueing on for the next hour, or off
                    if self.status.cueing_count == 0 {
                        self.status.cueing_count = 3600 / self.settings.cueing_period;
                    } else {
                        self.status.cueing_count = 0;
                    }
                }
                if self.status.cueing_count > 0 {
                    self.status.cueing_next_time = self.clock.now() + self.settings.cueing_period;
                }
                let reply = format!(
                    "Q:{}\r\nC:{}\r\n",
                    self.settings.cueing_period, self.status.cueing_count
                );
                self.reply(&reply);
            }
            b'Y' => {
                if !self.require_auth() {
                    return Ok(());
                }
                // Battery drain test: constant LEDs, endless cues
                self.hw.led2 = if self.hw.led2 != HW_CTRL_FORCE_ON { HW_CTRL_FORCE_ON } else { 0 };
                self.hw.led3 = if self.hw.led3 != HW_CTRL_FORCE_ON { HW_CTRL_FORCE_ON } else { 0 };
                self.battery.min_threshold = 0;
                self.settings.cueing_period = 5;
                self.status.cueing_count = u32::MAX;
                self.status.cueing_next_time = self.clock.now() + self.settings.cueing_period;
                self.reply("Drain\r\n");
            }
            b'W' => {
                if !self.require_auth() {
                    return Ok(());
                }
                if result > 1 && buf[1] != b'?' {
                    // Partial hex input only overwrites the low bytes
                    let mut raw = self.store.active_index().to_le_bytes();
                    if read_hex(&mut raw, &arg_text) > 0 {
                        self.status.epoch_read_index = u16::from_le_bytes(raw);
                    } else {
                        self.status.epoch_read_index =
                            crate::config::constants::epoch::EPOCH_BLOCK_INDEX_INVALID;
                    }
                }
                self.reply_query();
            }
            b'Q' => {
                if !self.require_auth() {
                    return Ok(());
                }
                self.reply_query();
            }
            b'S' => {
                if !self.require_auth() {
                    return Ok(());
                }
                if result > 1 && buf[1] != b'?' {
                    let mut raw = [0u8; 4];
                    if read_hex(&mut raw, &arg_text) > 0 {
                        let offset = i32::from_le_bytes(raw);
                        if offset != 0 {
                            self.settings.epoch_offset = offset;
                            self.save_settings()?;
                            let now = self.clock.now();
                            self.status.window.recalculate(
                                now,
                                self.settings.epoch_period,
                                self.settings.epoch_offset,
                            );
                        }
                    }
                }
                let reply = format!("S:{}\r\n", self.settings.epoch_offset);
                self.reply(&reply);
            }
            b'R' => {
                if !self.require_auth() {
                    return Ok(());
                }
                self.command_read_block()?;
            }
            b'I' | b'D' => {
                if !self.require_auth() {
                    return Ok(());
                }
                if buf[0].to_ascii_uppercase() == b'I' {
                    self.status.stream_mode = 1;
                    if result > 1 && buf[1] == b' ' {
                        // "I rate range" selects a custom sensor setup
                        let mut fields = arg_text.trim_start().split_whitespace();
                        if let Some(rate) = fields.next().and_then(|f| f.parse::<u16>().ok()) {
                            self.status.accel_rate = rate;
                        }
                        if let Some(range) = fields.next().and_then(|f| f.parse::<u8>().ok()) {
                            self.status.accel_range = range;
                        }
                        self.status.stream_mode = 3;
                    }
                    self.stop_logging_start_stream()?;
                } else {
                    self.status.stream_mode = 2;
                }
                let reply = format!(
                    "OP:{:02X}, {}, {}\r\n",
                    self.status.stream_mode, self.status.accel_rate, self.status.accel_range
                );
                self.reply(&reply);
            }
            b'?' => {
                if !self.require_auth() {
                    return Ok(());
                }
                let settings_dump = self.settings.to_bytes();
                self.dump_hex(&settings_dump);
                let status_dump = self.status_dump_bytes();
                self.dump_hex(&status_dump);
            }
            b'G' => {
                if !self.require_auth() {
                    return Ok(());
                }
                if result > 2 && buf[1] != b'?' {
                    let mut raw = [0u8; 4];
                    if read_hex(&mut raw, arg_text.get(1..).unwrap_or("")) > 0 {
                        let value = u32::from_le_bytes(raw);
                        match buf[1].to_ascii_uppercase() {
                            b'O' => self.settings.goal_time_offset = value,
                            b'P' => self.settings.goal_period = value,
                            b'G' => self.settings.goal_step_count = value,
                            _ => {}
                        }
                        self.status.goal_complete =
                            self.pedometer.total() >= self.settings.goal_step_count;
                    }
                }
                let reply = format!(
                    "O:{}\r\nP:{}\r\nG:{}\r\n",
                    self.settings.goal_time_offset,
                    self.settings.goal_period,
                    self.settings.goal_step_count
                );
                self.reply(&reply);
            }
            b'X' => {
                if !self.require_auth() {
                    return Ok(());
                }
                if buf[1] == b'!' {
                    // Immediate shutdown; the exit state turns the radio
                    // off once flash traffic drains
                    self.reply("Reset\r\n");
                    self.status.app_state = AppState::Exit;
                    self.status.app_counter = 0;
                    warn!("hard reset requested");
                } else if buf[1].to_ascii_lowercase() == b'b' {
                    // Firmware update entry after the countdown
                    self.status.app_state = AppState::Exit;
                    self.status.app_counter = 5;
                    self.reply("DFU\r\n");
                } else if result > 2 {
                    let mut raw = [0u8; 4];
                    if read_hex(&mut raw, &arg_text) > 0 {
                        let value = i32::from_le_bytes(raw);
                        // The logger pauses in ready state until this expires
                        self.status.app_counter = value;
                        let reply = format!("X:{value}\r\n");
                        self.reply(&reply);
                    } else {
                        self.reply("X?\r\n");
                    }
                } else {
                    self.reply("?\r\n");
                }
            }
            _ => self.reply("?\r\n"),
        }
        Ok(())
    }

    /// Erase commands: data wipe, factory reset, counter query, and the
    /// master-key unlock path
    fn command_erase(&mut self, buf: &[u8; SERIAL_CMD_LEN], result: usize) -> BandResult<()> {
        let mut arg = buf[1];
        if !self.status.authenticated {
            // The master key authorizes a full wipe directly
            if result >= 7 && buf[1..1 + KEY_LEN] == self.settings.master_key {
                self.status.authenticated = true;
                arg = b'!';
            } else {
                self.reply("!\r\n");
                return Ok(());
            }
        }
        if arg == b'?' {
            let reply = format!(
                "B:{}\r\nR:{}\r\nE:{}\r\n",
                self.settings.cycles_battery, self.settings.cycles_reset,
                self.settings.cycles_erase
            );
            self.reply(&reply);
            return Ok(());
        }
        // Any erase reverts the password and counts the wipe
        self.settings.security_key = self.settings.master_key;
        self.settings.cycles_erase += 1;
        if arg == b'!' {
            // Factory reset regenerates settings; the lifetime counters
            // survive so wear history is never lost
            let (battery, resets, erases) = (
                self.settings.cycles_battery,
                self.settings.cycles_reset,
                self.settings.cycles_erase,
            );
            self.settings = Settings::defaults(self.settings.address);
            self.settings.cycles_battery = battery;
            self.settings.cycles_reset = resets;
            self.settings.cycles_erase = erases;
            self.save_settings()?;
            self.reply("Erase all\r\n");
            info!("factory reset");
        } else {
            self.save_settings()?;
            self.reply("Erase data\r\n");
            info!("data erase");
        }
        let was_logging = self.status.app_state == AppState::Logging;
        if was_logging {
            self.logger_stop()?;
        }
        self.store.clear_all()?;
        if was_logging {
            self.status.app_state = AppState::Ready;
            self.status.app_counter = 5;
        }
        Ok(())
    }

    /// Logger status lines shared by the Q and W commands
    fn reply_query(&mut self) {
        let info = self.store.active_info();
        let reply = format!(
            "T:{}\r\nB:{}\r\nN:{}\r\n",
            self.clock.now(),
            info.block_number,
            info.data_length
        );
        self.reply(&reply);
        let reply = format!(
            "E:{}\r\nC:{}\r\nI:{}\r\n",
            info.time_stamp,
            self.store.block_count(),
            self.status.epoch_read_index
        );
        self.reply(&reply);
    }

    /// Stream the indexed block as ASCII hex and advance the cursor
    fn command_read_block(&mut self) -> BandResult<()> {
        // The whole encoded block must fit or nothing is sent
        if self.link.free_space() < 2 + 2 * EPOCH_NVM_BLOCK_SIZE {
            return Ok(());
        }
        if self.status.epoch_read_index >= EPOCH_NVM_BLOCK_COUNT {
            // Default to the most recently completed block
            self.status.epoch_read_index = self.store.active_index();
            if self.status.epoch_read_index != 0 {
                self.status.epoch_read_index -= 1;
            }
        }
        let mut offset = 0usize;
        let mut segment = [0u8; READ_SEGMENT_SIZE];
        while offset < EPOCH_NVM_BLOCK_SIZE {
            if self
                .store
                .read_block(&mut segment, offset, self.status.epoch_read_index)
                .is_err()
            {
                break;
            }
            let text = write_hex(&segment, false);
            if self.link.send(text.as_bytes()) != text.len() {
                break;
            }
            offset += READ_SEGMENT_SIZE;
        }
        if offset < EPOCH_NVM_BLOCK_SIZE {
            warn!(
                index = self.status.epoch_read_index,
                "block read reply truncated"
            );
        }
        self.status.epoch_read_index += 1;
        if self.status.epoch_read_index >= self.store.block_count() {
            self.status.epoch_read_index = 0;
        }
        self.reply("\r\n");
        Ok(())
    }

    /// Snapshot of the volatile status for the state dump
    fn status_dump_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32);
        out.extend_from_slice(&self.status.window.close_time.to_le_bytes());
        out.extend_from_slice(&self.status.window.span_len.to_le_bytes());
        out.extend_from_slice(&self.status.epoch_read_index.to_le_bytes());
        out.extend_from_slice(&self.status.cueing_next_time.to_le_bytes());
        out.extend_from_slice(&self.status.cueing_count.to_le_bytes());
        out.extend_from_slice(&self.status.app_counter.to_le_bytes());
        out.push(self.status.app_state as u8);
        out.push(self.status.goal_complete as u8);
        out.push(self.status.authenticated as u8);
        out.push(self.status.stream_mode);
        out.extend_from_slice(&self.status.accel_rate.to_le_bytes());
        out.push(self.status.accel_range);
        out
    }

    /// Hex dump a record in short segments with a terminator
    fn dump_hex(&mut self, source: &[u8]) {
        if self.link.free_space() < 2 + 2 * source.len() {
            return;
        }
        for segment in source.chunks(SERIAL_CMD_LEN / 2) {
            let text = write_hex(segment, false);
            if self.link.send(text.as_bytes()) != text.len() {
                break;
            }
        }
        self.link.send(b"\r\n");
    }

    fn require_auth(&mut self) -> bool {
        if !self.status.authenticated {
            self.reply("!\r\n");
            return false;
        }
        true
    }

    fn reply(&mut self, text: &str) {
        let sent = self.link.send(text.as_bytes());
        if sent != text.len() {
            warn!(wanted = text.len(), sent, "serial reply truncated");
        }
    }
}
