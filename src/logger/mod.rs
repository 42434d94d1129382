// src/logger/mod.rs
//! Epoch logger tasks: sensor lifecycle, window close handling and the
//! FIFO/motion event handlers, including the live streaming modes

use tracing::{debug, info, warn};

use crate::app::battery::{adc_to_millivolt, temp_string};
use crate::app::hardware::hw_mode;
use crate::app::Band;
use crate::config::constants::accel::{
    ACCEL_DEFAULT_RANGE, ACCEL_DEFAULT_RATE, ACCEL_FIFO_WATERMARK,
};
use crate::config::constants::epoch::INVALID_TIME;
use crate::config::constants::pedometer::PED_ONE_G_VALUE;
use crate::config::AppState;
use crate::epoch::{EpochAccumulator, EpochSample, Pedometer};
use crate::error::{BandResult, Fault, FaultCode};
use crate::protocol::hex::write_hex;

/// Bytes of outgoing queue one raw stream burst needs: hex header
/// (time, battery, temperature), hex samples, terminator
const STREAM_BURST_LEN: usize = 8 + 4 + 4 + 2 * (6 * ACCEL_FIFO_WATERMARK) + 2;
/// Samples hex-encoded per queue push
const STREAM_SEGMENT_SAMPLES: usize = 5;

impl Band {
    /// Start the sensor and open the first logging window
    pub(crate) fn logger_start(&mut self) -> BandResult<()> {
        self.store.reset_active_length();
        if !self.accel.present() {
            self.accumulator = EpochAccumulator::new(Default::default());
            return Err(Fault::new(
                FaultCode::SensorMissing,
                "accelerometer absent at logger start",
            ));
        }
        let now = self.clock.now();
        self.status.window.recalculate(
            now,
            self.settings.epoch_period,
            self.settings.epoch_offset,
        );
        self.accel
            .configure(self.status.accel_rate, self.status.accel_range)
            .map_err(|err| Fault::new(FaultCode::SensorMissing, format!("configure: {err}")))?;
        self.accel
            .start()
            .map_err(|err| Fault::new(FaultCode::SensorMissing, format!("start: {err}")))?;
        // Seed the DC trackers from a live reading
        let current = self
            .accel
            .read_sample()
            .map_err(|err| Fault::new(FaultCode::SensorMissing, format!("read: {err}")))?;
        self.accumulator = EpochAccumulator::new(current);
        // Clear pending event sources before enabling the pins
        self.last_events = self
            .accel
            .read_events()
            .map_err(|err| Fault::new(FaultCode::SensorMissing, format!("events: {err}")))?;
        self.accel.set_interrupts(true);
        self.pedometer = Pedometer::new(PED_ONE_G_VALUE);
        debug!(
            close = self.status.window.close_time,
            rate = self.status.accel_rate,
            range = self.status.accel_range,
            "epoch logger started"
        );
        Ok(())
    }

    /// Stop the sensor, flush any partial block and park the window
    pub(crate) fn logger_stop(&mut self) -> BandResult<()> {
        if self.accel.present() {
            self.accel.set_interrupts(false);
            self.accel.shutdown();
        }
        self.store.flush_partial()?;
        self.status.window.invalidate();
        debug!("epoch logger stopped");
        Ok(())
    }

    /// Close the window when due: pack one epoch entry, restart the
    /// integrator and schedule the next boundary
    pub(crate) fn write_tasks(&mut self) -> BandResult<()> {
        let now = self.clock.now();
        if !self.status.window.due(now) {
            return Ok(());
        }
        if self.accumulator.sample_count() == 0 {
            return Err(Fault::new(
                FaultCode::SensorSilent,
                "no sensor data over a full epoch window",
            ));
        }
        let steps = self.pedometer.reset_steps();
        // Normalize the integral to counts per second
        let svm = (self.accumulator.sum() / u64::from(self.settings.epoch_period)) as u32;
        let entry = EpochSample::pack(
            self.battery.percent(),
            self.temp_celsius,
            self.last_events.int1_src,
            steps,
            svm,
        );
        let close_time = self.status.window.close_time;
        self.store
            .add(entry, close_time, self.settings.epoch_period as u16)?;
        self.accumulator.reset();
        self.status.window.recalculate(
            now,
            self.settings.epoch_period,
            self.settings.epoch_offset,
        );
        // Events raised while handling the boundary must not be lost
        self.check_device_events();
        Ok(())
    }

    /// FIFO watermark: drain samples into the epoch integrator and, when
    /// streaming, onto the serial link
    pub(crate) fn handle_fifo_event(&mut self) -> BandResult<()> {
        let samples = self
            .accel
            .read_fifo(ACCEL_FIFO_WATERMARK)
            .map_err(|err| Fault::new(FaultCode::SensorSilent, format!("fifo read: {err}")))?;

        // Custom-rate streaming bypasses the epoch calculation
        if self.status.stream_mode != 3 {
            for sample in &samples {
                self.accumulator.add(*sample, &mut self.pedometer);
            }
        }

        // A FIFO overrun means samples were lost; drop the burst
        if self.last_events.overrun() {
            warn!("accelerometer fifo overrun, discarding burst");
            let _ = self.accel.read_fifo(ACCEL_FIFO_WATERMARK);
            self.last_events = self.accel.read_events().unwrap_or_default();
            return Ok(());
        }

        match self.status.stream_mode {
            2 => self.stream_debug_line(),
            1 | 3 => self.stream_raw_burst(&samples),
            _ => {}
        }
        Ok(())
    }

    /// Motion pin: clear latched sources and flash on a double tap
    pub(crate) fn handle_motion_event(&mut self) -> BandResult<()> {
        self.last_events = self
            .accel
            .read_events()
            .map_err(|err| Fault::new(FaultCode::SensorSilent, format!("events: {err}")))?;
        if self.last_events.double_tap() {
            self.hw.led2 = hw_mode(true, false, 1);
        }
        Ok(())
    }

    /// One debug text line per second while in stream mode 2
    fn stream_debug_line(&mut self) {
        let now = self.clock.now();
        if self.stream_last_time == now {
            return;
        }
        self.stream_last_time = now;
        let line = format!(
            "{},{},{},{},{:02X}\r",
            adc_to_millivolt(self.batt_raw * 2),
            temp_string(self.temp_raw),
            self.accumulator.sum(),
            self.pedometer.steps(),
            self.last_events.int1_src
        );
        if self.link.free_space() >= line.len() {
            self.link.send(line.as_bytes());
        }
    }

    /// Hex-encoded sample burst: time/battery/temperature header, then
    /// the samples in short segments, then a terminator
    fn stream_raw_burst(&mut self, samples: &[crate::hal::types::AccelSample]) {
        if self.link.free_space() < STREAM_BURST_LEN {
            return;
        }
        let now = self.clock.now();
        let mut header = String::with_capacity(16);
        header.push_str(&write_hex(&now.to_le_bytes(), false));
        header.push_str(&write_hex(&self.batt_raw.to_le_bytes(), false));
        header.push_str(&write_hex(&(self.temp_raw as u16).to_le_bytes(), false));
        self.link.send(header.as_bytes());

        for segment in samples.chunks(STREAM_SEGMENT_SAMPLES) {
            let mut raw = Vec::with_capacity(segment.len() * 6);
            for sample in segment {
                raw.extend_from_slice(&sample.x.to_le_bytes());
                raw.extend_from_slice(&sample.y.to_le_bytes());
                raw.extend_from_slice(&sample.z.to_le_bytes());
            }
            let text = write_hex(&raw, false);
            if self.link.send(text.as_bytes()) != text.len() {
                break;
            }
        }
        self.link.send(b"\r\n");
    }

    /// Enter custom-rate streaming: restart the sensor with the override
    /// rate/range and suspend the epoch window
    pub(crate) fn stop_logging_start_stream(&mut self) -> BandResult<()> {
        if self.status.stream_mode == 1 && self.status.app_state == AppState::Ready {
            // Sensor not running; nothing will actually stream
            return Ok(());
        }
        if self.status.stream_mode == 3 {
            self.logger_stop()?;
            self.logger_start()?;
            // The suspended window never closes while streaming
            self.status.window.close_time = INVALID_TIME;
            if self.status.app_state == AppState::Ready {
                // Hold in the logging state so the close time stays parked
                self.status.app_state = AppState::Logging;
                self.status.app_counter = 0;
            }
            info!(
                rate = self.status.accel_rate,
                range = self.status.accel_range,
                "custom rate streaming started"
            );
        }
        Ok(())
    }

    /// Leave streaming; a custom-rate stream restarts the logger at the
    /// default sensor configuration
    pub(crate) fn stop_streaming_and_restart_logger(&mut self) -> BandResult<()> {
        if self.status.stream_mode == 3 {
            self.status.accel_range = ACCEL_DEFAULT_RANGE;
            self.status.accel_rate = ACCEL_DEFAULT_RATE;
            self.logger_stop()?;
            self.logger_start()?;
        }
        self.status.stream_mode = 0;
        Ok(())
    }
}
