// src/app/mod.rs
//! Application core: owns the hardware collaborators, the persisted
//! settings and live status, and runs the top-level state machine
//!
//! The firmware is poll driven. [`Band::tick`] is the 8 Hz control
//! pass: it updates timed outputs, drains storage completions and the
//! device event queue, handles serial commands and, once per second,
//! runs the battery gauge, cueing, goal tracking and the application
//! state transitions.

pub mod battery;
pub mod hardware;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::app::battery::BatteryMonitor;
use crate::app::hardware::{hw_mode, HwControl};
use crate::config::constants::battery::{
    BATTERY_LOW_THRESHOLD, BATTERY_LOW_THRESHOLD_START, LOG_WAIT_FLASH_INTERVAL,
    LOW_BATT_FLASH_INTERVAL, LOW_BATT_THRESHOLD_COUNT,
};
use crate::config::constants::pedometer::PED_ONE_G_VALUE;
use crate::config::constants::scheduler::{
    APP_START_DELAY_SECS, HARDWARE_TASK_RATE, SCHED_QUEUE_SIZE,
};
use crate::config::{AppState, Settings, SettingsStore, Status};
use crate::epoch::{EpochAccumulator, EpochStore, Pedometer};
use crate::error::BandResult;
use crate::hal::traits::{Accelerometer, BlockStorage, Clock, Outputs, PowerMonitor, SerialLink};
use crate::hal::types::{AccelSample, EventFlags};

/// Asynchronous device events queued from interrupt pin polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Sensor FIFO reached its watermark
    FifoWatermark,
    /// Orientation or tap event pin raised
    Motion,
}

/// Hardware collaborators handed to a new [`Band`]
pub struct BandHardware {
    pub accel: Box<dyn Accelerometer>,
    pub clock: Box<dyn Clock>,
    pub power: Box<dyn PowerMonitor>,
    pub link: Box<dyn SerialLink>,
    pub outputs: Box<dyn Outputs>,
    /// Epoch block region
    pub data_flash: Box<dyn BlockStorage>,
    /// Settings record page
    pub settings_flash: Box<dyn BlockStorage>,
    /// Factory-programmed device address
    pub device_address: [u8; 6],
}

/// The firmware instance
pub struct Band {
    pub settings: Settings,
    pub status: Status,
    pub(crate) settings_store: SettingsStore,
    pub(crate) store: EpochStore,
    pub(crate) accel: Box<dyn Accelerometer>,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) power: Box<dyn PowerMonitor>,
    pub(crate) link: Box<dyn SerialLink>,
    pub(crate) outputs: Box<dyn Outputs>,
    pub(crate) hw: HwControl,
    pub(crate) battery: BatteryMonitor,
    pub(crate) accumulator: EpochAccumulator,
    pub(crate) pedometer: Pedometer,
    event_tx: Sender<DeviceEvent>,
    event_rx: Receiver<DeviceEvent>,
    pub(crate) batt_raw: u16,
    pub(crate) temp_raw: i16,
    pub(crate) temp_celsius: i8,
    /// Latest latched sensor event sources
    pub(crate) last_events: EventFlags,
    pub(crate) phase: u8,
    /// Timestamp rate limit for the debug stream
    pub(crate) stream_last_time: u32,
}

impl Band {
    /// Boot: scan the block region, load or regenerate settings and
    /// prime the battery gauge
    pub fn new(hardware: BandHardware) -> BandResult<Self> {
        let BandHardware {
            mut accel,
            clock,
            mut power,
            link,
            mut outputs,
            data_flash,
            settings_flash,
            device_address,
        } = hardware;

        let store = EpochStore::new(data_flash)?;
        let mut settings_store = SettingsStore::new(settings_flash);
        let (mut settings, restored) = settings_store.load(device_address)?;
        let mut status = Status::default();
        // Defaults unlock the channel; otherwise only an unset password
        status.authenticated = restored || settings.key_is_default();
        if !restored {
            settings.cycles_reset += 1;
            settings_store.save(&settings)?;
        }

        // Sensor powered down until the logger starts
        if accel.present() {
            accel.shutdown();
        }

        let mut hw = HwControl::default();
        hw.clear(outputs.as_mut());

        let mut battery = BatteryMonitor::new();
        let batt_raw = power.battery_raw();
        battery.sample(batt_raw);
        let temp_raw = power.temperature_raw();

        let (event_tx, event_rx) = bounded(SCHED_QUEUE_SIZE);

        status.app_counter = APP_START_DELAY_SECS;
        info!(
            serial = %settings.serial_number,
            restored,
            battery = battery.percent(),
            "band core initialized"
        );

        Ok(Self {
            settings,
            status,
            settings_store,
            store,
            accel,
            clock,
            power,
            link,
            outputs,
            hw,
            battery,
            accumulator: EpochAccumulator::new(AccelSample::new(0, 0, 0)),
            pedometer: Pedometer::new(PED_ONE_G_VALUE),
            event_tx,
            event_rx,
            batt_raw,
            temp_raw,
            temp_celsius: battery::temp_celsius(temp_raw),
            last_events: EventFlags::default(),
            phase: 0,
            stream_last_time: 0,
        })
    }

    /// Queue settings for NVM
    pub(crate) fn save_settings(&mut self) -> BandResult<()> {
        self.settings_store.save(&self.settings)
    }

    pub fn battery_percent(&self) -> u8 {
        self.battery.percent()
    }

    pub fn now(&self) -> u32 {
        self.clock.now()
    }

    /// One 8 Hz control pass
    pub fn tick(&mut self) -> BandResult<()> {
        self.phase = self.phase.wrapping_add(1);

        // Timed outputs
        let phase = self.phase;
        self.hw.tick(phase, self.outputs.as_mut());

        // Storage completions
        self.store.service()?;
        self.settings_store.service()?;

        // Interrupt pin polling feeds the bounded event queue
        self.check_device_events();
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_device_event(event)?;
        }

        // Serial commands
        while self.serial_tasks()? {}

        // Window close check runs every pass while logging
        self.app_tasks()?;

        // Once per second
        if self.phase & (HARDWARE_TASK_RATE - 1) == 0 {
            self.second_tasks()?;
        }
        Ok(())
    }

    /// Convenience: one simulated second of control passes
    pub fn tick_second(&mut self) -> BandResult<()> {
        for _ in 0..HARDWARE_TASK_RATE {
            self.tick()?;
        }
        Ok(())
    }

    /// Latch interrupt pin levels into queued events
    pub(crate) fn check_device_events(&mut self) {
        let (int1, int2) = self.accel.pin_levels();
        if int1 {
            if let Err(TrySendError::Full(_)) = self.event_tx.try_send(DeviceEvent::FifoWatermark)
            {
                warn!("device event queue full, fifo event dropped");
            }
        }
        if int2 {
            if let Err(TrySendError::Full(_)) = self.event_tx.try_send(DeviceEvent::Motion) {
                warn!("device event queue full, motion event dropped");
            }
        }
    }

    fn handle_device_event(&mut self, event: DeviceEvent) -> BandResult<()> {
        match event {
            DeviceEvent::FifoWatermark => self.handle_fifo_event()?,
            DeviceEvent::Motion => self.handle_motion_event()?,
        }
        // Re-check pins so closely spaced events are not missed
        self.check_device_events();
        Ok(())
    }

    /// Per-second housekeeping from the control task
    fn second_tasks(&mut self) -> BandResult<()> {
        let now = self.clock.now();

        // Vibration cue countdown
        if self.status.cueing_count > 0 && now >= self.status.cueing_next_time {
            self.status.cueing_count -= 1;
            self.status.cueing_next_time = now + self.settings.cueing_period;
            self.hw.motor = hw_mode(true, true, 8);
        }

        // Step goal trigger and periodic reset
        if !self.status.goal_complete && self.pedometer.total() > self.settings.goal_step_count {
            self.status.goal_complete = true;
            self.hw.motor = hw_mode(true, true, 8);
            self.hw.led2 = hw_mode(true, true, 8);
        }
        if self.settings.goal_period != 0
            && (now.wrapping_add(self.settings.goal_time_offset)) % self.settings.goal_period == 0
        {
            self.pedometer.reset_total();
            self.status.goal_complete = false;
        }

        // Alternate battery and temperature sampling
        if self.phase & HARDWARE_TASK_RATE != 0 {
            self.temp_raw = self.power.temperature_raw();
            self.temp_celsius = battery::temp_celsius(self.temp_raw);
        } else {
            self.batt_raw = self.power.battery_raw();
            self.battery.sample(self.batt_raw);
        }

        // Countdown used by timed transitions
        if self.status.app_counter > 0 {
            self.status.app_counter -= 1;
        }
        Ok(())
    }

    /// Application state machine, evaluated every control pass
    fn app_tasks(&mut self) -> BandResult<()> {
        let now = self.clock.now();
        match self.status.app_state {
            AppState::Logging => {
                // Handle end of epoch windows
                self.write_tasks()?;
                // A pause request or a passed stop time parks the logger
                if self.status.app_counter > 0
                    || (self.settings.epoch_stop != 0 && self.settings.epoch_stop < now)
                {
                    self.logger_stop()?;
                    self.status.app_state = AppState::Ready;
                    debug!("logger paused, waiting in ready state");
                }
            }
            AppState::Ready => {
                if self.status.app_counter == 0 {
                    // Custom-rate streaming holds off the logger restart
                    if self.status.stream_mode == 3 {
                        return Ok(());
                    }
                    if self.status.app_counter % LOG_WAIT_FLASH_INTERVAL == 0 {
                        self.hw.led2 = hw_mode(true, false, 1);
                    }
                    if self.settings.epoch_stop == 0 || self.settings.epoch_stop > now {
                        self.logger_start()?;
                        self.status.app_state = AppState::Logging;
                        info!(now, "logging started");
                    }
                }
            }
            AppState::LowBattery => {
                if self.status.app_counter == 0 {
                    self.hw.led3 = hw_mode(true, false, 1);
                    self.status.app_counter = LOW_BATT_FLASH_INTERVAL;
                    if self.battery.healthy() {
                        // Recovered past the raised restart threshold;
                        // always re-enter through the ready delay
                        self.battery.min_threshold = BATTERY_LOW_THRESHOLD;
                        self.status.app_state = AppState::Ready;
                        self.status.app_counter = APP_START_DELAY_SECS;
                        info!(percent = self.battery.percent(), "battery recovered");
                    }
                }
            }
            AppState::Exit => {
                // Radio must not drop while a flash operation is in flight
                if self.status.app_counter == 0 && !self.store.flash_busy() {
                    self.link.set_radio(false);
                }
            }
        }

        // Sustained depletion exits logging from any active state
        if matches!(self.status.app_state, AppState::Ready | AppState::Logging)
            && self.battery.percent() < self.battery.min_threshold
            && self.battery.low_count() > LOW_BATT_THRESHOLD_COUNT
        {
            if self.status.window.is_active() {
                self.logger_stop()?;
            }
            self.status.app_state = AppState::LowBattery;
            self.settings.cycles_battery += 1;
            self.save_settings()?;
            self.battery.min_threshold = BATTERY_LOW_THRESHOLD_START;
            self.status.app_counter = LOW_BATT_FLASH_INTERVAL;
            warn!(percent = self.battery.percent(), "battery depleted, logger stopped");
        }
        Ok(())
    }

    /// Link-level disconnect: lock the channel again unless no password
    /// is set, and stop any streaming
    pub fn on_disconnect(&mut self) -> BandResult<()> {
        self.status.authenticated = self.settings.key_is_default();
        if self.status.stream_mode != 0 {
            self.stop_streaming_and_restart_logger()?;
        }
        Ok(())
    }
}
