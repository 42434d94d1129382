// tests/logging_integration.rs
//! End-to-end logging behavior driven through simulated hardware
//!
//! Each test boots the firmware against the simulators, advances the
//! clock one second at a time while feeding pattern samples at the
//! sensor rate, and asserts on application state, stored epoch data
//! and output activity.

use band_core::app::{Band, BandHardware};
use band_core::config::constants::epoch::{EPOCH_NVM_BLOCK_COUNT, EPOCH_NVM_BLOCK_SIZE};
use band_core::config::{AppState, SimProfile};
use band_core::epoch::EpochBlock;
use band_core::error::{BandResult, FaultCode};
use band_core::hal::sim::{
    LoopbackLink, MemoryFlash, MotionPattern, RecordingOutputs, SimAccel, SimAccelConfig,
    SimClock, SimPower,
};
use band_core::protocol::hex::read_hex;

const ADDR: [u8; 6] = [0x10, 0x20, 0x30, 0x40, 0x50, 0x0A];
const SAMPLE_RATE: usize = 50;

struct Rig {
    band: Band,
    link: LoopbackLink,
    clock: SimClock,
    accel: SimAccel,
    power: SimPower,
    outputs: RecordingOutputs,
}

fn walking_pattern() -> SimAccelConfig {
    SimAccelConfig {
        pattern: MotionPattern::Walk {
            amplitude: 3000,
            period_samples: 40,
        },
        ..SimAccelConfig::default()
    }
}

fn make_rig(config: SimAccelConfig) -> Rig {
    make_rig_with_battery(config, 585)
}

fn make_rig_with_battery(config: SimAccelConfig, battery_raw: u16) -> Rig {
    make_rig_from_profile(SimProfile {
        accel: config,
        battery_raw,
        start_time: 1000,
        ..SimProfile::default()
    })
}

fn make_rig_from_profile(profile: SimProfile) -> Rig {
    let link = LoopbackLink::new();
    let clock = SimClock::new(profile.start_time);
    let accel = SimAccel::new(profile.accel);
    let power = SimPower::new(profile.battery_raw, profile.temperature_raw);
    let outputs = RecordingOutputs::new();
    let band = Band::new(BandHardware {
        accel: Box::new(accel.clone()),
        clock: Box::new(clock.clone()),
        power: Box::new(power.clone()),
        link: Box::new(link.clone()),
        outputs: Box::new(outputs.clone()),
        data_flash: Box::new(MemoryFlash::new(EPOCH_NVM_BLOCK_COUNT, EPOCH_NVM_BLOCK_SIZE)),
        settings_flash: Box::new(MemoryFlash::new(1, 1024)),
        device_address: ADDR,
    })
    .expect("band init");
    Rig {
        band,
        link,
        clock,
        accel,
        power,
        outputs,
    }
}

/// Advance simulated time with the sensor producing data while running
fn run_seconds(rig: &mut Rig, secs: u32) -> BandResult<()> {
    for _ in 0..secs {
        rig.clock.advance(1);
        if rig.accel.is_running() {
            rig.accel.feed(SAMPLE_RATE);
        }
        rig.band.tick_second()?;
    }
    Ok(())
}

/// Advance time without feeding any sensor data
fn run_seconds_silent(rig: &mut Rig, secs: u32) -> BandResult<()> {
    for _ in 0..secs {
        rig.clock.advance(1);
        rig.band.tick_second()?;
    }
    Ok(())
}

/// Retrieve and decode the active block through the R command; an
/// unset cursor defaults to the block under write
fn read_active_block(rig: &mut Rig) -> EpochBlock {
    rig.link.push_command("R");
    rig.band.tick().unwrap();
    let reply = rig.link.take_output();
    let text = reply.trim_end_matches(['\r', '\n']);
    let mut raw = [0u8; EPOCH_NVM_BLOCK_SIZE];
    assert_eq!(read_hex(&mut raw, text), EPOCH_NVM_BLOCK_SIZE);
    EpochBlock::from_bytes(&raw)
}

#[test]
fn test_boot_waits_then_starts_logging() {
    let mut rig = make_rig(walking_pattern());
    assert_eq!(rig.band.status.app_state, AppState::Ready);
    assert!(!rig.band.status.window.is_active());

    run_seconds(&mut rig, 6).unwrap();
    assert_eq!(rig.band.status.app_state, AppState::Logging);
    assert!(rig.band.status.window.is_active());
    assert!(rig.accel.is_running());
    // Default sensor setup applied at start
    assert_eq!(rig.accel.configured(), (50, 8));
}

#[test]
fn test_toml_profile_drives_simulation() {
    let profile = SimProfile::from_toml_str(
        r#"
        battery_raw = 585
        start_time = 5000

        [accel]
        pattern = { Walk = { amplitude = 3000, period_samples = 40 } }
        "#,
    )
    .unwrap();
    let mut rig = make_rig_from_profile(profile);
    run_seconds(&mut rig, 6).unwrap();
    assert_eq!(rig.band.now(), 5006);
    assert_eq!(rig.band.status.app_state, AppState::Logging);
}

#[test]
fn test_window_closes_on_the_period_grid() {
    let mut rig = make_rig(walking_pattern());
    run_seconds(&mut rig, 6).unwrap();
    // Zero offset aligns the close time to the minute grid
    assert_eq!(rig.band.status.window.close_time % 60, 0);
}

#[test]
fn test_epoch_entries_accumulate() {
    let mut rig = make_rig(walking_pattern());
    run_seconds(&mut rig, 130).unwrap();

    let block = read_active_block(&mut rig);
    assert!(block.info.data_length >= 2, "have {}", block.info.data_length);
    // First entry carries the walking activity
    let entry = block.samples[0];
    assert!(entry.svm > 5000, "walking svm was {}", entry.svm);
    assert!(entry.step_count() > 0, "walking should count steps");
    // Header stamped on the first entry
    assert_eq!(block.epoch_period, 60);
    assert!(block.info.time_stamp >= 1000);
}

#[test]
fn test_rest_logs_near_zero_activity() {
    let mut rig = make_rig(SimAccelConfig::default());
    run_seconds(&mut rig, 70).unwrap();

    let block = read_active_block(&mut rig);
    assert!(block.info.data_length >= 1);
    let entry = block.samples[0];
    assert_eq!(entry.step_count(), 0);
    // Noise integrates to a small residual only
    assert!(entry.svm < 5000, "rest svm was {}", entry.svm);
}

#[test]
fn test_silent_sensor_faults_at_window_close() {
    let mut rig = make_rig(SimAccelConfig::default());
    run_seconds(&mut rig, 6).unwrap();
    assert_eq!(rig.band.status.app_state, AppState::Logging);

    // No samples for a full window
    let err = run_seconds_silent(&mut rig, 70).unwrap_err();
    assert_eq!(err.code, FaultCode::SensorSilent);
}

#[test]
fn test_battery_hysteresis_returns_through_ready() {
    // Boot with the battery already depleted
    let mut rig = make_rig_with_battery(SimAccelConfig::default(), 473);

    let mut states = Vec::new();
    for _ in 0..60 {
        run_seconds(&mut rig, 1).unwrap();
        if states.last() != Some(&rig.band.status.app_state) {
            states.push(rig.band.status.app_state);
        }
        if rig.band.status.app_state == AppState::LowBattery {
            break;
        }
    }
    assert!(states.contains(&AppState::LowBattery));
    assert_eq!(rig.band.settings.cycles_battery, 1);
    assert!(rig.band.battery_percent() < 10);

    // Recharge and watch the recovery path
    rig.power.set_battery_raw(585);
    states.clear();
    for _ in 0..200 {
        run_seconds(&mut rig, 1).unwrap();
        if states.last() != Some(&rig.band.status.app_state) {
            states.push(rig.band.status.app_state);
        }
        if rig.band.status.app_state == AppState::Logging {
            break;
        }
    }
    // Recovery always passes through the ready delay, never straight
    // back into logging
    let ready_pos = states.iter().position(|s| *s == AppState::Ready);
    let logging_pos = states.iter().position(|s| *s == AppState::Logging);
    assert!(ready_pos.is_some(), "states were {states:?}");
    assert!(logging_pos.is_some(), "states were {states:?}");
    assert!(ready_pos.unwrap() < logging_pos.unwrap());
}

#[test]
fn test_stop_time_parks_the_logger() {
    let mut rig = make_rig(walking_pattern());
    rig.band.settings.epoch_stop = 1030;
    run_seconds(&mut rig, 6).unwrap();
    assert_eq!(rig.band.status.app_state, AppState::Logging);

    run_seconds(&mut rig, 40).unwrap();
    assert_eq!(rig.band.status.app_state, AppState::Ready);
    assert!(!rig.band.status.window.is_active());
    assert!(!rig.accel.is_running());

    // Stays parked while the stop time is in the past
    run_seconds(&mut rig, 20).unwrap();
    assert_eq!(rig.band.status.app_state, AppState::Ready);
}

#[test]
fn test_cueing_pulses_the_motor() {
    let mut rig = make_rig(SimAccelConfig::default());
    rig.band.settings.cueing_period = 5;
    rig.band.status.cueing_count = 3;
    rig.band.status.cueing_next_time = 1005;

    run_seconds(&mut rig, 25).unwrap();
    assert_eq!(rig.band.status.cueing_count, 0);
    assert!(rig.outputs.motor_pulses() > 0);
}

#[test]
fn test_erase_while_logging_restarts_logger() {
    let mut rig = make_rig(walking_pattern());
    run_seconds(&mut rig, 70).unwrap();
    assert_eq!(rig.band.status.app_state, AppState::Logging);

    rig.link.push_command("E");
    rig.band.tick().unwrap();
    assert!(rig.link.take_output().contains("Erase data"));
    assert_eq!(rig.band.status.app_state, AppState::Ready);
    assert!(!rig.band.status.window.is_active());

    // Logger comes back after the restart delay; the stop-side flush
    // completed into the wiped region so writing resumes at block 1
    run_seconds(&mut rig, 7).unwrap();
    assert_eq!(rig.band.status.app_state, AppState::Logging);
    rig.link.push_command("Q");
    rig.band.tick().unwrap();
    let reply = rig.link.take_output();
    assert!(reply.contains("B:1\r\n"), "got {reply}");
    assert!(reply.contains("N:0\r\n"), "got {reply}");
}

#[test]
fn test_raw_stream_emits_hex_bursts() {
    let mut rig = make_rig(walking_pattern());
    run_seconds(&mut rig, 6).unwrap();

    rig.link.push_command("I");
    rig.band.tick().unwrap();
    assert!(rig.link.take_output().starts_with("OP:01"));
    assert_eq!(rig.band.status.stream_mode, 1);

    // One watermark of samples produces one burst
    rig.accel.feed(25);
    rig.band.tick().unwrap();
    let burst = rig.link.take_output();
    assert!(burst.ends_with("\r\n"), "got {burst:?}");
    // Header plus 25 six-byte samples as hex
    assert_eq!(burst.len(), 16 + 300 + 2);
}

#[test]
fn test_custom_rate_stream_suspends_the_window() {
    let mut rig = make_rig(walking_pattern());
    run_seconds(&mut rig, 6).unwrap();

    rig.link.push_command("I 100 4");
    rig.band.tick().unwrap();
    let reply = rig.link.take_output();
    assert!(reply.contains("OP:03, 100, 4"), "got {reply}");
    assert_eq!(rig.accel.configured(), (100, 4));
    assert!(!rig.band.status.window.is_active());
    assert_eq!(rig.band.status.app_state, AppState::Logging);

    // Any command ends the stream and restores the default setup
    rig.link.push_command("B");
    rig.band.tick().unwrap();
    assert_eq!(rig.band.status.stream_mode, 0);
    assert_eq!(rig.accel.configured(), (50, 8));
    assert!(rig.band.status.window.is_active());
}

#[test]
fn test_disconnect_during_custom_stream_restarts_logger() {
    let mut rig = make_rig(walking_pattern());
    run_seconds(&mut rig, 6).unwrap();

    rig.link.push_command("I 100 4");
    rig.band.tick().unwrap();
    rig.link.take_output();
    assert_eq!(rig.accel.configured(), (100, 4));

    // A dropped link restores the default setup with no further traffic
    rig.band.on_disconnect().unwrap();
    assert_eq!(rig.band.status.stream_mode, 0);
    assert_eq!(rig.accel.configured(), (50, 8));
    assert!(rig.band.status.window.is_active());

    // Epoch logging carries on unattended
    run_seconds(&mut rig, 130).unwrap();
    let block = read_active_block(&mut rig);
    assert!(block.info.data_length >= 1, "have {}", block.info.data_length);
}

#[test]
fn test_goal_completion_vibrates() {
    let mut rig = make_rig(walking_pattern());
    rig.band.settings.goal_step_count = 10;
    run_seconds(&mut rig, 130).unwrap();

    assert!(rig.band.status.goal_complete);
    assert!(rig.outputs.motor_pulses() > 0);
}
