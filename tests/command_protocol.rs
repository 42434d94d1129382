// tests/command_protocol.rs
//! Serial command channel tests over the loopback link
//!
//! Covers the authentication flow, settings commands with their clamp
//! behavior, erase commands with their counters, and the query and
//! block retrieval replies. The firmware runs a full control pass per
//! queued packet so every reply goes through the real tick path.

use band_core::app::{Band, BandHardware};
use band_core::config::constants::epoch::{EPOCH_NVM_BLOCK_COUNT, EPOCH_NVM_BLOCK_SIZE};
use band_core::config::AppState;
use band_core::hal::sim::{
    LoopbackLink, MemoryFlash, RecordingOutputs, SimAccel, SimAccelConfig, SimClock, SimPower,
};
use band_core::hal::Clock;
use band_core::protocol::hex::write_hex;

const ADDR: [u8; 6] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x06];
// Last six serial characters for the address above
const MASTER_KEY: &str = "332211";

struct Rig {
    band: Band,
    link: LoopbackLink,
    clock: SimClock,
    accel: SimAccel,
    power: SimPower,
    data_flash: MemoryFlash,
    settings_flash: MemoryFlash,
}

fn make_rig() -> Rig {
    make_rig_with_flash(MemoryFlash::new(EPOCH_NVM_BLOCK_COUNT, EPOCH_NVM_BLOCK_SIZE), MemoryFlash::new(1, 1024))
}

fn make_rig_with_flash(data_flash: MemoryFlash, settings_flash: MemoryFlash) -> Rig {
    let link = LoopbackLink::new();
    let clock = SimClock::new(1000);
    let accel = SimAccel::new(SimAccelConfig::default());
    let power = SimPower::new(585, 84);
    let band = Band::new(BandHardware {
        accel: Box::new(accel.clone()),
        clock: Box::new(clock.clone()),
        power: Box::new(power.clone()),
        link: Box::new(link.clone()),
        outputs: Box::new(RecordingOutputs::new()),
        data_flash: Box::new(data_flash.clone()),
        settings_flash: Box::new(settings_flash.clone()),
        device_address: ADDR,
    })
    .expect("band init");
    Rig {
        band,
        link,
        clock,
        accel,
        power,
        data_flash,
        settings_flash,
    }
}

/// Send one command and collect the reply text
fn command(rig: &mut Rig, text: &str) -> String {
    rig.link.push_command(text);
    rig.band.tick().expect("tick");
    rig.link.take_output()
}

/// Hex argument in the wire byte order (least significant pair first)
fn hex_u32(value: u32) -> String {
    write_hex(&value.to_le_bytes(), false)
}

#[test]
fn test_serial_number_query_needs_no_auth() {
    let mut rig = make_rig();
    rig.band.status.authenticated = false;
    let reply = command(&mut rig, "#");
    assert_eq!(reply, "#:C65544332211\r\n");
}

#[test]
fn test_fresh_device_is_authenticated() {
    // No password set yet, the channel starts unlocked
    let rig = make_rig();
    assert!(rig.band.status.authenticated);
}

#[test]
fn test_unauthenticated_commands_rejected() {
    let mut rig = make_rig();
    rig.band.status.authenticated = false;
    for cmd in ["B", "Q", "T", "N", "R", "E?", "X", "1"] {
        let reply = command(&mut rig, cmd);
        assert_eq!(reply, "!\r\n", "command {cmd} should be gated");
    }
}

#[test]
fn test_unlock_with_default_key() {
    let mut rig = make_rig();
    rig.band.status.authenticated = false;
    assert_eq!(command(&mut rig, "B"), "!\r\n");
    let reply = command(&mut rig, &format!("U{MASTER_KEY}"));
    assert_eq!(reply, "Authenticated\r\n");
    assert!(rig.band.status.authenticated);
    // The same session now answers gated queries
    let reply = command(&mut rig, "B");
    assert!(reply.starts_with("B:") && reply.ends_with("%\r\n"), "got {reply}");
}

#[test]
fn test_unlock_with_wrong_key_fails() {
    let mut rig = make_rig();
    rig.band.status.authenticated = false;
    let reply = command(&mut rig, "U000000");
    assert_eq!(reply, "!\r\n");
    assert!(!rig.band.status.authenticated);
}

#[test]
fn test_password_change_and_relock() {
    let mut rig = make_rig();
    let reply = command(&mut rig, "Pabc123");
    assert_eq!(reply, "P:abc123\r\n");

    // Disconnect locks the channel now the key differs from master
    rig.band.on_disconnect().unwrap();
    assert!(!rig.band.status.authenticated);
    assert_eq!(command(&mut rig, &format!("U{MASTER_KEY}")), "!\r\n");
    assert_eq!(command(&mut rig, "Uabc123"), "Authenticated\r\n");
}

#[test]
fn test_password_rejects_non_alphanumeric() {
    let mut rig = make_rig();
    assert_eq!(command(&mut rig, "Pab!@#$"), "Error?\r\n");
    assert_eq!(command(&mut rig, "Pab"), "!\r\n");
}

#[test]
fn test_settings_survive_restart() {
    let mut rig = make_rig();
    assert_eq!(command(&mut rig, "Pabc123"), "P:abc123\r\n");
    // Let the queued settings write complete
    rig.band.tick().unwrap();

    let rig2 = make_rig_with_flash(rig.data_flash.clone(), rig.settings_flash.clone());
    assert_eq!(&rig2.band.settings.security_key, b"abc123");
    // A stored password locks the channel at boot
    assert!(!rig2.band.status.authenticated);
}

#[test]
fn test_epoch_period_clamping() {
    let mut rig = make_rig();
    assert_eq!(command(&mut rig, &format!("N{}", hex_u32(14))), "N:60\r\n");
    assert_eq!(command(&mut rig, &format!("N{}", hex_u32(15))), "N:15\r\n");
    // Non-hex argument leaves the period unchanged
    assert_eq!(command(&mut rig, "NZZ"), "N:15\r\n");
    assert_eq!(command(&mut rig, &format!("N{}", hex_u32(7200))), "N:7200\r\n");
    assert_eq!(command(&mut rig, &format!("N{}", hex_u32(7201))), "N:60\r\n");
    // A period change schedules a logger restart
    assert_eq!(rig.band.status.app_counter, 5);
}

#[test]
fn test_time_set_and_query() {
    let mut rig = make_rig();
    assert_eq!(command(&mut rig, "T"), "T:1000\r\n");
    assert_eq!(command(&mut rig, &format!("T{}", hex_u32(5000))), "T:5000\r\n");
    assert_eq!(rig.clock.now(), 5000);
}

#[test]
fn test_stop_time_set() {
    let mut rig = make_rig();
    let reply = command(&mut rig, &format!("H{}", hex_u32(90000)));
    assert_eq!(reply, "H:90000\r\n");
    assert_eq!(rig.band.settings.epoch_stop, 90000);
}

#[test]
fn test_erase_counters_query() {
    let mut rig = make_rig();
    assert_eq!(command(&mut rig, "E?"), "B:0\r\nR:0\r\nE:0\r\n");
}

#[test]
fn test_erase_data_counts_and_resets_key() {
    let mut rig = make_rig();
    assert_eq!(command(&mut rig, "Pabc123"), "P:abc123\r\n");
    assert_eq!(command(&mut rig, "E"), "Erase data\r\n");
    assert_eq!(rig.band.settings.cycles_erase, 1);
    // Erase reverts the password to the factory key
    assert_eq!(rig.band.settings.security_key, rig.band.settings.master_key);
}

#[test]
fn test_factory_reset_keeps_lifetime_counters() {
    let mut rig = make_rig();
    assert_eq!(command(&mut rig, "E"), "Erase data\r\n");
    assert_eq!(rig.band.settings.cycles_erase, 1);
    assert_eq!(command(&mut rig, "E!"), "Erase all\r\n");
    // Regenerated defaults carry the wear counters across
    assert_eq!(command(&mut rig, "E?"), "B:0\r\nR:0\r\nE:2\r\n");
    // Drain the queued erase, then the store reads back empty
    rig.band.tick().unwrap();
    let reply = command(&mut rig, "Q");
    assert!(reply.contains("B:0\r\n"), "got {reply}");
    assert!(reply.contains("N:0\r\n"));
    assert_eq!(rig.data_flash.slot(0), vec![0xFF; EPOCH_NVM_BLOCK_SIZE]);
}

#[test]
fn test_master_key_unlocks_erase_all() {
    let mut rig = make_rig();
    rig.band.status.authenticated = false;
    let reply = command(&mut rig, &format!("E{MASTER_KEY}"));
    assert_eq!(reply, "Erase all\r\n");
    assert!(rig.band.status.authenticated);
}

#[test]
fn test_battery_query() {
    let mut rig = make_rig();
    // Keep the gauge stable at the boot reading
    rig.power.set_battery_raw(585);
    let reply = command(&mut rig, "B");
    assert!(reply.starts_with("B:"), "got {reply}");
    assert!(reply.ends_with("%\r\n"));
}

#[test]
fn test_output_commands() {
    let mut rig = make_rig();
    assert_eq!(command(&mut rig, "1"), "MOT\r\n");
    assert_eq!(command(&mut rig, "2"), "LED2\r\n");
    assert_eq!(command(&mut rig, "3"), "LED3\r\n");
    assert_eq!(command(&mut rig, "M"), "MOT\r\n");
    assert_eq!(command(&mut rig, "O"), "OFF\r\n");
}

#[test]
fn test_connection_interval_commands() {
    let mut rig = make_rig();
    assert_eq!(command(&mut rig, "L"), "LP\r\n");
    assert_eq!(command(&mut rig, "F"), "HP\r\n");
    // Out-of-range requests force the high speed interval
    let reply = command(&mut rig, &format!("V{}", hex_u32(5000)));
    assert_eq!(reply, "V:40ms\r\n");
}

#[test]
fn test_cueing_toggle() {
    let mut rig = make_rig();
    // Default 60 s period gives an hour of cues
    assert_eq!(command(&mut rig, "C"), "Q:60\r\nC:60\r\n");
    assert_eq!(command(&mut rig, "C"), "Q:60\r\nC:0\r\n");
}

#[test]
fn test_cueing_period_clamped() {
    let mut rig = make_rig();
    // 2 s is under the minimum so the default is restored
    let reply = command(&mut rig, &format!("C{}", write_hex(&2u16.to_le_bytes(), false)));
    assert_eq!(reply, "Q:60\r\nC:60\r\n");
    let reply = command(&mut rig, &format!("C{}", write_hex(&120u16.to_le_bytes(), false)));
    assert_eq!(reply, "Q:120\r\nC:30\r\n");
}

#[test]
fn test_status_query() {
    let mut rig = make_rig();
    let reply = command(&mut rig, "Q");
    assert!(reply.contains("T:1000\r\n"));
    assert!(reply.contains("B:0\r\n"));
    assert!(reply.contains("N:0\r\n"));
    assert!(reply.contains("C:128\r\n"));
    assert!(reply.contains("I:65535\r\n"));
}

#[test]
fn test_read_index_setting_falls_through_to_query() {
    let mut rig = make_rig();
    let reply = command(&mut rig, &format!("W{}", write_hex(&5u16.to_le_bytes(), false)));
    assert!(reply.contains("I:5\r\n"), "got {reply}");
    assert_eq!(rig.band.status.epoch_read_index, 5);
}

#[test]
fn test_sync_offset_command() {
    let mut rig = make_rig();
    let reply = command(&mut rig, &format!("S{}", write_hex(&10i32.to_le_bytes(), false)));
    assert_eq!(reply, "S:10\r\n");
    assert_eq!(rig.band.settings.epoch_offset, 10);
}

#[test]
fn test_block_read_streams_whole_block() {
    let mut rig = make_rig();
    let reply = command(&mut rig, "R");
    // 512 bytes as hex plus the terminator
    assert_eq!(reply.len(), 2 * EPOCH_NVM_BLOCK_SIZE + 2);
    assert!(reply.ends_with("\r\n"));
    // The cursor advanced past the streamed block
    assert_eq!(rig.band.status.epoch_read_index, 1);
}

#[test]
fn test_goal_setting() {
    let mut rig = make_rig();
    let reply = command(&mut rig, &format!("GG{}", hex_u32(1000)));
    assert_eq!(reply, "O:0\r\nP:86400\r\nG:1000\r\n");
    assert_eq!(rig.band.settings.goal_step_count, 1000);
    assert!(!rig.band.status.goal_complete);

    let reply = command(&mut rig, &format!("GP{}", hex_u32(3600)));
    assert!(reply.contains("P:3600\r\n"));
}

#[test]
fn test_exit_commands() {
    let mut rig = make_rig();
    let reply = command(&mut rig, &format!("X{}", hex_u32(10)));
    assert_eq!(reply, "X:10\r\n");
    assert_eq!(rig.band.status.app_counter, 10);

    let reply = command(&mut rig, "Xb");
    assert_eq!(reply, "DFU\r\n");
    assert_eq!(rig.band.status.app_state, AppState::Exit);
    assert_eq!(rig.band.status.app_counter, 5);
}

#[test]
fn test_unknown_command() {
    let mut rig = make_rig();
    assert_eq!(command(&mut rig, "Z"), "?\r\n");
}

#[test]
fn test_state_dump() {
    let mut rig = make_rig();
    let reply = command(&mut rig, "?");
    // Two hex dumps, each with a terminator
    assert_eq!(reply.matches("\r\n").count(), 2);
    assert!(reply.chars().filter(|c| *c != '\r' && *c != '\n').all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_stream_mode_replies() {
    let mut rig = make_rig();
    let reply = command(&mut rig, "D");
    assert_eq!(reply, "OP:02, 50, 8\r\n");
    assert_eq!(rig.band.status.stream_mode, 2);
    // Any following command cancels the stream first
    let _ = command(&mut rig, "B");
    assert_eq!(rig.band.status.stream_mode, 0);
}

#[test]
fn test_accel_sample_query() {
    let mut rig = make_rig();
    rig.accel.push_samples(&[band_core::hal::AccelSample::new(10, -20, 4000)]);
    let reply = command(&mut rig, "A");
    assert_eq!(reply, "A:10,-20,4000,00\r\n");
}
