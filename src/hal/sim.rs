// src/hal/sim.rs
//! Host simulators for every hardware collaborator
//!
//! These stand in for the sensor, flash controller, power monitor and the
//! wireless serial service so the complete firmware behavior runs on a
//! desktop target. Each simulator is a cheap clone over shared inner state:
//! the firmware owns one clone behind a trait object while the test keeps
//! another to script stimulus and inspect effects.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::constants::protocol::{SERIAL_IN_QUEUE_LEN, SERIAL_OUT_QUEUE_LEN};
use crate::error::{HalError, StorageError};
use crate::hal::traits::{Accelerometer, BlockStorage, Clock, Outputs, PowerMonitor, SerialLink};
use crate::hal::types::{AccelSample, EventFlags, StorageEvent};

/// Synthetic motion fed into the simulated accelerometer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MotionPattern {
    /// Device at rest: gravity on z plus noise
    Rest,
    /// Triangle-wave vertical oscillation, like walking
    Walk {
        amplitude: i16,
        period_samples: u16,
    },
}

/// Simulated accelerometer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimAccelConfig {
    pub pattern: MotionPattern,
    /// Uniform noise amplitude, counts
    pub noise: i16,
    /// RNG seed so test runs are reproducible
    pub seed: u64,
}

impl Default for SimAccelConfig {
    fn default() -> Self {
        Self {
            pattern: MotionPattern::Rest,
            noise: 8,
            seed: 0x5EED,
        }
    }
}

struct AccelInner {
    config: SimAccelConfig,
    present: bool,
    running: bool,
    interrupts: bool,
    rate: u16,
    range: u8,
    fifo: VecDeque<AccelSample>,
    events: EventFlags,
    last: AccelSample,
    phase: u16,
    rng: StdRng,
}

/// Simulated accelerometer with a drainable FIFO
#[derive(Clone)]
pub struct SimAccel {
    inner: Arc<Mutex<AccelInner>>,
}

impl SimAccel {
    pub fn new(config: SimAccelConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner: Arc::new(Mutex::new(AccelInner {
                config,
                present: true,
                running: false,
                interrupts: false,
                rate: 0,
                range: 0,
                fifo: VecDeque::new(),
                events: EventFlags::default(),
                last: AccelSample::new(0, 0, 4096),
                phase: 0,
                rng,
            })),
        }
    }

    /// Mark the device absent so presence probes fail
    pub fn set_present(&self, present: bool) {
        self.inner.lock().unwrap().present = present;
    }

    /// Generate `count` pattern samples into the FIFO
    pub fn feed(&self, count: usize) {
        let mut inner = self.inner.lock().unwrap();
        for _ in 0..count {
            let sample = next_sample(&mut inner);
            inner.last = sample;
            inner.fifo.push_back(sample);
        }
    }

    /// Push explicit samples, bypassing the pattern generator
    pub fn push_samples(&self, samples: &[AccelSample]) {
        let mut inner = self.inner.lock().unwrap();
        for sample in samples {
            inner.last = *sample;
            inner.fifo.push_back(*sample);
        }
    }

    /// Latch event source flags for the next `read_events`
    pub fn set_events(&self, events: EventFlags) {
        self.inner.lock().unwrap().events = events;
    }

    pub fn fifo_len(&self) -> usize {
        self.inner.lock().unwrap().fifo.len()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().running
    }

    pub fn configured(&self) -> (u16, u8) {
        let inner = self.inner.lock().unwrap();
        (inner.rate, inner.range)
    }
}

fn next_sample(inner: &mut AccelInner) -> AccelSample {
    let noise = inner.config.noise;
    let jitter = |rng: &mut StdRng| -> i16 {
        if noise == 0 {
            0
        } else {
            rng.gen_range(-noise..=noise)
        }
    };
    match inner.config.pattern {
        MotionPattern::Rest => {
            let n = (jitter(&mut inner.rng), jitter(&mut inner.rng), jitter(&mut inner.rng));
            AccelSample::new(n.0, n.1, 4096 + n.2)
        }
        MotionPattern::Walk {
            amplitude,
            period_samples,
        } => {
            let period = period_samples.max(2);
            inner.phase = (inner.phase + 1) % period;
            let half = period / 2;
            // Triangle wave symmetric about gravity
            let pos = if inner.phase < half {
                inner.phase
            } else {
                period - inner.phase
            };
            let z = 4096 - amplitude / 2 + ((amplitude as i32 * pos as i32) / half as i32) as i16;
            AccelSample::new(jitter(&mut inner.rng), jitter(&mut inner.rng), z)
        }
    }
}

impl Accelerometer for SimAccel {
    fn present(&mut self) -> bool {
        self.inner.lock().unwrap().present
    }

    fn configure(&mut self, rate: u16, range: u8) -> Result<(), HalError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.present {
            return Err(HalError::NotPresent);
        }
        inner.rate = rate;
        inner.range = range;
        Ok(())
    }

    fn start(&mut self) -> Result<(), HalError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.present {
            return Err(HalError::NotPresent);
        }
        inner.running = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.running = false;
        inner.fifo.clear();
    }

    fn read_sample(&mut self) -> Result<AccelSample, HalError> {
        let inner = self.inner.lock().unwrap();
        if !inner.present {
            return Err(HalError::NotPresent);
        }
        Ok(inner.last)
    }

    fn read_fifo(&mut self, max: usize) -> Result<Vec<AccelSample>, HalError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.present {
            return Err(HalError::NotPresent);
        }
        let take = max.min(inner.fifo.len());
        Ok(inner.fifo.drain(..take).collect())
    }

    fn read_events(&mut self) -> Result<EventFlags, HalError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.present {
            return Err(HalError::NotPresent);
        }
        // Reading clears the latched sources, like the hardware registers
        let events = inner.events;
        inner.events = EventFlags::default();
        Ok(events)
    }

    fn set_interrupts(&mut self, enable: bool) {
        self.inner.lock().unwrap().interrupts = enable;
    }

    fn pin_levels(&self) -> (bool, bool) {
        let inner = self.inner.lock().unwrap();
        let int1 = inner.interrupts
            && inner.fifo.len() >= crate::config::constants::accel::ACCEL_FIFO_WATERMARK;
        (int1, false)
    }
}

/// Shared-handle seconds clock
#[derive(Clone)]
pub struct SimClock {
    secs: Arc<AtomicU32>,
}

impl SimClock {
    pub fn new(start: u32) -> Self {
        Self {
            secs: Arc::new(AtomicU32::new(start)),
        }
    }

    pub fn advance(&self, secs: u32) {
        self.secs.fetch_add(secs, Ordering::Relaxed);
    }
}

impl Clock for SimClock {
    fn now(&self) -> u32 {
        self.secs.load(Ordering::Relaxed)
    }

    fn set(&mut self, secs: u32) {
        self.secs.store(secs, Ordering::Relaxed);
    }
}

struct PowerInner {
    battery_raw: u16,
    temperature_raw: i16,
}

/// Simulated battery/temperature sampler
#[derive(Clone)]
pub struct SimPower {
    inner: Arc<Mutex<PowerInner>>,
}

impl SimPower {
    /// Raw 590 sits at the top of the capacity table (~100 %)
    pub fn new(battery_raw: u16, temperature_raw: i16) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PowerInner {
                battery_raw,
                temperature_raw,
            })),
        }
    }

    pub fn set_battery_raw(&self, raw: u16) {
        self.inner.lock().unwrap().battery_raw = raw;
    }

    pub fn set_temperature_raw(&self, raw: i16) {
        self.inner.lock().unwrap().temperature_raw = raw;
    }
}

impl PowerMonitor for SimPower {
    fn battery_raw(&mut self) -> u16 {
        self.inner.lock().unwrap().battery_raw
    }

    fn temperature_raw(&mut self) -> i16 {
        self.inner.lock().unwrap().temperature_raw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingOp {
    Write { slot: u16 },
    Clear { slot: u16, len: usize },
}

struct FlashInner {
    slot_size: usize,
    slots: Vec<Vec<u8>>,
    staged: Vec<(u16, Vec<u8>)>,
    pending: VecDeque<PendingOp>,
    fail_next_write: bool,
}

/// In-memory flash region with deferred write/erase completion
///
/// Writes and erases queue and take effect on a later [`BlockStorage::poll`],
/// one per call, mirroring the callback-per-operation flash controller the
/// firmware runs against. Erased bytes read back as 0xFF.
#[derive(Clone)]
pub struct MemoryFlash {
    inner: Arc<Mutex<FlashInner>>,
}

impl MemoryFlash {
    pub fn new(slot_count: u16, slot_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FlashInner {
                slot_size,
                slots: vec![vec![0xFF; slot_size]; slot_count as usize],
                staged: Vec::new(),
                pending: VecDeque::new(),
                fail_next_write: false,
            })),
        }
    }

    /// Make the next queued write report failure
    pub fn fail_next_write(&self) {
        self.inner.lock().unwrap().fail_next_write = true;
    }

    /// Direct slot inspection for tests
    pub fn slot(&self, slot: u16) -> Vec<u8> {
        self.inner.lock().unwrap().slots[slot as usize].clone()
    }
}

impl BlockStorage for MemoryFlash {
    fn slot_count(&self) -> u16 {
        self.inner.lock().unwrap().slots.len() as u16
    }

    fn slot_size(&self) -> usize {
        self.inner.lock().unwrap().slot_size
    }

    fn read(&self, slot: u16, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        let inner = self.inner.lock().unwrap();
        let data = inner
            .slots
            .get(slot as usize)
            .ok_or(StorageError::BadSlot(slot))?;
        let end = offset
            .checked_add(buf.len())
            .ok_or(StorageError::OutOfBounds {
                offset,
                len: buf.len(),
            })?;
        if end > data.len() {
            return Err(StorageError::OutOfBounds {
                offset,
                len: buf.len(),
            });
        }
        buf.copy_from_slice(&data[offset..end]);
        Ok(())
    }

    fn write(&mut self, slot: u16, data: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        if slot as usize >= inner.slots.len() {
            return Err(StorageError::BadSlot(slot));
        }
        if data.len() != inner.slot_size {
            return Err(StorageError::OutOfBounds {
                offset: 0,
                len: data.len(),
            });
        }
        inner.staged.push((slot, data.to_vec()));
        inner.pending.push_back(PendingOp::Write { slot });
        Ok(())
    }

    fn clear(&mut self, slot: u16, len: usize) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        if slot as usize >= inner.slots.len() {
            return Err(StorageError::BadSlot(slot));
        }
        inner.pending.push_back(PendingOp::Clear { slot, len });
        Ok(())
    }

    fn poll(&mut self) -> Option<StorageEvent> {
        let mut inner = self.inner.lock().unwrap();
        let op = inner.pending.pop_front()?;
        match op {
            PendingOp::Write { slot } => {
                let position = inner.staged.iter().position(|(s, _)| *s == slot)?;
                let (_, data) = inner.staged.remove(position);
                if inner.fail_next_write {
                    inner.fail_next_write = false;
                    return Some(StorageEvent::WriteDone { ok: false });
                }
                inner.slots[slot as usize].copy_from_slice(&data);
                Some(StorageEvent::WriteDone { ok: true })
            }
            PendingOp::Clear { slot, len } => {
                let slot_size = inner.slot_size;
                let span = len.div_ceil(slot_size);
                for index in 0..span {
                    let target = slot as usize + index;
                    if target < inner.slots.len() {
                        inner.slots[target].fill(0xFF);
                    }
                }
                Some(StorageEvent::ClearDone { ok: true })
            }
        }
    }

    fn busy(&self) -> bool {
        !self.inner.lock().unwrap().pending.is_empty()
    }
}

struct LinkInner {
    incoming: VecDeque<Vec<u8>>,
    outgoing: VecDeque<u8>,
    connected: bool,
    conn_interval: Option<u32>,
    radio_on: bool,
}

/// Loopback serial link: the test scripts packets in and reads replies out
#[derive(Clone)]
pub struct LoopbackLink {
    inner: Arc<Mutex<LinkInner>>,
}

impl Default for LoopbackLink {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackLink {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LinkInner {
                incoming: VecDeque::new(),
                outgoing: VecDeque::new(),
                connected: true,
                conn_interval: Some(crate::config::constants::link::CONN_INTERVAL_HIGH_SPEED_MS),
                radio_on: false,
            })),
        }
    }

    /// Queue one inbound command packet; dropped if the queue is full
    pub fn push_command(&self, text: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.incoming.len() < SERIAL_IN_QUEUE_LEN {
            inner.incoming.push_back(text.as_bytes().to_vec());
        }
    }

    /// Drain everything the firmware has sent
    pub fn take_output(&self) -> String {
        let mut inner = self.inner.lock().unwrap();
        let bytes: Vec<u8> = inner.outgoing.drain(..).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn set_connected(&self, connected: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = connected;
        if !connected {
            inner.conn_interval = None;
        }
    }

    pub fn has_input(&self) -> bool {
        !self.inner.lock().unwrap().incoming.is_empty()
    }

    pub fn radio_on(&self) -> bool {
        self.inner.lock().unwrap().radio_on
    }
}

impl SerialLink for LoopbackLink {
    fn send(&mut self, bytes: &[u8]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let room = SERIAL_OUT_QUEUE_LEN.saturating_sub(inner.outgoing.len());
        let take = room.min(bytes.len());
        inner.outgoing.extend(bytes[..take].iter().copied());
        take
    }

    fn receive(&mut self, buf: &mut [u8]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        match inner.incoming.pop_front() {
            Some(packet) => {
                let take = packet.len().min(buf.len());
                buf[..take].copy_from_slice(&packet[..take]);
                take
            }
            None => 0,
        }
    }

    fn free_space(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        SERIAL_OUT_QUEUE_LEN.saturating_sub(inner.outgoing.len())
    }

    fn connected(&self) -> bool {
        self.inner.lock().unwrap().connected
    }

    fn request_conn_interval(&mut self, ms: u32) {
        let mut inner = self.inner.lock().unwrap();
        if inner.connected {
            inner.conn_interval = Some(ms);
        }
    }

    fn conn_interval(&self) -> Option<u32> {
        self.inner.lock().unwrap().conn_interval
    }

    fn set_radio(&mut self, on: bool) {
        self.inner.lock().unwrap().radio_on = on;
    }
}

#[derive(Default)]
struct OutputsInner {
    led2: bool,
    led3: bool,
    motor: bool,
    motor_pulses: u32,
}

/// Records output pin states for assertions
#[derive(Clone, Default)]
pub struct RecordingOutputs {
    inner: Arc<Mutex<OutputsInner>>,
}

impl RecordingOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> (bool, bool, bool) {
        let inner = self.inner.lock().unwrap();
        (inner.led2, inner.led3, inner.motor)
    }

    /// Number of off-to-on motor transitions observed
    pub fn motor_pulses(&self) -> u32 {
        self.inner.lock().unwrap().motor_pulses
    }
}

impl Outputs for RecordingOutputs {
    fn led2(&mut self, on: bool) {
        self.inner.lock().unwrap().led2 = on;
    }

    fn led3(&mut self, on: bool) {
        self.inner.lock().unwrap().led3 = on;
    }

    fn motor(&mut self, on: bool) {
        let mut inner = self.inner.lock().unwrap();
        if on && !inner.motor {
            inner.motor_pulses += 1;
        }
        inner.motor = on;
    }
}
