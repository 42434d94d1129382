// src/hal/traits.rs
//! Trait seams for the hardware collaborators
//!
//! The epoch/pedometer core and the application state machine depend only on
//! these interfaces; register-level drivers, the wireless stack and the flash
//! controller live on the far side. Host simulators implement every trait so
//! the full firmware behavior runs in tests.

use crate::error::{HalError, StorageError};
use crate::hal::types::{AccelSample, EventFlags, StorageEvent};

/// Triaxial accelerometer with a hardware FIFO and latched event sources
pub trait Accelerometer {
    /// Probe the device id; false means absent or not responding
    fn present(&mut self) -> bool;

    /// Apply rate (Hz) and range (g) before starting
    fn configure(&mut self, rate: u16, range: u8) -> Result<(), HalError>;

    /// Begin sampling into the FIFO
    fn start(&mut self) -> Result<(), HalError>;

    /// Power the sensor down to its lowest-power state
    fn shutdown(&mut self);

    /// Read the most recent single sample
    fn read_sample(&mut self) -> Result<AccelSample, HalError>;

    /// Drain up to `max` samples from the FIFO
    fn read_fifo(&mut self, max: usize) -> Result<Vec<AccelSample>, HalError>;

    /// Read and clear the latched event source registers
    fn read_events(&mut self) -> Result<EventFlags, HalError>;

    /// Enable or disable interrupt-pin event generation
    fn set_interrupts(&mut self, enable: bool);

    /// Level of the interrupt pins right now (pin1, pin2); used to re-check
    /// for events that fired while a handler was running
    fn pin_levels(&self) -> (bool, bool);
}

/// Seconds-resolution device clock (RTC-backed on hardware)
pub trait Clock {
    fn now(&self) -> u32;
    fn set(&mut self, secs: u32);
}

/// Battery and die-temperature sampler
pub trait PowerMonitor {
    /// Raw battery ADC reading
    fn battery_raw(&mut self) -> u16;
    /// Raw temperature in 0.25 degree steps
    fn temperature_raw(&mut self) -> i16;
}

/// Byte transport tunneled over the wireless serial service
///
/// `send` returns the number of bytes actually queued; a full outgoing buffer
/// is not an error, streaming callers drop data instead of blocking.
pub trait SerialLink {
    fn send(&mut self, bytes: &[u8]) -> usize;
    fn receive(&mut self, buf: &mut [u8]) -> usize;
    /// Space remaining in the outgoing queue
    fn free_space(&self) -> usize;
    fn connected(&self) -> bool;
    /// Request a new connection interval from the peer, milliseconds
    fn request_conn_interval(&mut self, ms: u32);
    /// Negotiated connection interval, None when disconnected
    fn conn_interval(&self) -> Option<u32>;
    /// Start or stop radio presence (advertising when unconnected)
    fn set_radio(&mut self, on: bool);
}

/// Non-volatile block storage with asynchronous write/erase completion
///
/// Reads are synchronous. Writes and erases are queued and complete later;
/// the owner polls [`BlockStorage::poll`] from scheduler context and must not
/// issue a second operation while [`BlockStorage::busy`] is true.
pub trait BlockStorage {
    /// Number of equally-sized slots in the registered region
    fn slot_count(&self) -> u16;

    /// Size of one slot in bytes
    fn slot_size(&self) -> usize;

    /// Synchronous read of `buf.len()` bytes from `offset` within a slot
    fn read(&self, slot: u16, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Queue an asynchronous whole-slot write
    fn write(&mut self, slot: u16, data: &[u8]) -> Result<(), StorageError>;

    /// Queue an asynchronous erase of `len` bytes starting at `slot`
    fn clear(&mut self, slot: u16, len: usize) -> Result<(), StorageError>;

    /// Take the next completion event, if one has fired
    fn poll(&mut self) -> Option<StorageEvent>;

    /// An operation is still in flight
    fn busy(&self) -> bool;
}

/// Discrete outputs: two indicator LEDs and the vibration motor
pub trait Outputs {
    fn led2(&mut self, on: bool);
    fn led3(&mut self, on: bool);
    fn motor(&mut self, on: bool);
}
