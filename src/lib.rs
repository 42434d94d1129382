// src/lib.rs
//! band-core: wearable activity band firmware core
//!
//! Host-portable implementation of the band firmware logic:
//!
//! - Epoch energy-expenditure integration and step counting
//! - Flash-backed circular block storage with asynchronous writes
//! - The application state machine (battery, logging, streaming)
//! - The single-letter ASCII command channel over the wireless link
//! - Hardware trait seams with full-fidelity simulators for testing
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use band_core::app::{Band, BandHardware};
//! use band_core::hal::sim::{
//!     LoopbackLink, MemoryFlash, RecordingOutputs, SimAccel, SimAccelConfig, SimClock, SimPower,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let clock = SimClock::new(1000);
//!     let accel = SimAccel::new(SimAccelConfig::default());
//!     let mut band = Band::new(BandHardware {
//!         accel: Box::new(accel.clone()),
//!         clock: Box::new(clock.clone()),
//!         power: Box::new(SimPower::new(585, 84)),
//!         link: Box::new(LoopbackLink::new()),
//!         outputs: Box::new(RecordingOutputs::new()),
//!         data_flash: Box::new(MemoryFlash::new(128, 512)),
//!         settings_flash: Box::new(MemoryFlash::new(1, 1024)),
//!         device_address: [0x11, 0x22, 0x33, 0x44, 0x55, 0x06],
//!     })?;
//!     loop {
//!         clock.advance(1);
//!         accel.feed(50);
//!         band.tick_second()?;
//!     }
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod app;
pub mod config;
pub mod epoch;
pub mod error;
pub mod hal;
pub mod logger;
pub mod protocol;

// Re-export commonly used types for convenience
pub use app::{Band, BandHardware};
pub use config::{AppState, Settings, Status};
pub use epoch::{EpochBlock, EpochSample, EpochStore, EpochWindow, Pedometer};
pub use error::{BandResult, Fault, FaultCode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
