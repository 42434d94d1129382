// src/hal/mod.rs
//! Hardware abstraction layer: trait seams plus host simulators

pub mod sim;
pub mod traits;
pub mod types;

pub use sim::{
    LoopbackLink, MemoryFlash, MotionPattern, RecordingOutputs, SimAccel, SimAccelConfig,
    SimClock, SimPower,
};
pub use traits::{Accelerometer, BlockStorage, Clock, Outputs, PowerMonitor, SerialLink};
pub use types::{AccelSample, EventFlags, StorageEvent};
