// src/epoch/mod.rs
//! Epoch integration pipeline: per-sample magnitude, step detection,
//! window alignment and the flash-backed block store

pub mod block;
pub mod pedometer;
pub mod store;
pub mod svm;
pub mod window;

pub use block::{BlockInfo, EpochBlock, EpochSample};
pub use pedometer::Pedometer;
pub use store::EpochStore;
pub use svm::{sqrt_rounded, EpochAccumulator};
pub use window::EpochWindow;
