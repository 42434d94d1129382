// src/error.rs
//! Unified error handling for the band firmware core
//!
//! The firmware distinguishes two failure classes. Recoverable problems
//! (malformed command input, out-of-range settings) never surface here; they
//! become short reply tokens or silent clamps at the point of use. Everything
//! in this module is the unrecoverable class: the hardware or the stored data
//! can no longer be trusted, and the only safe response is a device reset. All
//! such paths funnel through [`Fault`] with an identifying [`FaultCode`], the
//! moral equivalent of the one fault handler a release build reboots from.

use thiserror::Error;

/// Identifies which invariant was violated when a fault is raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    /// Synchronous NVM read failed; stored data cannot be reasoned about
    StorageRead,
    /// Asynchronous NVM write or erase reported failure
    StorageWrite,
    /// Compile-time record layout does not match the on-flash block size
    BlockLayout,
    /// Accelerometer absent when the logger was asked to start
    SensorMissing,
    /// An epoch window closed with zero integrated samples
    SensorSilent,
    /// Persisting the settings record failed; durability is assumed critical
    SettingsSave,
    /// Active block bookkeeping corrupted (append past capacity)
    BlockOverrun,
}

/// Fatal fault: carries the code plus optional context for post-mortem
#[derive(Debug, Clone, Error)]
#[error("fatal fault {code:?}: {context}")]
pub struct Fault {
    pub code: FaultCode,
    pub context: String,
}

impl Fault {
    pub fn new(code: FaultCode, context: impl Into<String>) -> Self {
        let fault = Self {
            code,
            context: context.into(),
        };
        tracing::error!(code = ?fault.code, context = %fault.context, "fault raised");
        fault
    }
}

/// Errors reported by hardware collaborators behind the HAL traits
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    #[error("device not present")]
    NotPresent,
    #[error("device busy")]
    Busy,
    #[error("unsupported configuration: {0}")]
    Unsupported(String),
    #[error("transfer failed: {0}")]
    Transfer(String),
}

/// Errors from the non-volatile block storage collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("slot {0} out of range")]
    BadSlot(u16),
    #[error("access beyond slot bounds: offset {offset} len {len}")]
    OutOfBounds { offset: usize, len: usize },
    #[error("operation already in flight")]
    Busy,
}

/// Crate-wide result alias
pub type BandResult<T> = Result<T, Fault>;
