// src/epoch/block.rs
//! Epoch sample and 512-byte block wire layout
//!
//! Block layout, little endian throughout:
//! info tag (8) + format (2) + epoch period (2) + meta (18) +
//! 60 samples of 8 bytes (480) + checksum (2) = 512.
//! The checksum makes the whole block sum to zero over 16-bit words.

use crate::config::constants::epoch::{
    BLOCK_FORMAT_EPOCH_DATA, EPOCH_BLOCK_DATA_COUNT, EPOCH_NVM_BLOCK_SIZE,
};

/// One logged data point, 8 bytes on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EpochSample {
    /// Battery percent
    pub batt: u8,
    /// Temperature, whole degrees C
    pub temp: i8,
    /// Sensor event source bits; the top two bits carry step count
    /// overflow so ten bits of steps fit the record
    pub accel: u8,
    /// Step count, low eight bits
    pub steps: u8,
    /// Integrated magnitude normalized to per-second
    pub svm: u32,
}

impl EpochSample {
    pub const SIZE: usize = 8;

    /// Pack a window's values, spilling step bits 8..=9 into the unused
    /// top of the event byte
    pub fn pack(batt: u8, temp: i8, events: u8, steps: u16, svm: u32) -> Self {
        let accel = (events & 0x3F) | (((steps >> 2) as u8) & 0xC0);
        Self {
            batt,
            temp,
            accel,
            steps: steps as u8,
            svm,
        }
    }

    /// Recover the ten-bit step count
    pub fn step_count(&self) -> u16 {
        self.steps as u16 | (((self.accel & 0xC0) as u16) << 2)
    }

    /// Event source bits without the step overflow
    pub fn event_bits(&self) -> u8 {
        self.accel & 0x3F
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0] = self.batt;
        out[1] = self.temp as u8;
        out[2] = self.accel;
        out[3] = self.steps;
        out[4..8].copy_from_slice(&self.svm.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            batt: bytes[0],
            temp: bytes[1] as i8,
            accel: bytes[2],
            steps: bytes[3],
            svm: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

/// Tag at the start of each block, 8 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockInfo {
    pub block_number: u16,
    pub data_length: u16,
    pub time_stamp: u32,
}

impl BlockInfo {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.block_number.to_le_bytes());
        out[2..4].copy_from_slice(&self.data_length.to_le_bytes());
        out[4..8].copy_from_slice(&self.time_stamp.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            block_number: u16::from_le_bytes([bytes[0], bytes[1]]),
            data_length: u16::from_le_bytes([bytes[2], bytes[3]]),
            time_stamp: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        }
    }
}

pub const META_DATA_LEN: usize = 18;

/// The in-RAM active block being filled before a flash commit
#[derive(Debug, Clone)]
pub struct EpochBlock {
    pub info: BlockInfo,
    pub format: u16,
    pub epoch_period: u16,
    pub meta: [u8; META_DATA_LEN],
    pub samples: [EpochSample; EPOCH_BLOCK_DATA_COUNT],
    pub check: u16,
}

impl Default for EpochBlock {
    fn default() -> Self {
        Self {
            info: BlockInfo::default(),
            format: BLOCK_FORMAT_EPOCH_DATA,
            epoch_period: 0,
            meta: [0; META_DATA_LEN],
            samples: [EpochSample::default(); EPOCH_BLOCK_DATA_COUNT],
            check: 0,
        }
    }
}

impl EpochBlock {
    /// Zero everything but keep a block number
    pub fn fresh(block_number: u16) -> Self {
        let mut block = Self::default();
        block.info.block_number = block_number;
        block
    }

    pub fn is_full(&self) -> bool {
        self.info.data_length as usize >= EPOCH_BLOCK_DATA_COUNT
    }

    /// Serialize with the stored `check` field as-is
    pub fn to_bytes(&self) -> [u8; EPOCH_NVM_BLOCK_SIZE] {
        let mut out = [0u8; EPOCH_NVM_BLOCK_SIZE];
        out[0..8].copy_from_slice(&self.info.to_bytes());
        out[8..10].copy_from_slice(&self.format.to_le_bytes());
        out[10..12].copy_from_slice(&self.epoch_period.to_le_bytes());
        out[12..30].copy_from_slice(&self.meta);
        for (index, sample) in self.samples.iter().enumerate() {
            let start = 30 + index * EpochSample::SIZE;
            out[start..start + EpochSample::SIZE].copy_from_slice(&sample.to_bytes());
        }
        out[510..512].copy_from_slice(&self.check.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; EPOCH_NVM_BLOCK_SIZE]) -> Self {
        let mut info_raw = [0u8; BlockInfo::SIZE];
        info_raw.copy_from_slice(&bytes[0..8]);
        let mut samples = [EpochSample::default(); EPOCH_BLOCK_DATA_COUNT];
        for (index, sample) in samples.iter_mut().enumerate() {
            let start = 30 + index * EpochSample::SIZE;
            let mut raw = [0u8; EpochSample::SIZE];
            raw.copy_from_slice(&bytes[start..start + EpochSample::SIZE]);
            *sample = EpochSample::from_bytes(&raw);
        }
        let mut meta = [0u8; META_DATA_LEN];
        meta.copy_from_slice(&bytes[12..30]);
        Self {
            info: BlockInfo::from_bytes(&info_raw),
            format: u16::from_le_bytes([bytes[8], bytes[9]]),
            epoch_period: u16::from_le_bytes([bytes[10], bytes[11]]),
            meta,
            samples,
            check: u16::from_le_bytes([bytes[510], bytes[511]]),
        }
    }

    /// Compute and store the checksum, then serialize
    pub fn to_bytes_checked(&mut self) -> [u8; EPOCH_NVM_BLOCK_SIZE] {
        self.check = 0;
        let bytes = self.to_bytes();
        self.check = block_checksum(&bytes);
        self.to_bytes()
    }
}

/// Sum the first 510 bytes as little-endian 16-bit words and negate, so
/// a valid block sums to zero over all 256 words
pub fn block_checksum(bytes: &[u8; EPOCH_NVM_BLOCK_SIZE]) -> u16 {
    let mut check: u16 = 0;
    for pair in bytes[..510].chunks_exact(2) {
        check = check.wrapping_add(u16::from_le_bytes([pair[0], pair[1]]));
    }
    (!check).wrapping_add(1)
}

/// Verify a serialized block sums to zero
pub fn block_valid(bytes: &[u8; EPOCH_NVM_BLOCK_SIZE]) -> bool {
    let mut sum: u16 = 0;
    for pair in bytes.chunks_exact(2) {
        sum = sum.wrapping_add(u16::from_le_bytes([pair[0], pair[1]]));
    }
    sum == 0
}
