// src/epoch/store.rs
//! Flash-backed circular block store for epoch records
//!
//! One 512-byte block is filled in RAM and committed to the next NVM
//! slot when full. Writes and the bulk erase complete asynchronously;
//! [`EpochStore::service`] drains the completion events each scheduler
//! pass. Boot scans the region for the highest-numbered valid block and
//! resumes logging in the following slot.

use tracing::{debug, info, warn};

use crate::config::constants::epoch::{
    BLOCK_FORMAT_EPOCH_DATA_V2, EPOCH_BLOCK_INDEX_INVALID, EPOCH_BLOCK_NUMBER_LAST,
    EPOCH_NVM_BLOCK_SIZE, EPOCH_NVM_SIZE_TOTAL,
};
use crate::epoch::block::{BlockInfo, EpochBlock, EpochSample};
use crate::error::{BandResult, Fault, FaultCode};
use crate::hal::traits::BlockStorage;
use crate::hal::types::StorageEvent;

pub struct EpochStore {
    storage: Box<dyn BlockStorage>,
    active: EpochBlock,
    active_index: u16,
}

impl EpochStore {
    /// Attach to a storage region and find the resume position
    pub fn new(storage: Box<dyn BlockStorage>) -> BandResult<Self> {
        if storage.slot_size() != EPOCH_NVM_BLOCK_SIZE {
            return Err(Fault::new(
                FaultCode::BlockLayout,
                format!("slot size {} expected {}", storage.slot_size(), EPOCH_NVM_BLOCK_SIZE),
            ));
        }
        let mut store = Self {
            storage,
            active: EpochBlock::default(),
            active_index: EPOCH_BLOCK_INDEX_INVALID,
        };
        store.scan_resume_position()?;
        Ok(store)
    }

    /// Scan every slot's info tag for the highest valid block number
    fn scan_resume_position(&mut self) -> BandResult<()> {
        let count = self.storage.slot_count();
        let mut index_start = EPOCH_BLOCK_INDEX_INVALID;
        let mut max_block_num: u16 = 0;
        let mut scan_ok = true;
        for index in 0..count {
            let mut raw = [0u8; BlockInfo::SIZE];
            if let Err(err) = self.storage.read(index, 0, &mut raw) {
                warn!(%err, index, "info tag read failed, restarting region at slot 0");
                scan_ok = false;
                break;
            }
            let info = BlockInfo::from_bytes(&raw);
            // Erased and torn slots carry out-of-range numbers
            if info.block_number > EPOCH_BLOCK_NUMBER_LAST {
                continue;
            }
            // Strict compare against the seed leaves a lone block 0
            // invisible to the scan
            if info.block_number > max_block_num {
                index_start = index;
                max_block_num = info.block_number;
            }
        }

        let (mut active_index, mut block_number) =
            if scan_ok && index_start < count && max_block_num < EPOCH_BLOCK_NUMBER_LAST {
                (index_start + 1, max_block_num + 1)
            } else {
                // Startup state: zeroed or fully erased region
                (0, 0)
            };
        if active_index >= count {
            active_index = 0;
        }
        if block_number > EPOCH_BLOCK_NUMBER_LAST {
            block_number = 0;
        }

        self.active = EpochBlock::fresh(block_number);
        self.active_index = active_index;
        info!(active_index, block_number, "block store resume position");
        Ok(())
    }

    pub fn block_count(&self) -> u16 {
        self.storage.slot_count()
    }

    pub fn active_index(&self) -> u16 {
        self.active_index
    }

    pub fn active_info(&self) -> BlockInfo {
        self.active.info
    }

    /// True while a write or erase has not yet completed
    pub fn flash_busy(&self) -> bool {
        self.storage.busy()
    }

    /// Zero the active block's sample cursor before a logging session
    pub fn reset_active_length(&mut self) {
        self.active.info.data_length = 0;
    }

    /// Append one epoch record; flushes to flash when the block fills
    pub fn add(&mut self, sample: EpochSample, close_time: u32, period: u16) -> BandResult<()> {
        if self.active_index == EPOCH_BLOCK_INDEX_INVALID {
            return Ok(());
        }
        if self.active.is_full() {
            // A full block means the previous flush never completed
            return Err(Fault::new(
                FaultCode::BlockOverrun,
                format!("append to full block {}", self.active.info.block_number),
            ));
        }
        if self.active.info.data_length == 0 {
            // First record stamps the block header
            self.active.info.time_stamp = close_time;
            self.active.format = BLOCK_FORMAT_EPOCH_DATA_V2;
            self.active.epoch_period = period;
            self.active.meta = [0; crate::epoch::block::META_DATA_LEN];
        }
        let slot = self.active.info.data_length as usize;
        self.active.samples[slot] = sample;
        self.active.info.data_length += 1;
        if self.active.is_full() {
            self.flush()?;
        }
        Ok(())
    }

    /// Checksum the active block and queue it for its NVM slot
    pub fn flush(&mut self) -> BandResult<()> {
        if self.active_index >= self.storage.slot_count() {
            return Ok(());
        }
        let bytes = self.active.to_bytes_checked();
        debug!(
            index = self.active_index,
            block_number = self.active.info.block_number,
            samples = self.active.info.data_length,
            "queueing block write"
        );
        self.storage
            .write(self.active_index, &bytes)
            .map_err(|err| {
                Fault::new(FaultCode::StorageWrite, format!("block write request: {err}"))
            })
    }

    /// Flush the active block if it holds any records
    pub fn flush_partial(&mut self) -> BandResult<()> {
        if self.active.info.data_length > 0 {
            self.flush()?;
        }
        Ok(())
    }

    /// Queue erasure of the whole region and restart at slot 0, block 0
    pub fn clear_all(&mut self) -> BandResult<()> {
        self.active_index = 0;
        self.active = EpochBlock::default();
        self.storage
            .clear(0, EPOCH_NVM_SIZE_TOTAL)
            .map_err(|err| {
                Fault::new(FaultCode::StorageWrite, format!("region clear request: {err}"))
            })
    }

    /// Read `dest.len()` bytes at `offset` within the indexed block
    ///
    /// The active block reads from RAM with a placeholder checksum so
    /// the retrieval command can show in-progress data.
    pub fn read_block(&mut self, dest: &mut [u8], offset: usize, index: u16) -> BandResult<()> {
        if index == self.active_index {
            self.active.check = 0xFFFF;
            let bytes = self.active.to_bytes();
            let end = offset + dest.len();
            if end > bytes.len() {
                return Err(Fault::new(
                    FaultCode::StorageRead,
                    format!("active block read beyond end: offset {offset}"),
                ));
            }
            dest.copy_from_slice(&bytes[offset..end]);
            Ok(())
        } else {
            self.storage.read(index, offset, dest).map_err(|err| {
                Fault::new(FaultCode::StorageRead, format!("block {index} read: {err}"))
            })
        }
    }

    /// Drain one storage completion event, advancing the write cursor
    pub fn service(&mut self) -> BandResult<()> {
        match self.storage.poll() {
            Some(StorageEvent::WriteDone { ok: true }) => {
                let mut next = self.active.info.block_number.wrapping_add(1);
                if next > EPOCH_BLOCK_NUMBER_LAST {
                    next = 0;
                }
                self.active = EpochBlock::fresh(next);
                self.active_index += 1;
                if self.active_index >= self.storage.slot_count() {
                    self.active_index = 0;
                }
                debug!(
                    index = self.active_index,
                    block_number = next,
                    "block committed, cursor advanced"
                );
                Ok(())
            }
            Some(StorageEvent::WriteDone { ok: false }) => Err(Fault::new(
                FaultCode::StorageWrite,
                format!("block {} write failed", self.active.info.block_number),
            )),
            Some(StorageEvent::ClearDone { ok }) => {
                if ok && self.active.info.data_length != 0 {
                    // Erase-before-write path: commit the held block now
                    self.flush()?;
                } else if !ok {
                    warn!("region clear reported failure");
                }
                Ok(())
            }
            None => Ok(()),
        }
    }
}
