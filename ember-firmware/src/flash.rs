//! Persistent records in on-chip flash
//!
//! Uses sequential-storage for a wear-leveled key/value map in the last
//! 64 KB of flash. The controller's storage interface is blocking, so each
//! operation runs the async flash driver to completion in place.

use embassy_futures::block_on;
use embassy_rp::dma::Channel;
use embassy_rp::flash::{Async, Flash};
use embassy_rp::peripherals::FLASH;
use embassy_rp::Peri;
use ember_core::config::RECORD_MAX;
use ember_hal::flash::{FlashError, FlashStorage, StorageKey};
use sequential_storage::cache::NoCache;
use sequential_storage::map;

/// 2 MB flash on the controller board
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Record partition, excluded from the program image in memory.x
pub const RECORD_PARTITION_SIZE: usize = 64 * 1024;

/// Flash range of the record partition
pub const RECORD_RANGE: core::ops::Range<u32> =
    ((FLASH_SIZE - RECORD_PARTITION_SIZE) as u32)..(FLASH_SIZE as u32);

/// Room for the largest record plus the map's item header
const DATA_BUFFER: usize = RECORD_MAX + 64;

/// Flash-backed record storage
///
/// Jiffies stall while a sector is erased or written, since the flash
/// driver runs with interrupts disabled.
pub struct RecordFlash<'d> {
    flash: Flash<'d, FLASH, Async, FLASH_SIZE>,
    buffer: [u8; DATA_BUFFER],
}

impl<'d> RecordFlash<'d> {
    pub fn new(flash: Peri<'d, FLASH>, dma: Peri<'d, impl Channel>) -> Self {
        Self {
            flash: Flash::new(flash, dma),
            buffer: [0; DATA_BUFFER],
        }
    }
}

impl FlashStorage for RecordFlash<'_> {
    fn read(&mut self, key: StorageKey, buffer: &mut [u8]) -> Result<usize, FlashError> {
        let result = block_on(map::fetch_item::<StorageKey, &[u8], _>(
            &mut self.flash,
            RECORD_RANGE,
            &mut NoCache::new(),
            &mut self.buffer,
            &key,
        ));

        match result {
            Ok(Some(data)) => {
                let len = data.len();
                if buffer.len() < len {
                    return Err(FlashError::BufferTooSmall);
                }
                buffer[..len].copy_from_slice(data);
                Ok(len)
            }
            Ok(None) => Err(FlashError::NotFound),
            Err(_) => Err(FlashError::Storage),
        }
    }

    fn write(&mut self, key: StorageKey, data: &[u8]) -> Result<(), FlashError> {
        block_on(map::store_item(
            &mut self.flash,
            RECORD_RANGE,
            &mut NoCache::new(),
            &mut self.buffer,
            &key,
            &data,
        ))
        .map_err(|_| FlashError::Storage)
    }

    fn erase(&mut self, key: StorageKey) -> Result<(), FlashError> {
        block_on(map::remove_item(
            &mut self.flash,
            RECORD_RANGE,
            &mut NoCache::new(),
            &mut self.buffer,
            &key,
        ))
        .map_err(|_| FlashError::Storage)
    }
}
