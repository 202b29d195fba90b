//! Flash-backed recipe region
//!
//! The controller works on a RAM image of the region. The image is kept as
//! a single sequential-storage map item in the last 64KB of flash and is
//! rewritten whenever the controller has changed a cell.

use embassy_rp::dma::Channel;
use embassy_rp::flash::{Async, Flash};
use embassy_rp::peripherals::FLASH;
use embassy_rp::Peri;
use sequential_storage::cache::NoCache;
use sequential_storage::map;

use mashtun_core::traits::MemEeprom;

/// Flash storage configuration
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;
pub const REGION_PARTITION_SIZE: usize = 64 * 1024;
pub const REGION_PARTITION_START: usize = FLASH_SIZE - REGION_PARTITION_SIZE;

/// Flash range for the region partition
pub const REGION_RANGE: core::ops::Range<u32> =
    (REGION_PARTITION_START as u32)..(FLASH_SIZE as u32);

/// Size of the persistent recipe region in bytes
pub const REGION_SIZE: usize = 2048;

/// Map key of the region image
const REGION_KEY: u8 = 0;

/// Item buffer: region image plus key and item header
const ITEM_BUFFER_SIZE: usize = REGION_SIZE + 32;

/// RAM image the controller reads and writes
pub type RegionImage = MemEeprom<REGION_SIZE>;

/// Region persistence errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// sequential-storage operation failed
    Storage,
    /// Stored item is not a region image
    SizeMismatch,
}

/// Region partition of the RP2040 flash
pub struct RegionFlash<'d> {
    flash: Flash<'d, FLASH, Async, FLASH_SIZE>,
}

impl<'d> RegionFlash<'d> {
    pub fn new(flash: Peri<'d, FLASH>, dma: Peri<'d, impl Channel>) -> Self {
        Self {
            flash: Flash::new(flash, dma),
        }
    }

    /// Load the saved image, `None` on a board that never saved one
    pub async fn load(&mut self) -> Result<Option<RegionImage>, FlashError> {
        let mut buffer = [0u8; ITEM_BUFFER_SIZE];

        let result = map::fetch_item::<u8, &[u8], _>(
            &mut self.flash,
            REGION_RANGE,
            &mut NoCache::new(),
            &mut buffer,
            &REGION_KEY,
        )
        .await;

        match result {
            Ok(Some(data)) => {
                let mut cells = [0xFF; REGION_SIZE];
                if data.len() != cells.len() {
                    return Err(FlashError::SizeMismatch);
                }
                cells.copy_from_slice(data);
                Ok(Some(RegionImage::from_image(cells)))
            }
            Ok(None) => Ok(None),
            Err(_) => Err(FlashError::Storage),
        }
    }

    /// Store a new image
    pub async fn save(&mut self, image: &[u8]) -> Result<(), FlashError> {
        let mut buffer = [0u8; ITEM_BUFFER_SIZE];

        map::store_item(
            &mut self.flash,
            REGION_RANGE,
            &mut NoCache::new(),
            &mut buffer,
            &REGION_KEY,
            &image,
        )
        .await
        .map_err(|_| FlashError::Storage)
    }
}
