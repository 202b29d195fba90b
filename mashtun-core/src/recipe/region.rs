//! In-RAM image of the persistent byte region
//!
//! The recipe store edits this image; [`Region::flush`] pushes the changed
//! window back to the storage device one cell at a time, skipping cells whose
//! content already matches.

use core::ops::Range;

use heapless::Vec;

use crate::config::{MAX_REGION_SIZE, MIN_REGION_SIZE};
use crate::error::Error;
use crate::traits::Eeprom;

/// Value of an erased (free) cell
pub const ERASED: u8 = 0xFF;

/// Fixed-capacity byte image with dirty-window tracking
#[derive(Debug, Clone)]
pub struct Region {
    bytes: Vec<u8, MAX_REGION_SIZE>,
    dirty: Option<Range<usize>>,
}

impl Region {
    /// Create an erased image of `capacity` bytes
    ///
    /// The whole image starts dirty so the first flush formats the device.
    pub fn erased(capacity: usize) -> Result<Self, Error> {
        if !(MIN_REGION_SIZE..=MAX_REGION_SIZE).contains(&capacity) {
            return Err(Error::InvalidArgument);
        }

        let mut bytes = Vec::new();
        bytes
            .resize(capacity, ERASED)
            .map_err(|_| Error::InvalidArgument)?;

        Ok(Self {
            bytes,
            dirty: Some(0..capacity),
        })
    }

    /// Read the device into a new image
    ///
    /// Devices larger than [`MAX_REGION_SIZE`] are mirrored up to that size.
    pub fn load<E: Eeprom>(eeprom: &E) -> Result<Self, Error> {
        let capacity = eeprom.capacity().min(MAX_REGION_SIZE);
        let mut region = Self::erased(capacity)?;

        for (addr, cell) in region.bytes.iter_mut().enumerate() {
            *cell = eeprom.read(addr)?;
        }
        region.dirty = None;

        Ok(region)
    }

    /// Write changed cells back to the device
    ///
    /// Returns the number of cells actually written. On failure the dirty
    /// window is kept so a later flush retries it.
    pub fn flush<E: Eeprom>(&mut self, eeprom: &mut E) -> Result<usize, Error> {
        let Some(dirty) = self.dirty.take() else {
            return Ok(0);
        };

        let mut written = 0;
        for addr in dirty.clone() {
            match eeprom.update(addr, self.bytes[addr]) {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => {
                    self.dirty = Some(dirty);
                    return Err(e.into());
                }
            }
        }

        Ok(written)
    }

    /// Size of the image in bytes
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Raw image content
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Read one cell
    pub fn get(&self, addr: usize) -> Option<u8> {
        self.bytes.get(addr).copied()
    }

    /// Check if the image holds changes not yet flushed
    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    /// Overwrite bytes starting at `addr`
    pub fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), Error> {
        let end = addr.checked_add(data.len()).ok_or(Error::Full)?;
        let target = self.bytes.get_mut(addr..end).ok_or(Error::Full)?;
        target.copy_from_slice(data);
        self.mark_dirty(addr..end);
        Ok(())
    }

    /// Set every byte in `range` to `value`
    pub fn fill(&mut self, range: Range<usize>, value: u8) -> Result<(), Error> {
        let target = self.bytes.get_mut(range.clone()).ok_or(Error::Full)?;
        target.fill(value);
        self.mark_dirty(range);
        Ok(())
    }

    /// Move `range` by `delta` bytes (positive = toward the end)
    ///
    /// Source and destination may overlap. Bytes uncovered by the move keep
    /// their old content; callers erase them if needed.
    pub fn shift(&mut self, range: Range<usize>, delta: isize) -> Result<(), Error> {
        if range.start > range.end || range.end > self.bytes.len() {
            return Err(Error::Full);
        }

        let dest = range
            .start
            .checked_add_signed(delta)
            .ok_or(Error::Full)?;
        let dest_end = dest.checked_add(range.len()).ok_or(Error::Full)?;
        if dest_end > self.bytes.len() {
            return Err(Error::Full);
        }

        self.bytes.copy_within(range.clone(), dest);
        self.mark_dirty(range.start.min(dest)..range.end.max(dest_end));
        Ok(())
    }

    fn mark_dirty(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        self.dirty = Some(match self.dirty.take() {
            Some(d) => d.start.min(range.start)..d.end.max(range.end),
            None => range,
        });
    }
}
