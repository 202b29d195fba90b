//! Byte-addressable persistent storage
//!
//! Models a small EEPROM (or an emulation of one): individual cells can be
//! read and rewritten in place.

use crate::error::Error;

/// Errors from persistent storage operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Address beyond the device capacity
    OutOfBounds,
    /// Device rejected the write
    WriteFailed,
}

impl From<StorageError> for Error {
    fn from(_: StorageError) -> Self {
        Error::CorruptStore
    }
}

/// Trait for byte-addressable persistent storage
pub trait Eeprom {
    /// Size of the device in bytes
    fn capacity(&self) -> usize;

    /// Read one cell
    fn read(&self, addr: usize) -> Result<u8, StorageError>;

    /// Write one cell
    fn write(&mut self, addr: usize, byte: u8) -> Result<(), StorageError>;

    /// Write one cell only if its content differs
    ///
    /// Returns whether a write happened.
    fn update(&mut self, addr: usize, byte: u8) -> Result<bool, StorageError> {
        if self.read(addr)? == byte {
            return Ok(false);
        }
        self.write(addr, byte)?;
        Ok(true)
    }
}

/// RAM-backed storage for hosts and tests
///
/// Starts erased (`0xFF`), like a fresh device.
#[derive(Debug, Clone)]
pub struct MemEeprom<const N: usize> {
    cells: [u8; N],
    writes: usize,
}

impl<const N: usize> MemEeprom<N> {
    /// Create an erased device
    pub const fn new() -> Self {
        Self {
            cells: [0xFF; N],
            writes: 0,
        }
    }

    /// Create a device holding a previously saved image
    pub const fn from_image(cells: [u8; N]) -> Self {
        Self { cells, writes: 0 }
    }

    /// Raw device content
    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    /// Number of cell writes performed so far
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl<const N: usize> Default for MemEeprom<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Eeprom for MemEeprom<N> {
    fn capacity(&self) -> usize {
        N
    }

    fn read(&self, addr: usize) -> Result<u8, StorageError> {
        self.cells.get(addr).copied().ok_or(StorageError::OutOfBounds)
    }

    fn write(&mut self, addr: usize, byte: u8) -> Result<(), StorageError> {
        let cell = self.cells.get_mut(addr).ok_or(StorageError::OutOfBounds)?;
        *cell = byte;
        self.writes += 1;
        Ok(())
    }
}
