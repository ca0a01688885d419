// Licensed under the Apache-2.0 license

//! Generic interface for flash storage access.

use core::result::Result;
use pdc_error::BootError;

/// Reading, programming and erasing arbitrary ranges of a flash device.
///
/// Addresses are absolute: internal flash uses system bus addresses, an
/// external device starts at 0. Programming can only clear bits, so a range
/// must be erased before it is written with new data.
pub trait FlashStorage {
    /// Read from the flash storage, filling the provided buffer with data
    fn read(&self, buffer: &mut [u8], address: usize) -> Result<(), FlashDrvError>;

    /// Program the full contents of the buffer, starting at the specified address.
    /// Both the address and the length must be multiples of [`Self::write_granularity`].
    fn write(&self, buffer: &[u8], address: usize) -> Result<(), FlashDrvError>;

    /// Erase `length` bytes starting at address `address`. The range must
    /// cover whole sectors of the device.
    fn erase(&self, address: usize, length: usize) -> Result<(), FlashDrvError>;

    /// Returns the size of the flash storage in bytes.
    fn capacity(&self) -> usize;

    /// Address of the first byte of the device.
    fn base_address(&self) -> usize {
        0
    }

    /// Smallest unit the device can program, in bytes.
    fn write_granularity(&self) -> usize {
        1
    }

    /// True if `[address, address + length)` lies inside the device.
    fn contains(&self, address: usize, length: usize) -> bool {
        let base = self.base_address();
        address >= base
            && address
                .checked_add(length)
                .is_some_and(|end| end <= base + self.capacity())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum FlashDrvError {
    /// Generic failure condition
    FAIL = 1,
    /// Underlying system is busy, or stayed busy past the driver's timeout
    BUSY = 2,
    /// An invalid parameter was passed
    INVAL = 6,
    /// Parameter passed was too large
    SIZE = 7,
    /// Operation is not supported
    NOSUPPORT = 10,
}

impl From<FlashDrvError> for usize {
    fn from(err: FlashDrvError) -> usize {
        err as usize
    }
}

impl From<FlashDrvError> for BootError {
    fn from(_: FlashDrvError) -> BootError {
        BootError::Flash
    }
}
