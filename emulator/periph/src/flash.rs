// Licensed under the Apache-2.0 license

//! Memory-mapped NOR flash emulation.
//!
//! Programming clears bits only (new = old & data) and erasing sets a whole
//! sector to 0xff, like the real part. Faults can be injected into program,
//! erase and read operations.

use pdc_boot_common::flash::{FlashDrvError, FlashStorage};
use pdc_image::ERASED_BYTE;
use std::cell::{Cell, RefCell};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlashStats {
    pub reads: usize,
    pub writes: usize,
    pub erases: usize,
    pub bytes_written: usize,
}

#[derive(Default)]
struct FaultPlan {
    /// Program operations that still succeed before every further one fails.
    writes_before_failure: Option<usize>,
    /// Erasing a range containing this address fails.
    erase_failure_at: Option<usize>,
    reads_fail: bool,
}

pub struct EmulatedFlash {
    base: usize,
    sector_size: usize,
    write_granularity: usize,
    data: RefCell<Vec<u8>>,
    faults: RefCell<FaultPlan>,
    stats: Cell<FlashStats>,
}

impl EmulatedFlash {
    /// An erased device of `size` bytes mapped at `base`.
    pub fn new(base: usize, size: usize, sector_size: usize) -> Self {
        Self {
            base,
            sector_size,
            write_granularity: 1,
            data: RefCell::new(vec![ERASED_BYTE; size]),
            faults: RefCell::new(FaultPlan::default()),
            stats: Cell::new(FlashStats::default()),
        }
    }

    pub fn with_write_granularity(mut self, granularity: usize) -> Self {
        self.write_granularity = granularity;
        self
    }

    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn offset(&self, address: usize, len: usize) -> Result<usize, FlashDrvError> {
        if self.contains(address, len) {
            Ok(address - self.base)
        } else {
            Err(FlashDrvError::SIZE)
        }
    }

    /// Stores `bytes` at `address` as a programmer would, ignoring the
    /// erase state. Panics if the range is outside the device.
    pub fn load(&self, address: usize, bytes: &[u8]) {
        let start = address - self.base;
        self.data.borrow_mut()[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Copy of `len` bytes starting at `address`.
    pub fn contents(&self, address: usize, len: usize) -> Vec<u8> {
        let start = address - self.base;
        self.data.borrow()[start..start + len].to_vec()
    }

    /// Flips the lowest bit of the byte at `address`.
    pub fn corrupt(&self, address: usize) {
        self.data.borrow_mut()[address - self.base] ^= 0x01;
    }

    /// Lets `count` more program operations succeed, then fails all others.
    pub fn fail_writes_after(&self, count: usize) {
        self.faults.borrow_mut().writes_before_failure = Some(count);
    }

    pub fn fail_erase_at(&self, address: usize) {
        self.faults.borrow_mut().erase_failure_at = Some(address);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.faults.borrow_mut().reads_fail = fail;
    }

    pub fn clear_faults(&self) {
        *self.faults.borrow_mut() = FaultPlan::default();
    }

    pub fn stats(&self) -> FlashStats {
        self.stats.get()
    }

    pub fn reset_stats(&self) {
        self.stats.set(FlashStats::default());
    }

    fn update_stats(&self, f: impl FnOnce(&mut FlashStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl FlashStorage for EmulatedFlash {
    fn read(&self, buffer: &mut [u8], address: usize) -> Result<(), FlashDrvError> {
        let start = self.offset(address, buffer.len())?;
        if self.faults.borrow().reads_fail {
            return Err(FlashDrvError::FAIL);
        }
        buffer.copy_from_slice(&self.data.borrow()[start..start + buffer.len()]);
        self.update_stats(|s| s.reads += 1);
        Ok(())
    }

    fn write(&self, buffer: &[u8], address: usize) -> Result<(), FlashDrvError> {
        let start = self.offset(address, buffer.len())?;
        if address % self.write_granularity != 0 || buffer.len() % self.write_granularity != 0 {
            return Err(FlashDrvError::INVAL);
        }
        {
            let mut faults = self.faults.borrow_mut();
            match faults.writes_before_failure {
                Some(0) => return Err(FlashDrvError::FAIL),
                Some(ref mut remaining) => *remaining -= 1,
                None => {}
            }
        }
        let mut data = self.data.borrow_mut();
        for (cell, byte) in data[start..start + buffer.len()].iter_mut().zip(buffer) {
            *cell &= *byte;
        }
        self.update_stats(|s| {
            s.writes += 1;
            s.bytes_written += buffer.len();
        });
        Ok(())
    }

    fn erase(&self, address: usize, length: usize) -> Result<(), FlashDrvError> {
        let start = self.offset(address, length)?;
        if address % self.sector_size != 0 || length % self.sector_size != 0 {
            return Err(FlashDrvError::INVAL);
        }
        if let Some(fault) = self.faults.borrow().erase_failure_at {
            if (address..address + length).contains(&fault) {
                return Err(FlashDrvError::FAIL);
            }
        }
        self.data.borrow_mut()[start..start + length].fill(ERASED_BYTE);
        self.update_stats(|s| s.erases += 1);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.borrow().len()
    }

    fn base_address(&self) -> usize {
        self.base
    }

    fn write_granularity(&self) -> usize {
        self.write_granularity
    }
}
