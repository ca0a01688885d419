// Licensed under the Apache-2.0 license

// Internal flash of the STM32F407 behind the HAL's flash controller driver.

use core::cell::RefCell;
use pdc_boot_common::flash::{FlashDrvError, FlashStorage};
use pdc_config_stm32::{sector_index, FLASH_BASE, FLASH_SIZE, INTERNAL_FLASH_SECTORS};
use stm32f4xx_hal::{
    flash::{self, FlashExt, LockedFlash},
    pac::FLASH,
};

pub struct InternalFlash {
    flash: RefCell<LockedFlash>,
}

impl InternalFlash {
    pub fn new(flash: FLASH) -> Self {
        InternalFlash {
            flash: RefCell::new(LockedFlash::new(flash)),
        }
    }

    fn offset(&self, address: usize, length: usize) -> Result<usize, FlashDrvError> {
        if !self.contains(address, length) {
            return Err(FlashDrvError::SIZE);
        }
        Ok(address - FLASH_BASE as usize)
    }

    /// Runs `op` on the unlocked controller. The HAL locks it again when the
    /// guard drops, whatever the outcome.
    fn unlocked(
        &self,
        op: impl FnOnce(&mut flash::UnlockedFlash<'_>) -> Result<(), flash::Error>,
    ) -> Result<(), FlashDrvError> {
        let mut flash = self
            .flash
            .try_borrow_mut()
            .map_err(|_| FlashDrvError::BUSY)?;
        let mut unlocked = flash.unlocked();
        op(&mut unlocked).map_err(|err| {
            log::error!("[pdc-boot] Internal flash error {:?}", err);
            FlashDrvError::FAIL
        })
    }
}

impl FlashStorage for InternalFlash {
    fn read(&self, buf: &mut [u8], address: usize) -> Result<(), FlashDrvError> {
        let offset = self.offset(address, buf.len())?;
        let flash = self.flash.try_borrow().map_err(|_| FlashDrvError::BUSY)?;
        let data = flash
            .read()
            .get(offset..offset + buf.len())
            .ok_or(FlashDrvError::SIZE)?;
        buf.copy_from_slice(data);
        Ok(())
    }

    fn write(&self, buf: &[u8], address: usize) -> Result<(), FlashDrvError> {
        let offset = self.offset(address, buf.len())?;
        self.unlocked(|flash| flash.program(offset, buf.iter()))
    }

    /// Erases the sectors making up `[address, address + length)`. The range
    /// must start and end on sector boundaries.
    fn erase(&self, address: usize, length: usize) -> Result<(), FlashDrvError> {
        self.offset(address, length)?;
        let first = sector_index(address as u32).ok_or(FlashDrvError::INVAL)?;
        let end = address + length;
        let mut count = 0;
        let mut covered = address;
        for (base, size) in &INTERNAL_FLASH_SECTORS[first..] {
            if covered >= end {
                break;
            }
            covered = (*base + *size) as usize;
            count += 1;
        }
        if covered != end {
            return Err(FlashDrvError::INVAL);
        }

        self.unlocked(|flash| {
            for index in first..first + count {
                log::debug!("[pdc-boot] Erasing internal sector {}", index);
                flash.erase(index as u8)?;
            }
            Ok(())
        })
    }

    fn capacity(&self) -> usize {
        FLASH_SIZE as usize
    }

    fn base_address(&self) -> usize {
        FLASH_BASE as usize
    }
}
