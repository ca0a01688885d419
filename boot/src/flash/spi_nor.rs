// Licensed under the Apache-2.0 license

//! Driver for 24-bit addressed SPI NOR flash with the common JEDEC command set.

use crate::flash::hil::{FlashDrvError, FlashStorage};
use core::cell::RefCell;
use embedded_hal::spi::{Operation, SpiDevice};

pub const CMD_READ: u8 = 0x03;
pub const CMD_WRITE_ENABLE: u8 = 0x06;
pub const CMD_PAGE_PROGRAM: u8 = 0x02;
pub const CMD_SECTOR_ERASE: u8 = 0x20;
pub const CMD_READ_STATUS: u8 = 0x05;

pub const STATUS_BUSY: u8 = 1 << 0;
pub const STATUS_WEL: u8 = 1 << 1;

pub const PAGE_SIZE: usize = 256;
pub const SECTOR_SIZE: usize = 4096;

/// Status polls before a busy device is reported as [`FlashDrvError::BUSY`].
/// A 4K sector erase typically completes within a few thousand polls at the
/// bus speeds used here.
pub const DEFAULT_MAX_POLLS: u32 = 1_000_000;

pub struct SpiNorFlash<D> {
    spi: RefCell<D>,
    capacity: usize,
    max_polls: u32,
}

impl<D: SpiDevice> SpiNorFlash<D> {
    pub fn new(spi: D, capacity: usize) -> Self {
        SpiNorFlash {
            spi: RefCell::new(spi),
            capacity,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    pub fn release(self) -> D {
        self.spi.into_inner()
    }

    fn transaction(&self, operations: &mut [Operation<'_, u8>]) -> Result<(), FlashDrvError> {
        let mut spi = self.spi.try_borrow_mut().map_err(|_| FlashDrvError::BUSY)?;
        spi.transaction(operations).map_err(|_| FlashDrvError::FAIL)
    }

    fn command_with_address(cmd: u8, address: usize) -> [u8; 4] {
        [cmd, (address >> 16) as u8, (address >> 8) as u8, address as u8]
    }

    pub fn read_status(&self) -> Result<u8, FlashDrvError> {
        let mut status = [0u8; 1];
        self.transaction(&mut [
            Operation::Write(&[CMD_READ_STATUS]),
            Operation::Read(&mut status),
        ])?;
        Ok(status[0])
    }

    fn wait_ready(&self) -> Result<(), FlashDrvError> {
        for _ in 0..self.max_polls {
            if self.read_status()? & STATUS_BUSY == 0 {
                return Ok(());
            }
        }
        log::error!("[pdc-boot] SPI flash stayed busy");
        Err(FlashDrvError::BUSY)
    }

    fn write_enable(&self) -> Result<(), FlashDrvError> {
        self.transaction(&mut [Operation::Write(&[CMD_WRITE_ENABLE])])
    }

    fn check_range(&self, address: usize, length: usize) -> Result<(), FlashDrvError> {
        if self.contains(address, length) {
            Ok(())
        } else {
            Err(FlashDrvError::SIZE)
        }
    }
}

impl<D: SpiDevice> FlashStorage for SpiNorFlash<D> {
    fn read(&self, buffer: &mut [u8], address: usize) -> Result<(), FlashDrvError> {
        self.check_range(address, buffer.len())?;
        if buffer.is_empty() {
            return Ok(());
        }
        let cmd = Self::command_with_address(CMD_READ, address);
        self.transaction(&mut [Operation::Write(&cmd), Operation::Read(buffer)])
    }

    fn write(&self, buffer: &[u8], address: usize) -> Result<(), FlashDrvError> {
        self.check_range(address, buffer.len())?;
        let mut address = address;
        let mut remaining = buffer;
        while !remaining.is_empty() {
            // A page program wraps inside its page, so never cross a boundary.
            let room = PAGE_SIZE - address % PAGE_SIZE;
            let (chunk, rest) = remaining.split_at(room.min(remaining.len()));
            self.write_enable()?;
            let cmd = Self::command_with_address(CMD_PAGE_PROGRAM, address);
            self.transaction(&mut [Operation::Write(&cmd), Operation::Write(chunk)])?;
            self.wait_ready()?;
            address += chunk.len();
            remaining = rest;
        }
        Ok(())
    }

    fn erase(&self, address: usize, length: usize) -> Result<(), FlashDrvError> {
        self.check_range(address, length)?;
        if address % SECTOR_SIZE != 0 || length % SECTOR_SIZE != 0 {
            return Err(FlashDrvError::INVAL);
        }
        for sector in (address..address + length).step_by(SECTOR_SIZE) {
            self.write_enable()?;
            let cmd = Self::command_with_address(CMD_SECTOR_ERASE, sector);
            self.transaction(&mut [Operation::Write(&cmd)])?;
            self.wait_ready()?;
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
