// Licensed under the Apache-2.0 license

use crate::flash::hil::{FlashDrvError, FlashStorage};
use pdc_image::ERASED_BYTE;
use zerocopy::{FromBytes, IntoBytes};

/// Largest block moved per program operation when copying between partitions.
pub const COPY_BLOCK_SIZE: usize = 256;

/// Represents a partition within the flash memory.
///
/// A `FlashPartition` provides a view into a contiguous region of the underlying
/// flash, allowing for read, write, and erase operations within the
/// specified bounds. All operations are checked to ensure they do not exceed
/// the partition's boundaries.
///
/// # Fields
/// - `driver`: Reference to the flash storage controller driver.
/// - `name`: Name of the partition (for debugging or identification).
/// - `base`: Absolute address of the partition's first byte on the device.
/// - `length`: The size of the partition in bytes.
#[derive(Clone, Copy)]
pub struct FlashPartition<'a> {
    driver: &'a dyn FlashStorage,
    name: &'static str,
    base: usize,
    length: usize,
}

impl<'a> FlashPartition<'a> {
    /// Creates a new `FlashPartition` instance.
    ///
    /// Returns `Err(FlashDrvError::SIZE)` if the partition does not fit inside
    /// the device.
    pub fn new(
        driver: &'a dyn FlashStorage,
        name: &'static str,
        base: usize,
        length: usize,
    ) -> Result<Self, FlashDrvError> {
        if !driver.contains(base, length) {
            return Err(FlashDrvError::SIZE);
        }
        Ok(FlashPartition {
            driver,
            name,
            base,
            length,
        })
    }

    fn check_range(&self, partition_offset: usize, len: usize) -> Result<usize, FlashDrvError> {
        match partition_offset.checked_add(len) {
            Some(end) if end <= self.length => Ok(self.base + partition_offset),
            _ => Err(FlashDrvError::SIZE),
        }
    }

    /// Reads data from the flash partition into the provided buffer, starting at
    /// the specified offset within the partition.
    ///
    /// Returns `Err(FlashDrvError::SIZE)` if the requested range exceeds the
    /// partition size, or propagates errors from the underlying flash controller.
    pub fn read(&self, partition_offset: usize, buf: &mut [u8]) -> Result<(), FlashDrvError> {
        let address = self.check_range(partition_offset, buf.len())?;
        self.driver.read(buf, address)
    }

    /// Writes data to the flash partition, starting at the specified offset
    /// within the partition. The range must have been erased.
    pub fn write(&self, partition_offset: usize, buf: &[u8]) -> Result<(), FlashDrvError> {
        let address = self.check_range(partition_offset, buf.len())?;
        self.driver.write(buf, address)
    }

    /// Writes `data` padded with erased bytes up to the write granularity.
    pub fn write_padded(&self, partition_offset: usize, data: &[u8]) -> Result<(), FlashDrvError> {
        let granularity = self.write_granularity();
        if granularity == 0 || granularity > COPY_BLOCK_SIZE {
            return Err(FlashDrvError::INVAL);
        }
        let block = COPY_BLOCK_SIZE - COPY_BLOCK_SIZE % granularity;
        let mut buf = [ERASED_BYTE; COPY_BLOCK_SIZE];
        for (i, chunk) in data.chunks(block).enumerate() {
            let padded = chunk.len().div_ceil(granularity) * granularity;
            buf[..chunk.len()].copy_from_slice(chunk);
            buf[chunk.len()..padded].fill(ERASED_BYTE);
            self.write(partition_offset + i * block, &buf[..padded])?;
        }
        Ok(())
    }

    /// Erases a region of the flash partition, starting at the specified offset
    /// within the partition.
    pub fn erase(&self, partition_offset: usize, len: usize) -> Result<(), FlashDrvError> {
        let address = self.check_range(partition_offset, len)?;
        self.driver.erase(address, len)
    }

    /// Erases the whole partition one sector at a time.
    pub fn erase_all(&self, sector_size: usize) -> Result<(), FlashDrvError> {
        if sector_size == 0 || self.length % sector_size != 0 {
            return Err(FlashDrvError::INVAL);
        }
        for offset in (0..self.length).step_by(sector_size) {
            self.erase(offset, sector_size)?;
        }
        Ok(())
    }

    /// Reads a fixed-layout structure stored at `partition_offset`.
    pub fn read_struct<T: FromBytes + IntoBytes>(
        &self,
        partition_offset: usize,
    ) -> Result<T, FlashDrvError> {
        let mut value = T::new_zeroed();
        self.read(partition_offset, value.as_mut_bytes())?;
        Ok(value)
    }

    pub fn write_granularity(&self) -> usize {
        self.driver.write_granularity()
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Copies the first `len` bytes of `src` to the start of `dst`.
///
/// Data moves in blocks that are a whole multiple of the destination's write
/// granularity. The last block is padded with erased bytes up to the
/// granularity. `dst` must already be erased. `progress` receives the number
/// of bytes copied so far after every block.
pub fn copy_region(
    src: &FlashPartition,
    dst: &FlashPartition,
    len: usize,
    mut progress: impl FnMut(usize),
) -> Result<(), FlashDrvError> {
    let granularity = dst.write_granularity();
    if granularity == 0 || granularity > COPY_BLOCK_SIZE {
        return Err(FlashDrvError::INVAL);
    }
    let block = COPY_BLOCK_SIZE - COPY_BLOCK_SIZE % granularity;
    if len > src.len() || len.div_ceil(granularity) * granularity > dst.len() {
        return Err(FlashDrvError::SIZE);
    }

    let mut buf = [ERASED_BYTE; COPY_BLOCK_SIZE];
    let mut offset = 0;
    while offset < len {
        let chunk = block.min(len - offset);
        let padded = chunk.div_ceil(granularity) * granularity;
        buf[chunk..padded].fill(ERASED_BYTE);
        src.read(offset, &mut buf[..chunk])?;
        dst.write(offset, &buf[..padded])?;
        offset += chunk;
        progress(offset);
    }
    Ok(())
}
