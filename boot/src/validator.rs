// Licensed under the Apache-2.0 license

use crate::flash::{FlashDrvError, FlashPartition, FlashStorage, COPY_BLOCK_SIZE};
use crate::signature::SignatureVerifier;
use pdc_config::MemoryMap;
use pdc_error::BootError;
use pdc_image::{Crc32, FirmwareHeader};

/// Location of one application image in internal flash.
///
/// Images are linked for the primary slot. The backup slot holds a
/// byte-identical copy laid out the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSlot {
    pub name: &'static str,
    pub header_addr: u32,
    pub body_addr: u32,
    /// Header region plus body capacity.
    pub size: u32,
}

impl ImageSlot {
    pub fn primary(map: &MemoryMap) -> Self {
        ImageSlot {
            name: "primary",
            header_addr: map.app_header.base,
            body_addr: map.app_body.base,
            size: map.primary().size,
        }
    }

    pub fn backup(map: &MemoryMap) -> Self {
        ImageSlot {
            name: "backup",
            header_addr: map.backup.base,
            body_addr: map.backup.base + map.header_region_size(),
            size: map.backup.size,
        }
    }

    pub fn body_offset(&self) -> u32 {
        self.body_addr - self.header_addr
    }

    pub fn body_capacity(&self) -> u32 {
        self.size - self.body_offset()
    }

    pub fn partition<'a>(
        &self,
        flash: &'a dyn FlashStorage,
    ) -> Result<FlashPartition<'a>, FlashDrvError> {
        FlashPartition::new(
            flash,
            self.name,
            self.header_addr as usize,
            self.size as usize,
        )
    }
}

/// Structural and integrity checks of an image in place. Never writes.
#[derive(Clone, Copy)]
pub struct FirmwareValidator<'a> {
    flash: &'a dyn FlashStorage,
    map: &'a MemoryMap,
    signature: &'a dyn SignatureVerifier,
}

impl<'a> FirmwareValidator<'a> {
    pub fn new(
        flash: &'a dyn FlashStorage,
        map: &'a MemoryMap,
        signature: &'a dyn SignatureVerifier,
    ) -> Self {
        FirmwareValidator {
            flash,
            map,
            signature,
        }
    }

    /// Validates the image in `slot` and returns its header.
    ///
    /// Checks run in a fixed order and the first failure wins: magic
    /// (`NoApp`), header CRC (`Crc`), body size and vector table address
    /// (`Error`), body CRC (`Crc`), vector table contents (`Error`), then the
    /// optional signature hook. The body CRC and the vector table are read at
    /// the slot's copy of `vector_table_addr`.
    pub fn validate(
        &self,
        slot: &ImageSlot,
        verify_signature: bool,
    ) -> Result<FirmwareHeader, BootError> {
        let result = self.check(slot, verify_signature);
        match &result {
            Ok(header) => log::debug!(
                "[pdc-boot] {} image {} valid, {} bytes",
                slot.name,
                header.version(),
                header.app_size
            ),
            Err(err) => log::warn!("[pdc-boot] {} image invalid: {}", slot.name, err),
        }
        result
    }

    fn check(&self, slot: &ImageSlot, verify_signature: bool) -> Result<FirmwareHeader, BootError> {
        let partition = slot.partition(self.flash)?;
        let header: FirmwareHeader = partition.read_struct(0)?;

        if !header.is_magic_valid() {
            return Err(BootError::NoApp);
        }
        if !header.is_header_crc_valid() {
            return Err(BootError::Crc);
        }
        if header.app_size == 0 || header.app_size > slot.body_capacity() {
            return Err(BootError::Error);
        }
        // Images are linked for the primary body, the backup keeps that
        // address in its byte-identical header.
        if header.vector_table_addr != self.map.app_body.base {
            log::warn!(
                "[pdc-boot] Vector table {:#010x} is not at the body start {:#010x}",
                header.vector_table_addr,
                self.map.app_body.base
            );
            return Err(BootError::Error);
        }

        let body_offset = slot.body_offset() as usize;
        let app_size = header.app_size as usize;
        if body_crc(&partition, body_offset, app_size)? != header.app_crc32 {
            return Err(BootError::Crc);
        }

        if app_size < 8 {
            return Err(BootError::Error);
        }
        let vectors: [u32; 2] = partition.read_struct(body_offset)?;
        let (initial_sp, reset_handler) = (u32::from_le(vectors[0]), u32::from_le(vectors[1]));
        if !self.map.is_valid_stack_pointer(initial_sp) {
            log::warn!("[pdc-boot] Initial stack pointer {:#010x} outside RAM", initial_sp);
            return Err(BootError::Error);
        }
        if !self.map.is_valid_reset_handler(reset_handler) {
            log::warn!("[pdc-boot] Reset handler {:#010x} outside flash", reset_handler);
            return Err(BootError::Error);
        }

        if verify_signature {
            self.signature.verify_signature(&header)?;
        }
        Ok(header)
    }
}

/// CRC32 of `len` bytes starting at `offset`, read in bounded blocks.
pub fn body_crc(partition: &FlashPartition, offset: usize, len: usize) -> Result<u32, BootError> {
    let mut crc = Crc32::new();
    let mut buf = [0u8; COPY_BLOCK_SIZE];
    let mut done = 0;
    while done < len {
        let chunk = COPY_BLOCK_SIZE.min(len - done);
        partition.read(offset + done, &mut buf[..chunk])?;
        crc.update(&buf[..chunk]);
        done += chunk;
    }
    Ok(crc.finalize())
}
