// Licensed under the Apache-2.0 license

use crate::flash::{copy_region, FlashStorage};
use crate::validator::{FirmwareValidator, ImageSlot};
use pdc_config::MemoryMap;
use pdc_error::BootError;
use pdc_image::FirmwareHeader;

/// Snapshots the primary image into the backup region and restores it.
///
/// Both directions copy the whole region synchronously and only after the
/// source has validated. Neither is resumable: an interrupted copy leaves the
/// destination invalid until the operation is repeated.
#[derive(Clone, Copy)]
pub struct BackupManager<'a> {
    flash: &'a dyn FlashStorage,
    map: &'a MemoryMap,
    validator: FirmwareValidator<'a>,
    verify_signature: bool,
}

impl<'a> BackupManager<'a> {
    pub fn new(
        flash: &'a dyn FlashStorage,
        map: &'a MemoryMap,
        validator: FirmwareValidator<'a>,
        verify_signature: bool,
    ) -> Self {
        BackupManager {
            flash,
            map,
            validator,
            verify_signature,
        }
    }

    /// Copies a valid primary image into the backup region and returns the
    /// header of the fresh backup.
    pub fn backup(&self) -> Result<FirmwareHeader, BootError> {
        let primary = ImageSlot::primary(self.map);
        let backup = ImageSlot::backup(self.map);
        let header = self.validator.validate(&primary, self.verify_signature)?;
        log::info!("[pdc-boot] Backing up primary image {}", header.version());
        self.copy_slot(&primary, &backup, &header)?;
        self.validator.validate(&backup, self.verify_signature)
    }

    /// Restores the backup image over the primary region and returns the
    /// header of the restored primary.
    pub fn rollback(&self) -> Result<FirmwareHeader, BootError> {
        let primary = ImageSlot::primary(self.map);
        let backup = ImageSlot::backup(self.map);
        let header = self.validator.validate(&backup, self.verify_signature)?;
        log::info!("[pdc-boot] Rolling back to backup image {}", header.version());
        self.copy_slot(&backup, &primary, &header)?;
        self.validator.validate(&primary, self.verify_signature)
    }

    fn copy_slot(
        &self,
        src: &ImageSlot,
        dst: &ImageSlot,
        header: &FirmwareHeader,
    ) -> Result<(), BootError> {
        let src_part = src.partition(self.flash)?;
        let dst_part = dst.partition(self.flash)?;
        dst_part.erase_all(self.map.internal_sector_size as usize)?;
        let len = (src.body_offset() + header.app_size) as usize;
        copy_region(&src_part, &dst_part, len, |_| {})?;
        Ok(())
    }
}
