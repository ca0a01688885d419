// Licensed under the Apache-2.0 license

use crate::backup::BackupManager;
use crate::flash::{copy_region, FlashPartition, FlashStorage};
use crate::validator::{body_crc, FirmwareValidator, ImageSlot};
use core::cell::Cell;
use pdc_config::MemoryMap;
use pdc_error::BootError;
use pdc_image::{FirmwareHeader, StagingStatus, UpdateStagingHeader};
use zerocopy::IntoBytes;

/// Moves a staged update from external flash into the primary slot and
/// manages the staging region on behalf of the update transport.
///
/// The staging region starts with a header sector holding an
/// [`UpdateStagingHeader`]. The blob follows at
/// [`MemoryMap::staging_data_offset`] and is a byte image of the primary
/// region: firmware header padded to the header region, then the body.
pub struct UpdateApplier<'a> {
    internal: &'a dyn FlashStorage,
    external: &'a dyn FlashStorage,
    map: &'a MemoryMap,
    validator: FirmwareValidator<'a>,
    backup: BackupManager<'a>,
    verify_signature: bool,
    progress: Cell<u8>,
}

impl<'a> UpdateApplier<'a> {
    pub fn new(
        internal: &'a dyn FlashStorage,
        external: &'a dyn FlashStorage,
        map: &'a MemoryMap,
        validator: FirmwareValidator<'a>,
        backup: BackupManager<'a>,
        verify_signature: bool,
    ) -> Self {
        UpdateApplier {
            internal,
            external,
            map,
            validator,
            backup,
            verify_signature,
            progress: Cell::new(0),
        }
    }

    /// Percentage of the last apply that has been copied.
    pub fn progress(&self) -> u8 {
        self.progress.get()
    }

    fn staging(&self) -> Result<FlashPartition<'a>, BootError> {
        Ok(FlashPartition::new(
            self.external,
            "staging-header",
            self.map.staging.base as usize,
            self.map.staging_data_offset() as usize,
        )?)
    }

    fn blob(&self) -> Result<FlashPartition<'a>, BootError> {
        Ok(FlashPartition::new(
            self.external,
            "staging-data",
            (self.map.staging.base + self.map.staging_data_offset()) as usize,
            self.map.staging_capacity() as usize,
        )?)
    }

    pub fn staging_header(&self) -> Result<UpdateStagingHeader, BootError> {
        Ok(self.staging()?.read_struct(0)?)
    }

    /// True when a CRC-valid header announces a pending update.
    pub fn is_update_available(&self) -> bool {
        self.staging_header()
            .map(|header| header.is_pending())
            .unwrap_or(false)
    }

    /// Installs the pending update into the primary slot.
    ///
    /// Nothing in internal flash is touched until the staging header, the
    /// embedded firmware header and the blob CRC have all checked out. From
    /// the erase onwards a storage fault aborts immediately and leaves the
    /// primary partially written.
    pub fn apply_update(&self) -> Result<FirmwareHeader, BootError> {
        self.progress.set(0);
        let staging = self.staging()?;
        let header: UpdateStagingHeader = staging.read_struct(0)?;
        if !header.is_magic_valid() || header.status() != Some(StagingStatus::Pending) {
            log::info!("[pdc-boot] No pending update staged");
            return Err(BootError::Error);
        }
        if !header.is_crc_valid() {
            log::warn!("[pdc-boot] Staging header CRC mismatch");
            return Err(BootError::Crc);
        }
        let firmware = self.check_staged_image(&header)?;
        log::info!(
            "[pdc-boot] Applying update {} ({} bytes)",
            firmware.version(),
            header.firmware_size
        );

        if let Err(err) = self.backup.backup() {
            log::warn!("[pdc-boot] Backup before update failed: {}, continuing", err);
        }

        let primary_slot = ImageSlot::primary(self.map);
        let primary = primary_slot.partition(self.internal)?;
        primary.erase_all(self.map.internal_sector_size as usize)?;

        let total = header.firmware_size as usize;
        copy_region(&self.blob()?, &primary, total, |done| {
            self.progress.set(percent(done, total));
        })?;

        match self.validator.validate(&primary_slot, self.verify_signature) {
            Ok(installed) => {
                self.mark(header, StagingStatus::Applied)?;
                self.progress.set(100);
                log::info!("[pdc-boot] Update {} applied", installed.version());
                Ok(installed)
            }
            Err(err) => {
                log::error!("[pdc-boot] Installed image failed validation: {}", err);
                if let Err(mark_err) = self.mark(header, StagingStatus::Failed) {
                    log::warn!("[pdc-boot] Could not mark update failed: {}", mark_err);
                }
                Err(err)
            }
        }
    }

    /// Checks the staged blob without touching internal flash.
    fn check_staged_image(&self, header: &UpdateStagingHeader) -> Result<FirmwareHeader, BootError> {
        let primary = ImageSlot::primary(self.map);
        if header.header_offset != 0
            || header.firmware_size > primary.size
            || header.firmware_size > self.map.staging_capacity()
        {
            log::warn!(
                "[pdc-boot] Staged blob layout rejected: size {} offset {}",
                header.firmware_size,
                header.header_offset
            );
            return Err(BootError::Error);
        }

        let blob = self.blob()?;
        let firmware: FirmwareHeader = blob.read_struct(header.header_offset as usize)?;
        if !firmware.is_magic_valid() {
            return Err(BootError::Error);
        }
        if !firmware.is_header_crc_valid() {
            return Err(BootError::Crc);
        }
        if firmware.app_size == 0
            || firmware.app_size > primary.body_capacity()
            || primary.body_offset() + firmware.app_size != header.firmware_size
        {
            return Err(BootError::Error);
        }

        if body_crc(&blob, 0, header.firmware_size as usize)? != header.firmware_crc32 {
            log::warn!("[pdc-boot] Staged blob CRC mismatch");
            return Err(BootError::Crc);
        }
        Ok(firmware)
    }

    fn mark(&self, mut header: UpdateStagingHeader, status: StagingStatus) -> Result<(), BootError> {
        header.set_status(status);
        self.write_staging_header(&header)
    }

    fn write_staging_header(&self, header: &UpdateStagingHeader) -> Result<(), BootError> {
        let staging = self.staging()?;
        staging.erase_all(self.map.external_sector_size as usize)?;
        staging.write_padded(0, header.as_bytes())?;
        Ok(())
    }

    /// Programs `data` at `offset` into the staged blob.
    ///
    /// Chunks are expected in ascending order. Every sector whose first byte
    /// falls inside the chunk is erased before programming, so a chunk that
    /// starts mid-sector relies on the previous chunk having erased it.
    pub fn write_update_chunk(&self, offset: u32, data: &[u8]) -> Result<(), BootError> {
        let blob = self.blob()?;
        let start = offset as usize;
        let end = match start.checked_add(data.len()) {
            Some(end) if end <= blob.len() => end,
            _ => {
                log::warn!("[pdc-boot] Update chunk at {:#x} outside staging area", offset);
                return Err(BootError::Error);
            }
        };
        let sector = self.map.external_sector_size as usize;
        for sector_start in (start.div_ceil(sector) * sector..end).step_by(sector) {
            blob.erase(sector_start, sector)?;
        }
        blob.write(start, data)?;
        Ok(())
    }

    /// Publishes the staged blob as a pending update.
    pub fn finalize_update(
        &self,
        total_size: u32,
        crc32: u32,
        timestamp: u32,
    ) -> Result<(), BootError> {
        if total_size == 0
            || total_size > self.map.staging_capacity()
            || total_size > self.map.primary().size
        {
            return Err(BootError::Error);
        }
        let header = UpdateStagingHeader::new_pending(total_size, crc32, timestamp);
        self.write_staging_header(&header)?;
        log::info!("[pdc-boot] Update staged: {} bytes, crc {:#010x}", total_size, crc32);
        Ok(())
    }

    /// Invalidates any staged update. Idempotent.
    pub fn cancel_update(&self) -> Result<(), BootError> {
        self.staging()?
            .erase_all(self.map.external_sector_size as usize)?;
        log::info!("[pdc-boot] Staged update cancelled");
        Ok(())
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (done as u64 * 100 / total as u64).min(100) as u8
}
