// Licensed under the Apache-2.0 license

//! Power-up decision: apply a staged update, recover from a boot loop or a
//! corrupt image, then hand over to the primary image.

use crate::backup::BackupManager;
use crate::boot_status::BootCheckpoint;
use crate::flash::FlashStorage;
use crate::platform::{BootPlatform, ResetFlags};
use crate::shared_state::{RetainedMemory, SharedStateStore};
use crate::signature::SignatureVerifier;
use crate::transfer::BootTransfer;
use crate::update::UpdateApplier;
use crate::validator::{FirmwareValidator, ImageSlot};
use pdc_config::{BootPolicy, MemoryMap};
use pdc_error::{BootError, BootStatus};
use pdc_image::{BootFlags, BootReason, FirmwareHeader, SharedBootState, UpdateStagingHeader};

/// Everything the boot flow talks to.
#[derive(Clone, Copy)]
pub struct BootEnv<'a> {
    pub internal_flash: &'a dyn FlashStorage,
    pub external_flash: &'a dyn FlashStorage,
    pub retained: &'a dyn RetainedMemory,
    pub platform: &'a dyn BootPlatform,
    pub transfer: &'a dyn BootTransfer,
    pub signature: &'a dyn SignatureVerifier,
    pub map: &'a MemoryMap,
    pub policy: BootPolicy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BootState {
    #[default]
    Idle,
    StayResident,
    Updating,
    RollingBack,
    Jumping,
}

/// How [`BootEngine::run`] ended when it did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Control was handed to the image whose vector table is at this address.
    /// Only observable with a transfer that returns.
    Transferred { vector_table_addr: u32 },
    /// The operator asked to stay in the bootloader.
    Resident,
}

/// Snapshot of the engine for status reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Diagnostics {
    pub primary_status: BootStatus,
    pub backup_status: BootStatus,
    pub update_pending: bool,
    pub update_progress: u8,
    pub boot_reason: BootReason,
    pub boot_attempts: u32,
    pub flags: BootFlags,
    pub state: BootState,
    pub last_status: BootStatus,
    pub checkpoint: BootCheckpoint,
}

impl Diagnostics {
    pub fn primary_valid(&self) -> bool {
        self.primary_status == BootStatus::Ok
    }

    pub fn backup_valid(&self) -> bool {
        self.backup_status == BootStatus::Ok
    }
}

pub struct BootEngine<'a> {
    env: BootEnv<'a>,
    state: BootState,
    reason: BootReason,
    primary: Result<FirmwareHeader, BootError>,
    backup: Result<FirmwareHeader, BootError>,
    update_pending: bool,
    shared: SharedBootState,
    progress: u8,
    last_status: BootStatus,
    checkpoint: BootCheckpoint,
}

impl<'a> BootEngine<'a> {
    pub fn new(env: BootEnv<'a>) -> Self {
        BootEngine {
            env,
            state: BootState::Idle,
            reason: BootReason::PowerOn,
            primary: Err(BootError::NoApp),
            backup: Err(BootError::NoApp),
            update_pending: false,
            shared: SharedBootState::default(),
            progress: 0,
            last_status: BootStatus::Ok,
            checkpoint: BootCheckpoint::NotStarted,
        }
    }

    fn validator(&self) -> FirmwareValidator<'a> {
        FirmwareValidator::new(self.env.internal_flash, self.env.map, self.env.signature)
    }

    fn backup_manager(&self) -> BackupManager<'a> {
        BackupManager::new(
            self.env.internal_flash,
            self.env.map,
            self.validator(),
            self.env.policy.verify_signature,
        )
    }

    fn applier(&self) -> UpdateApplier<'a> {
        UpdateApplier::new(
            self.env.internal_flash,
            self.env.external_flash,
            self.env.map,
            self.validator(),
            self.backup_manager(),
            self.env.policy.verify_signature,
        )
    }

    fn store(&self) -> SharedStateStore<'a> {
        SharedStateStore::new(self.env.retained)
    }

    fn set_checkpoint(&mut self, checkpoint: BootCheckpoint) {
        log::trace!("[pdc-boot] Checkpoint {:?}", checkpoint);
        self.checkpoint = checkpoint;
    }

    fn persist(&mut self) {
        self.store().store(&mut self.shared);
    }

    fn validate(&self, slot: &ImageSlot) -> Result<FirmwareHeader, BootError> {
        self.validator()
            .validate(slot, self.env.policy.verify_signature)
    }

    /// Loads the shared state, determines the boot reason and validates both
    /// image slots. Touches no flash.
    pub fn init(&mut self) -> Result<(), BootError> {
        self.set_checkpoint(BootCheckpoint::InitStarted);
        if let Err(err) = self.env.map.check() {
            log::error!("[pdc-boot] Memory map rejected: {:?}", err);
            self.last_status = BootStatus::Error;
            return Err(BootError::Error);
        }

        self.env.retained.enable();
        let store = self.store();
        self.shared = match store.load() {
            Some(state) => state,
            None => {
                log::info!("[pdc-boot] Shared boot state invalid, reinitializing");
                let mut state = SharedBootState::default();
                store.store(&mut state);
                state
            }
        };

        let reset_flags = self.env.platform.reset_flags();
        self.env.platform.clear_reset_flags();
        self.reason = match self.shared.reason() {
            BootReason::PowerOn => reason_from_reset_flags(reset_flags),
            left_by_app => {
                self.shared.set_reason(BootReason::PowerOn);
                self.persist();
                left_by_app
            }
        };
        log::info!(
            "[pdc-boot] Boot reason {:?}, attempt count {}",
            self.reason,
            self.shared.boot_attempt_count
        );
        self.set_checkpoint(BootCheckpoint::SharedStateLoaded);

        self.primary = self.validate(&ImageSlot::primary(self.env.map));
        self.backup = self.validate(&ImageSlot::backup(self.env.map));
        self.update_pending = self.applier().is_update_available();
        if self.update_pending {
            log::info!("[pdc-boot] Staged update pending");
        }
        self.set_checkpoint(BootCheckpoint::ImagesValidated);

        self.state = BootState::Idle;
        self.last_status = BootStatus::from(&self.primary);
        self.set_checkpoint(BootCheckpoint::InitComplete);
        Ok(())
    }

    /// Runs the boot decision. Either hands over to the primary image or
    /// returns with the engine resident.
    pub fn run(&mut self) -> Result<RunOutcome, BootError> {
        if self.env.platform.manual_entry_requested() {
            log::info!("[pdc-boot] Manual entry requested, staying in bootloader");
            self.reason = BootReason::ManualEntry;
            self.state = BootState::StayResident;
            self.last_status = BootStatus::Ok;
            self.set_checkpoint(BootCheckpoint::ManualEntry);
            return Ok(RunOutcome::Resident);
        }

        if self.shared.is_update_requested() || self.update_pending {
            self.handle_update();
        }

        if self.shared.boot_attempt_count >= self.env.policy.max_boot_attempts {
            log::warn!(
                "[pdc-boot] {} unconfirmed boots, restoring backup",
                self.shared.boot_attempt_count
            );
            if self.rollback().is_err() {
                return self.stay_resident(BootError::NoApp);
            }
            self.shared.boot_attempt_count = 0;
            self.persist();
        }

        if self.primary.is_err() {
            log::warn!("[pdc-boot] Primary image unusable, promoting backup");
            if self.rollback().is_err() {
                return self.stay_resident(BootError::NoApp);
            }
        }

        let header = match self.primary {
            Ok(header) => header,
            Err(_) => return self.stay_resident(BootError::NoApp),
        };

        self.shared.boot_attempt_count = self.shared.boot_attempt_count.saturating_add(1);
        self.persist();
        self.set_checkpoint(BootCheckpoint::AttemptRecorded);

        log::info!(
            "[pdc-boot] Starting image {} at {:#010x}",
            header.version(),
            header.vector_table_addr
        );
        self.state = BootState::Jumping;
        self.last_status = BootStatus::Ok;
        self.set_checkpoint(BootCheckpoint::TransferStarted);
        self.env.transfer.transfer(header.vector_table_addr);
        Ok(RunOutcome::Transferred {
            vector_table_addr: header.vector_table_addr,
        })
    }

    fn handle_update(&mut self) {
        self.state = BootState::Updating;
        self.set_checkpoint(BootCheckpoint::UpdateStarted);
        let applier = self.applier();
        let result = applier.apply_update();
        self.progress = applier.progress();
        self.update_pending = applier.is_update_available();
        self.shared.set_update_requested(false);

        match result {
            Ok(header) => {
                self.primary = Ok(header);
                self.backup = self.validate(&ImageSlot::backup(self.env.map));
                self.shared.boot_attempt_count = 0;
                let flags = (self.shared.boot_flags() | BootFlags::UPDATE_APPLIED)
                    - BootFlags::ROLLED_BACK;
                self.shared.set_boot_flags(flags);
                self.persist();
                self.last_status = BootStatus::Ok;
                self.set_checkpoint(BootCheckpoint::UpdateApplied);
            }
            Err(err) => {
                log::warn!("[pdc-boot] Update not applied: {}", err);
                self.persist();
                self.last_status = err.into();
                self.set_checkpoint(BootCheckpoint::UpdateFailed);

                // The apply may have refreshed the backup before failing.
                self.backup = self.validate(&ImageSlot::backup(self.env.map));
                if self.backup.is_ok() {
                    if let Err(err) = self.rollback() {
                        log::error!("[pdc-boot] Rollback after failed update: {}", err);
                    }
                } else {
                    self.primary = self.validate(&ImageSlot::primary(self.env.map));
                }
            }
        }
    }

    fn rollback(&mut self) -> Result<(), BootError> {
        self.state = BootState::RollingBack;
        self.set_checkpoint(BootCheckpoint::RollbackStarted);
        match self.backup_manager().rollback() {
            Ok(header) => {
                self.primary = Ok(header);
                self.shared
                    .set_boot_flags(self.shared.boot_flags() | BootFlags::ROLLED_BACK);
                self.persist();
                self.set_checkpoint(BootCheckpoint::RollbackComplete);
                Ok(())
            }
            Err(err) => {
                log::error!("[pdc-boot] Rollback failed: {}", err);
                self.primary = self.validate(&ImageSlot::primary(self.env.map));
                self.last_status = err.into();
                self.set_checkpoint(BootCheckpoint::RollbackFailed);
                Err(err)
            }
        }
    }

    fn stay_resident(&mut self, err: BootError) -> Result<RunOutcome, BootError> {
        log::error!("[pdc-boot] No bootable image, staying resident");
        self.state = BootState::StayResident;
        self.last_status = err.into();
        self.set_checkpoint(BootCheckpoint::NoBootableImage);
        Err(err)
    }

    pub fn is_update_available(&self) -> bool {
        self.applier().is_update_available()
    }

    pub fn staging_header(&self) -> Result<UpdateStagingHeader, BootError> {
        self.applier().staging_header()
    }

    pub fn write_update_chunk(&mut self, offset: u32, data: &[u8]) -> Result<(), BootError> {
        let result = self.applier().write_update_chunk(offset, data);
        if result.is_ok() {
            self.last_status = BootStatus::UpdateInProgress;
        }
        result
    }

    /// Publishes the staged blob. Takes effect on the next boot, or earlier
    /// with [`Self::request_update`] and a reboot.
    pub fn finalize_update(
        &mut self,
        total_size: u32,
        crc32: u32,
        timestamp: u32,
    ) -> Result<(), BootError> {
        self.applier().finalize_update(total_size, crc32, timestamp)?;
        self.update_pending = true;
        self.last_status = BootStatus::UpdateRequired;
        Ok(())
    }

    pub fn cancel_update(&mut self) -> Result<(), BootError> {
        self.applier().cancel_update()?;
        self.update_pending = false;
        self.last_status = BootStatus::Ok;
        Ok(())
    }

    pub fn request_update(&mut self) {
        self.shared.set_update_requested(true);
        self.persist();
    }

    /// Leaves `reason` in the shared state for the next boot.
    pub fn prepare_reboot(&mut self, reason: BootReason) {
        self.shared.set_reason(reason);
        self.persist();
    }

    pub fn request_reboot(&mut self, reason: BootReason) -> ! {
        self.prepare_reboot(reason);
        log::info!("[pdc-boot] Rebooting: {:?}", reason);
        self.env.platform.system_reset()
    }

    pub fn active_header(&self) -> Option<&FirmwareHeader> {
        self.primary.as_ref().ok()
    }

    pub fn backup_header(&self) -> Option<&FirmwareHeader> {
        self.backup.as_ref().ok()
    }

    pub fn shared_data(&self) -> &SharedBootState {
        &self.shared
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    pub fn boot_reason(&self) -> BootReason {
        self.reason
    }

    pub fn update_progress(&self) -> u8 {
        self.progress
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            primary_status: BootStatus::from(&self.primary),
            backup_status: BootStatus::from(&self.backup),
            update_pending: self.update_pending,
            update_progress: self.progress,
            boot_reason: self.reason,
            boot_attempts: self.shared.boot_attempt_count,
            flags: self.shared.boot_flags(),
            state: self.state,
            last_status: self.last_status,
            checkpoint: self.checkpoint,
        }
    }
}

/// Hardware reset cause when the application left no reason. A software
/// reset is reported as such; it may follow an update request or a crash.
fn reason_from_reset_flags(flags: ResetFlags) -> BootReason {
    if flags.contains(ResetFlags::WATCHDOG) {
        BootReason::Watchdog
    } else if flags.contains(ResetFlags::SOFTWARE) {
        BootReason::SoftwareReset
    } else {
        BootReason::PowerOn
    }
}
