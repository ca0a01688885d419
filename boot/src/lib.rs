/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Boot decision, image validation and update/rollback for the
    power-distribution controller.

--*/

#![no_std]

pub mod backup;
pub mod boot_engine;
pub mod boot_status;
pub mod flash;
pub mod platform;
pub mod shared_state;
pub mod signature;
pub mod transfer;
pub mod update;
pub mod validator;

pub use backup::BackupManager;
pub use boot_engine::{BootEngine, BootEnv, BootState, Diagnostics, RunOutcome};
pub use boot_status::BootCheckpoint;
pub use flash::{FlashDrvError, FlashPartition, FlashStorage, SpiNorFlash};
pub use platform::{BootPlatform, ResetFlags};
pub use shared_state::{RetainedMemory, SharedStateStore, VolatileRetainedMemory};
pub use signature::{SignatureVerifier, UnverifiedSignature};
pub use transfer::BootTransfer;
pub use update::UpdateApplier;
pub use validator::{FirmwareValidator, ImageSlot};
