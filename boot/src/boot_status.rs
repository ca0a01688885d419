// Licensed under the Apache-2.0 license

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Progress markers of the boot flow, kept for diagnostics. Values are
/// reported to host tooling and must stay stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum BootCheckpoint {
    NotStarted = 0,
    InitStarted = 1,
    SharedStateLoaded = 2,
    ImagesValidated = 3,
    InitComplete = 4,

    ManualEntry = 0x10,

    UpdateStarted = 0x20,
    UpdateApplied = 0x21,
    UpdateFailed = 0x22,

    RollbackStarted = 0x30,
    RollbackComplete = 0x31,
    RollbackFailed = 0x32,

    AttemptRecorded = 0x40,
    TransferStarted = 0x41,

    NoBootableImage = 0xf0,
}

impl Default for BootCheckpoint {
    fn default() -> Self {
        BootCheckpoint::NotStarted
    }
}
