// Licensed under the Apache-2.0 license

//! Error and status codes shared by the bootloader, the application and host
//! tooling. The numeric values are reported over diagnostics channels and
//! must never be renumbered.

#![no_std]

use thiserror::Error;

/// Failure kinds produced by the boot and update subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[repr(u32)]
pub enum BootError {
    /// Generic structural failure (bad size, bad vector table, bad state).
    #[error("structural error")]
    Error = 1,
    /// Integrity check failed (header or body CRC32).
    #[error("CRC mismatch")]
    Crc = 2,
    /// Reserved: signature verification failure.
    #[error("signature verification failed")]
    Signature = 3,
    /// Reserved: version policy failure.
    #[error("version check failed")]
    Version = 4,
    /// Storage I/O failure.
    #[error("flash access failed")]
    Flash = 5,
    /// No bootable image in either slot.
    #[error("no bootable application")]
    NoApp = 6,
    /// Operation did not finish in time.
    #[error("operation timed out")]
    Timeout = 7,
}

impl From<BootError> for u32 {
    fn from(err: BootError) -> u32 {
        err as u32
    }
}

/// Status word as exposed to host tooling. Superset of [`BootError`] with a
/// success value and the update status markers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum BootStatus {
    #[default]
    Ok = 0,
    Error = 1,
    Crc = 2,
    Signature = 3,
    Version = 4,
    Flash = 5,
    NoApp = 6,
    Timeout = 7,
    UpdateRequired = 8,
    UpdateInProgress = 9,
}

impl From<BootError> for BootStatus {
    fn from(err: BootError) -> Self {
        match err {
            BootError::Error => BootStatus::Error,
            BootError::Crc => BootStatus::Crc,
            BootError::Signature => BootStatus::Signature,
            BootError::Version => BootStatus::Version,
            BootError::Flash => BootStatus::Flash,
            BootError::NoApp => BootStatus::NoApp,
            BootError::Timeout => BootStatus::Timeout,
        }
    }
}

impl<T> From<&Result<T, BootError>> for BootStatus {
    fn from(result: &Result<T, BootError>) -> Self {
        match result {
            Ok(_) => BootStatus::Ok,
            Err(err) => (*err).into(),
        }
    }
}

impl From<BootStatus> for u32 {
    fn from(status: BootStatus) -> u32 {
        status as u32
    }
}
