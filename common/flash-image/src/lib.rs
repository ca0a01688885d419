// Licensed under the Apache-2.0 license

//! Binary layouts shared by the bootloader, the application and host tooling.
//! All structures are little-endian with no implicit padding.

#![no_std]

use core::fmt;
use core::mem::{offset_of, size_of};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

pub mod crc;
mod shared;

pub use crate::crc::{crc32, Crc32};
pub use shared::*;

pub const FIRMWARE_MAGIC: u32 = u32::from_le_bytes(*b"PDFW");
pub const STAGING_MAGIC: u32 = u32::from_le_bytes(*b"PDUP");

pub const FIRMWARE_HEADER_SIZE: usize = size_of::<FirmwareHeader>();
pub const STAGING_HEADER_SIZE: usize = size_of::<UpdateStagingHeader>();
pub const SIGNATURE_SIZE: usize = 64;

/// Value of erased flash cells.
pub const ERASED_BYTE: u8 = 0xff;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}+{}", self.major, self.minor, self.patch, self.build)
    }
}

/// Header placed in front of every application image.
///
/// `header_crc32` covers every byte before it. `app_crc32` covers exactly
/// `app_size` bytes of the body, which starts at `vector_table_addr` when the
/// image sits in the primary slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct FirmwareHeader {
    pub magic: u32,
    pub version_major: u32,
    pub version_minor: u32,
    pub version_patch: u32,
    pub build_number: u32,
    pub build_timestamp: u32,
    pub app_size: u32,
    pub app_crc32: u32,
    pub vector_table_addr: u32,
    pub entry_point: u32,
    /// Placeholder, not verified.
    pub signature: [u8; SIGNATURE_SIZE],
    pub reserved: [u8; 128],
    pub header_crc32: u32,
}

impl FirmwareHeader {
    pub fn new(app_size: u32, app_crc32: u32, vector_table_addr: u32, entry_point: u32) -> Self {
        let mut header = Self::new_zeroed();
        header.magic = FIRMWARE_MAGIC;
        header.app_size = app_size;
        header.app_crc32 = app_crc32;
        header.vector_table_addr = vector_table_addr;
        header.entry_point = entry_point;
        header
    }

    pub fn version(&self) -> FirmwareVersion {
        FirmwareVersion {
            major: self.version_major,
            minor: self.version_minor,
            patch: self.version_patch,
            build: self.build_number,
        }
    }

    pub fn set_version(&mut self, version: FirmwareVersion) {
        self.version_major = version.major;
        self.version_minor = version.minor;
        self.version_patch = version.patch;
        self.build_number = version.build;
    }

    pub fn is_magic_valid(&self) -> bool {
        self.magic == FIRMWARE_MAGIC
    }

    pub fn compute_header_crc(&self) -> u32 {
        crc32(&self.as_bytes()[..offset_of!(FirmwareHeader, header_crc32)])
    }

    pub fn is_header_crc_valid(&self) -> bool {
        self.compute_header_crc() == self.header_crc32
    }

    /// Populates `header_crc32`. Call after the last field change.
    pub fn seal(&mut self) {
        self.header_crc32 = self.compute_header_crc();
    }
}

/// Lifecycle of a staged update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum StagingStatus {
    Pending = 1,
    Applied = 2,
    Failed = 3,
}

/// Header at offset 0 of the external staging region.
///
/// `firmware_size` and `firmware_crc32` describe the staged blob, which is a
/// byte image of the primary region (header slot followed by the body).
/// `header_offset` locates the embedded [`FirmwareHeader`] inside the blob.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct UpdateStagingHeader {
    pub magic: u32,
    pub firmware_size: u32,
    pub firmware_crc32: u32,
    pub header_offset: u32,
    pub status: u32,
    pub timestamp: u32,
    pub reserved: [u8; 32],
    pub buffer_crc32: u32,
}

impl UpdateStagingHeader {
    /// A sealed header announcing a freshly uploaded blob.
    pub fn new_pending(firmware_size: u32, firmware_crc32: u32, timestamp: u32) -> Self {
        let mut header = Self::new_zeroed();
        header.magic = STAGING_MAGIC;
        header.firmware_size = firmware_size;
        header.firmware_crc32 = firmware_crc32;
        header.header_offset = 0;
        header.status = StagingStatus::Pending.into();
        header.timestamp = timestamp;
        header.seal();
        header
    }

    pub fn is_magic_valid(&self) -> bool {
        self.magic == STAGING_MAGIC
    }

    pub fn status(&self) -> Option<StagingStatus> {
        StagingStatus::try_from(self.status).ok()
    }

    /// Changes the status and re-seals the header.
    pub fn set_status(&mut self, status: StagingStatus) {
        self.status = status.into();
        self.seal();
    }

    pub fn compute_crc(&self) -> u32 {
        crc32(&self.as_bytes()[..offset_of!(UpdateStagingHeader, buffer_crc32)])
    }

    pub fn is_crc_valid(&self) -> bool {
        self.compute_crc() == self.buffer_crc32
    }

    pub fn seal(&mut self) {
        self.buffer_crc32 = self.compute_crc();
    }

    /// True when the header announces an update that has not been consumed.
    pub fn is_pending(&self) -> bool {
        self.is_magic_valid()
            && self.is_crc_valid()
            && self.status() == Some(StagingStatus::Pending)
    }
}
