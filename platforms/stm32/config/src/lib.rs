// Licensed under the Apache-2.0 license

//! Board layout of the STM32F407 controller with a 16 Mbit SPI NOR for
//! update staging.

#![cfg_attr(target_os = "none", no_std)]

use pdc_config::{AddressRange, BootPolicy, MemoryMap, Region};

pub const FLASH_BASE: u32 = 0x0800_0000;
pub const FLASH_SIZE: u32 = 1024 * 1024;

/// Erase granularity of the internal sectors that hold application images.
pub const IMAGE_SECTOR_SIZE: u32 = 128 * 1024;

/// Internal flash sectors as (base, size). The first four are 16K, then one
/// 64K sector and seven 128K sectors.
pub const INTERNAL_FLASH_SECTORS: [(u32, u32); 12] = [
    (0x0800_0000, 0x4000),
    (0x0800_4000, 0x4000),
    (0x0800_8000, 0x4000),
    (0x0800_c000, 0x4000),
    (0x0801_0000, 0x1_0000),
    (0x0802_0000, 0x2_0000),
    (0x0804_0000, 0x2_0000),
    (0x0806_0000, 0x2_0000),
    (0x0808_0000, 0x2_0000),
    (0x080a_0000, 0x2_0000),
    (0x080c_0000, 0x2_0000),
    (0x080e_0000, 0x2_0000),
];

/// Index of the sector starting exactly at `address`.
pub fn sector_index(address: u32) -> Option<usize> {
    INTERNAL_FLASH_SECTORS
        .iter()
        .position(|(base, _)| *base == address)
}

pub const EXTERNAL_FLASH_SIZE: u32 = 2 * 1024 * 1024;
pub const EXTERNAL_SECTOR_SIZE: u32 = 4096;

pub const RAM: [AddressRange; 2] = [
    // SRAM1 + SRAM2
    AddressRange::new(0x2000_0000, 0x2002_0000),
    // CCM data RAM
    AddressRange::new(0x1000_0000, 0x1001_0000),
];

pub const MEMORY_MAP: MemoryMap = MemoryMap {
    bootloader: Region::new(0x0800_0000, 0x2_0000),
    app_header: Region::new(0x0802_0000, 0x200),
    app_body: Region::new(0x0802_0200, 0x6_0000 - 0x200),
    backup: Region::new(0x0808_0000, 0x6_0000),
    staging: Region::new(0, 0x10_0000),
    config: Region::new(0x10_0000, 0x1_0000),
    flash: AddressRange::new(FLASH_BASE, FLASH_BASE + FLASH_SIZE),
    ram: &RAM,
    internal_sector_size: IMAGE_SECTOR_SIZE,
    external_sector_size: EXTERNAL_SECTOR_SIZE,
};

pub const BOOT_POLICY: BootPolicy = BootPolicy {
    max_boot_attempts: 3,
    verify_signature: false,
};

/// Backup SRAM, kept alive by VBAT across resets.
pub const BKPSRAM_BASE: usize = 0x4002_4000;

/// External crystal of the controller board.
pub const HSE_HZ: u32 = 8_000_000;
pub const SPI_FLASH_HZ: u32 = 8_000_000;
pub const CONSOLE_BAUD: u32 = 115_200;
