// Licensed under the Apache-2.0 license

use anyhow::{bail, Result};
use pdc_builder::{load_file, FirmwareImage, StagingImage};
use pdc_config::MemoryMap;
use pdc_image::{FirmwareHeader, StagingStatus, UpdateStagingHeader};
use std::path::Path;

pub(crate) fn create(input: &Path, version: &str, output: &Path, map: &MemoryMap) -> Result<()> {
    let header = pdc_builder::image_build(input, output, version, map)?;
    println!("Firmware image written to {}", output.display());
    print_firmware_header(&header);
    Ok(())
}

pub(crate) fn verify(file: &Path, map: &MemoryMap) -> Result<()> {
    let header = pdc_builder::image_verify(file, map)?;
    println!("{}: valid firmware image", file.display());
    print_firmware_header(&header);
    Ok(())
}

pub(crate) fn staging_create(input: &Path, output: &Path, map: &MemoryMap) -> Result<()> {
    let header = pdc_builder::staging_build(input, output, map)?;
    println!("Staging contents written to {}", output.display());
    print_staging_header(&header);
    Ok(())
}

/// Checks staging contents that may be embedded in a larger dump of the
/// external flash.
pub(crate) fn staging_verify(file: &Path, offset: u32, map: &MemoryMap) -> Result<()> {
    let data = load_file(file)?;
    let Some(region) = data.get(offset as usize..) else {
        bail!("Offset {:#x} is past the end of {}", offset, file.display());
    };
    let staging = StagingImage::parse(region, map)?;
    if staging.header().status() != Some(StagingStatus::Pending) {
        bail!("Staged update is not pending: {:?}", staging.header().status());
    }
    println!("{}: pending update", file.display());
    print_staging_header(staging.header());
    print_firmware_header(FirmwareImage::parse(staging.blob(), map)?.header());
    Ok(())
}

fn print_firmware_header(header: &FirmwareHeader) {
    println!("  Version:        {}", header.version());
    println!("  Build time:     {}", header.build_timestamp);
    println!("  App size:       {:#x}", header.app_size);
    println!("  App CRC32:      {:#010x}", header.app_crc32);
    println!("  Vector table:   {:#010x}", header.vector_table_addr);
    println!("  Entry point:    {:#010x}", header.entry_point);
    println!("  Header CRC32:   {:#010x}", header.header_crc32);
}

fn print_staging_header(header: &UpdateStagingHeader) {
    println!("  Status:         {:?}", header.status());
    println!("  Blob size:      {:#x}", header.firmware_size);
    println!("  Blob CRC32:     {:#010x}", header.firmware_crc32);
    println!("  Timestamp:      {}", header.timestamp);
}
