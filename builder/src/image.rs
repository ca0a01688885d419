// Licensed under the Apache-2.0 license

//! Host-side construction and checking of firmware images and staging
//! region contents.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use pdc_config::MemoryMap;
use pdc_image::{
    crc32, FirmwareHeader, FirmwareVersion, StagingStatus, UpdateStagingHeader, ERASED_BYTE,
    FIRMWARE_HEADER_SIZE, STAGING_HEADER_SIZE,
};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use zerocopy::{FromBytes, IntoBytes};

/// An application image laid out as it sits in the primary slot: the
/// firmware header padded with erased bytes to the header region, then the
/// body.
#[derive(Clone, Debug)]
pub struct FirmwareImage {
    header: FirmwareHeader,
    body: Vec<u8>,
    header_region_size: usize,
}

impl FirmwareImage {
    /// Wraps a raw application binary linked for the primary body address.
    pub fn new(
        body: Vec<u8>,
        version: FirmwareVersion,
        timestamp: u32,
        map: &MemoryMap,
    ) -> Result<Self> {
        let header_region_size = map.header_region_size() as usize;
        if header_region_size < FIRMWARE_HEADER_SIZE {
            bail!(
                "Header region of {} bytes cannot hold a {} byte header",
                header_region_size,
                FIRMWARE_HEADER_SIZE
            );
        }
        if body.len() < 8 {
            bail!("Body of {} bytes has no vector table", body.len());
        }
        if body.len() > map.app_body.size as usize {
            bail!(
                "Body of {} bytes exceeds the {} byte application region",
                body.len(),
                map.app_body.size
            );
        }

        let (stack_pointer, reset_handler) = vector_table(&body)?;
        if !map.is_valid_stack_pointer(stack_pointer) {
            bail!("Initial stack pointer {:#010x} is not in RAM", stack_pointer);
        }
        if !map.is_valid_reset_handler(reset_handler) {
            bail!("Reset handler {:#010x} is not in flash", reset_handler);
        }

        let mut header = FirmwareHeader::new(
            body.len() as u32,
            crc32(&body),
            map.app_body.base,
            reset_handler,
        );
        header.set_version(version);
        header.build_timestamp = timestamp;
        header.seal();

        Ok(Self {
            header,
            body,
            header_region_size,
        })
    }

    /// Parses and checks an image produced by [`FirmwareImage::to_bytes`].
    pub fn parse(blob: &[u8], map: &MemoryMap) -> Result<Self> {
        let header_region_size = map.header_region_size() as usize;
        if blob.len() < header_region_size || header_region_size < FIRMWARE_HEADER_SIZE {
            bail!("Image too small to contain the header region.");
        }
        let header = FirmwareHeader::read_from_bytes(&blob[..FIRMWARE_HEADER_SIZE])
            .map_err(|_| anyhow!("Failed to parse firmware header"))?;
        if !header.is_magic_valid() {
            bail!("Invalid header: incorrect magic number.");
        }
        if !header.is_header_crc_valid() {
            bail!("Header CRC mismatch.");
        }

        let body = &blob[header_region_size..];
        if header.app_size as usize != body.len() {
            bail!(
                "Header announces {} body bytes, image holds {}",
                header.app_size,
                body.len()
            );
        }
        if crc32(body) != header.app_crc32 {
            bail!("Body CRC mismatch.");
        }
        if header.vector_table_addr != map.app_body.base {
            bail!(
                "Vector table at {:#010x}, primary body starts at {:#010x}",
                header.vector_table_addr,
                map.app_body.base
            );
        }

        Ok(Self {
            header,
            body: body.to_vec(),
            header_region_size,
        })
    }

    pub fn header(&self) -> &FirmwareHeader {
        &self.header
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Size of the image in the primary slot, header region included.
    pub fn len(&self) -> usize {
        self.header_region_size + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![ERASED_BYTE; self.header_region_size];
        bytes[..FIRMWARE_HEADER_SIZE].copy_from_slice(self.header.as_bytes());
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

/// Contents of the external staging region for factory programming: the
/// staging header owns the first sector and the blob starts at the staging
/// data offset.
#[derive(Clone, Debug)]
pub struct StagingImage {
    header: UpdateStagingHeader,
    blob: Vec<u8>,
    data_offset: usize,
}

impl StagingImage {
    /// Stages `blob` as a pending update. The blob must be a valid image.
    pub fn new(blob: Vec<u8>, timestamp: u32, map: &MemoryMap) -> Result<Self> {
        FirmwareImage::parse(&blob, map)?;
        if blob.len() > map.staging_capacity() as usize {
            bail!(
                "Image of {} bytes exceeds the {} byte staging area",
                blob.len(),
                map.staging_capacity()
            );
        }
        if blob.len() > map.primary().size as usize {
            bail!(
                "Image of {} bytes does not fit the {} byte primary slot",
                blob.len(),
                map.primary().size
            );
        }
        let header = UpdateStagingHeader::new_pending(blob.len() as u32, crc32(&blob), timestamp);
        Ok(Self {
            header,
            blob,
            data_offset: map.staging_data_offset() as usize,
        })
    }

    /// Parses staging region contents, whatever their status.
    pub fn parse(data: &[u8], map: &MemoryMap) -> Result<Self> {
        let data_offset = map.staging_data_offset() as usize;
        if data.len() < data_offset || data_offset < STAGING_HEADER_SIZE {
            bail!("Staging image too small to contain the header sector.");
        }
        let header = UpdateStagingHeader::read_from_bytes(&data[..STAGING_HEADER_SIZE])
            .map_err(|_| anyhow!("Failed to parse staging header"))?;
        if !header.is_magic_valid() {
            bail!("Invalid staging header: incorrect magic number.");
        }
        if !header.is_crc_valid() {
            bail!("Staging header CRC mismatch.");
        }
        if header.status().is_none() {
            bail!("Unknown staging status {}", header.status);
        }
        if header.header_offset != 0 {
            bail!("Unsupported firmware header offset {}", header.header_offset);
        }

        let end = data_offset + header.firmware_size as usize;
        if data.len() < end {
            bail!(
                "Staging header announces {} bytes, {} present",
                header.firmware_size,
                data.len() - data_offset
            );
        }
        let blob = &data[data_offset..end];
        if crc32(blob) != header.firmware_crc32 {
            bail!("Staged image CRC mismatch.");
        }
        FirmwareImage::parse(blob, map)?;

        Ok(Self {
            header,
            blob: blob.to_vec(),
            data_offset,
        })
    }

    pub fn header(&self) -> &UpdateStagingHeader {
        &self.header
    }

    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![ERASED_BYTE; self.data_offset];
        bytes[..STAGING_HEADER_SIZE].copy_from_slice(self.header.as_bytes());
        bytes.extend_from_slice(&self.blob);
        bytes
    }
}

fn vector_table(body: &[u8]) -> Result<(u32, u32)> {
    let word = |i: usize| -> Result<u32> {
        let bytes = body
            .get(i * 4..i * 4 + 4)
            .ok_or_else(|| anyhow!("Body too small for a vector table"))?;
        Ok(u32::from_le_bytes(bytes.try_into()?))
    };
    Ok((word(0)?, word(1)?))
}

/// Parses `major.minor.patch[+build]`. The build metadata, when present,
/// must be a number and becomes the build number.
pub fn parse_version(version: &str) -> Result<FirmwareVersion> {
    let parsed = semver::Version::parse(version)
        .map_err(|e| anyhow!("Invalid version '{}': {}", version, e))?;
    let component = |value: u64, name: &str| -> Result<u32> {
        u32::try_from(value).map_err(|_| anyhow!("Version {} component {} too large", name, value))
    };
    let build = if parsed.build.is_empty() {
        0
    } else {
        parsed
            .build
            .as_str()
            .parse::<u32>()
            .map_err(|_| anyhow!("Build metadata '{}' is not a number", parsed.build))?
    };
    Ok(FirmwareVersion {
        major: component(parsed.major, "major")?,
        minor: component(parsed.minor, "minor")?,
        patch: component(parsed.patch, "patch")?,
        build,
    })
}

/// Seconds since the epoch for the header timestamp. `SOURCE_DATE_EPOCH`
/// overrides the clock so builds can be reproduced.
pub fn build_timestamp() -> Result<u32> {
    let time = match std::env::var("SOURCE_DATE_EPOCH") {
        Ok(epoch) => {
            let seconds = epoch
                .parse::<i64>()
                .map_err(|_| anyhow!("SOURCE_DATE_EPOCH '{}' is not a number", epoch))?;
            DateTime::<Utc>::from_timestamp(seconds, 0)
                .ok_or_else(|| anyhow!("SOURCE_DATE_EPOCH {} out of range", seconds))?
        }
        Err(_) => Utc::now(),
    };
    u32::try_from(time.timestamp()).map_err(|_| anyhow!("Timestamp {} does not fit 32 bits", time))
}

pub fn load_file(path: &Path) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut file = File::open(path)
        .map_err(|e| anyhow!("Cannot open file '{}': {}", path.display(), e))?;
    file.read_to_end(&mut buffer)
        .map_err(|e| anyhow!("Cannot read file '{}': {}", path.display(), e))?;
    Ok(buffer)
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data).map_err(|e| anyhow!("Unable to write file {}: {}", path.display(), e))
}

/// Wraps the raw application binary at `input` and writes the image to
/// `output`.
pub fn image_build(
    input: &Path,
    output: &Path,
    version: &str,
    map: &MemoryMap,
) -> Result<FirmwareHeader> {
    let body = load_file(input)?;
    let image = FirmwareImage::new(body, parse_version(version)?, build_timestamp()?, map)?;
    write_file(output, &image.to_bytes())?;
    Ok(*image.header())
}

pub fn image_verify(path: &Path, map: &MemoryMap) -> Result<FirmwareHeader> {
    let image = FirmwareImage::parse(&load_file(path)?, map)?;
    Ok(*image.header())
}

/// Turns the image at `input` into staging region contents at `output`.
pub fn staging_build(input: &Path, output: &Path, map: &MemoryMap) -> Result<UpdateStagingHeader> {
    let staging = StagingImage::new(load_file(input)?, build_timestamp()?, map)?;
    write_file(output, &staging.to_bytes())?;
    Ok(*staging.header())
}

/// Checks staging region contents. Only a pending update is accepted.
pub fn staging_verify(path: &Path, map: &MemoryMap) -> Result<UpdateStagingHeader> {
    let staging = StagingImage::parse(&load_file(path)?, map)?;
    match staging.header().status() {
        Some(StagingStatus::Pending) => Ok(*staging.header()),
        status => bail!("Staged update is not pending: {:?}", status),
    }
}
