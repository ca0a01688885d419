// Licensed under the Apache-2.0 license

#![cfg_attr(target_os = "none", no_std)]

/// A contiguous block of addresses in one storage device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub base: u32,
    pub size: u32,
}

impl Region {
    pub const fn new(base: u32, size: u32) -> Self {
        Region { base, size }
    }

    /// First address past the end of the region.
    pub const fn end(&self) -> u32 {
        self.base + self.size
    }

    pub const fn contains(&self, address: u32) -> bool {
        address >= self.base && address < self.end()
    }

    pub const fn overlaps(&self, other: &Region) -> bool {
        self.base < other.end() && other.base < self.end()
    }

    pub const fn is_aligned_to(&self, granularity: u32) -> bool {
        granularity != 0 && self.base % granularity == 0 && self.size % granularity == 0
    }
}

/// Half-open address range `[start, end)` on the system bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressRange {
    pub start: u32,
    pub end: u32,
}

impl AddressRange {
    pub const fn new(start: u32, end: u32) -> Self {
        AddressRange { start, end }
    }

    pub const fn contains(&self, address: u32) -> bool {
        address >= self.start && address < self.end
    }

    /// Initial stack pointers point one past the top of the stack, so the end
    /// address itself is accepted and the start address is not.
    pub const fn contains_stack_top(&self, sp: u32) -> bool {
        sp > self.start && sp <= self.end
    }
}

/// Reasons a memory map is rejected by [`MemoryMap::check`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryMapError {
    /// The application body does not start right after the header region.
    HeaderNotAdjacent,
    /// Backup and primary regions differ in size.
    BackupSizeMismatch,
    /// Two internal regions overlap.
    Overlap,
    /// A region is not aligned to the erase granularity of its device.
    Misaligned,
    /// The staging region cannot hold a header sector plus a full image.
    StagingTooSmall,
}

/// Board-defined layout of internal and external flash as seen by the boot
/// and update subsystem.
///
/// Internal regions use absolute bus addresses. External regions are
/// flat-addressed from 0 on the external device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryMap {
    /// Never written at runtime.
    pub bootloader: Region,
    /// Holds the firmware header of the primary image, padded to the region size.
    pub app_header: Region,
    pub app_body: Region,
    /// Header and body of the backup image, laid out like the primary.
    pub backup: Region,
    /// External staging buffer for uploaded updates.
    pub staging: Region,
    /// External configuration store (owned by the application).
    pub config: Region,
    /// Code range a reset handler must point into.
    pub flash: AddressRange,
    /// Ranges an initial stack pointer may point into.
    pub ram: &'static [AddressRange],
    pub internal_sector_size: u32,
    pub external_sector_size: u32,
}

impl MemoryMap {
    /// Header and body of the primary image as one region.
    pub const fn primary(&self) -> Region {
        Region::new(self.app_header.base, self.app_header.size + self.app_body.size)
    }

    pub const fn header_region_size(&self) -> u32 {
        self.app_header.size
    }

    /// Offset of the staged blob from the start of the staging region. The
    /// staging header owns the whole first sector.
    pub const fn staging_data_offset(&self) -> u32 {
        self.external_sector_size
    }

    pub const fn staging_capacity(&self) -> u32 {
        self.staging.size - self.staging_data_offset()
    }

    pub fn is_valid_stack_pointer(&self, sp: u32) -> bool {
        self.ram.iter().any(|range| range.contains_stack_top(sp))
    }

    pub fn is_valid_reset_handler(&self, handler: u32) -> bool {
        // Thumb entry points have bit 0 set.
        self.flash.contains(handler & !1)
    }

    /// Verifies the structural invariants the update code relies on.
    pub fn check(&self) -> Result<(), MemoryMapError> {
        if self.app_header.end() != self.app_body.base {
            return Err(MemoryMapError::HeaderNotAdjacent);
        }
        if self.backup.size != self.primary().size {
            return Err(MemoryMapError::BackupSizeMismatch);
        }
        let internal = [self.bootloader, self.primary(), self.backup];
        for (i, a) in internal.iter().enumerate() {
            for b in internal.iter().skip(i + 1) {
                if a.overlaps(b) {
                    return Err(MemoryMapError::Overlap);
                }
            }
        }
        if self.staging.overlaps(&self.config) {
            return Err(MemoryMapError::Overlap);
        }
        if !self.primary().is_aligned_to(self.internal_sector_size)
            || !self.backup.is_aligned_to(self.internal_sector_size)
            || !self.staging.is_aligned_to(self.external_sector_size)
        {
            return Err(MemoryMapError::Misaligned);
        }
        if self.staging.size < self.staging_data_offset() + self.primary().size {
            return Err(MemoryMapError::StagingTooSmall);
        }
        Ok(())
    }
}

/// Tunables of the boot decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootPolicy {
    /// Consecutive unconfirmed boots before the backup is restored.
    pub max_boot_attempts: u32,
    /// Ask the signature hook to run during validation.
    pub verify_signature: bool,
}

impl Default for BootPolicy {
    fn default() -> Self {
        BootPolicy {
            max_boot_attempts: 3,
            verify_signature: false,
        }
    }
}
