// Licensed under the Apache-2.0 license

use bitflags::bitflags;
use core::mem::{offset_of, size_of};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

pub const SHARED_STATE_MAGIC: u32 = u32::from_le_bytes(*b"PDBS");
pub const SHARED_STATE_SIZE: usize = size_of::<SharedBootState>();
pub const SHARED_STATE_WORDS: usize = SHARED_STATE_SIZE / 4;

/// Why the bootloader is running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum BootReason {
    /// Cold start, or nothing more specific is known.
    #[default]
    PowerOn = 0,
    Watchdog = 1,
    /// The reset controller reports a software reset. The application may
    /// have asked for an update or crashed; the flag alone does not say which.
    SoftwareReset = 2,
    UpdateRequest = 3,
    ManualEntry = 4,
    ApplicationRequest = 5,
    BootFailure = 6,
}

bitflags! {
    /// Persistent markers kept in [`SharedBootState::flags`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BootFlags: u32 {
        /// The bootloader installed a staged update on the last boot.
        const UPDATE_APPLIED = 1 << 0;
        /// The bootloader restored the backup image and the application has
        /// not confirmed a healthy boot since.
        const ROLLED_BACK = 1 << 1;
        /// `last_crash_addr` holds a fault address recorded by the application.
        const CRASH_RECORDED = 1 << 2;
    }
}

/// State handed between bootloader and application through retained memory.
///
/// Both programs must agree on this exact layout and on [`Self::compute_checksum`].
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct SharedBootState {
    pub magic: u32,
    pub boot_reason: u32,
    pub update_requested: u32,
    pub boot_attempt_count: u32,
    pub last_crash_addr: u32,
    pub flags: u32,
    pub checksum: u32,
}

impl Default for SharedBootState {
    fn default() -> Self {
        let mut state = Self::new_zeroed();
        state.magic = SHARED_STATE_MAGIC;
        state.boot_reason = BootReason::PowerOn.into();
        state.seal();
        state
    }
}

impl SharedBootState {
    pub fn from_words(words: &[u32; SHARED_STATE_WORDS]) -> Self {
        SharedBootState {
            magic: words[0],
            boot_reason: words[1],
            update_requested: words[2],
            boot_attempt_count: words[3],
            last_crash_addr: words[4],
            flags: words[5],
            checksum: words[6],
        }
    }

    pub fn to_words(&self) -> [u32; SHARED_STATE_WORDS] {
        [
            self.magic,
            self.boot_reason,
            self.update_requested,
            self.boot_attempt_count,
            self.last_crash_addr,
            self.flags,
            self.checksum,
        ]
    }

    /// XOR-folds every word before the checksum, rotating the accumulator left
    /// by 7 bits after each fold.
    pub fn compute_checksum(&self) -> u32 {
        let covered = offset_of!(SharedBootState, checksum) / 4;
        self.to_words()[..covered]
            .iter()
            .fold(0u32, |acc, &word| (acc ^ word).rotate_left(7))
    }

    pub fn seal(&mut self) {
        self.checksum = self.compute_checksum();
    }

    /// Magic and checksum both match. Anything else is treated as
    /// uninitialized memory, never as tampering.
    pub fn is_valid(&self) -> bool {
        self.magic == SHARED_STATE_MAGIC && self.checksum == self.compute_checksum()
    }

    pub fn reason(&self) -> BootReason {
        BootReason::try_from(self.boot_reason).unwrap_or_default()
    }

    pub fn set_reason(&mut self, reason: BootReason) {
        self.boot_reason = reason.into();
    }

    pub fn is_update_requested(&self) -> bool {
        self.update_requested != 0
    }

    pub fn set_update_requested(&mut self, requested: bool) {
        self.update_requested = requested as u32;
    }

    pub fn boot_flags(&self) -> BootFlags {
        BootFlags::from_bits_truncate(self.flags)
    }

    pub fn set_boot_flags(&mut self, flags: BootFlags) {
        self.flags = flags.bits();
    }
}
