// Licensed under the Apache-2.0 license

//! Access to the [`SharedBootState`] kept in memory that survives resets.
//!
//! The same helpers are linked into the bootloader and the application, so
//! both sides agree on layout and checksum.

use crate::platform::BootPlatform;
use pdc_image::{BootFlags, BootReason, SharedBootState, SHARED_STATE_WORDS};

/// Word-addressed memory that keeps its contents across a system reset.
pub trait RetainedMemory {
    /// Makes the memory accessible. Called once before the first access.
    fn enable(&self) {}

    fn read_words(&self) -> [u32; SHARED_STATE_WORDS];

    fn write_words(&self, words: &[u32; SHARED_STATE_WORDS]);
}

/// Retained memory reached through volatile accesses at a fixed address.
///
/// This is the only place the boot code dereferences a raw pointer into
/// retained memory.
pub struct VolatileRetainedMemory {
    base: *mut u32,
}

impl VolatileRetainedMemory {
    /// # Safety
    ///
    /// `base` must be word aligned and point to `SHARED_STATE_WORDS` words of
    /// memory that nothing else in the program accesses.
    pub const unsafe fn new(base: usize) -> Self {
        VolatileRetainedMemory {
            base: base as *mut u32,
        }
    }
}

impl RetainedMemory for VolatileRetainedMemory {
    fn read_words(&self) -> [u32; SHARED_STATE_WORDS] {
        let mut words = [0u32; SHARED_STATE_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            // SAFETY: in bounds and exclusive per the contract of `new`.
            *word = unsafe { core::ptr::read_volatile(self.base.add(i)) };
        }
        words
    }

    fn write_words(&self, words: &[u32; SHARED_STATE_WORDS]) {
        for (i, word) in words.iter().enumerate() {
            // SAFETY: in bounds and exclusive per the contract of `new`.
            unsafe { core::ptr::write_volatile(self.base.add(i), *word) };
        }
    }
}

/// Loads and stores the shared state with its checksum.
#[derive(Clone, Copy)]
pub struct SharedStateStore<'a> {
    mem: &'a dyn RetainedMemory,
}

impl<'a> SharedStateStore<'a> {
    pub fn new(mem: &'a dyn RetainedMemory) -> Self {
        SharedStateStore { mem }
    }

    /// The stored state, or `None` if magic or checksum do not match.
    pub fn load(&self) -> Option<SharedBootState> {
        let state = SharedBootState::from_words(&self.mem.read_words());
        state.is_valid().then_some(state)
    }

    /// The stored state, falling back to defaults when it is not valid.
    pub fn load_or_default(&self) -> SharedBootState {
        self.load().unwrap_or_default()
    }

    /// Seals `state` and writes it back.
    pub fn store(&self, state: &mut SharedBootState) {
        state.seal();
        self.mem.write_words(&state.to_words());
    }

    fn modify(&self, f: impl FnOnce(&mut SharedBootState)) {
        let mut state = self.load_or_default();
        f(&mut state);
        self.store(&mut state);
    }

    /// Asks the bootloader to apply the staged update on the next boot.
    pub fn request_update(&self) {
        self.modify(|state| state.set_update_requested(true));
    }

    /// Marks the running image healthy: clears the boot attempt counter and
    /// the rollback marker.
    pub fn confirm_boot(&self) {
        self.modify(|state| {
            state.boot_attempt_count = 0;
            state.set_boot_flags(state.boot_flags() - BootFlags::ROLLED_BACK);
        });
    }

    pub fn record_crash(&self, fault_addr: u32) {
        self.modify(|state| {
            state.last_crash_addr = fault_addr;
            state.set_boot_flags(state.boot_flags() | BootFlags::CRASH_RECORDED);
        });
    }

    /// Leaves `reason` for the bootloader without resetting.
    pub fn prepare_reboot(&self, reason: BootReason) {
        self.modify(|state| state.set_reason(reason));
    }

    pub fn request_reboot(&self, reason: BootReason, platform: &dyn BootPlatform) -> ! {
        self.prepare_reboot(reason);
        platform.system_reset()
    }
}
