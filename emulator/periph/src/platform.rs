// Licensed under the Apache-2.0 license

use pdc_boot_common::platform::{BootPlatform, ResetFlags};
use std::cell::Cell;

/// Board services with scriptable reset flags and boot button.
///
/// `system_reset` cannot return, so it panics after counting the request.
/// Tests observe it with `std::panic::catch_unwind`.
#[derive(Default)]
pub struct EmulatedPlatform {
    reset_flags: Cell<ResetFlags>,
    manual_entry: Cell<bool>,
    flags_cleared: Cell<bool>,
    reset_requests: Cell<u32>,
}

pub const SYSTEM_RESET_PANIC: &str = "emulated system reset";

impl EmulatedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reset_flags(&self, flags: ResetFlags) {
        self.reset_flags.set(flags);
        self.flags_cleared.set(false);
    }

    pub fn set_manual_entry(&self, pressed: bool) {
        self.manual_entry.set(pressed);
    }

    pub fn flags_cleared(&self) -> bool {
        self.flags_cleared.get()
    }

    pub fn reset_requests(&self) -> u32 {
        self.reset_requests.get()
    }
}

impl BootPlatform for EmulatedPlatform {
    fn reset_flags(&self) -> ResetFlags {
        self.reset_flags.get()
    }

    fn clear_reset_flags(&self) {
        self.reset_flags.set(ResetFlags::empty());
        self.flags_cleared.set(true);
    }

    fn manual_entry_requested(&self) -> bool {
        self.manual_entry.get()
    }

    fn system_reset(&self) -> ! {
        self.reset_requests.set(self.reset_requests.get() + 1);
        panic!("{}", SYSTEM_RESET_PANIC);
    }
}
