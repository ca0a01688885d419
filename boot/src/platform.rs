// Licensed under the Apache-2.0 license

use bitflags::bitflags;

bitflags! {
    /// Reset causes latched by the reset controller.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ResetFlags: u32 {
        const POWER_ON = 1 << 0;
        const PIN = 1 << 1;
        const SOFTWARE = 1 << 2;
        const WATCHDOG = 1 << 3;
    }
}

/// Board services the boot decision needs besides storage.
pub trait BootPlatform {
    /// Reset causes since the flags were last cleared.
    fn reset_flags(&self) -> ResetFlags;

    fn clear_reset_flags(&self);

    /// True while the operator holds the board in the bootloader, usually
    /// with a button sampled at power-up.
    fn manual_entry_requested(&self) -> bool;

    fn system_reset(&self) -> !;
}
