// Licensed under the Apache-2.0 license

//! Reset controller, boot button and backup SRAM of the STM32F407.

use pdc_boot_common::{BootPlatform, ResetFlags, RetainedMemory, VolatileRetainedMemory};
use pdc_config_stm32::BKPSRAM_BASE;
use pdc_image::SHARED_STATE_WORDS;
use stm32f4xx_hal::{
    gpio::{Input, PC13},
    pac,
};

const RCC_CSR_BORRSTF: u32 = 1 << 25;
const RCC_CSR_PINRSTF: u32 = 1 << 26;
const RCC_CSR_PORRSTF: u32 = 1 << 27;
const RCC_CSR_SFTRSTF: u32 = 1 << 28;
const RCC_CSR_IWDGRSTF: u32 = 1 << 29;
const RCC_CSR_WWDGRSTF: u32 = 1 << 30;

const BUTTON_SAMPLES: u32 = 1000;
const REGULATOR_POLLS: u32 = 100_000;

pub struct Stm32Platform {
    /// User button, active low.
    button: PC13<Input>,
    reset_flags: ResetFlags,
}

impl Stm32Platform {
    pub fn new(reset_flags: ResetFlags, button: PC13<Input>) -> Self {
        Stm32Platform {
            button,
            reset_flags,
        }
    }
}

/// Reads the reset cause latches. Must run before the clock tree is
/// reconfigured, which takes ownership of the RCC block.
pub fn sample_reset_flags(rcc: &pac::RCC) -> ResetFlags {
    decode_reset_flags(rcc.csr().read().bits())
}

fn decode_reset_flags(csr: u32) -> ResetFlags {
    let mut flags = ResetFlags::empty();
    if csr & (RCC_CSR_IWDGRSTF | RCC_CSR_WWDGRSTF) != 0 {
        flags |= ResetFlags::WATCHDOG;
    }
    if csr & RCC_CSR_SFTRSTF != 0 {
        flags |= ResetFlags::SOFTWARE;
    }
    if csr & (RCC_CSR_PORRSTF | RCC_CSR_BORRSTF) != 0 {
        flags |= ResetFlags::POWER_ON;
    }
    if csr & RCC_CSR_PINRSTF != 0 {
        flags |= ResetFlags::PIN;
    }
    flags
}

impl BootPlatform for Stm32Platform {
    fn reset_flags(&self) -> ResetFlags {
        self.reset_flags
    }

    fn clear_reset_flags(&self) {
        // SAFETY: RMVF only clears the reset cause latches, which the clock
        // driver never touches.
        let rcc = unsafe { &*pac::RCC::ptr() };
        rcc.csr().modify(|_, w| w.rmvf().set_bit());
    }

    fn manual_entry_requested(&self) -> bool {
        // Pressed for every sample, so a bouncing contact does not count.
        (0..BUTTON_SAMPLES).all(|_| self.button.is_low())
    }

    fn system_reset(&self) -> ! {
        crate::io::flush();
        cortex_m::peripheral::SCB::sys_reset()
    }
}

/// Shared boot state in the 4K backup SRAM.
pub struct BackupSram {
    pwr: pac::PWR,
    mem: VolatileRetainedMemory,
}

impl BackupSram {
    /// Enables the power controller and backup SRAM clocks.
    pub fn new(rcc: &pac::RCC, pwr: pac::PWR) -> Self {
        rcc.apb1enr().modify(|_, w| w.pwren().set_bit());
        rcc.ahb1enr().modify(|_, w| w.bkpsramen().set_bit());
        BackupSram {
            pwr,
            // SAFETY: the first words of backup SRAM are reserved for the
            // shared boot state in both bootloader and application.
            mem: unsafe { VolatileRetainedMemory::new(BKPSRAM_BASE) },
        }
    }
}

impl RetainedMemory for BackupSram {
    fn enable(&self) {
        self.pwr.cr().modify(|_, w| w.dbp().set_bit());
        self.pwr.csr().modify(|_, w| w.bre().set_bit());
        if !(0..REGULATOR_POLLS).any(|_| self.pwr.csr().read().brr().bit_is_set()) {
            log::warn!("[pdc-boot] Backup regulator not ready, state lost on power-off");
        }
    }

    fn read_words(&self) -> [u32; SHARED_STATE_WORDS] {
        self.mem.read_words()
    }

    fn write_words(&self, words: &[u32; SHARED_STATE_WORDS]) {
        self.mem.write_words(words)
    }
}
