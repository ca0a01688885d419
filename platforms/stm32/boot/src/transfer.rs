// Licensed under the Apache-2.0 license

use pdc_boot_common::BootTransfer;

/// System control block vector table offset register.
const SCB_VTOR: *mut u32 = 0xe000_ed08 as *mut u32;

/// Starts an image by loading its stack pointer and reset vector.
pub struct CortexMTransfer;

impl BootTransfer for CortexMTransfer {
    fn transfer(&self, vector_table_addr: u32) {
        crate::io::flush();
        cortex_m::interrupt::disable();
        // SAFETY: the engine only transfers to an image whose vector table
        // passed validation, so word 0 is a RAM stack top and word 1 a reset
        // handler in flash. Nothing of the bootloader runs afterwards.
        unsafe {
            core::ptr::write_volatile(SCB_VTOR, vector_table_addr);
            cortex_m::asm::dsb();
            cortex_m::asm::isb();
            cortex_m::asm::bootload(vector_table_addr as *const u32)
        }
    }
}
