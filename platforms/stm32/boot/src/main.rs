/*++

Licensed under the Apache-2.0 license.

File Name:

    main.rs

Abstract:

    File contains main entry point for the STM32F407 bootloader

--*/

#![cfg_attr(target_arch = "arm", no_std)]
#![no_main]

#[cfg(target_arch = "arm")]
mod flash;
#[cfg(target_arch = "arm")]
mod io;
#[cfg(target_arch = "arm")]
mod platform;
#[cfg(target_arch = "arm")]
mod spi;
#[cfg(target_arch = "arm")]
mod stm32;
#[cfg(target_arch = "arm")]
mod transfer;

#[cfg(target_arch = "arm")]
use panic_halt as _;

#[cfg(target_arch = "arm")]
#[cortex_m_rt::entry]
fn main() -> ! {
    stm32::boot_entry()
}

#[cfg(not(target_arch = "arm"))]
#[no_mangle]
pub extern "C" fn main() {
    // no-op on the host just to keep the build clean
}
