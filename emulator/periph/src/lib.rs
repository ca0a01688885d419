/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    Host-side emulation of the storage, retained memory and board services
    used by the boot code.

--*/

mod flash;
mod platform;
mod retained;
mod spi_flash;
mod transfer;

pub use flash::{EmulatedFlash, FlashStats};
pub use platform::{EmulatedPlatform, SYSTEM_RESET_PANIC};
pub use retained::EmulatedRetainedMemory;
pub use spi_flash::{EmulatedSpiFlash, SpiFlashErr};
pub use transfer::RecordingTransfer;
