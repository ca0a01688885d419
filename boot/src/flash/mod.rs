// Licensed under the Apache-2.0 license

pub mod flash_partition;
pub mod hil;
pub mod spi_nor;

pub use flash_partition::{copy_region, FlashPartition, COPY_BLOCK_SIZE};
pub use hil::{FlashDrvError, FlashStorage};
pub use spi_nor::SpiNorFlash;
