/*++

Licensed under the Apache-2.0 license.

File Name:

    stm32.rs

Abstract:

    File contains the STM32F407 boot flow: board bring-up, boot decision
    and the resident loop.

--*/

use crate::flash::InternalFlash;
use crate::io;
use crate::platform::{self, BackupSram, Stm32Platform};
use crate::spi::SpiNorDevice;
use crate::transfer::CortexMTransfer;
use log::LevelFilter;
use pdc_boot_common::{BootEngine, BootEnv, RunOutcome, SpiNorFlash, UnverifiedSignature};
use pdc_config_stm32::{
    BOOT_POLICY, CONSOLE_BAUD, EXTERNAL_FLASH_SIZE, HSE_HZ, MEMORY_MAP, SPI_FLASH_HZ,
};
use stm32f4xx_hal::{
    gpio::PinState,
    pac,
    prelude::*,
    rcc::Config,
    serial::{config::Config as SerialConfig, Serial},
    spi::{Mode, Phase, Polarity, Spi},
};

const SPI_MODE: Mode = Mode {
    polarity: Polarity::IdleLow,
    phase: Phase::CaptureOnFirstTransition,
};

pub fn boot_entry() -> ! {
    let Some(dp) = pac::Peripherals::take() else {
        loop {
            cortex_m::asm::wfi();
        }
    };

    // Reset cause and backup SRAM clocks are set up on the raw RCC block
    // before the HAL takes it over.
    let reset_flags = platform::sample_reset_flags(&dp.RCC);
    let retained = BackupSram::new(&dp.RCC, dp.PWR);
    let rcc = dp.RCC.constrain();
    let mut rcc = rcc.freeze(Config::hse(HSE_HZ.Hz()));

    let gpioa = dp.GPIOA.split(&mut rcc);
    let gpioc = dp.GPIOC.split(&mut rcc);

    if let Ok(serial) = Serial::new(
        dp.USART2,
        (gpioa.pa2.into_alternate(), gpioa.pa3.into_alternate()),
        SerialConfig::default().baudrate(CONSOLE_BAUD.bps()),
        &mut rcc,
    ) {
        io::init_console(serial);
    }
    io::init_logger(LevelFilter::Info);
    log::info!("[pdc-boot] Hello from the PDC bootloader");

    let spi = Spi::new(
        dp.SPI1,
        (gpioa.pa5, gpioa.pa6, gpioa.pa7),
        SPI_MODE,
        SPI_FLASH_HZ.Hz(),
        &mut rcc,
    );
    let cs = gpioa.pa4.into_push_pull_output_in_state(PinState::High);
    let external = SpiNorFlash::new(SpiNorDevice::new(spi, cs), EXTERNAL_FLASH_SIZE as usize);
    let internal = InternalFlash::new(dp.FLASH);
    let platform = Stm32Platform::new(reset_flags, gpioc.pc13.into_pull_up_input());

    let mut engine = BootEngine::new(BootEnv {
        internal_flash: &internal,
        external_flash: &external,
        retained: &retained,
        platform: &platform,
        transfer: &CortexMTransfer,
        signature: &UnverifiedSignature,
        map: &MEMORY_MAP,
        policy: BOOT_POLICY,
    });

    if let Err(err) = engine.init() {
        log::error!("[pdc-boot] Boot init failed: {}", err);
        resident(&engine);
    }
    match engine.run() {
        Ok(RunOutcome::Resident) => {}
        // The Cortex-M transfer does not return.
        Ok(RunOutcome::Transferred { vector_table_addr }) => {
            log::error!("[pdc-boot] Image at {:#010x} returned", vector_table_addr);
        }
        Err(err) => log::error!("[pdc-boot] Boot failed: {}", err),
    }
    resident(&engine)
}

/// Stays in the bootloader. An update transport would be served from here;
/// until then the board waits for a reset.
fn resident(engine: &BootEngine) -> ! {
    let diag = engine.diagnostics();
    log::info!(
        "[pdc-boot] Resident: primary {:?} backup {:?} attempts {} status {:?} at {:?}",
        diag.primary_status,
        diag.backup_status,
        diag.boot_attempts,
        diag.last_status,
        diag.checkpoint
    );
    io::flush();
    loop {
        cortex_m::asm::wfi();
    }
}
