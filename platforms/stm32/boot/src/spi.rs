// Licensed under the Apache-2.0 license

// SPI1 bus with a GPIO chip select, wired to the external NOR flash.

use embedded_hal::spi::{ErrorType, Operation, SpiBus, SpiDevice};
use pdc_config_stm32::HSE_HZ;
use stm32f4xx_hal::{
    gpio::{Output, PushPull, PA4},
    pac::SPI1,
    spi::{Error, Spi},
};

const NS_PER_CYCLE: u32 = 1_000_000_000 / HSE_HZ;

/// The staging flash as the only device on SPI1. The chip select is held
/// low for a whole transaction.
pub struct SpiNorDevice {
    bus: Spi<SPI1>,
    cs: PA4<Output<PushPull>>,
}

impl SpiNorDevice {
    pub fn new(bus: Spi<SPI1>, mut cs: PA4<Output<PushPull>>) -> Self {
        cs.set_high();
        SpiNorDevice { bus, cs }
    }

    fn run(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Error> {
        for operation in operations.iter_mut() {
            match operation {
                Operation::Read(buf) => SpiBus::read(&mut self.bus, buf)?,
                Operation::Write(bytes) => SpiBus::write(&mut self.bus, bytes)?,
                Operation::Transfer(read, write) => SpiBus::transfer(&mut self.bus, read, write)?,
                Operation::TransferInPlace(buf) => SpiBus::transfer_in_place(&mut self.bus, buf)?,
                Operation::DelayNs(ns) => cortex_m::asm::delay(ns.div_ceil(NS_PER_CYCLE)),
            }
        }
        Ok(())
    }
}

impl ErrorType for SpiNorDevice {
    type Error = Error;
}

impl SpiDevice for SpiNorDevice {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        self.cs.set_low();
        let result = self.run(operations);
        // The last byte must be clocked out before the chip is released.
        let flushed = SpiBus::flush(&mut self.bus);
        self.cs.set_high();
        result.and(flushed)
    }
}
