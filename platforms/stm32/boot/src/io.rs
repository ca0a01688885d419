// Licensed under the Apache-2.0 license.

//! USART2 console on PA2/PA3 and the `log` backend that writes to it.

use core::cell::RefCell;
use core::fmt::Write;
use cortex_m::interrupt::Mutex;
use log::{LevelFilter, Log, Metadata, Record};
use stm32f4xx_hal::{pac::USART2, serial::Serial};

const TX_POLLS: u32 = 100_000;

static CONSOLE: Mutex<RefCell<Option<Serial<USART2>>>> = Mutex::new(RefCell::new(None));

pub fn init_console(serial: Serial<USART2>) {
    cortex_m::interrupt::free(|cs| CONSOLE.borrow(cs).replace(Some(serial)));
}

/// Waits until the last byte has left the shift register.
pub fn flush() {
    // SAFETY: reads the status register of the console UART only.
    let usart = unsafe { &*USART2::ptr() };
    for _ in 0..TX_POLLS {
        if usart.sr().read().tc().bit_is_set() {
            return;
        }
    }
}

pub struct Console;

impl Write for Console {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        cortex_m::interrupt::free(|cs| match CONSOLE.borrow(cs).borrow_mut().as_mut() {
            Some(serial) => serial.write_str(s),
            // Output before bring-up, or without a console, is dropped.
            None => Ok(()),
        })
    }
}

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = write!(Console, "{:<5} {}\r\n", record.level(), record.args());
        }
    }

    fn flush(&self) {
        flush();
    }
}

pub fn init_logger(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
