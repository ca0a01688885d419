/*++

Licensed under the Apache-2.0 license.

File Name:

    spi_flash.rs

Abstract:

    File contains SPI NOR flash emulation behind an embedded-hal SpiDevice

--*/

use embedded_hal::spi::{self, ErrorKind, ErrorType, Operation, SpiDevice};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use pdc_image::ERASED_BYTE;
use std::{cell::RefCell, rc::Rc};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpiFlashErr {
    SpiFlashBusy,
    WriteDisabled,
    InvalidOpcode,
    InvalidAddress,
    CrossPageProgram,
    EraseAdressUnaligned,
    BytesReqNothingToSend,
}

impl spi::Error for SpiFlashErr {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
enum JedecSpiFlashCmd {
    PageProgram = 0x02,
    Read = 0x03,
    WriteDisable = 0x04,
    Rdsr1 = 0x05,
    WriteEnable = 0x06,
    SectorErase = 0x20,
    Rdid = 0x9f,
}

impl JedecSpiFlashCmd {
    fn address_length(self) -> u8 {
        match self {
            Self::PageProgram | Self::Read | Self::SectorErase => 3,
            _ => 0,
        }
    }
}

const STATUS_BUSY: u8 = 1 << 0;
const STATUS_WEL: u8 = 1 << 1;
const PAGE_SIZE: usize = 256;
const SECTOR_SIZE: usize = 4096;
const JEDEC_ID: [u8; 3] = [0xef, 0x40, 0x18];

/// One command between chip select low and high.
struct Command {
    cmd: JedecSpiFlashCmd,
    address: usize,
    address_bytes: u8,
    payload: Vec<u8>,
}

impl Command {
    fn address_complete(&self) -> bool {
        self.address_bytes == self.cmd.address_length()
    }
}

struct FlashState {
    data: Vec<u8>,
    write_enable: bool,
    busy_polls: u32,
    program_busy_polls: u32,
    erase_busy_polls: u32,
    stuck_busy: bool,
    opcodes: Vec<u8>,
    erases: usize,
}

impl FlashState {
    fn is_busy(&self) -> bool {
        self.stuck_busy || self.busy_polls > 0
    }

    fn input(&mut self, command: &mut Option<Command>, byte: u8) -> Result<(), SpiFlashErr> {
        let Some(current) = command.as_mut() else {
            let cmd =
                JedecSpiFlashCmd::try_from(byte).map_err(|_| SpiFlashErr::InvalidOpcode)?;
            self.opcodes.push(byte);
            if self.is_busy() && cmd != JedecSpiFlashCmd::Rdsr1 {
                return Err(SpiFlashErr::SpiFlashBusy);
            }
            if matches!(
                cmd,
                JedecSpiFlashCmd::PageProgram | JedecSpiFlashCmd::SectorErase
            ) && !self.write_enable
            {
                return Err(SpiFlashErr::WriteDisabled);
            }
            *command = Some(Command {
                cmd,
                address: 0,
                address_bytes: 0,
                payload: Vec::new(),
            });
            return Ok(());
        };

        if !current.address_complete() {
            current.address = (current.address << 8) | byte as usize;
            current.address_bytes += 1;
            if current.address_complete() && current.address >= self.data.len() {
                return Err(SpiFlashErr::InvalidAddress);
            }
            Ok(())
        } else if current.cmd == JedecSpiFlashCmd::PageProgram {
            current.payload.push(byte);
            Ok(())
        } else {
            Err(SpiFlashErr::InvalidOpcode)
        }
    }

    fn output(&mut self, command: &mut Option<Command>, buf: &mut [u8]) -> Result<(), SpiFlashErr> {
        let Some(current) = command.as_mut() else {
            return Err(SpiFlashErr::BytesReqNothingToSend);
        };
        match current.cmd {
            JedecSpiFlashCmd::Read => {
                if !current.address_complete() {
                    return Err(SpiFlashErr::InvalidAddress);
                }
                let end = current.address + buf.len();
                if end > self.data.len() {
                    return Err(SpiFlashErr::InvalidAddress);
                }
                buf.copy_from_slice(&self.data[current.address..end]);
                current.address = end;
            }
            JedecSpiFlashCmd::Rdsr1 => {
                for byte in buf.iter_mut() {
                    let mut status = 0;
                    if self.is_busy() {
                        status |= STATUS_BUSY;
                    }
                    if self.write_enable {
                        status |= STATUS_WEL;
                    }
                    *byte = status;
                    self.busy_polls = self.busy_polls.saturating_sub(1);
                }
            }
            JedecSpiFlashCmd::Rdid => {
                for (byte, id) in buf.iter_mut().zip(JEDEC_ID.iter().cycle()) {
                    *byte = *id;
                }
            }
            _ => return Err(SpiFlashErr::BytesReqNothingToSend),
        }
        Ok(())
    }

    // Runs once chip select goes high.
    fn complete(&mut self, command: Command) -> Result<(), SpiFlashErr> {
        match command.cmd {
            JedecSpiFlashCmd::WriteEnable => self.write_enable = true,
            JedecSpiFlashCmd::WriteDisable => self.write_enable = false,
            JedecSpiFlashCmd::PageProgram => {
                self.write_enable = false;
                if !command.address_complete() {
                    return Err(SpiFlashErr::InvalidAddress);
                }
                if command.address % PAGE_SIZE + command.payload.len() > PAGE_SIZE {
                    return Err(SpiFlashErr::CrossPageProgram);
                }
                let start = command.address;
                for (cell, byte) in self.data[start..start + command.payload.len()]
                    .iter_mut()
                    .zip(&command.payload)
                {
                    *cell &= *byte;
                }
                self.busy_polls = self.program_busy_polls;
            }
            JedecSpiFlashCmd::SectorErase => {
                self.write_enable = false;
                if !command.address_complete() {
                    return Err(SpiFlashErr::InvalidAddress);
                }
                if command.address % SECTOR_SIZE != 0 {
                    return Err(SpiFlashErr::EraseAdressUnaligned);
                }
                let end = (command.address + SECTOR_SIZE).min(self.data.len());
                self.data[command.address..end].fill(ERASED_BYTE);
                self.erases += 1;
                self.busy_polls = self.erase_busy_polls;
            }
            JedecSpiFlashCmd::Read | JedecSpiFlashCmd::Rdsr1 | JedecSpiFlashCmd::Rdid => {}
        }
        Ok(())
    }
}

/// Emulated 24-bit SPI NOR flash. Clones share the same memory, so a test
/// can keep a handle after giving the device to a driver.
#[derive(Clone)]
pub struct EmulatedSpiFlash {
    state: Rc<RefCell<FlashState>>,
}

impl EmulatedSpiFlash {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(FlashState {
                data: vec![ERASED_BYTE; capacity],
                write_enable: false,
                busy_polls: 0,
                program_busy_polls: 2,
                erase_busy_polls: 5,
                stuck_busy: false,
                opcodes: Vec::new(),
                erases: 0,
            })),
        }
    }

    /// Status polls that report busy after a page program and a sector erase.
    pub fn set_busy_polls(&self, program: u32, erase: u32) {
        let mut state = self.state.borrow_mut();
        state.program_busy_polls = program;
        state.erase_busy_polls = erase;
    }

    /// Keeps the busy bit set forever.
    pub fn set_stuck_busy(&self, stuck: bool) {
        self.state.borrow_mut().stuck_busy = stuck;
    }

    pub fn load(&self, address: usize, bytes: &[u8]) {
        self.state.borrow_mut().data[address..address + bytes.len()].copy_from_slice(bytes);
    }

    pub fn contents(&self, address: usize, len: usize) -> Vec<u8> {
        self.state.borrow().data[address..address + len].to_vec()
    }

    pub fn corrupt(&self, address: usize) {
        self.state.borrow_mut().data[address] ^= 0x01;
    }

    /// Every opcode received so far, in order.
    pub fn opcodes(&self) -> Vec<u8> {
        self.state.borrow().opcodes.clone()
    }

    pub fn erase_count(&self) -> usize {
        self.state.borrow().erases
    }
}

impl ErrorType for EmulatedSpiFlash {
    type Error = SpiFlashErr;
}

impl SpiDevice for EmulatedSpiFlash {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        let mut command = None;
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    for byte in bytes.iter() {
                        state.input(&mut command, *byte)?;
                    }
                }
                Operation::Read(buf) => state.output(&mut command, buf)?,
                Operation::Transfer(read, write) => {
                    for byte in write.iter() {
                        state.input(&mut command, *byte)?;
                    }
                    state.output(&mut command, read)?;
                }
                Operation::TransferInPlace(buf) => {
                    for byte in buf.iter() {
                        state.input(&mut command, *byte)?;
                    }
                    state.output(&mut command, buf)?;
                }
                Operation::DelayNs(_) => {}
            }
        }
        match command {
            Some(command) => state.complete(command),
            None => Ok(()),
        }
    }
}
