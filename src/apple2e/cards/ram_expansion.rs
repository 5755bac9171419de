//! Slinky-style RAM expansion card.
//!
//! The memory is not mapped into the address space.  Software loads a 24-bit
//! address into the first three registers and streams bytes through the data
//! port, which advances the address after every access.
//!
//! ```text
//! $C0n0  address bits 0-7
//! $C0n1  address bits 8-15
//! $C0n2  address bits 16-23 (reads back with the top nibble set)
//! $C0n3  data, auto-increment
//! $C0nE  installed size in 64K units
//! ```

use super::{blank_expansion_rom, blank_firmware, Card};
use crate::apple2e::banks::Bank;
use crate::apple2e::event::MemoryEvent;

const REG_ADDR_LO: u8 = 0x0;
const REG_ADDR_MID: u8 = 0x1;
const REG_ADDR_HI: u8 = 0x2;
const REG_DATA: u8 = 0x3;
const REG_SIZE: u8 = 0xE;

const MAX_KB: usize = 8 * 1024;

pub struct RamExpansionCard {
    ram: Vec<u8>,
    address: u32,
    firmware: Bank,
    expansion: Bank,
}

impl RamExpansionCard {
    /// `size_kb` is rounded up to a whole 64K and capped at 8M.
    pub fn new(size_kb: usize) -> Self {
        let kb = size_kb.clamp(64, MAX_KB).div_ceil(64) * 64;
        Self {
            ram: vec![0; kb * 1024],
            address: 0,
            firmware: blank_firmware(),
            expansion: blank_expansion_rom(),
        }
    }

    pub fn size(&self) -> usize {
        self.ram.len()
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    fn offset(&self) -> usize {
        self.address as usize % self.ram.len()
    }

    fn set_address_byte(&mut self, shift: u32, value: u8) {
        self.address = (self.address & !(0xFF << shift)) | ((value as u32) << shift);
        self.address &= 0x00FF_FFFF;
    }

    fn advance(&mut self) {
        self.address = (self.address + 1) & 0x00FF_FFFF;
    }
}

impl Card for RamExpansionCard {
    fn name(&self) -> &str {
        "RAM expansion"
    }

    fn reset(&mut self) {
        self.address = 0;
    }

    fn firmware(&self) -> &Bank {
        &self.firmware
    }

    fn expansion_rom(&self) -> &Bank {
        &self.expansion
    }

    fn handle_io_access(&mut self, register: u8, event: &mut MemoryEvent) {
        let write = event.is_write();
        match register {
            REG_ADDR_LO | REG_ADDR_MID | REG_ADDR_HI => {
                let shift = register as u32 * 8;
                if write {
                    self.set_address_byte(shift, event.value());
                } else {
                    let b = (self.address >> shift) as u8;
                    event.set_value(if register == REG_ADDR_HI { b | 0xF0 } else { b });
                }
            }
            REG_DATA => {
                let at = self.offset();
                if write {
                    self.ram[at] = event.value();
                } else {
                    event.set_value(self.ram[at]);
                }
                self.advance();
            }
            REG_SIZE if !write => {
                event.set_value((self.ram.len() >> 16) as u8);
            }
            _ => log::trace!("RAM expansion: unused register {register:X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(card: &mut RamExpansionCard, reg: u8, v: u8) {
        let mut e = MemoryEvent::write(0xC0C0 + reg as u16, v, 0);
        card.handle_io_access(reg, &mut e);
    }

    fn read(card: &mut RamExpansionCard, reg: u8) -> u8 {
        let mut e = MemoryEvent::read(0xC0C0 + reg as u16, 0);
        card.handle_io_access(reg, &mut e);
        e.value()
    }

    #[test]
    fn data_port_streams_and_increments() {
        let mut card = RamExpansionCard::new(256);
        write(&mut card, REG_ADDR_LO, 0xFF);
        write(&mut card, REG_ADDR_MID, 0xFF);
        write(&mut card, REG_ADDR_HI, 0x00);
        write(&mut card, REG_DATA, 0x11);
        write(&mut card, REG_DATA, 0x22);
        assert_eq!(card.address(), 0x01_0001);

        write(&mut card, REG_ADDR_LO, 0xFF);
        write(&mut card, REG_ADDR_MID, 0xFF);
        write(&mut card, REG_ADDR_HI, 0x00);
        assert_eq!(read(&mut card, REG_DATA), 0x11);
        assert_eq!(read(&mut card, REG_DATA), 0x22);
        assert_eq!(read(&mut card, REG_ADDR_LO), 0x01);
        assert_eq!(read(&mut card, REG_ADDR_HI), 0xF1);
    }

    #[test]
    fn size_register_and_rounding() {
        let mut card = RamExpansionCard::new(100);
        assert_eq!(card.size(), 128 * 1024);
        assert_eq!(read(&mut card, REG_SIZE), 2);
        assert_eq!(RamExpansionCard::new(1 << 20).size(), MAX_KB * 1024);
    }

    #[test]
    fn address_wraps_inside_installed_memory() {
        let mut card = RamExpansionCard::new(64);
        write(&mut card, REG_ADDR_HI, 0x01);
        write(&mut card, REG_DATA, 0x77);
        write(&mut card, REG_ADDR_HI, 0x00);
        write(&mut card, REG_ADDR_MID, 0x00);
        write(&mut card, REG_ADDR_LO, 0x00);
        assert_eq!(read(&mut card, REG_DATA), 0x77);
        card.reset();
        assert_eq!(card.address(), 0);
    }
}
