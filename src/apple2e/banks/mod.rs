//! Memory banks.
//!
//! Every physical block of memory in the machine is a `Bank` of 256-byte
//! pages.  The MMU never copies bytes around; it only decides which page
//! of which bank backs each of the 256 address pages.

pub mod bank;
pub mod system_ram;
pub mod system_rom;

pub use bank::{Bank, BankId, Page, PageOrigin, PageRef, PAGE_SIZE};
pub use system_ram::RamInit;

use crate::apple2e::error::MachineError;

// ── Bank sizes (in pages) ─────────────────────────────────────

pub const RAM_PAGES: usize = 0xC0;
pub const LANGUAGE_CARD_PAGES: usize = 0x30;
pub const LANGUAGE_CARD2_PAGES: usize = 0x10;
pub const ROM_PAGES: usize = 0x30;
pub const CX_ROM_PAGES: usize = 0x10;
pub const SLOT_FIRMWARE_PAGES: usize = 0x01;
pub const SLOT_ROM_PAGES: usize = 0x08;

/// Fill byte of the blank page backing empty slots and the I/O hole.
pub const BLANK_FILL: u8 = 0xFF;

/// All banks owned by the motherboard itself.
pub struct SystemBanks {
    pub main_ram: Bank,
    pub aux_ram: Bank,
    pub main_lc: Bank,
    pub main_lc2: Bank,
    pub aux_lc: Bank,
    pub aux_lc2: Bank,
    pub rom: Bank,
    pub cx_rom: Bank,
    pub blank: Bank,
    ram_init: RamInit,
}

impl SystemBanks {
    pub fn new(ram_init: RamInit) -> Self {
        let mut banks = Self {
            main_ram: Bank::new(PageOrigin::Ram, RAM_PAGES),
            aux_ram: Bank::new(PageOrigin::AuxRam, RAM_PAGES),
            main_lc: Bank::new(PageOrigin::LanguageCard, LANGUAGE_CARD_PAGES),
            main_lc2: Bank::new(PageOrigin::LanguageCard, LANGUAGE_CARD2_PAGES),
            aux_lc: Bank::new(PageOrigin::LanguageCard, LANGUAGE_CARD_PAGES),
            aux_lc2: Bank::new(PageOrigin::LanguageCard, LANGUAGE_CARD2_PAGES),
            rom: Bank::new(PageOrigin::Rom, ROM_PAGES),
            cx_rom: Bank::new(PageOrigin::Rom, CX_ROM_PAGES),
            blank: Bank::filled(PageOrigin::Blank, 1, BLANK_FILL),
            ram_init,
        };
        system_rom::install_stub(&mut banks.cx_rom, &mut banks.rom);
        banks.clear_ram();
        banks
    }

    /// Re-apply the power-on fill to every RAM bank.
    pub fn clear_ram(&mut self) {
        let init = self.ram_init;
        for bank in [
            &mut self.main_ram,
            &mut self.aux_ram,
            &mut self.main_lc,
            &mut self.main_lc2,
            &mut self.aux_lc,
            &mut self.aux_lc2,
        ] {
            init.apply(bank);
        }
    }

    pub fn load_rom(&mut self, origin: u16, data: &[u8]) -> Result<(), MachineError> {
        system_rom::load_rom(&mut self.cx_rom, &mut self.rom, origin, data)
    }

    /// Machine-owned bank by id; card banks return `None`.
    pub fn get(&self, id: BankId) -> Option<&Bank> {
        Some(match id {
            BankId::MainRam => &self.main_ram,
            BankId::AuxRam => &self.aux_ram,
            BankId::MainLanguageCard => &self.main_lc,
            BankId::MainLanguageCard2 => &self.main_lc2,
            BankId::AuxLanguageCard => &self.aux_lc,
            BankId::AuxLanguageCard2 => &self.aux_lc2,
            BankId::Rom => &self.rom,
            BankId::CxRom => &self.cx_rom,
            BankId::Blank => &self.blank,
            BankId::SlotFirmware(_) | BankId::SlotRom(_) => return None,
        })
    }

    pub fn get_mut(&mut self, id: BankId) -> Option<&mut Bank> {
        Some(match id {
            BankId::MainRam => &mut self.main_ram,
            BankId::AuxRam => &mut self.aux_ram,
            BankId::MainLanguageCard => &mut self.main_lc,
            BankId::MainLanguageCard2 => &mut self.main_lc2,
            BankId::AuxLanguageCard => &mut self.aux_lc,
            BankId::AuxLanguageCard2 => &mut self.aux_lc2,
            BankId::Rom => &mut self.rom,
            BankId::CxRom => &mut self.cx_rom,
            BankId::Blank => &mut self.blank,
            BankId::SlotFirmware(_) | BankId::SlotRom(_) => return None,
        })
    }
}
