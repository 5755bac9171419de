//! Peripheral cards and the seven-slot table.
//!
//! A card owns its firmware page and its expansion ROM.  `Memory` reaches
//! those through `CardSlots` when it resolves a `BankId::SlotFirmware` /
//! `BankId::SlotRom` page reference, and forwards accesses to the card's
//! windows through the three listeners installed on attach.

pub mod ram_expansion;
pub mod rom_card;

pub use ram_expansion::RamExpansionCard;
pub use rom_card::RomCard;

use super::banks::{Bank, BankId, PageOrigin, SLOT_FIRMWARE_PAGES, SLOT_ROM_PAGES};
use super::error::{DeviceError, MachineError};
use super::event::MemoryEvent;
use super::motherboard::SpeedRequests;

pub const SLOT_COUNT: usize = 8;

/// Base of the per-slot I/O registers; slot n owns $C080 + n*16 ..= +15.
pub const IO_BASE: u16 = 0xC080;

pub fn io_range(slot: usize) -> (u16, u16) {
    let lo = IO_BASE + (slot as u16) * 0x10;
    (lo, lo + 0x0F)
}

pub fn firmware_range(slot: usize) -> (u16, u16) {
    let lo = 0xC000 + ((slot as u16) << 8);
    (lo, lo + 0xFF)
}

pub const EXPANSION_RANGE: (u16, u16) = (0xC800, 0xCFFF);

/// A peripheral card.
pub trait Card: Send {
    fn name(&self) -> &str;

    fn reset(&mut self);

    /// One video-rate clock.
    fn tick(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// One-page firmware window ($Cn00).
    fn firmware(&self) -> &Bank;

    /// Eight-page shared expansion window ($C800).
    fn expansion_rom(&self) -> &Bank;

    /// Access to one of the card's 16 I/O registers.
    fn handle_io_access(&mut self, register: u8, event: &mut MemoryEvent);

    fn handle_firmware_access(&mut self, _offset: u8, _event: &mut MemoryEvent) {}

    fn handle_expansion_access(&mut self, _offset: u16, _event: &mut MemoryEvent) {}

    /// Stop together with the CPU when the machine is suspended.
    fn suspends_with_cpu(&self) -> bool {
        false
    }

    fn suspended(&mut self) {}

    fn resumed(&mut self) {}

    /// Called between detach and re-attach.
    fn reconfigure(&mut self) {}

    fn on_attach(&mut self, _slot: usize, _speed: &SpeedRequests) {}
}

/// Blank card banks, shared by cards without firmware.
pub fn blank_firmware() -> Bank {
    Bank::filled(PageOrigin::SlotFirmware, SLOT_FIRMWARE_PAGES, 0xFF)
}

pub fn blank_expansion_rom() -> Bank {
    Bank::filled(PageOrigin::SlotFirmware, SLOT_ROM_PAGES, 0xFF)
}

pub struct Slot {
    pub card: Box<dyn Card>,
    pub running: bool,
}

/// Slots 1–7; index 0 is the motherboard's own firmware and stays empty.
pub struct CardSlots {
    slots: [Option<Slot>; SLOT_COUNT],
}

impl CardSlots {
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
        }
    }

    fn check(slot: usize) -> Result<(), MachineError> {
        if (1..SLOT_COUNT).contains(&slot) {
            Ok(())
        } else {
            Err(MachineError::InvalidSlot(slot))
        }
    }

    pub fn is_occupied(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Some(_)))
    }

    pub fn insert(&mut self, slot: usize, card: Box<dyn Card>) -> Result<(), MachineError> {
        Self::check(slot)?;
        if let Some(existing) = &self.slots[slot] {
            return Err(MachineError::SlotOccupied {
                slot,
                card: existing.card.name().to_string(),
            });
        }
        self.slots[slot] = Some(Slot {
            card,
            running: true,
        });
        Ok(())
    }

    pub fn take(&mut self, slot: usize) -> Option<Box<dyn Card>> {
        self.slots.get_mut(slot)?.take().map(|s| s.card)
    }

    pub fn get(&self, slot: usize) -> Option<&dyn Card> {
        self.slots.get(slot)?.as_ref().map(|s| s.card.as_ref())
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut dyn Card> {
        match self.slots.get_mut(slot)? {
            Some(s) => Some(s.card.as_mut()),
            None => None,
        }
    }

    pub fn slot_mut(&mut self, slot: usize) -> Option<&mut Slot> {
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Occupied slot numbers, ascending.
    pub fn occupied(&self) -> impl Iterator<Item = usize> + '_ {
        (1..SLOT_COUNT).filter(|&s| self.is_occupied(s))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Slot)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|s| (i, s)))
    }

    /// Bank behind a card page reference.
    pub fn bank(&self, id: BankId) -> Option<&Bank> {
        match id {
            BankId::SlotFirmware(s) => self.get(s as usize).map(|c| c.firmware()),
            BankId::SlotRom(s) => self.get(s as usize).map(|c| c.expansion_rom()),
            _ => None,
        }
    }
}

impl Default for CardSlots {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Test card that records every I/O access it sees.
    pub struct RecordingCard {
        pub log: Arc<Mutex<Vec<(u8, bool)>>>,
        firmware: Bank,
        rom: Bank,
        pub fail_ticks: bool,
        pub with_cpu: bool,
    }

    impl RecordingCard {
        pub fn new() -> Self {
            let mut firmware = blank_firmware();
            firmware.fill(0xA5);
            let mut rom = blank_expansion_rom();
            rom.fill(0x5A);
            Self {
                log: Arc::new(Mutex::new(Vec::new())),
                firmware,
                rom,
                fail_ticks: false,
                with_cpu: false,
            }
        }
    }

    impl Card for RecordingCard {
        fn name(&self) -> &str {
            "recorder"
        }

        fn reset(&mut self) {}

        fn tick(&mut self) -> Result<(), DeviceError> {
            if self.fail_ticks {
                return Err(DeviceError::Fault("recorder tick".into()));
            }
            Ok(())
        }

        fn firmware(&self) -> &Bank {
            &self.firmware
        }

        fn expansion_rom(&self) -> &Bank {
            &self.rom
        }

        fn handle_io_access(&mut self, register: u8, event: &mut MemoryEvent) {
            if let Ok(mut log) = self.log.lock() {
                log.push((register, event.is_write()));
            }
        }

        fn suspends_with_cpu(&self) -> bool {
            self.with_cpu
        }
    }

    #[test]
    fn slot_zero_and_eight_are_rejected() {
        let mut slots = CardSlots::new();
        assert!(matches!(
            slots.insert(0, Box::new(RecordingCard::new())),
            Err(MachineError::InvalidSlot(0))
        ));
        assert!(slots.insert(8, Box::new(RecordingCard::new())).is_err());
        slots.insert(7, Box::new(RecordingCard::new())).unwrap();
        assert!(matches!(
            slots.insert(7, Box::new(RecordingCard::new())),
            Err(MachineError::SlotOccupied { slot: 7, .. })
        ));
        assert_eq!(slots.occupied().collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn card_banks_resolve_by_slot() {
        let mut slots = CardSlots::new();
        slots.insert(2, Box::new(RecordingCard::new())).unwrap();
        assert_eq!(slots.bank(BankId::SlotFirmware(2)).map(|b| b.read(0)), Some(0xA5));
        assert_eq!(slots.bank(BankId::SlotRom(2)).map(|b| b.read(0x7FF)), Some(0x5A));
        assert!(slots.bank(BankId::SlotRom(3)).is_none());
        assert!(slots.take(2).is_some());
        assert!(!slots.is_occupied(2));
    }

    #[test]
    fn register_windows() {
        assert_eq!(io_range(3), (0xC0B0, 0xC0BF));
        assert_eq!(firmware_range(6), (0xC600, 0xC6FF));
    }
}
