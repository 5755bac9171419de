//! Apple IIe MMU: maps each of the 256 address pages to a page of some
//! bank, separately for reads and writes.
//!
//! The map is rebuilt from scratch on every relevant switch change.  The
//! steps of `reconfigure` run in a fixed order and a later step always wins
//! for the pages it touches; that order is the only place overlay priority
//! is encoded.

use super::banks::{BankId, PageRef};
use super::cards::CardSlots;
use super::switches::{SoftSwitches, Switch};

pub const PAGE_COUNT: usize = 0x100;

/// Page number of the I/O hole ($C000–$C0FF).
pub const IO_PAGE: usize = 0xC0;

pub type PageTable = [Option<PageRef>; PAGE_COUNT];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMap {
    read: PageTable,
    write: PageTable,
}

impl ActiveMap {
    pub fn new() -> Self {
        Self {
            read: [None; PAGE_COUNT],
            write: [None; PAGE_COUNT],
        }
    }

    #[inline]
    pub fn read_page(&self, page: usize) -> Option<PageRef> {
        self.read[page]
    }

    #[inline]
    pub fn write_page(&self, page: usize) -> Option<PageRef> {
        self.write[page]
    }

    /// Rebuild both tables from the switch state, the installed cards and
    /// the active slot latch.
    pub fn reconfigure(&mut self, switches: &SoftSwitches, cards: &CardSlots, active_slot: usize) {
        self.read = [None; PAGE_COUNT];
        self.write = [None; PAGE_COUNT];

        let aux_zp = switches.is_on(Switch::AltZp);

        // 1. Main / aux RAM below the I/O hole.
        let read_ram = ram_bank(switches.is_on(Switch::RamRd));
        let write_ram = ram_bank(switches.is_on(Switch::RamWrt));
        for page in 0..IO_PAGE {
            self.read[page] = Some(PageRef::new(read_ram, page as u8));
            self.write[page] = Some(PageRef::new(write_ram, page as u8));
        }

        // 2. ROM over $D000-$FFFF (read side).
        copy_pages(&mut self.read, BankId::Rom, 0x00, 0xD0, 0x30);

        // 3. The I/O hole is never plain writable memory.
        self.write[IO_PAGE] = None;

        // 4. Language card, read side.
        let (lc, lc2) = if aux_zp {
            (BankId::AuxLanguageCard, BankId::AuxLanguageCard2)
        } else {
            (BankId::MainLanguageCard, BankId::MainLanguageCard2)
        };
        if switches.is_on(Switch::LcRam) {
            copy_pages(&mut self.read, lc, 0x00, 0xD0, 0x30);
            if switches.is_off(Switch::LcBank1) {
                copy_pages(&mut self.read, lc2, 0x00, 0xD0, 0x10);
            }
        }

        // 5. Language card, write side; otherwise $D000-$FFFF is read-only.
        if switches.is_on(Switch::LcWrite) {
            copy_pages(&mut self.write, lc, 0x00, 0xD0, 0x30);
            if switches.is_off(Switch::LcBank1) {
                copy_pages(&mut self.write, lc2, 0x00, 0xD0, 0x10);
            }
        } else {
            self.write[0xD0..=0xFF].fill(None);
        }

        // 6. 80STORE lets PAGE2 pick the display pages independently of
        //    RAMRD / RAMWRT.
        if switches.is_on(Switch::Store80) {
            let display = ram_bank(switches.is_on(Switch::Page2));
            for page in 0x04..=0x07 {
                self.set_both(page, PageRef::new(display, page as u8));
            }
            if switches.is_on(Switch::Hires) {
                for page in 0x20..=0x3F {
                    self.set_both(page, PageRef::new(display, page as u8));
                }
            }
        }

        // 7. Zero page and stack.
        let zp = ram_bank(aux_zp);
        for page in 0x00..=0x01 {
            self.set_both(page, PageRef::new(zp, page as u8));
        }

        // 8. $C100-$CFFF: internal ROM or slot firmware.
        if switches.is_on(Switch::IntCxRom) {
            copy_pages(&mut self.read, BankId::CxRom, 0x01, 0xC1, 0x0F);
        } else {
            for slot in 1..=7u8 {
                let page = 0xC0 + slot as usize;
                self.read[page] = Some(if cards.is_occupied(slot as usize) {
                    PageRef::new(BankId::SlotFirmware(slot), 0)
                } else {
                    blank()
                });
            }

            if (1..=7).contains(&active_slot) && cards.is_occupied(active_slot) {
                copy_pages(&mut self.read, BankId::SlotRom(active_slot as u8), 0x00, 0xC8, 0x08);
            } else {
                self.read[0xC8..=0xCF].fill(Some(blank()));
            }

            if switches.is_off(Switch::SlotC3Rom) {
                copy_pages(&mut self.read, BankId::CxRom, 0x03, 0xC3, 0x01);
            }
            if switches.is_on(Switch::IntC8Rom) {
                copy_pages(&mut self.read, BankId::CxRom, 0x08, 0xC8, 0x08);
            }
        }

        // 9. Placeholder behind the I/O hole; reads there always dispatch.
        self.read[IO_PAGE] = Some(blank());
    }

    fn set_both(&mut self, page: usize, r: PageRef) {
        self.read[page] = Some(r);
        self.write[page] = Some(r);
    }
}

impl Default for ActiveMap {
    fn default() -> Self {
        Self::new()
    }
}

fn ram_bank(aux: bool) -> BankId {
    if aux {
        BankId::AuxRam
    } else {
        BankId::MainRam
    }
}

fn blank() -> PageRef {
    PageRef::new(BankId::Blank, 0)
}

/// Point `count` table entries starting at `dest` at consecutive pages of
/// `bank` starting at `src`.
fn copy_pages(table: &mut PageTable, bank: BankId, src: usize, dest: usize, count: usize) {
    for i in 0..count {
        table[dest + i] = Some(PageRef::new(bank, (src + i) as u8));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(switches: &SoftSwitches, cards: &CardSlots, active: usize) -> ActiveMap {
        let mut map = ActiveMap::new();
        map.reconfigure(switches, cards, active);
        map
    }

    #[test]
    fn reset_defaults_map_main_ram_and_rom() {
        let map = build(&SoftSwitches::new(), &CardSlots::new(), 0);
        assert_eq!(map.read_page(0x04), Some(PageRef::new(BankId::MainRam, 0x04)));
        assert_eq!(map.write_page(0xBF), Some(PageRef::new(BankId::MainRam, 0xBF)));
        assert_eq!(map.read_page(0xE0), Some(PageRef::new(BankId::Rom, 0x10)));
        assert_eq!(map.write_page(0xE0), None);
        assert_eq!(map.write_page(IO_PAGE), None);
        assert_eq!(map.read_page(IO_PAGE), Some(blank()));
        // SLOTC3ROM is off at reset, so $C3 is internal.
        assert_eq!(map.read_page(0xC3), Some(PageRef::new(BankId::CxRom, 0x03)));
        assert_eq!(map.read_page(0xC5), Some(blank()));
        for page in 0xC1..=0xCF {
            assert_eq!(map.write_page(page), None);
        }
    }

    #[test]
    fn ramrd_and_ramwrt_split_reads_from_writes() {
        let mut s = SoftSwitches::new();
        s.set(Switch::RamRd, true);
        let map = build(&s, &CardSlots::new(), 0);
        assert_eq!(map.read_page(0x40).map(|r| r.bank), Some(BankId::AuxRam));
        assert_eq!(map.write_page(0x40).map(|r| r.bank), Some(BankId::MainRam));
        // zero page follows ALTZP, not RAMRD
        assert_eq!(map.read_page(0x00).map(|r| r.bank), Some(BankId::MainRam));
    }

    #[test]
    fn language_card_bank_two_overlays_d000() {
        let mut s = SoftSwitches::new();
        s.set(Switch::LcRam, true);
        let map = build(&s, &CardSlots::new(), 0);
        assert_eq!(map.read_page(0xD0), Some(PageRef::new(BankId::MainLanguageCard2, 0)));
        assert_eq!(map.read_page(0xE0), Some(PageRef::new(BankId::MainLanguageCard, 0x10)));

        s.set(Switch::LcBank1, true);
        s.set(Switch::AltZp, true);
        let map = build(&s, &CardSlots::new(), 0);
        assert_eq!(map.read_page(0xD0), Some(PageRef::new(BankId::AuxLanguageCard, 0)));
        assert_eq!(map.write_page(0xD0), None);
    }

    #[test]
    fn lc_write_without_read_keeps_rom_visible() {
        let mut s = SoftSwitches::new();
        s.set(Switch::LcWrite, true);
        s.set(Switch::LcBank1, true);
        let map = build(&s, &CardSlots::new(), 0);
        assert_eq!(map.read_page(0xD8).map(|r| r.bank), Some(BankId::Rom));
        assert_eq!(map.write_page(0xD8), Some(PageRef::new(BankId::MainLanguageCard, 0x08)));
    }

    #[test]
    fn store80_with_hires_routes_display_pages_by_page2() {
        let mut s = SoftSwitches::new();
        s.set(Switch::Store80, true);
        s.set(Switch::Page2, true);
        let map = build(&s, &CardSlots::new(), 0);
        assert_eq!(map.read_page(0x04).map(|r| r.bank), Some(BankId::AuxRam));
        assert_eq!(map.write_page(0x07).map(|r| r.bank), Some(BankId::AuxRam));
        assert_eq!(map.read_page(0x20).map(|r| r.bank), Some(BankId::MainRam));

        s.set(Switch::Hires, true);
        let map = build(&s, &CardSlots::new(), 0);
        assert_eq!(map.read_page(0x20).map(|r| r.bank), Some(BankId::AuxRam));
        assert_eq!(map.write_page(0x3F).map(|r| r.bank), Some(BankId::AuxRam));
        assert_eq!(map.read_page(0x40).map(|r| r.bank), Some(BankId::MainRam));
    }

    #[test]
    fn intcxrom_hides_every_slot() {
        let mut s = SoftSwitches::new();
        s.set(Switch::IntCxRom, true);
        s.set(Switch::SlotC3Rom, true);
        let map = build(&s, &CardSlots::new(), 4);
        for page in 0xC1..=0xCF {
            assert_eq!(map.read_page(page), Some(PageRef::new(BankId::CxRom, (page - 0xC0) as u8)));
        }
    }

    #[test]
    fn intc8rom_wins_over_active_slot() {
        let mut s = SoftSwitches::new();
        s.set(Switch::IntC8Rom, true);
        let map = build(&s, &CardSlots::new(), 0);
        assert_eq!(map.read_page(0xC8), Some(PageRef::new(BankId::CxRom, 0x08)));
        assert_eq!(map.read_page(0xCF), Some(PageRef::new(BankId::CxRom, 0x0F)));
    }

    #[test]
    fn reconfigure_is_a_pure_function_of_its_inputs() {
        let cards = CardSlots::new();
        for combo in 0u32..(1 << Switch::MEMORY_GATES.len()) {
            let mut s = SoftSwitches::new();
            for (i, sw) in Switch::MEMORY_GATES.iter().enumerate() {
                s.set(*sw, combo & (1 << i) != 0);
            }
            let mut a = ActiveMap::new();
            a.reconfigure(&s, &cards, 0);
            let mut b = build(&SoftSwitches::new(), &cards, 3);
            b.reconfigure(&s, &cards, 0);
            assert_eq!(a, b, "switch vector {combo:#x}");
            for page in 0..PAGE_COUNT {
                assert!(a.read_page(page).is_some(), "page {page:02X} unmapped for reads");
            }
        }
    }
}
