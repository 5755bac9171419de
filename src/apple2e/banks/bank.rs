//! The core `Bank` type, a fixed run of 256-byte pages with a single origin.
//!
//! Banks are created once when the machine is built and are only ever
//! mutated in place, so a `PageRef` taken from one stays valid for the
//! lifetime of the machine.

use serde::{Deserialize, Serialize};

pub const PAGE_SIZE: usize = 0x100;

/// Where the bytes of a page come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageOrigin {
    Ram,
    AuxRam,
    Rom,
    LanguageCard,
    SlotFirmware,
    Blank,
}

#[derive(Clone)]
pub struct Page {
    bytes: [u8; PAGE_SIZE],
    origin: PageOrigin,
}

impl Page {
    pub fn new(origin: PageOrigin) -> Self {
        Self {
            bytes: [0; PAGE_SIZE],
            origin,
        }
    }

    #[inline]
    pub fn read(&self, offset: u8) -> u8 {
        self.bytes[offset as usize]
    }

    #[inline]
    pub fn write(&mut self, offset: u8, value: u8) {
        self.bytes[offset as usize] = value;
    }

    pub fn origin(&self) -> PageOrigin {
        self.origin
    }

    pub fn bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.bytes
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page").field("origin", &self.origin).finish()
    }
}

/// An ordered, never-reallocated sequence of pages.
#[derive(Debug, Clone)]
pub struct Bank {
    origin: PageOrigin,
    pages: Box<[Page]>,
}

impl Bank {
    pub fn new(origin: PageOrigin, page_count: usize) -> Self {
        Self {
            origin,
            pages: vec![Page::new(origin); page_count].into_boxed_slice(),
        }
    }

    /// A bank whose every byte is `fill`.
    pub fn filled(origin: PageOrigin, page_count: usize, fill: u8) -> Self {
        let mut bank = Self::new(origin, page_count);
        bank.fill(fill);
        bank
    }

    pub fn origin(&self) -> PageOrigin {
        self.origin
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn byte_len(&self) -> usize {
        self.pages.len() * PAGE_SIZE
    }

    #[inline]
    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    #[inline]
    pub fn page_mut(&mut self, index: usize) -> Option<&mut Page> {
        self.pages.get_mut(index)
    }

    /// Read by byte offset from the start of the bank.  Out of range reads
    /// return 0.
    pub fn read(&self, offset: usize) -> u8 {
        self.pages
            .get(offset / PAGE_SIZE)
            .map_or(0, |p| p.bytes[offset % PAGE_SIZE])
    }

    pub fn write(&mut self, offset: usize, value: u8) {
        if let Some(p) = self.pages.get_mut(offset / PAGE_SIZE) {
            p.bytes[offset % PAGE_SIZE] = value;
        }
    }

    /// Copy `data` in starting at byte `offset`; whatever does not fit is
    /// dropped.  Returns the number of bytes copied.
    pub fn load(&mut self, offset: usize, data: &[u8]) -> usize {
        let mut copied = 0;
        for (i, &b) in data.iter().enumerate() {
            let at = offset + i;
            if at >= self.byte_len() {
                break;
            }
            self.write(at, b);
            copied += 1;
        }
        copied
    }

    pub fn fill(&mut self, value: u8) {
        for p in self.pages.iter_mut() {
            p.bytes.fill(value);
        }
    }

    /// Flat copy of the whole bank.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for p in self.pages.iter() {
            out.extend_from_slice(&p.bytes);
        }
        out
    }

    pub fn pages_mut(&mut self) -> impl Iterator<Item = &mut Page> {
        self.pages.iter_mut()
    }
}

/// Names every bank a `PageRef` can point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BankId {
    MainRam,
    AuxRam,
    MainLanguageCard,
    MainLanguageCard2,
    AuxLanguageCard,
    AuxLanguageCard2,
    Rom,
    CxRom,
    Blank,
    SlotFirmware(u8),
    SlotRom(u8),
}

impl BankId {
    /// Banks the machine itself owns (as opposed to a card).
    pub const SYSTEM: [BankId; 9] = [
        BankId::MainRam,
        BankId::AuxRam,
        BankId::MainLanguageCard,
        BankId::MainLanguageCard2,
        BankId::AuxLanguageCard,
        BankId::AuxLanguageCard2,
        BankId::Rom,
        BankId::CxRom,
        BankId::Blank,
    ];
}

/// Non-owning reference to one page of one bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRef {
    pub bank: BankId,
    pub index: u8,
}

impl PageRef {
    pub const fn new(bank: BankId, index: u8) -> Self {
        Self { bank, index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_stops_at_bank_end() {
        let mut bank = Bank::new(PageOrigin::Rom, 2);
        let copied = bank.load(0x1FE, &[1, 2, 3, 4]);
        assert_eq!(copied, 2);
        assert_eq!(bank.read(0x1FE), 1);
        assert_eq!(bank.read(0x1FF), 2);
        assert_eq!(bank.read(0x200), 0);
    }

    #[test]
    fn pages_carry_bank_origin() {
        let bank = Bank::filled(PageOrigin::AuxRam, 3, 0xEA);
        assert_eq!(bank.page(2).map(Page::origin), Some(PageOrigin::AuxRam));
        assert_eq!(bank.page(1).map(|p| p.read(0x7F)), Some(0xEA));
        assert!(bank.page(3).is_none());
        assert_eq!(bank.to_vec().len(), 3 * PAGE_SIZE);
    }
}
