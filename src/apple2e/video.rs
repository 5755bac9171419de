//! Video timing collaborator.
//!
//! Pixel rendering lives elsewhere; this side only tracks the beam and
//! supplies the floating-bus byte that I/O-hole reads with no listener
//! return.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use super::banks::{BankId, BLANK_FILL};
use super::error::DeviceError;
use super::memory::{FloatingBus, Memory};
use super::switches::Switch;

pub trait Video: Send {
    /// One video clock (one CPU cycle at the default divisor).
    fn tick(&mut self, memory: &Memory) -> Result<(), DeviceError>;

    /// Supplier `Memory` calls for the floating bus.
    fn floating_bus_fn(&self) -> FloatingBus;

    fn reset(&mut self);

    fn frames(&self) -> u64 {
        0
    }
}

// ── NTSC beam timing ───────────────────────────────────────────

pub const CYCLES_PER_LINE: u32 = 65;
pub const LINES_PER_FRAME: u32 = 262;
pub const CYCLES_PER_FRAME: u32 = CYCLES_PER_LINE * LINES_PER_FRAME;

/// Cycles of horizontal blanking at the start of each line.
const HBLANK: u32 = 25;
const VISIBLE_LINES: u32 = 192;

/// Beam counter that leaves the text-page byte under the beam on the bus.
pub struct ScanVideo {
    h: u32,
    v: u32,
    frames: u64,
    bus: Arc<AtomicU8>,
}

impl ScanVideo {
    pub fn new() -> Self {
        Self {
            h: 0,
            v: 0,
            frames: 0,
            bus: Arc::new(AtomicU8::new(BLANK_FILL)),
        }
    }

    pub fn position(&self) -> (u32, u32) {
        (self.h, self.v)
    }

    fn bus_byte(&self, memory: &Memory) -> u8 {
        if self.h < HBLANK || self.v >= VISIBLE_LINES {
            return BLANK_FILL;
        }
        let row = (self.v / 8) as usize;
        let col = (self.h - HBLANK) as usize;
        let base = if memory.switch(Switch::Page2) && !memory.switch(Switch::Store80) {
            0x800
        } else {
            0x400
        };
        let addr = base + (row & 7) * 0x80 + (row >> 3) * 0x28 + col;
        memory
            .bank(BankId::MainRam)
            .map_or(BLANK_FILL, |b| b.read(addr))
    }
}

impl Default for ScanVideo {
    fn default() -> Self {
        Self::new()
    }
}

impl Video for ScanVideo {
    fn tick(&mut self, memory: &Memory) -> Result<(), DeviceError> {
        self.bus.store(self.bus_byte(memory), Ordering::Relaxed);
        self.h += 1;
        if self.h == CYCLES_PER_LINE {
            self.h = 0;
            self.v += 1;
            if self.v == LINES_PER_FRAME {
                self.v = 0;
                self.frames += 1;
            }
        }
        Ok(())
    }

    fn floating_bus_fn(&self) -> FloatingBus {
        let bus = self.bus.clone();
        Box::new(move || bus.load(Ordering::Relaxed))
    }

    fn reset(&mut self) {
        self.h = 0;
        self.v = 0;
        self.bus.store(BLANK_FILL, Ordering::Relaxed);
    }

    fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apple2e::banks::RamInit;

    #[test]
    fn frame_counter_wraps_after_full_raster() {
        let mem = Memory::new(RamInit::Zero);
        let mut video = ScanVideo::new();
        for _ in 0..CYCLES_PER_FRAME {
            video.tick(&mem).unwrap();
        }
        assert_eq!(video.frames(), 1);
        assert_eq!(video.position(), (0, 0));
    }

    #[test]
    fn bus_carries_text_byte_under_beam() {
        let mut mem = Memory::new(RamInit::Zero);
        mem.bank_mut(BankId::MainRam).unwrap().write(0x400, 0xC1);
        mem.bank_mut(BankId::MainRam).unwrap().write(0x800, 0xC2);
        let mut video = ScanVideo::new();
        let bus = video.floating_bus_fn();
        for _ in 0..=HBLANK {
            video.tick(&mem).unwrap();
        }
        assert_eq!(bus(), 0xC1);

        mem.set_switch(Switch::Page2, true);
        video.reset();
        for _ in 0..=HBLANK {
            video.tick(&mem).unwrap();
        }
        assert_eq!(bus(), 0xC2);
    }

    #[test]
    fn blanking_floats_high() {
        let mem = Memory::new(RamInit::Zero);
        let mut video = ScanVideo::new();
        video.tick(&mem).unwrap();
        assert_eq!(video.floating_bus_fn()(), BLANK_FILL);
    }
}
