//! Soft switches: the boolean latches that steer address decoding and
//! video mode.
//!
//! The registry is pure state.  Deciding *when* a change needs the active
//! map rebuilt is left to `Memory`, which consults `Switch::gates_memory`.

use std::fmt;

/// Every named latch on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Switch {
    Store80,
    RamRd,
    RamWrt,
    IntCxRom,
    AltZp,
    SlotC3Rom,
    Col80,
    AltCharset,
    Text,
    Mixed,
    Page2,
    Hires,
    Dhires,
    LcRam,
    LcWrite,
    LcBank1,
    LcPrewrite,
    IntC8Rom,
    OpenApple,
    SolidApple,
}

impl Switch {
    pub const ALL: [Switch; 20] = [
        Switch::Store80,
        Switch::RamRd,
        Switch::RamWrt,
        Switch::IntCxRom,
        Switch::AltZp,
        Switch::SlotC3Rom,
        Switch::Col80,
        Switch::AltCharset,
        Switch::Text,
        Switch::Mixed,
        Switch::Page2,
        Switch::Hires,
        Switch::Dhires,
        Switch::LcRam,
        Switch::LcWrite,
        Switch::LcBank1,
        Switch::LcPrewrite,
        Switch::IntC8Rom,
        Switch::OpenApple,
        Switch::SolidApple,
    ];

    /// Switches that feed the MMU reconfiguration.
    pub const MEMORY_GATES: [Switch; 12] = [
        Switch::RamRd,
        Switch::RamWrt,
        Switch::LcRam,
        Switch::LcWrite,
        Switch::LcBank1,
        Switch::AltZp,
        Switch::Store80,
        Switch::Page2,
        Switch::Hires,
        Switch::IntCxRom,
        Switch::SlotC3Rom,
        Switch::IntC8Rom,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Switch::Store80 => "80STORE",
            Switch::RamRd => "RAMRD",
            Switch::RamWrt => "RAMWRT",
            Switch::IntCxRom => "INTCXROM",
            Switch::AltZp => "ALTZP",
            Switch::SlotC3Rom => "SLOTC3ROM",
            Switch::Col80 => "80COL",
            Switch::AltCharset => "ALTCHARSET",
            Switch::Text => "TEXT",
            Switch::Mixed => "MIXED",
            Switch::Page2 => "PAGE2",
            Switch::Hires => "HIRES",
            Switch::Dhires => "DHIRES",
            Switch::LcRam => "LCRAM",
            Switch::LcWrite => "LCWRITE",
            Switch::LcBank1 => "LCBANK1",
            Switch::LcPrewrite => "LCPREWRITE",
            Switch::IntC8Rom => "INTC8ROM",
            Switch::OpenApple => "OPENAPPLE",
            Switch::SolidApple => "SOLIDAPPLE",
        }
    }

    /// Value after a cold or warm reset.
    pub fn default_state(self) -> bool {
        matches!(self, Switch::Text)
    }

    pub fn gates_memory(self) -> bool {
        Self::MEMORY_GATES.contains(&self)
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The switch registry, stored as a bit vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftSwitches {
    bits: u32,
}

impl SoftSwitches {
    pub fn new() -> Self {
        let mut s = Self { bits: 0 };
        s.reset();
        s
    }

    #[inline]
    pub fn get(&self, switch: Switch) -> bool {
        self.bits & switch.bit() != 0
    }

    #[inline]
    pub fn is_on(&self, switch: Switch) -> bool {
        self.get(switch)
    }

    #[inline]
    pub fn is_off(&self, switch: Switch) -> bool {
        !self.get(switch)
    }

    /// Returns `true` if the value changed.
    pub fn set(&mut self, switch: Switch, value: bool) -> bool {
        let old = self.get(switch);
        if value {
            self.bits |= switch.bit();
        } else {
            self.bits &= !switch.bit();
        }
        old != value
    }

    /// Flip `switch`; returns the new value.
    pub fn toggle(&mut self, switch: Switch) -> bool {
        self.bits ^= switch.bit();
        self.get(switch)
    }

    /// Restore every switch to its power-on default.
    pub fn reset(&mut self) {
        self.bits = 0;
        for s in Switch::ALL {
            if s.default_state() {
                self.bits |= s.bit();
            }
        }
    }

    /// Raw bit vector (bit n = `Switch` discriminant n), for snapshots.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn from_bits(bits: u32) -> Self {
        let mask = Switch::ALL.iter().fold(0, |m, s| m | s.bit());
        Self { bits: bits & mask }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Switch, bool)> + '_ {
        Switch::ALL.iter().map(move |&s| (s, self.get(s)))
    }
}

impl Default for SoftSwitches {
    fn default() -> Self {
        Self::new()
    }
}
