//! The IIe address space: banks, active map, soft switches, listeners and
//! card slots in one owning structure.
//!
//! Plain reads and writes go straight through the active map.  A listener
//! is consulted only when one is filed under the page, when the caller asks
//! for an event, or when the address is in the $C0xx I/O hole, which is
//! always dispatched per register.

use mos6502::memory::Bus;

use super::banks::{Bank, BankId, Page, PageRef, RamInit, SystemBanks, BLANK_FILL};
use super::cards::{self, Card, CardSlots, EXPANSION_RANGE};
use super::error::MachineError;
use super::event::{
    Action, CardHook, EventType, Handler, Listener, ListenerId, ListenerTable, ListenerTag,
    MemoryEvent, Scope, SwitchHook, TypeFilter,
};
use super::mmu::{ActiveMap, IO_PAGE};
use super::switches::{SoftSwitches, Switch};

pub type FloatingBus = Box<dyn Fn() -> u8 + Send>;

/// $C000–$C00F write latches, in register-pair order (even = off, odd = on).
const WRITE_LATCHES: [Switch; 8] = [
    Switch::Store80,
    Switch::RamRd,
    Switch::RamWrt,
    Switch::IntCxRom,
    Switch::AltZp,
    Switch::SlotC3Rom,
    Switch::Col80,
    Switch::AltCharset,
];

/// Status registers: bit 7 reports the switch.
const STATUS_READS: [(u16, Switch, bool); 16] = [
    (0xC011, Switch::LcBank1, true),
    (0xC012, Switch::LcRam, false),
    (0xC013, Switch::RamRd, false),
    (0xC014, Switch::RamWrt, false),
    (0xC015, Switch::IntCxRom, false),
    (0xC016, Switch::AltZp, false),
    (0xC017, Switch::SlotC3Rom, false),
    (0xC018, Switch::Store80, false),
    (0xC01A, Switch::Text, false),
    (0xC01B, Switch::Mixed, false),
    (0xC01C, Switch::Page2, false),
    (0xC01D, Switch::Hires, false),
    (0xC01E, Switch::AltCharset, false),
    (0xC01F, Switch::Col80, false),
    (0xC061, Switch::OpenApple, false),
    (0xC062, Switch::SolidApple, false),
];

/// $C050–$C057, any access.
const VIDEO_LATCHES: [Switch; 4] = [Switch::Text, Switch::Mixed, Switch::Page2, Switch::Hires];

pub struct Memory {
    banks: SystemBanks,
    cards: CardSlots,
    map: ActiveMap,
    switches: SoftSwitches,
    listeners: ListenerTable,
    active_slot: usize,
    floating_bus: FloatingBus,
    cpu_holds: usize,
    /// Opcode already dispatched as an execute event, handed to the CPU's
    /// next bus read instead of a second dispatch.
    fetched: Option<(u16, u8)>,
}

impl Memory {
    pub fn new(ram_init: RamInit) -> Self {
        let mut mem = Self {
            banks: SystemBanks::new(ram_init),
            cards: CardSlots::new(),
            map: ActiveMap::new(),
            switches: SoftSwitches::new(),
            listeners: ListenerTable::new(),
            active_slot: 0,
            floating_bus: Box::new(|| BLANK_FILL),
            cpu_holds: 0,
            fetched: None,
        };
        mem.install_system_hooks();
        mem.reconfigure();
        mem
    }

    fn install_system_hooks(&mut self) {
        let sys = |scope, filter, hook| {
            Listener::new(scope, filter, ListenerTag::System, Handler::Switch(hook))
        };

        for (i, &switch) in WRITE_LATCHES.iter().enumerate() {
            for on in [false, true] {
                let addr = 0xC000 + (i as u16) * 2 + on as u16;
                self.listeners.add(sys(
                    Scope::Address(addr),
                    TypeFilter::Write,
                    SwitchHook::Latch { switch, on },
                ));
            }
        }

        for (addr, switch, invert) in STATUS_READS {
            self.listeners.add(sys(
                Scope::Address(addr),
                TypeFilter::Read,
                SwitchHook::Status { switch, invert },
            ));
        }

        for (i, &switch) in VIDEO_LATCHES.iter().enumerate() {
            for on in [false, true] {
                let addr = 0xC050 + (i as u16) * 2 + on as u16;
                self.listeners.add(sys(
                    Scope::Address(addr),
                    TypeFilter::Any,
                    SwitchHook::Latch { switch, on },
                ));
            }
        }
        for (addr, on) in [(0xC05E, true), (0xC05F, false)] {
            self.listeners.add(sys(
                Scope::Address(addr),
                TypeFilter::Any,
                SwitchHook::Latch { switch: Switch::Dhires, on },
            ));
        }

        self.listeners.add(sys(
            Scope::Range(0xC080, 0xC08F),
            TypeFilter::Any,
            SwitchHook::LanguageCard,
        ));
        self.listeners.add(sys(
            Scope::Range(0xC300, 0xC3FF),
            TypeFilter::Any,
            SwitchHook::SlotC3Access,
        ));
        self.listeners.add(sys(
            Scope::Address(EXPANSION_RANGE.1),
            TypeFilter::Any,
            SwitchHook::ReleaseExpansion,
        ));
    }

    /// Rebuild the active map from the current switches, cards and active
    /// slot.
    pub fn reconfigure(&mut self) {
        self.map
            .reconfigure(&self.switches, &self.cards, self.active_slot);
    }

    pub fn active_map(&self) -> &ActiveMap {
        &self.map
    }

    // ── Bank access ────────────────────────────────────────────

    pub fn bank(&self, id: BankId) -> Option<&Bank> {
        self.banks.get(id).or_else(|| self.cards.bank(id))
    }

    pub fn bank_mut(&mut self, id: BankId) -> Option<&mut Bank> {
        self.banks.get_mut(id)
    }

    /// Raw page behind a page reference (video scanning, debuggers).
    pub fn page(&self, r: PageRef) -> Option<&Page> {
        self.bank(r.bank)?.page(r.index as usize)
    }

    pub(crate) fn system_banks(&self) -> &SystemBanks {
        &self.banks
    }

    pub(crate) fn system_banks_mut(&mut self) -> &mut SystemBanks {
        &mut self.banks
    }

    pub fn load_rom(&mut self, origin: u16, data: &[u8]) -> Result<(), MachineError> {
        self.banks.load_rom(origin, data)
    }

    // ── Floating bus ───────────────────────────────────────────

    pub fn set_floating_bus(&mut self, f: FloatingBus) {
        self.floating_bus = f;
    }

    #[inline]
    pub fn floating_bus(&self) -> u8 {
        (self.floating_bus)()
    }

    // ── Read / write ───────────────────────────────────────────

    /// Byte at `addr` through the read table, without dispatch.
    pub fn peek(&self, addr: u16) -> u8 {
        match self.map.read_page((addr >> 8) as usize) {
            Some(r) => self.byte_at(r, addr as u8),
            None => self.floating_bus(),
        }
    }

    pub fn peek_word(&self, addr: u16) -> u16 {
        u16::from_le_bytes([self.peek(addr), self.peek(addr.wrapping_add(1))])
    }

    fn byte_at(&self, r: PageRef, offset: u8) -> u8 {
        self.page(r).map_or(BLANK_FILL, |p| p.read(offset))
    }

    pub fn read(&mut self, addr: u16, kind: EventType, trigger_event: bool, require_sync: bool) -> u8 {
        let page = (addr >> 8) as usize;
        if page == IO_PAGE {
            let bus = self.floating_bus();
            return self.dispatch_synced(MemoryEvent::new(addr, kind, bus, bus), require_sync);
        }
        let value = self.peek(addr);
        if trigger_event || self.listeners.page_has_listeners(page) {
            self.dispatch_synced(MemoryEvent::new(addr, kind, value, value), require_sync)
        } else {
            value
        }
    }

    /// Store `value` and return the byte previously visible at `addr`.
    /// Writes to read-only or unmapped pages are dropped after listeners
    /// have seen them.
    pub fn write(&mut self, addr: u16, value: u8, generate_event: bool, require_sync: bool) -> u8 {
        let page = (addr >> 8) as usize;
        // Captured before dispatch: a listener may remap the page.
        let target = self.map.write_page(page);
        let old = match target {
            Some(r) => self.byte_at(r, addr as u8),
            None => self.peek(addr),
        };

        let value = if page == IO_PAGE || generate_event || self.listeners.page_has_listeners(page) {
            self.dispatch_synced(MemoryEvent::write(addr, value, old), require_sync)
        } else {
            value
        };

        if let Some(r) = target {
            if let Some(p) = self
                .banks
                .get_mut(r.bank)
                .and_then(|b| b.page_mut(r.index as usize))
            {
                p.write(addr as u8, value);
            }
        }
        old
    }

    pub fn read_word(&mut self, addr: u16, trigger_event: bool, require_sync: bool) -> u16 {
        let lo = self.read(addr, EventType::Read, trigger_event, require_sync);
        let hi = self.read(addr.wrapping_add(1), EventType::Read, trigger_event, require_sync);
        u16::from_le_bytes([lo, hi])
    }

    pub fn write_word(&mut self, addr: u16, value: u16, generate_event: bool, require_sync: bool) {
        let [lo, hi] = value.to_le_bytes();
        self.write(addr, lo, generate_event, require_sync);
        self.write(addr.wrapping_add(1), hi, generate_event, require_sync);
    }

    // ── Dispatch ───────────────────────────────────────────────

    /// With `require_sync` the CPU hold count is raised for the dispatch.
    /// Hold and release happen inside this one `&mut` call, so the CPU can
    /// never observe the hold here; callers off the machine thread get
    /// their ordering from `runner`, which applies pokes between tick
    /// slices.  The count matters for holds taken through `hold_cpu` that
    /// span ticks.
    fn dispatch_synced(&mut self, event: MemoryEvent, require_sync: bool) -> u8 {
        if require_sync {
            self.hold_cpu();
            let v = self.dispatch(event);
            self.release_cpu();
            v
        } else {
            self.dispatch(event)
        }
    }

    /// Run every matching listener in registration order; returns the final
    /// value.
    fn dispatch(&mut self, mut event: MemoryEvent) -> u8 {
        let mut n = 0;
        while let Some(found) = self.listeners.action_at(n, &event) {
            n += 1;
            match found {
                None => {}
                Some(Action::Callback(pos)) => self.listeners.run_callback(pos, &mut event),
                Some(Action::Switch(hook)) => self.switch_hook(hook, &mut event),
                Some(Action::Card { slot, hook }) => self.card_access(slot as usize, hook, &mut event),
            }
        }
        event.value()
    }

    fn switch_hook(&mut self, hook: SwitchHook, event: &mut MemoryEvent) {
        match hook {
            SwitchHook::Latch { switch, on } => self.set_switch(switch, on),
            SwitchHook::Status { switch, invert } => {
                let bit = (self.switches.get(switch) ^ invert) as u8;
                event.set_value((bit << 7) | (event.value() & 0x7F));
            }
            SwitchHook::LanguageCard => self.language_card(event),
            SwitchHook::SlotC3Access => {
                if self.switches.is_off(Switch::SlotC3Rom) {
                    self.set_switch(Switch::IntC8Rom, true);
                }
            }
            SwitchHook::ReleaseExpansion => {
                let changed = self.switches.set(Switch::IntC8Rom, false) || self.active_slot != 0;
                self.active_slot = 0;
                if changed {
                    self.reconfigure();
                }
            }
        }
    }

    /// $C080–$C08F.  Two successive odd reads enable writing.
    fn language_card(&mut self, event: &MemoryEvent) {
        let r = event.address() & 0x0F;
        let mut changes = vec![
            (Switch::LcBank1, r & 0x08 != 0),
            (Switch::LcRam, matches!(r & 0x03, 0 | 3)),
        ];
        if r & 1 == 1 {
            if event.is_write() {
                changes.push((Switch::LcPrewrite, false));
            } else {
                if self.switches.is_on(Switch::LcPrewrite) {
                    changes.push((Switch::LcWrite, true));
                }
                changes.push((Switch::LcPrewrite, true));
            }
        } else {
            changes.push((Switch::LcWrite, false));
            changes.push((Switch::LcPrewrite, false));
        }
        self.set_switches(&changes);
    }

    fn card_access(&mut self, slot: usize, hook: CardHook, event: &mut MemoryEvent) {
        match hook {
            CardHook::Io => {
                if let Some(card) = self.cards.get_mut(slot) {
                    card.handle_io_access((event.address() & 0x0F) as u8, event);
                }
            }
            CardHook::Firmware => {
                if self.active_slot != slot {
                    self.active_slot = slot;
                    self.reconfigure();
                }
                if self.switches.is_off(Switch::IntCxRom) {
                    if let Some(card) = self.cards.get_mut(slot) {
                        card.handle_firmware_access(event.address() as u8, event);
                    }
                }
            }
            CardHook::Expansion => {
                if self.switches.is_off(Switch::IntCxRom)
                    && self.switches.is_off(Switch::IntC8Rom)
                    && self.active_slot == slot
                {
                    if let Some(card) = self.cards.get_mut(slot) {
                        card.handle_expansion_access(event.address() - EXPANSION_RANGE.0, event);
                    }
                }
            }
        }
    }

    // ── Soft switches ──────────────────────────────────────────

    pub fn switches(&self) -> &SoftSwitches {
        &self.switches
    }

    pub fn switch(&self, switch: Switch) -> bool {
        self.switches.get(switch)
    }

    /// Set a switch, reconfiguring only if a mapping switch changed.
    pub fn set_switch(&mut self, switch: Switch, value: bool) {
        self.set_switches(&[(switch, value)]);
    }

    pub fn toggle_switch(&mut self, switch: Switch) -> bool {
        let value = !self.switches.get(switch);
        self.set_switch(switch, value);
        value
    }

    fn set_switches(&mut self, changes: &[(Switch, bool)]) {
        let mut remap = false;
        for &(switch, value) in changes {
            if self.switches.set(switch, value) {
                log::trace!("{switch} -> {value}");
                remap |= switch.gates_memory();
            }
        }
        if remap {
            self.reconfigure();
        }
    }

    pub(crate) fn replace_state(&mut self, switches: SoftSwitches, active_slot: usize) {
        self.switches = switches;
        self.active_slot = active_slot;
        self.reconfigure();
    }

    pub fn active_slot(&self) -> usize {
        self.active_slot
    }

    // ── Listeners ──────────────────────────────────────────────

    pub fn add_listener(&mut self, listener: Listener) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id).is_some()
    }

    pub fn remove_listeners_tagged(&mut self, tag: ListenerTag) -> usize {
        self.listeners.remove_tagged(tag)
    }

    pub fn listeners(&self) -> &ListenerTable {
        &self.listeners
    }

    // ── Cards ──────────────────────────────────────────────────

    pub fn cards(&self) -> &CardSlots {
        &self.cards
    }

    pub fn cards_mut(&mut self) -> &mut CardSlots {
        &mut self.cards
    }

    /// Install `card` in `slot` and register its three windows.  The
    /// machine must be paused.
    pub fn attach_card(&mut self, slot: usize, card: Box<dyn Card>) -> Result<(), MachineError> {
        let name = card.name().to_string();
        self.cards.insert(slot, card)?;

        let tag = ListenerTag::Slot(slot as u8);
        let s = slot as u8;
        let (io_lo, io_hi) = cards::io_range(slot);
        let (fw_lo, fw_hi) = cards::firmware_range(slot);
        for (scope, hook) in [
            (Scope::Range(io_lo, io_hi), CardHook::Io),
            (Scope::Range(fw_lo, fw_hi), CardHook::Firmware),
            (Scope::Range(EXPANSION_RANGE.0, EXPANSION_RANGE.1), CardHook::Expansion),
        ] {
            self.listeners.add(Listener::new(
                scope,
                TypeFilter::Any,
                tag,
                Handler::Card { slot: s, hook },
            ));
        }
        self.reconfigure();
        log::info!("slot {slot}: attached {name}");
        Ok(())
    }

    /// Remove the card in `slot` together with its listeners.  The machine
    /// must be paused.
    pub fn detach_card(&mut self, slot: usize) -> Option<Box<dyn Card>> {
        let card = self.cards.take(slot)?;
        self.listeners.remove_tagged(ListenerTag::Slot(slot as u8));
        if self.active_slot == slot {
            self.active_slot = 0;
        }
        self.reconfigure();
        log::info!("slot {slot}: detached {}", card.name());
        Some(card)
    }

    // ── Opcode fetch ───────────────────────────────────────────

    /// Dispatch the opcode fetch at `pc` as an execute event and latch the
    /// result, so the CPU decodes the value listeners settled on and the
    /// fetch is seen exactly once.
    pub(crate) fn fetch_opcode(&mut self, pc: u16) -> u8 {
        let opcode = self.read(pc, EventType::Execute, false, false);
        self.fetched = Some((pc, opcode));
        opcode
    }

    pub(crate) fn clear_fetch(&mut self) {
        self.fetched = None;
    }

    // ── CPU hold ───────────────────────────────────────────────

    pub fn hold_cpu(&mut self) {
        self.cpu_holds += 1;
    }

    pub fn release_cpu(&mut self) {
        self.cpu_holds = self.cpu_holds.saturating_sub(1);
    }

    pub fn cpu_held(&self) -> bool {
        self.cpu_holds > 0
    }

    // ── Reset ──────────────────────────────────────────────────

    /// Switches back to defaults and the expansion window released; a cold
    /// reset also refills RAM.
    pub fn reset(&mut self, cold: bool) {
        if cold {
            self.banks.clear_ram();
        }
        self.switches.reset();
        self.active_slot = 0;
        self.cpu_holds = 0;
        self.fetched = None;
        for (_, slot) in self.cards.iter_mut() {
            slot.card.reset();
        }
        self.reconfigure();
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(RamInit::default())
    }
}

// ── mos6502 Bus implementation ────────────────────────────────

impl Bus for Memory {
    fn get_byte(&mut self, addr: u16) -> u8 {
        if let Some((pc, opcode)) = self.fetched.take() {
            if pc == addr {
                return opcode;
            }
        }
        self.read(addr, EventType::Read, false, false)
    }

    fn set_byte(&mut self, addr: u16, val: u8) {
        self.write(addr, val, false, false);
    }
}
