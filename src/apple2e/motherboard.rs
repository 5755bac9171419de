//! Tick scheduler: drives CPU, video, cards and misc devices in lock-step
//! and owns the pause / resume protocol.
//!
//! ```text
//!   tick()  ──► CPU ──► (every cpu_per_clock calls) video ─► cards ─► devices
//! ```
//!
//! Structural changes (attach / detach, listener edits, switch snapshots)
//! go through a `PauseGuard`, which stops ticking for as long as it lives
//! and restores the previous run state when dropped.

use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

use super::banks::RamInit;
use super::cards::{Card, RamExpansionCard, RomCard};
use super::cpu::Cpu;
use super::error::{DeviceError, MachineError};
use super::memory::Memory;
use super::roms::RomImage;
use super::video::{ScanVideo, Video};
use crate::config::{CardKind, Config};

/// A non-card peripheral ticked after the cards.
pub trait Device: Send {
    fn name(&self) -> &str;

    fn tick(&mut self, memory: &mut Memory) -> Result<(), DeviceError>;

    fn reset(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
    Paused,
}

// ── Speed requests ─────────────────────────────────────────────

/// Reference set of components asking for maximum speed.  Normal pacing
/// resumes once the set is empty.
#[derive(Debug, Clone, Default)]
pub struct SpeedRequests {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl SpeedRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this is a new request.
    pub fn request(&self, who: &str) -> bool {
        let mut set = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let added = set.insert(who.to_string());
        if added && set.len() == 1 {
            log::debug!("max speed on ({who})");
        }
        added
    }

    pub fn release(&self, who: &str) -> bool {
        let mut set = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = set.remove(who);
        if removed && set.is_empty() {
            log::debug!("max speed off ({who})");
        }
        removed
    }

    pub fn is_max(&self) -> bool {
        !self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

// ── Motherboard ────────────────────────────────────────────────

pub struct Motherboard {
    cpu: Cpu,
    video: Box<dyn Video>,
    devices: Vec<Box<dyn Device>>,
    state: RunState,
    cpu_per_clock: u32,
    clock_counter: u32,
    speed: SpeedRequests,
    faults: u64,
    last_fault: Option<String>,
}

impl Motherboard {
    pub fn new(mut memory: Memory, video: Box<dyn Video>, cpu_per_clock: u32) -> Self {
        memory.set_floating_bus(video.floating_bus_fn());
        let cpu_per_clock = cpu_per_clock.max(1);
        Self {
            cpu: Cpu::new(memory),
            video,
            devices: Vec::new(),
            state: RunState::Stopped,
            cpu_per_clock,
            clock_counter: cpu_per_clock,
            speed: SpeedRequests::new(),
            faults: 0,
            last_fault: None,
        }
    }

    /// Build a board from configuration.  A card that cannot be built is
    /// logged and its slot left empty.
    pub fn from_config(cfg: &Config) -> Result<Self, MachineError> {
        let mut memory = Memory::new(cfg.ram_init);

        let image = match &cfg.rom_path {
            Some(path) => Some(RomImage::load(path, cfg.rom_origin)?),
            None => match RomImage::find() {
                Ok(img) => Some(img),
                Err(e) => {
                    log::warn!("{e}");
                    log::warn!("Using the built-in stub ROM");
                    None
                }
            },
        };
        if let Some(img) = image {
            memory.load_rom(img.origin, &img.data)?;
        }

        let mut board = Self::new(memory, Box::new(ScanVideo::new()), cfg.cpu_per_clock);
        for sc in &cfg.slots {
            let card = match build_card(&sc.card) {
                Ok(card) => card,
                Err(e) => {
                    log::error!("slot {}: card not installed: {e}", sc.slot);
                    continue;
                }
            };
            if let Err(e) = board.attach_card(sc.slot, card) {
                log::error!("slot {}: {e}", sc.slot);
            }
        }
        // Pick up the reset vector of the loaded ROM.
        board.cpu.reset();
        Ok(board)
    }

    // ── Accessors ──────────────────────────────────────────────

    pub fn memory(&self) -> &Memory {
        self.cpu.memory()
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        self.cpu.memory_mut()
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn video(&self) -> &dyn Video {
        self.video.as_ref()
    }

    pub fn speed(&self) -> &SpeedRequests {
        &self.speed
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn cpu_per_clock(&self) -> u32 {
        self.cpu_per_clock
    }

    /// Total device faults logged so far and the most recent message.
    pub fn faults(&self) -> (u64, Option<&str>) {
        (self.faults, self.last_fault.as_deref())
    }

    pub fn add_device(&mut self, device: Box<dyn Device>) {
        log::debug!("device added: {}", device.name());
        self.devices.push(device);
    }

    // ── Run state ──────────────────────────────────────────────

    pub fn start(&mut self) {
        if self.state != RunState::Running {
            log::info!("machine running");
            self.state = RunState::Running;
        }
    }

    pub fn stop(&mut self) {
        if self.state != RunState::Stopped {
            log::info!("machine stopped");
            self.state = RunState::Stopped;
        }
    }

    /// Running <-> Paused; a stopped machine stays stopped.
    pub fn toggle_pause(&mut self) {
        self.state = match self.state {
            RunState::Running => RunState::Paused,
            RunState::Paused => RunState::Running,
            RunState::Stopped => RunState::Stopped,
        };
    }

    /// Stop ticking until the guard is dropped.
    pub fn pause(&mut self) -> PauseGuard<'_> {
        let was_running = self.state == RunState::Running;
        if was_running {
            self.state = RunState::Paused;
        }
        PauseGuard {
            board: self,
            was_running,
            suspended: Vec::new(),
        }
    }

    /// Like `pause`, and also suspend every running card that stops with
    /// the CPU.  Only those cards are resumed afterwards.
    pub fn suspend(&mut self) -> PauseGuard<'_> {
        let mut suspended = Vec::new();
        for (slot, s) in self.cpu.memory_mut().cards_mut().iter_mut() {
            if s.running && s.card.suspends_with_cpu() {
                s.running = false;
                s.card.suspended();
                suspended.push(slot);
            }
        }
        let mut guard = self.pause();
        guard.suspended = suspended;
        guard
    }

    // ── Tick ───────────────────────────────────────────────────

    /// One CPU cycle; video, cards and devices run every `cpu_per_clock`
    /// cycles.  Device faults are logged and do not stop the machine.
    pub fn tick(&mut self) {
        if self.state != RunState::Running {
            return;
        }
        self.cpu.tick();

        self.clock_counter = self.clock_counter.saturating_sub(1);
        if self.clock_counter > 0 {
            return;
        }
        self.clock_counter = self.cpu_per_clock;

        if let Err(e) = self.video.tick(self.cpu.memory()) {
            self.fault("video", &e);
        }

        let mut errors = Vec::new();
        for (slot, s) in self.cpu.memory_mut().cards_mut().iter_mut() {
            if !s.running {
                continue;
            }
            if let Err(e) = s.card.tick() {
                errors.push((format!("slot {slot} ({})", s.card.name()), e));
            }
        }
        for dev in self.devices.iter_mut() {
            if let Err(e) = dev.tick(self.cpu.memory_mut()) {
                errors.push((dev.name().to_string(), e));
            }
        }
        for (who, e) in errors {
            self.fault(&who, &e);
        }
    }

    fn fault(&mut self, who: &str, e: &DeviceError) {
        log::error!("{who}: {e}");
        self.faults += 1;
        self.last_fault = Some(format!("{who}: {e}"));
    }

    /// Tick up to `n` times, stopping early if the machine leaves the
    /// running state.  Returns the number of ticks executed.
    pub fn run_cycles(&mut self, n: u64) -> u64 {
        let mut done = 0;
        while done < n && self.state == RunState::Running {
            self.tick();
            done += 1;
        }
        done
    }

    // ── Reset ──────────────────────────────────────────────────

    /// Power cycle: RAM refilled, switches and devices back to defaults.
    pub fn cold_reset(&mut self) {
        self.reset(true);
    }

    pub fn warm_reset(&mut self) {
        self.reset(false);
    }

    fn reset(&mut self, cold: bool) {
        let mut board = self.pause();
        board.cpu.memory_mut().reset(cold);
        board.video.reset();
        for dev in board.devices.iter_mut() {
            dev.reset();
        }
        board.speed.clear();
        let divisor = board.cpu_per_clock;
        board.clock_counter = divisor;
        board.cpu.reset();
        log::info!("{} reset", if cold { "cold" } else { "warm" });
    }

    // ── Cards ──────────────────────────────────────────────────

    pub fn attach_card(&mut self, slot: usize, mut card: Box<dyn Card>) -> Result<(), MachineError> {
        let speed = self.speed.clone();
        let mut board = self.suspend();
        card.on_attach(slot, &speed);
        board.memory_mut().attach_card(slot, card)
    }

    pub fn detach_card(&mut self, slot: usize) -> Option<Box<dyn Card>> {
        let mut board = self.suspend();
        board.memory_mut().detach_card(slot)
    }

    /// Suspend, detach, let the card reconfigure itself, attach again.
    pub fn reconfigure_card(&mut self, slot: usize) -> Result<(), MachineError> {
        let speed = self.speed.clone();
        let mut board = self.suspend();
        let mut card = board
            .memory_mut()
            .detach_card(slot)
            .ok_or(MachineError::EmptySlot(slot))?;
        card.reconfigure();
        card.on_attach(slot, &speed);
        board.memory_mut().attach_card(slot, card)
    }
}

fn build_card(kind: &CardKind) -> Result<Box<dyn Card>, MachineError> {
    Ok(match kind {
        CardKind::Rom {
            firmware,
            expansion_rom,
        } => Box::new(RomCard::from_files(firmware, expansion_rom.as_deref())?),
        CardKind::RamExpansion { size_kb } => Box::new(RamExpansionCard::new(*size_kb)),
    })
}

impl Default for Motherboard {
    fn default() -> Self {
        Self::new(Memory::new(RamInit::default()), Box::new(ScanVideo::new()), 1)
    }
}

// ── Pause guard ────────────────────────────────────────────────

/// Scoped pause.  Dropping it resumes the cards it suspended and, if the
/// machine was running when the guard was taken, resumes the machine.
pub struct PauseGuard<'a> {
    board: &'a mut Motherboard,
    was_running: bool,
    suspended: Vec<usize>,
}

impl PauseGuard<'_> {
    pub fn was_running(&self) -> bool {
        self.was_running
    }

    /// Slots suspended by this guard.
    pub fn suspended_slots(&self) -> &[usize] {
        &self.suspended
    }
}

impl Deref for PauseGuard<'_> {
    type Target = Motherboard;

    fn deref(&self) -> &Motherboard {
        self.board
    }
}

impl DerefMut for PauseGuard<'_> {
    fn deref_mut(&mut self) -> &mut Motherboard {
        self.board
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        for &slot in &self.suspended {
            if let Some(s) = self.board.memory_mut().cards_mut().slot_mut(slot) {
                s.running = true;
                s.card.resumed();
            }
        }
        if self.was_running && self.board.state == RunState::Paused {
            self.board.state = RunState::Running;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apple2e::cards::tests::RecordingCard;
    use crate::apple2e::event::{Listener, ListenerTag, Scope, TypeFilter};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn board() -> Motherboard {
        Motherboard::new(Memory::new(RamInit::Zero), Box::new(ScanVideo::new()), 1)
    }

    struct Counter {
        hits: Arc<AtomicU32>,
    }

    impl Device for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn tick(&mut self, _memory: &mut Memory) -> Result<(), DeviceError> {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    #[test]
    fn ticks_only_while_running() {
        let mut b = board();
        b.tick();
        assert_eq!(b.cpu().cycles(), 0);
        b.start();
        assert_eq!(b.run_cycles(3), 3);
        assert_eq!(b.cpu().cycles(), 3);
        b.stop();
        assert_eq!(b.run_cycles(3), 0);
    }

    #[test]
    fn scenario_f_pause_resume_loses_no_ticks() {
        let mut b = board();
        b.start();
        b.run_cycles(10);
        {
            let mut guard = b.pause();
            assert!(guard.was_running());
            assert_eq!(guard.state(), RunState::Paused);
            guard.memory_mut().add_listener(Listener::callback(
                Scope::Address(0x0300),
                TypeFilter::Any,
                ListenerTag::Device(1),
                |_| {},
            ));
            guard.tick();
            assert_eq!(guard.cpu().cycles(), 10);

            // nested pause does not resume on its own
            let inner = guard.pause();
            assert!(!inner.was_running());
        }
        assert_eq!(b.state(), RunState::Running);
        b.run_cycles(10);
        assert_eq!(b.cpu().cycles(), 20);
    }

    #[test]
    fn pause_of_stopped_machine_stays_stopped() {
        let mut b = board();
        drop(b.pause());
        assert_eq!(b.state(), RunState::Stopped);
    }

    #[test]
    fn divisor_gates_video_and_devices() {
        let hits = Arc::new(AtomicU32::new(0));
        let mut b = Motherboard::new(Memory::new(RamInit::Zero), Box::new(ScanVideo::new()), 4);
        b.add_device(Box::new(Counter { hits: hits.clone() }));
        b.start();
        b.run_cycles(10);
        assert_eq!(hits.load(Ordering::Relaxed), 2);
        assert_eq!(b.cpu().cycles(), 10);
    }

    #[test]
    fn faulting_card_is_contained() {
        let hits = Arc::new(AtomicU32::new(0));
        let mut b = board();
        let mut card = RecordingCard::new();
        card.fail_ticks = true;
        b.attach_card(2, Box::new(card)).unwrap();
        b.add_device(Box::new(Counter { hits: hits.clone() }));
        b.start();
        b.run_cycles(5);
        assert_eq!(b.state(), RunState::Running);
        assert_eq!(hits.load(Ordering::Relaxed), 5);
        let (count, last) = b.faults();
        assert_eq!(count, 5);
        assert!(last.unwrap().contains("recorder"));
    }

    #[test]
    fn suspend_records_only_cards_that_stop_with_cpu() {
        let mut b = board();
        let mut with_cpu = RecordingCard::new();
        with_cpu.with_cpu = true;
        b.attach_card(1, Box::new(with_cpu)).unwrap();
        b.attach_card(2, Box::new(RecordingCard::new())).unwrap();
        let mut idle = RecordingCard::new();
        idle.with_cpu = true;
        b.attach_card(3, Box::new(idle)).unwrap();
        b.memory_mut().cards_mut().slot_mut(3).unwrap().running = false;
        b.start();
        {
            let mut guard = b.suspend();
            assert_eq!(guard.suspended_slots(), &[1]);
            let cards = guard.memory_mut().cards_mut();
            assert!(!cards.slot_mut(1).unwrap().running);
            assert!(cards.slot_mut(2).unwrap().running);
        }
        let cards = b.memory_mut().cards_mut();
        assert!(cards.slot_mut(1).unwrap().running);
        assert!(!cards.slot_mut(3).unwrap().running);
        assert_eq!(b.state(), RunState::Running);
    }

    #[test]
    fn reconfigure_card_keeps_it_in_place() {
        let mut b = board();
        b.attach_card(5, Box::new(RecordingCard::new())).unwrap();
        let listeners = b.memory().listeners().len();
        b.start();
        b.reconfigure_card(5).unwrap();
        assert!(b.memory().cards().is_occupied(5));
        assert_eq!(b.memory().listeners().len(), listeners);
        assert_eq!(b.state(), RunState::Running);
        assert!(matches!(b.reconfigure_card(4), Err(MachineError::EmptySlot(4))));
        assert_eq!(b.state(), RunState::Running);
    }

    #[test]
    fn missing_configured_rom_is_an_error_naming_the_file_once() {
        let cfg = Config {
            rom_path: Some("/nonexistent/lumen/board.rom".into()),
            ..Config::default()
        };
        let msg = match Motherboard::from_config(&cfg) {
            Err(e) => e.to_string(),
            Ok(_) => panic!("board built without its ROM"),
        };
        assert_eq!(msg.matches("board.rom").count(), 1, "{msg}");
    }

    #[test]
    fn speed_requests_are_reference_counted_by_name() {
        let speed = SpeedRequests::new();
        assert!(!speed.is_max());
        assert!(speed.request("disk"));
        assert!(!speed.request("disk"));
        assert!(speed.request("tape"));
        assert!(speed.release("disk"));
        assert!(speed.is_max());
        assert!(speed.release("tape"));
        assert!(!speed.is_max());
        assert!(!speed.release("tape"));
    }

    #[test]
    fn cold_reset_restores_switches_and_vector() {
        use crate::apple2e::switches::Switch;
        let mut b = board();
        b.memory_mut().set_switch(Switch::RamRd, true);
        b.start();
        b.run_cycles(50);
        b.cold_reset();
        assert!(!b.memory().switch(Switch::RamRd));
        assert_eq!(b.cpu().program_counter(), b.memory().peek_word(0xFFFC));
        assert_eq!(b.state(), RunState::Running);
    }
}
