// Machine thread: owns the motherboard, runs it in frame-sized slices
// paced to wall time, and applies commands from other threads between
// slices.  Every structural change therefore happens on this one thread.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, tick, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::apple2e::{Motherboard, RunState, Switch};

/// Slices per emulated second.
const SLICES_PER_SECOND: u32 = 60;

pub type ConfigureFn = Box<dyn FnOnce(&mut Motherboard) + Send>;

/// Commands sent from the front end → machine thread.
pub enum MachineCmd {
    Start,
    Stop,
    TogglePause,
    ColdReset,
    WarmReset,
    /// Dispatched write with CPU hold, as a keyboard or debugger would.
    Poke { addr: u16, value: u8 },
    Peek { addr: u16, reply: Sender<u8> },
    SetSwitch { switch: Switch, value: bool },
    /// Runs inside a suspend guard.
    Configure(ConfigureFn),
    Quit,
}

/// Status updates sent from machine thread → front end.
#[derive(Debug, Clone)]
pub struct MachineStatus {
    pub state: RunState,
    pub cycles: u64,
    pub frames: u64,
    pub max_speed: bool,
    pub error: Option<String>,
}

pub struct MachineHandle {
    cmd_tx: Sender<MachineCmd>,
    status_rx: Receiver<MachineStatus>,
    thread: Option<JoinHandle<()>>,
}

impl MachineHandle {
    /// Returns `false` once the machine thread is gone.
    pub fn send(&self, cmd: MachineCmd) -> bool {
        self.cmd_tx.send(cmd).is_ok()
    }

    pub fn status_rx(&self) -> &Receiver<MachineStatus> {
        &self.status_rx
    }

    /// Most recent status, draining older ones.
    pub fn latest_status(&self) -> Option<MachineStatus> {
        self.status_rx.try_iter().last()
    }

    pub fn poke(&self, addr: u16, value: u8) -> bool {
        self.send(MachineCmd::Poke { addr, value })
    }

    pub fn peek(&self, addr: u16, timeout: Duration) -> Option<u8> {
        let (reply, rx) = bounded(1);
        if !self.send(MachineCmd::Peek { addr, reply }) {
            return None;
        }
        rx.recv_timeout(timeout).ok()
    }

    pub fn configure<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut Motherboard) + Send + 'static,
    {
        self.send(MachineCmd::Configure(Box::new(f)))
    }

    /// Wait for a status matching `pred`.
    pub fn wait_for<P>(&self, timeout: Duration, mut pred: P) -> Option<MachineStatus>
    where
        P: FnMut(&MachineStatus) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.status_rx.recv_timeout(left) {
                Ok(s) if pred(&s) => return Some(s),
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Stop the machine thread and wait for it.
    pub fn shutdown(mut self) {
        self.quit();
    }

    fn quit(&mut self) {
        let _ = self.cmd_tx.send(MachineCmd::Quit);
        if let Some(t) = self.thread.take() {
            if t.join().is_err() {
                log::error!("machine thread panicked");
            }
        }
    }
}

impl Drop for MachineHandle {
    fn drop(&mut self) {
        self.quit();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Machine thread
// ─────────────────────────────────────────────────────────────────────────────

pub fn spawn_machine(board: Motherboard, cycles_per_second: u32) -> io::Result<MachineHandle> {
    let (cmd_tx, cmd_rx) = bounded::<MachineCmd>(64);
    let (status_tx, status_rx) = bounded::<MachineStatus>(16);

    let thread = thread::Builder::new()
        .name("lumen-machine".into())
        .spawn(move || {
            machine_loop(board, cycles_per_second, cmd_rx, status_tx);
        })?;

    Ok(MachineHandle {
        cmd_tx,
        status_rx,
        thread: Some(thread),
    })
}

fn machine_loop(
    mut board: Motherboard,
    cycles_per_second: u32,
    cmd_rx: Receiver<MachineCmd>,
    status_tx: Sender<MachineStatus>,
) {
    let cps = cycles_per_second.max(SLICES_PER_SECOND);
    let slice = (cps / SLICES_PER_SECOND) as u64;
    let slice_dur = Duration::from_secs_f64(slice as f64 / cps as f64);
    let mut next_slice = Instant::now();

    let idle_tick = tick(Duration::from_millis(100));
    log::info!("machine thread started ({cps} Hz, {slice} cycles per slice)");

    loop {
        match board.state() {
            RunState::Stopped | RunState::Paused => {
                select! {
                    recv(cmd_rx) -> msg => {
                        match msg {
                            Ok(MachineCmd::Quit) | Err(_) => break,
                            Ok(cmd) => handle_cmd(cmd, &mut board),
                        }
                        next_slice = Instant::now();
                        send_status(&board, &status_tx);
                    }
                    recv(idle_tick) -> _ => {
                        send_status(&board, &status_tx);
                    }
                }
            }
            RunState::Running => {
                // Drain commands (also detect front-end shutdown)
                loop {
                    match cmd_rx.try_recv() {
                        Ok(MachineCmd::Quit) | Err(TryRecvError::Disconnected) => {
                            log::info!("machine thread exiting");
                            return;
                        }
                        Ok(cmd) => handle_cmd(cmd, &mut board),
                        Err(TryRecvError::Empty) => break,
                    }
                }

                if board.state() != RunState::Running {
                    send_status(&board, &status_tx);
                    continue;
                }

                board.run_cycles(slice);

                if board.speed().is_max() {
                    next_slice = Instant::now();
                } else {
                    // Absolute timeline; snap forward after a stall rather
                    // than fast-forwarding.
                    next_slice += slice_dur;
                    let now = Instant::now();
                    if next_slice < now {
                        next_slice = now;
                    }
                    wait_until(next_slice);
                }

                send_status(&board, &status_tx);
            }
        }
    }

    log::info!("machine thread exiting");
}

fn handle_cmd(cmd: MachineCmd, board: &mut Motherboard) {
    match cmd {
        MachineCmd::Start => board.start(),
        MachineCmd::Stop => board.stop(),
        MachineCmd::TogglePause => board.toggle_pause(),
        MachineCmd::ColdReset => board.cold_reset(),
        MachineCmd::WarmReset => board.warm_reset(),
        MachineCmd::Poke { addr, value } => {
            board.memory_mut().write(addr, value, true, true);
        }
        MachineCmd::Peek { addr, reply } => {
            let _ = reply.send(board.memory().peek(addr));
        }
        MachineCmd::SetSwitch { switch, value } => board.memory_mut().set_switch(switch, value),
        MachineCmd::Configure(f) => {
            let mut guard = board.suspend();
            f(&mut *guard);
        }
        MachineCmd::Quit => {}
    }
}

fn send_status(board: &Motherboard, tx: &Sender<MachineStatus>) {
    let _ = tx.try_send(MachineStatus {
        state: board.state(),
        cycles: board.cpu().cycles(),
        frames: board.video().frames(),
        max_speed: board.speed().is_max(),
        error: board.faults().1.map(str::to_string),
    });
}

/// Wait until `deadline` using sleep for bulk + spin for precision.
fn wait_until(deadline: Instant) {
    let now = Instant::now();
    if now >= deadline {
        return;
    }
    let remaining = deadline - now;
    // Sleep if > 1.5ms remaining (sleep granularity is ~1ms on most OSes)
    if remaining > Duration::from_micros(1500) {
        thread::sleep(remaining - Duration::from_micros(1000));
    }
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}
