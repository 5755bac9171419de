// Headless front end: load the config, build the machine and run it on the
// machine thread for a while, logging status once a second.
//
//   lumen [--config <file>] [--rom <file>] [--seconds <n>] [--fast]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use lumen::apple2e::{Motherboard, RunState};
use lumen::config::Config;
use lumen::runner::{spawn_machine, MachineCmd};

const DEFAULT_SECONDS: u64 = 5;

struct Args {
    config: Option<PathBuf>,
    rom: Option<PathBuf>,
    seconds: u64,
    fast: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
//  CLI argument helpers
// ─────────────────────────────────────────────────────────────────────────────

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config: None,
        rom: None,
        seconds: DEFAULT_SECONDS,
        fast: false,
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = Some(value_of(&arg, it.next())?.into()),
            "--rom" => args.rom = Some(value_of(&arg, it.next())?.into()),
            "--seconds" => {
                let v = value_of(&arg, it.next())?;
                args.seconds = v
                    .parse()
                    .map_err(|_| format!("--seconds: not a number: {v}"))?;
            }
            "--fast" => args.fast = true,
            "-h" | "--help" => {
                return Err(
                    "usage: lumen [--config <file>] [--rom <file>] [--seconds <n>] [--fast]".into(),
                )
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(args)
}

fn value_of(flag: &str, v: Option<String>) -> Result<String, String> {
    v.ok_or_else(|| format!("{flag} needs a value"))
}

// ─────────────────────────────────────────────────────────────────────────────
//  Entry point
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args() {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let mut cfg = match &args.config {
        Some(path) => match Config::load_from(path) {
            Ok(c) => c,
            Err(e) => {
                log::error!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => Config::load(),
    };
    if args.rom.is_some() {
        cfg.rom_path = args.rom;
    }

    let board = match Motherboard::from_config(&cfg) {
        Ok(b) => b,
        Err(e) => {
            log::error!("Cannot build machine: {e}");
            return ExitCode::FAILURE;
        }
    };
    if args.fast {
        board.speed().request("cli");
    }

    let handle = match spawn_machine(board, cfg.cycles_per_second) {
        Ok(h) => h,
        Err(e) => {
            log::error!("Cannot start machine thread: {e}");
            return ExitCode::FAILURE;
        }
    };
    handle.send(MachineCmd::Start);

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut next_report = Instant::now() + Duration::from_secs(1);
    let mut last = None;
    while Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
        if let Some(status) = handle.latest_status() {
            last = Some(status);
        }
        if Instant::now() >= next_report {
            next_report += Duration::from_secs(1);
            if let Some(s) = &last {
                log::info!(
                    "{:?}: {} cycles, {} frames{}",
                    s.state,
                    s.cycles,
                    s.frames,
                    if s.max_speed { " (max speed)" } else { "" }
                );
            }
        }
        if matches!(&last, Some(s) if s.state == RunState::Stopped && s.cycles > 0) {
            break;
        }
    }

    handle.shutdown();

    match last.and_then(|s| s.error) {
        Some(err) => {
            log::warn!("last device fault: {err}");
            ExitCode::from(2)
        }
        None => ExitCode::SUCCESS,
    }
}
