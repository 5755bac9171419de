//! Error types for machine construction and device ticking.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("slot {0} is out of range (expected 1-7)")]
    InvalidSlot(usize),

    #[error("slot {0} is empty")]
    EmptySlot(usize),

    #[error("slot {slot} is already occupied by {card}")]
    SlotOccupied { slot: usize, card: String },

    #[error("ROM image of {len} bytes does not fit at ${origin:04X}")]
    RomTooLarge { origin: u16, len: usize },

    #[error("ROM origin ${0:04X} is below the ROM area ($C000)")]
    RomOrigin(u16),

    #[error("{}: expected a 12K or 16K ROM image, got {len} bytes", path.display())]
    RomSize { path: PathBuf, len: usize },

    #[error(
        "IIe ROM not found.  Searched:\n{searched}\n\
         Place apple2e.rom or apple2e.bin (16 KiB) in one of those directories, \
         or set the LUMEN_ROM_DIR environment variable."
    )]
    RomNotFound { searched: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config: {0}")]
    Config(#[from] serde_json::Error),
}

impl MachineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A fault raised while ticking a device.  The scheduler logs it and keeps
/// ticking the device on later cycles.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("{0}")]
    Fault(String),
}
