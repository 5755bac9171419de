// Persistent machine configuration: ROM image, clock, RAM fill, slot cards.
// Stored as JSON in <config_dir>/lumen/config.json

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::apple2e::banks::RamInit;
use crate::apple2e::MachineError;

/// NTSC IIe CPU clock.
pub const DEFAULT_CYCLES_PER_SECOND: u32 = 1_020_484;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// System ROM image.  `None` searches the standard ROM directories and
    /// falls back to the built-in stub.
    pub rom_path: Option<PathBuf>,
    /// Load address of the ROM image; `None` infers it from the size.
    pub rom_origin: Option<u16>,
    pub cycles_per_second: u32,
    /// CPU cycles per video/card clock.
    pub cpu_per_clock: u32,
    pub ram_init: RamInit,
    pub slots: Vec<SlotConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rom_path: None,
            rom_origin: None,
            cycles_per_second: DEFAULT_CYCLES_PER_SECOND,
            cpu_per_clock: 1,
            ram_init: RamInit::default(),
            slots: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub slot: usize,
    pub card: CardKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CardKind {
    Rom {
        firmware: PathBuf,
        #[serde(default)]
        expansion_rom: Option<PathBuf>,
    },
    RamExpansion {
        #[serde(default = "default_expansion_kb")]
        size_kb: usize,
    },
}

fn default_expansion_kb() -> usize {
    1024
}

impl Config {
    /// Path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|d| d.join("config.json"))
    }

    /// Load config from disk, or return defaults if not found / invalid.
    pub fn load() -> Self {
        let path = match Self::config_path() {
            Some(p) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("Cannot read config: {e}");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, MachineError> {
        let content = std::fs::read_to_string(path).map_err(|e| MachineError::io(path, e))?;
        let cfg = Self::parse_json(&content)?;
        log::debug!("Config loaded from {}", path.display());
        Ok(cfg)
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<(), MachineError> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), MachineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MachineError::io(parent, e))?;
        }
        std::fs::write(path, self.to_json()?).map_err(|e| MachineError::io(path, e))?;
        log::info!("Config saved to {}", path.display());
        Ok(())
    }

    /// Unknown fields are ignored, missing fields get defaults.
    pub fn parse_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Get the application config directory.
fn config_dir() -> Option<PathBuf> {
    // macOS:   ~/Library/Application Support/lumen/
    // Linux:   ~/.config/lumen/
    // Windows: %APPDATA%/lumen/

    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").ok()?;
        Some(
            PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("lumen"),
        )
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").ok()?;
        Some(PathBuf::from(appdata).join("lumen"))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let home = std::env::var("HOME").ok()?;
        Some(PathBuf::from(home).join(".config").join("lumen"))
    }
}
