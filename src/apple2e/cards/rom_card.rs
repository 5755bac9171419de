//! A card that is nothing but ROM: a firmware page and, optionally, an
//! expansion ROM for the shared $C800 window.

use std::path::Path;

use super::{blank_expansion_rom, blank_firmware, Card};
use crate::apple2e::banks::Bank;
use crate::apple2e::error::MachineError;
use crate::apple2e::event::MemoryEvent;

pub struct RomCard {
    name: String,
    firmware: Bank,
    expansion: Bank,
}

impl RomCard {
    /// Images longer than their window are truncated.
    pub fn new(name: impl Into<String>, firmware: &[u8], expansion: Option<&[u8]>) -> Self {
        let mut fw = blank_firmware();
        let copied = fw.load(0, firmware);
        if copied < firmware.len() {
            log::warn!("firmware image truncated to {copied} bytes");
        }
        let mut exp = blank_expansion_rom();
        if let Some(data) = expansion {
            let copied = exp.load(0, data);
            if copied < data.len() {
                log::warn!("expansion ROM truncated to {copied} bytes");
            }
        }
        Self {
            name: name.into(),
            firmware: fw,
            expansion: exp,
        }
    }

    pub fn from_files(firmware: &Path, expansion: Option<&Path>) -> Result<Self, MachineError> {
        let fw = std::fs::read(firmware).map_err(|e| MachineError::io(firmware, e))?;
        let exp = match expansion {
            Some(p) => Some(std::fs::read(p).map_err(|e| MachineError::io(p, e))?),
            None => None,
        };
        let name = firmware
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("rom card")
            .to_string();
        log::info!(
            "ROM card '{name}': {} firmware bytes, {} expansion bytes",
            fw.len(),
            exp.as_ref().map_or(0, Vec::len)
        );
        Ok(Self::new(name, &fw, exp.as_deref()))
    }
}

impl Card for RomCard {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) {}

    fn firmware(&self) -> &Bank {
        &self.firmware
    }

    fn expansion_rom(&self) -> &Bank {
        &self.expansion
    }

    fn handle_io_access(&mut self, _register: u8, _event: &mut MemoryEvent) {}
}
