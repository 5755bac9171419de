//! Save state for the memory subsystem.
//!
//! Bank contents, the switch vector and the active slot are enough to
//! rebuild the active map.  Card ROMs are not captured; the card set is
//! part of the machine configuration.

use serde::{Deserialize, Serialize};

use super::banks::BankId;
use super::error::MachineError;
use super::memory::Memory;
use super::switches::SoftSwitches;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankImage {
    pub bank: BankId,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub banks: Vec<BankImage>,
    pub switches: u32,
    pub active_slot: usize,
}

impl MemorySnapshot {
    pub fn to_json(&self) -> Result<String, MachineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, MachineError> {
        Ok(serde_json::from_str(s)?)
    }
}

impl Memory {
    pub fn snapshot(&self) -> MemorySnapshot {
        let banks = BankId::SYSTEM
            .iter()
            .filter_map(|&id| {
                self.system_banks().get(id).map(|b| BankImage {
                    bank: id,
                    bytes: b.to_vec(),
                })
            })
            .collect();
        MemorySnapshot {
            banks,
            switches: self.switches().bits(),
            active_slot: self.active_slot(),
        }
    }

    /// Load `snap` and rebuild the active map.  The machine must be paused.
    /// An active slot without a card falls back to none.
    pub fn restore(&mut self, snap: &MemorySnapshot) -> Result<(), MachineError> {
        for image in &snap.banks {
            let Some(bank) = self.system_banks_mut().get_mut(image.bank) else {
                log::warn!("snapshot: skipping {:?}", image.bank);
                continue;
            };
            let copied = bank.load(0, &image.bytes);
            if copied != image.bytes.len() {
                log::warn!(
                    "snapshot: {:?} truncated to {copied} of {} bytes",
                    image.bank,
                    image.bytes.len()
                );
            }
        }
        let active = if self.cards().is_occupied(snap.active_slot) {
            snap.active_slot
        } else {
            0
        };
        self.replace_state(SoftSwitches::from_bits(snap.switches), active);
        log::debug!("memory snapshot restored");
        Ok(())
    }
}
