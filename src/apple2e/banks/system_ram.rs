//! Main / auxiliary RAM power-on contents.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::bank::Bank;

/// How RAM is filled on a cold start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RamInit {
    Zero,
    /// Alternating runs of $00 / $FF, the pattern most IIe boards show:
    /// ```text
    /// $0000: 00 00 ff ff 00 00 ff ff  00 00 ff ff 00 00 ff ff
    /// $0100: ff ff 00 00 ff ff 00 00  ff ff 00 00 ff ff 00 00
    /// ```
    #[default]
    Pattern,
    Random,
}

impl RamInit {
    pub fn apply(self, bank: &mut Bank) {
        match self {
            RamInit::Zero => bank.fill(0),
            RamInit::Pattern => {
                let mut start: u8 = 0x00;
                for page in bank.pages_mut() {
                    let bytes = page.bytes_mut();
                    for (i, b) in bytes.iter_mut().enumerate() {
                        *b = if (i >> 1) & 1 == 0 { start } else { !start };
                    }
                    start = !start;
                }
            }
            RamInit::Random => {
                let mut rng = rand::thread_rng();
                for page in bank.pages_mut() {
                    rng.fill(&mut page.bytes_mut()[..]);
                }
            }
        }
    }
}
