//! Apple IIe memory architecture: banked address space, soft switches,
//! event dispatch, card slots and the tick scheduler.
//!
//! CPU is delegated to the `mos6502` crate; the rest of the
//! machine lives here.

pub mod banks;
pub mod cards;
pub mod cpu;
pub mod error;
pub mod event;
pub mod memory;
pub mod mmu;
pub mod motherboard;
pub mod roms;
pub mod snapshot;
pub mod switches;
pub mod video;

pub use error::{DeviceError, MachineError};
pub use memory::Memory;
pub use motherboard::{Device, Motherboard, PauseGuard, RunState, SpeedRequests};
pub use switches::{SoftSwitches, Switch};
