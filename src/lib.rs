//! Lumen: an Apple IIe bank-switched memory core with listener dispatch,
//! peripheral card slots and a lock-step tick scheduler.

pub mod apple2e;
pub mod config;
pub mod runner;
