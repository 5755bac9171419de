//! System ROM: the internal C-page ROM ($C000–$CFFF) and the main ROM
//! ($D000–$FFFF).
//!
//! Writes to ROM are never routed here by the active map.  When no ROM image
//! is loaded a minimal stub is installed so the CPU has somewhere to go
//! after reset.

use super::bank::Bank;
use crate::apple2e::error::MachineError;

/// 6502 opcodes used in the stub ROM.
mod opc {
    pub const RTS: u8 = 0x60;
    pub const RTI: u8 = 0x40;
    pub const CLD: u8 = 0xD8;
    pub const LDA_ABS: u8 = 0xAD;
    pub const JMP_ABS: u8 = 0x4C;
}

pub const CX_ROM_BASE: u16 = 0xC000;
pub const ROM_BASE: u16 = 0xD000;

/// Monitor reset entry used by the stub.
pub const STUB_RESET: u16 = 0xFA62;
/// Shared IRQ / NMI handler used by the stub.
pub const STUB_IRQ: u16 = 0xFA40;

/// Write a ROM image sequentially from `origin`.  Bytes below $D000 land in
/// the C-page ROM, the rest in the main ROM.
pub fn load_rom(
    cx_rom: &mut Bank,
    rom: &mut Bank,
    origin: u16,
    data: &[u8],
) -> Result<(), MachineError> {
    if origin < CX_ROM_BASE {
        return Err(MachineError::RomOrigin(origin));
    }
    if origin as usize + data.len() > 0x1_0000 {
        return Err(MachineError::RomTooLarge {
            origin,
            len: data.len(),
        });
    }

    for (i, &b) in data.iter().enumerate() {
        let addr = origin as usize + i;
        if addr < ROM_BASE as usize {
            cx_rom.write(addr - CX_ROM_BASE as usize, b);
        } else {
            rom.write(addr - ROM_BASE as usize, b);
        }
    }
    log::debug!(
        "ROM image loaded: {} bytes at ${origin:04X}-${:04X}",
        data.len(),
        (origin as usize + data.len()).saturating_sub(1)
    );
    Ok(())
}

fn set_val(rom: &mut Bank, addr: u16, val: u8) {
    rom.write((addr - ROM_BASE) as usize, val);
}

fn set_vector(rom: &mut Bank, addr: u16, target: u16) {
    set_val(rom, addr, (target & 0xFF) as u8);
    set_val(rom, addr + 1, (target >> 8) as u8);
}

/// Install the stub: RESET selects text mode and spins, IRQ/NMI return.
pub fn install_stub(cx_rom: &mut Bank, rom: &mut Bank) {
    cx_rom.fill(opc::RTS);
    rom.fill(opc::RTS);

    set_val(rom, STUB_IRQ, opc::RTI);

    // RESET: CLD / LDA $C051 / JMP *
    let spin = STUB_RESET + 4;
    set_val(rom, STUB_RESET, opc::CLD);
    set_val(rom, STUB_RESET + 1, opc::LDA_ABS);
    set_val(rom, STUB_RESET + 2, 0x51);
    set_val(rom, STUB_RESET + 3, 0xC0);
    set_val(rom, spin, opc::JMP_ABS);
    set_vector(rom, spin + 1, spin);

    // Hardware vectors
    set_vector(rom, 0xFFFA, STUB_IRQ);
    set_vector(rom, 0xFFFC, STUB_RESET);
    set_vector(rom, 0xFFFE, STUB_IRQ);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apple2e::banks::PageOrigin;

    fn banks() -> (Bank, Bank) {
        (
            Bank::new(PageOrigin::Rom, 0x10),
            Bank::new(PageOrigin::Rom, 0x30),
        )
    }

    #[test]
    fn image_is_split_across_c_page_and_main_rom() {
        let (mut cx, mut rom) = banks();
        let mut image = vec![0u8; 0x4000];
        image[0x0400] = 0x11; // $C400
        image[0x1000] = 0x22; // $D000
        image[0x3FFF] = 0x33; // $FFFF
        load_rom(&mut cx, &mut rom, 0xC000, &image).unwrap();
        assert_eq!(cx.read(0x400), 0x11);
        assert_eq!(rom.read(0x0000), 0x22);
        assert_eq!(rom.read(0x2FFF), 0x33);
    }

    #[test]
    fn oversized_image_is_rejected() {
        let (mut cx, mut rom) = banks();
        let err = load_rom(&mut cx, &mut rom, 0xD000, &[0; 0x3001]).unwrap_err();
        assert!(matches!(err, MachineError::RomTooLarge { .. }));
        let err = load_rom(&mut cx, &mut rom, 0xB000, &[0; 4]).unwrap_err();
        assert!(matches!(err, MachineError::RomOrigin(0xB000)));
    }

    #[test]
    fn stub_points_reset_at_spin_loop() {
        let (mut cx, mut rom) = banks();
        install_stub(&mut cx, &mut rom);
        let lo = rom.read(0xFFFC - 0xD000) as u16;
        let hi = rom.read(0xFFFD - 0xD000) as u16;
        assert_eq!((hi << 8) | lo, STUB_RESET);
        assert_eq!(rom.read((STUB_RESET + 4 - 0xD000) as usize), 0x4C);
    }
}
