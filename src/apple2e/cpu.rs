//! 6502 CPU driven one cycle at a time.
//!
//! `mos6502` executes whole instructions, so the wrapper steps an
//! instruction on its first cycle and then idles for the rest of the
//! instruction's cycle count.

use mos6502::cpu::CPU;
use mos6502::instruction::Nmos6502;
use mos6502::registers::{StackPointer, Status};

use super::memory::Memory;

pub const RESET_VECTOR: u16 = 0xFFFC;

// ─────────────────────────────────────────────────────────────────────────────
//  Approximate 6502 cycle counts per opcode
// ─────────────────────────────────────────────────────────────────────────────

static OPCODE_CYCLES: [u8; 256] = [
    //0  1  2  3  4  5  6  7  8  9  A  B  C  D  E  F
    7, 6, 2, 8, 3, 3, 5, 5, 3, 2, 2, 2, 4, 4, 6, 6, // 0x
    2, 5, 2, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // 1x
    6, 6, 2, 8, 3, 3, 5, 5, 4, 2, 2, 2, 4, 4, 6, 6, // 2x
    2, 5, 2, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // 3x
    6, 6, 2, 8, 3, 3, 5, 5, 3, 2, 2, 2, 3, 4, 6, 6, // 4x
    2, 5, 2, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // 5x
    6, 6, 2, 8, 3, 3, 5, 5, 4, 2, 2, 2, 5, 4, 6, 6, // 6x
    2, 5, 2, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // 7x
    2, 6, 2, 6, 3, 3, 3, 3, 2, 2, 2, 2, 4, 4, 4, 4, // 8x
    2, 6, 2, 6, 4, 4, 4, 4, 2, 5, 2, 5, 5, 5, 5, 5, // 9x
    2, 6, 2, 6, 3, 3, 3, 3, 2, 2, 2, 2, 4, 4, 4, 4, // Ax
    2, 5, 2, 5, 4, 4, 4, 4, 2, 4, 2, 4, 4, 4, 4, 4, // Bx
    2, 6, 2, 8, 3, 3, 5, 5, 2, 2, 2, 2, 4, 4, 6, 6, // Cx
    2, 5, 2, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // Dx
    2, 6, 2, 8, 3, 3, 5, 5, 2, 2, 2, 2, 4, 4, 6, 6, // Ex
    2, 5, 2, 8, 4, 4, 6, 6, 2, 4, 2, 7, 4, 4, 7, 7, // Fx
];

pub fn opcode_cycles(opcode: u8) -> u32 {
    OPCODE_CYCLES[opcode as usize] as u32
}

pub struct Cpu {
    inner: CPU<Memory, Nmos6502>,
    /// Cycles left in the current instruction.
    pending: u32,
    cycles: u64,
}

impl Cpu {
    pub fn new(memory: Memory) -> Self {
        let mut cpu = Self {
            inner: CPU::new(memory, Nmos6502),
            pending: 0,
            cycles: 0,
        };
        cpu.reset();
        cpu
    }

    pub fn memory(&self) -> &Memory {
        &self.inner.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.inner.memory
    }

    pub fn program_counter(&self) -> u16 {
        self.inner.registers.program_counter
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Load PC from the reset vector as seen through the current map.
    pub fn reset(&mut self) {
        let pc = self.inner.memory.peek_word(RESET_VECTOR);
        self.inner.registers.program_counter = pc;
        self.inner.registers.stack_pointer = StackPointer(0xFD);
        self.inner.registers.status.insert(Status::PS_DISABLE_INTERRUPTS);
        self.pending = 0;
        log::debug!("CPU reset, PC=${pc:04X}");
    }

    /// Advance one cycle.  Does nothing while a synchronized dispatch holds
    /// the CPU.
    pub fn tick(&mut self) {
        if self.inner.memory.cpu_held() {
            return;
        }
        self.cycles += 1;
        if self.pending > 0 {
            self.pending -= 1;
            return;
        }
        let pc = self.inner.registers.program_counter;
        // Execute event for the fetch; plain pages cost only a table lookup.
        let opcode = self.inner.memory.fetch_opcode(pc);
        self.inner.single_step();
        self.inner.memory.clear_fetch();
        self.pending = opcode_cycles(opcode).saturating_sub(1);
    }
}
