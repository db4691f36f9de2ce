//! Register file: R0–R31, the 64 memory-mapped I/O slots and the stack
//! pointer, in one flat array of 96 bytes.
//!
//! | Slot    | Content                                  |
//! |---------|------------------------------------------|
//! | 0–31    | General registers (X = 26:27, Y = 28:29, Z = 30:31) |
//! | 32–92   | I/O registers                            |
//! | 93–94   | SPL, SPH                                 |
//! | 95      | Status register (held by the ALU)        |
//!
//! Besides the single-register write port there is a word port for the X,
//! Y, Z and SP pairs so a pointer update and a register write can happen in
//! the same cycle.

use serde::{Deserialize, Serialize};

use crate::{REG_FILE_SIZE, RESET_SP, SPL_INDEX, SREG_INDEX, X_INDEX, Y_INDEX, Z_INDEX};

/// Register pair reachable through the word port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordSelect {
    X,
    Y,
    Z,
    Sp,
}

impl WordSelect {
    /// Slot of the low byte.
    #[inline(always)]
    pub fn base(self) -> usize {
        match self {
            WordSelect::X => X_INDEX,
            WordSelect::Y => Y_INDEX,
            WordSelect::Z => Z_INDEX,
            WordSelect::Sp => SPL_INDEX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFile {
    slots: Vec<u8>,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    pub fn new() -> Self {
        RegisterFile { slots: vec![0u8; REG_FILE_SIZE] }
    }

    /// Read port. Slot 95 reads the status register supplied by the ALU;
    /// out-of-range indices read zero.
    #[inline(always)]
    pub fn read(&self, index: usize, status: u8) -> u8 {
        match index {
            SREG_INDEX => status,
            i if i < REG_FILE_SIZE => self.slots[i],
            _ => 0,
        }
    }

    /// Single-register write port. Out-of-range writes are dropped, as are
    /// writes to the status slot, which the ALU services instead.
    #[inline(always)]
    pub fn write(&mut self, index: usize, value: u8) {
        if index < REG_FILE_SIZE && index != SREG_INDEX {
            self.slots[index] = value;
        }
    }

    #[inline(always)]
    pub fn word(&self, sel: WordSelect) -> u16 {
        let base = sel.base();
        u16::from_le_bytes([self.slots[base], self.slots[base + 1]])
    }

    #[inline(always)]
    pub fn set_word(&mut self, sel: WordSelect, value: u16) {
        let base = sel.base();
        let [lo, hi] = value.to_le_bytes();
        self.slots[base] = lo;
        self.slots[base + 1] = hi;
    }

    /// Direct Z output for IJMP/ICALL.
    #[inline(always)]
    pub fn z(&self) -> u16 {
        self.word(WordSelect::Z)
    }

    #[inline(always)]
    pub fn sp(&self) -> u16 {
        self.word(WordSelect::Sp)
    }

    /// Reset only touches SP.
    pub fn reset(&mut self) {
        self.set_word(WordSelect::Sp, RESET_SP);
    }

    /// Clock edge. The word write is applied last so it wins over a
    /// single-register write to either byte of the same pair.
    pub fn clock(&mut self, write: Option<(usize, u8)>, word: Option<(WordSelect, u16)>) {
        if let Some((index, value)) = write {
            self.write(index, value);
        }
        if let Some((sel, value)) = word {
            self.set_word(sel, value);
        }
    }

    /// Raw view of all 96 slots (slot 95 is not maintained here).
    pub fn slots(&self) -> &[u8] {
        &self.slots
    }

    pub(crate) fn load_slots(&mut self, slots: &[u8]) {
        let n = slots.len().min(REG_FILE_SIZE);
        self.slots[..n].copy_from_slice(&slots[..n]);
    }
}
