//! Program address unit: the program counter and its next-address adder.

use serde::{Deserialize, Serialize};

/// What the counter loads at the clock edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcLoad {
    /// The adder output.
    Next(u16),
    /// Replace the low byte from the data bus.
    LowByte(u8),
    /// Replace the high byte from the data bus.
    HighByte(u8),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramAddressUnit {
    pub pc: u16,
}

impl ProgramAddressUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(pc & mask) + offset`, where the mask is all ones in relative mode
    /// and all zeros in absolute mode.
    #[inline(always)]
    pub fn next(&self, relative: bool, offset: u16) -> u16 {
        let mask = if relative { 0xFFFF } else { 0x0000 };
        (self.pc & mask).wrapping_add(offset)
    }

    pub fn clock(&mut self, load: PcLoad, reset: bool) {
        if reset {
            self.pc = 0;
            return;
        }
        self.pc = match load {
            PcLoad::Next(addr) => addr,
            PcLoad::LowByte(b) => (self.pc & 0xFF00) | b as u16,
            PcLoad::HighByte(b) => (self.pc & 0x00FF) | ((b as u16) << 8),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_and_absolute() {
        let pau = ProgramAddressUnit { pc: 0x0100 };
        assert_eq!(pau.next(true, 1), 0x0101);
        assert_eq!(pau.next(true, (-3i16) as u16), 0x00FD);
        assert_eq!(pau.next(false, 0x0456), 0x0456);
    }

    #[test]
    fn test_byte_loads() {
        let mut pau = ProgramAddressUnit { pc: 0x1234 };
        pau.clock(PcLoad::LowByte(0xCD), false);
        assert_eq!(pau.pc, 0x12CD);
        pau.clock(PcLoad::HighByte(0xAB), false);
        assert_eq!(pau.pc, 0xABCD);
    }

    #[test]
    fn test_reset_zeroes() {
        let mut pau = ProgramAddressUnit { pc: 0x1234 };
        pau.clock(PcLoad::Next(0x4000), true);
        assert_eq!(pau.pc, 0);
    }
}
