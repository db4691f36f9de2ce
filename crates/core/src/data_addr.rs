//! Data address unit.
//!
//! One 16-bit adder: `base + offset`. The bus sees either the base
//! (post-modify and plain modes) or the sum (pre-modify, displacement and
//! direct modes); the sum is also what gets written back to the pointer
//! pair for auto-increment/decrement. Addresses below the memory-mapped
//! threshold are flagged internal and never reach data memory.

use crate::IO_LIMIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataAddress {
    /// Address presented on the data address bus.
    pub address: u16,
    /// `base + offset`, for pointer write-back.
    pub sum: u16,
    /// Address falls in the register file.
    pub internal: bool,
}

/// `base` is `None` when no pair is selected (direct addressing).
#[inline(always)]
pub fn compute(base: Option<u16>, offset: i16, pre: bool) -> DataAddress {
    let base = base.unwrap_or(0);
    let sum = base.wrapping_add(offset as u16);
    let address = if pre { sum } else { base };
    DataAddress { address, sum, internal: (address as usize) < IO_LIMIT }
}

/// Value driven onto the data bus: only while writing, high impedance
/// otherwise.
#[inline(always)]
pub fn drive(write: bool, value: u8) -> Option<u8> {
    if write { Some(value) } else { None }
}
