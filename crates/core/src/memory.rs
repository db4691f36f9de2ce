//! External memory collaborators: program memory (16-bit words) and data
//! memory (bytes).
//!
//! Both are flat arrays with combinational reads. Data-memory writes are
//! strobed during a cycle and committed by [`DataMemory::clock`] at the end
//! of it, like an edge-triggered SRAM. Addresses below the memory-mapped
//! threshold belong to the register file; the core never presents them, so
//! an access there is reported as a diagnostic.

use tracing::{event, Level};

use crate::{DATA_SIZE, IO_LIMIT, PROGRAM_WORDS};

/// Program memory, word addressed.
#[derive(Debug, Clone)]
pub struct ProgramMemory {
    words: Vec<u16>,
}

impl Default for ProgramMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramMemory {
    pub fn new() -> Self {
        ProgramMemory { words: vec![0u16; PROGRAM_WORDS] }
    }

    #[inline(always)]
    pub fn read(&self, addr: u16) -> u16 {
        self.words[addr as usize]
    }

    /// Clear and load `words` from address 0. Returns the number of words
    /// stored; anything past the end of program memory is dropped.
    pub fn load(&mut self, words: &[u16]) -> usize {
        self.words.iter_mut().for_each(|w| *w = 0);
        let n = words.len().min(PROGRAM_WORDS);
        self.words[..n].copy_from_slice(&words[..n]);
        n
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }
}

/// Data memory with a one-cycle write commit.
#[derive(Debug, Clone)]
pub struct DataMemory {
    bytes: Vec<u8>,
    pending: Option<(u16, u8)>,
    /// Address changes seen while a write was pending.
    pub glitches: u64,
}

impl Default for DataMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl DataMemory {
    pub fn new() -> Self {
        DataMemory { bytes: vec![0u8; DATA_SIZE], pending: None, glitches: 0 }
    }

    fn check_address(addr: u16) {
        if (addr as usize) < IO_LIMIT {
            event!(Level::WARN, "data memory accessed at 0x{:04X}, inside the register file", addr);
        }
    }

    /// Read strobe.
    pub fn read(&self, addr: u16) -> u8 {
        Self::check_address(addr);
        self.bytes[addr as usize]
    }

    /// Write strobe. The value lands at the next [`clock`](Self::clock).
    ///
    /// The glitch count only moves for callers that strobe twice before a
    /// clock. [`Avr::tick`](crate::Avr::tick) strobes and clocks within one
    /// tick, so the core alone never raises it.
    pub fn write(&mut self, addr: u16, value: u8) {
        Self::check_address(addr);
        if let Some((pending, _)) = self.pending {
            if pending != addr {
                self.glitches += 1;
                event!(
                    Level::WARN,
                    "data address changed from 0x{:04X} to 0x{:04X} while a write was pending",
                    pending,
                    addr
                );
            }
        }
        self.pending = Some((addr, value));
    }

    /// Commit a pending write.
    pub fn clock(&mut self) {
        if let Some((addr, value)) = self.pending.take() {
            self.bytes[addr as usize] = value;
        }
    }

    /// Read without bus side effects.
    #[inline(always)]
    pub fn peek(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }

    /// Store without bus timing (test setup, save-state restore).
    #[inline(always)]
    pub fn poke(&mut self, addr: u16, value: u8) {
        self.bytes[addr as usize] = value;
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn load_bytes(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(DATA_SIZE);
        self.bytes[..n].copy_from_slice(&bytes[..n]);
        self.pending = None;
    }
}
