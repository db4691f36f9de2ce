//! Per-cycle bus record and a ring buffer of recent cycles.
//!
//! A [`BusCycle`] is what a logic analyzer on the core's pins would see for
//! one clock period, plus the control unit's view of which instruction and
//! cycle index produced it. [`TraceBuffer`] keeps the last N of them for
//! post-mortem printing.

use std::collections::VecDeque;
use std::fmt;

/// One clock period on the external buses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusCycle {
    /// Tick number, counted from construction.
    pub tick: u64,
    /// Program address bus (the PC).
    pub prog_addr: u16,
    /// Program data bus.
    pub prog_data: u16,
    /// Address the executing instruction was fetched from.
    pub instr_addr: u16,
    /// Cycle index within the instruction, from 1.
    pub step: u8,
    /// Final cycle of the instruction.
    pub last: bool,
    /// Reset was asserted during this cycle.
    pub reset: bool,
    pub data_addr: u16,
    /// External read strobe asserted.
    pub data_rd: bool,
    /// External write strobe asserted.
    pub data_wr: bool,
    /// Driven value on writes, sampled value on reads.
    pub data_value: Option<u8>,
}

impl BusCycle {
    /// Active-low read strobe pin level.
    pub fn data_rd_n(&self) -> bool {
        !self.data_rd
    }

    /// Active-low write strobe pin level.
    pub fn data_wr_n(&self) -> bool {
        !self.data_wr
    }

    pub fn reset_n(&self) -> bool {
        !self.reset
    }
}

impl fmt::Display for BusCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>8}  PA={:04X} PD={:04X}  [{:04X}.{}]{}",
            self.tick,
            self.prog_addr,
            self.prog_data,
            self.instr_addr,
            self.step,
            if self.last { "*" } else { " " },
        )?;
        if self.reset {
            return write!(f, "  RESET");
        }
        match (self.data_rd, self.data_wr, self.data_value) {
            (true, _, Some(v)) => write!(f, "  RD {:04X} -> {:02X}", self.data_addr, v),
            (_, true, Some(v)) => write!(f, "  WR {:04X} <- {:02X}", self.data_addr, v),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

/// One external data-memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusAccess {
    /// Address of the instruction that made the access.
    pub instr_addr: u16,
    pub kind: AccessKind,
    pub addr: u16,
    pub value: u8,
}

/// Reduce a cycle trace to its external data accesses, each tagged with the
/// instruction that caused it rather than the word being fetched at the time.
pub fn data_accesses<'a, I>(cycles: I) -> Vec<BusAccess>
where
    I: IntoIterator<Item = &'a BusCycle>,
{
    cycles
        .into_iter()
        .filter_map(|c| {
            let kind = match (c.data_rd, c.data_wr) {
                (true, false) => AccessKind::Read,
                (false, true) => AccessKind::Write,
                _ => return None,
            };
            Some(BusAccess {
                instr_addr: c.instr_addr,
                kind,
                addr: c.data_addr,
                value: c.data_value.unwrap_or(0),
            })
        })
        .collect()
}

/// Fixed-capacity history of the most recent bus cycles.
pub struct TraceBuffer {
    buf: VecDeque<BusCycle>,
    capacity: usize,
}

impl TraceBuffer {
    pub fn new(capacity: usize) -> Self {
        TraceBuffer { buf: VecDeque::with_capacity(capacity), capacity }
    }

    /// Append a cycle, dropping the oldest when full.
    pub fn push(&mut self, cycle: BusCycle) {
        if self.capacity == 0 {
            return;
        }
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(cycle);
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &BusCycle> {
        self.buf.iter()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
