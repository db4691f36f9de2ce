//! # avr-core
//!
//! Cycle-accurate model of an AVR-compatible 8-bit multi-cycle core.
//!
//! Every instruction takes its exact clock count, and each tick reports what
//! the external program and data buses carry. The core is single-issue and
//! non-pipelined apart from the one-word fetch skew: the word that will
//! execute next is latched on the edge that ends the current instruction.
//!
//! ## Architecture
//!
//! - [`Avr`] — Top-level core that wires the five units to the memories and pins
//! - [`alu`] — ALU and status register (flags, masked latch, sticky zero)
//! - [`regfile`] — 96-slot register file with the X/Y/Z/SP word port
//! - [`data_addr`] — Data address unit (base + offset, pre/post select)
//! - [`prog_addr`] — Program counter and next-address adder
//! - [`control`] — Instruction/second-word registers, cycle counter and decoder
//! - [`opcodes`] — Opcode pattern table and field extraction
//! - [`memory`] — Program and data memory collaborators
//! - [`trace`] — Per-cycle bus records and a history ring
//! - [`disasm`] — Instruction disassembler for traces and step mode
//! - [`hex`] — Intel HEX loader
//! - [`savestate`] — Save states
//!
//! ## Clocking
//!
//! [`Avr::tick`] evaluates one clock period. The decoder depends on a few
//! combinational datapath values (the pre-latch zero flag for CPSE, the
//! tested register for SBRC/SBRS, the data address for memory-mapped
//! redirection), so decode and datapath are iterated until those values stop
//! changing. Only then is anything latched, all units on the same edge.

pub mod alu;
pub mod control;
pub mod data_addr;
pub mod disasm;
pub mod error;
pub mod hex;
pub mod memory;
pub mod opcodes;
pub mod prog_addr;
pub mod regfile;
pub mod savestate;
pub mod trace;

#[cfg(test)]
pub(crate) mod asm;

pub use alu::Alu;
pub use control::ControlUnit;
pub use error::{CoreError, HexError, StateError};
pub use memory::{DataMemory, ProgramMemory};
pub use prog_addr::ProgramAddressUnit;
pub use regfile::RegisterFile;
pub use savestate::SaveState;
pub use trace::{BusCycle, TraceBuffer};

use tracing::{event, Level};

use alu::AluOutput;
use control::{ControlSignals, DataAccess, DriveSource, Feedback, OperandA, OperandB, PcControl, RegSource, Target};
use data_addr::DataAddress;
use prog_addr::PcLoad;

/// Register file slots: 32 general registers + 64 I/O slots
pub const REG_FILE_SIZE: usize = 96;
/// Data addresses below this are serviced by the register file
pub const IO_LIMIT: usize = REG_FILE_SIZE;
/// IN/OUT address 0 maps to this slot
pub const IO_BASE: u8 = 32;

pub const X_INDEX: usize = 26;
pub const Y_INDEX: usize = 28;
pub const Z_INDEX: usize = 30;
/// Stack pointer low byte; the high byte follows it
pub const SPL_INDEX: usize = 93;
/// Status register slot (held by the ALU)
pub const SREG_INDEX: usize = 95;

/// Program memory size in 16-bit words
pub const PROGRAM_WORDS: usize = 0x1_0000;
/// Data memory size in bytes
pub const DATA_SIZE: usize = 0x1_0000;
/// Stack pointer value forced by reset
pub const RESET_SP: u16 = 0xFFFF;

/// Decode/datapath passes allowed per tick before giving up.
pub const MAX_SETTLE_PASSES: usize = 4;

// SREG bit positions
pub const SREG_C: u8 = 0;
pub const SREG_Z: u8 = 1;
pub const SREG_N: u8 = 2;
pub const SREG_V: u8 = 3;
pub const SREG_S: u8 = 4;
pub const SREG_H: u8 = 5;
pub const SREG_T: u8 = 6;
pub const SREG_I: u8 = 7;

/// External control pins, active low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Pins {
    pub reset_n: bool,
    /// Interrupt request lines. Sampled by nothing in this core; they are
    /// carried for the surrounding system.
    pub int0_n: bool,
    pub int1_n: bool,
}

impl Default for Pins {
    fn default() -> Self {
        Pins { reset_n: true, int0_n: true, int1_n: true }
    }
}

/// Combinational datapath values for one settle pass.
#[derive(Debug, Clone, Copy)]
struct Datapath {
    /// Register read on port A, before operand selection.
    reg_a: u8,
    addr: DataAddress,
    /// Resolved data bus: the driven value on writes, the sampled value on
    /// reads, `None` when idle.
    bus: Option<u8>,
    alu: AluOutput,
}

impl Datapath {
    fn feedback(&self) -> Feedback {
        Feedback {
            alu_zero: self.alu.zero,
            operand_a: self.reg_a,
            data_addr: self.addr.address,
            internal: self.addr.internal,
        }
    }
}

/// The core plus its memories and pins.
pub struct Avr {
    pub control: ControlUnit,
    pub alu: Alu,
    pub regs: RegisterFile,
    pub pau: ProgramAddressUnit,
    pub program: ProgramMemory,
    pub data: DataMemory,
    pub pins: Pins,
    /// Ticks since construction, reset ticks included.
    pub tick: u64,
}

impl Default for Avr {
    fn default() -> Self {
        Self::new()
    }
}

impl Avr {
    /// Power-on state: everything zero, reset released. Call [`reset`](Self::reset)
    /// before running so SP and the instruction register are defined.
    pub fn new() -> Self {
        Avr {
            control: ControlUnit::new(),
            alu: Alu::new(),
            regs: RegisterFile::new(),
            pau: ProgramAddressUnit::new(),
            program: ProgramMemory::new(),
            data: DataMemory::new(),
            pins: Pins::default(),
            tick: 0,
        }
    }

    /// Drive the reset pin (`true` = asserted).
    pub fn set_reset(&mut self, asserted: bool) {
        if self.pins.reset_n == asserted {
            event!(Level::DEBUG, "reset {} at tick {}", if asserted { "asserted" } else { "released" }, self.tick);
        }
        self.pins.reset_n = !asserted;
    }

    /// Hold reset for one tick and release it.
    pub fn reset(&mut self) -> BusCycle {
        self.set_reset(true);
        let cycle = self.clock_reset();
        self.set_reset(false);
        cycle
    }

    /// Load program words from address 0. Returns the number stored.
    pub fn load_program(&mut self, words: &[u16]) -> usize {
        let n = self.program.load(words);
        event!(Level::DEBUG, "loaded {} program words", n);
        n
    }

    /// Load an Intel HEX image. Returns the number of program words stored.
    pub fn load_hex(&mut self, text: &str) -> Result<usize, HexError> {
        let image = hex::parse_hex(text)?;
        Ok(self.load_program(&hex::to_words(&image)))
    }

    #[inline(always)]
    pub fn pc(&self) -> u16 {
        self.pau.pc
    }

    #[inline(always)]
    pub fn sp(&self) -> u16 {
        self.regs.sp()
    }

    #[inline(always)]
    pub fn status(&self) -> u8 {
        self.alu.status
    }

    /// Register file slot, with slot 95 reading the status register.
    #[inline(always)]
    pub fn reg(&self, index: usize) -> u8 {
        self.regs.read(index, self.alu.status)
    }

    /// Run one clock period.
    ///
    /// On `Err` nothing was latched: the core is left exactly as it was and
    /// ticking again reports the same error.
    pub fn tick(&mut self) -> Result<BusCycle, CoreError> {
        if !self.pins.reset_n {
            return Ok(self.clock_reset());
        }

        let (sig, dp) = match self.settle() {
            Ok(v) => v,
            Err(e) => {
                event!(Level::WARN, "{}", e);
                return Err(e);
            }
        };

        let pc = self.pau.pc;
        let prog_data = self.program.read(pc);
        let external = !sig.internal;
        let data_rd = external && sig.data == DataAccess::Read;
        let data_wr = external && matches!(sig.data, DataAccess::Write(_));

        let cycle = BusCycle {
            tick: self.tick,
            prog_addr: pc,
            prog_data,
            instr_addr: self.control.ir_addr,
            step: self.control.cycle,
            last: self.control.is_last(&sig),
            reset: false,
            data_addr: dp.addr.address,
            data_rd,
            data_wr,
            data_value: if data_rd || data_wr { dp.bus } else { None },
        };

        // Everything below is computed from pre-edge state.
        let bus = dp.bus.unwrap_or(0);
        let pc_load = match sig.pc {
            PcControl::Relative(k) => PcLoad::Next(self.pau.next(true, k as u16)),
            PcControl::Absolute(Target::SecondWord) => PcLoad::Next(self.pau.next(false, self.control.second)),
            PcControl::Absolute(Target::Z) => PcLoad::Next(self.pau.next(false, self.regs.z())),
            PcControl::LoadLow => PcLoad::LowByte(bus),
            PcControl::LoadHigh => PcLoad::HighByte(bus),
        };
        let reg_write = sig.reg_write.map(|w| {
            let value = match w.source {
                RegSource::Alu => dp.alu.result,
                RegSource::DataBus => bus,
            };
            (w.index, value)
        });
        let word_write = sig.word_write.map(|sel| (sel, dp.addr.sum));
        if data_wr {
            self.data.write(dp.addr.address, bus);
        }

        // Clock edge
        self.regs.clock(reg_write, word_write);
        self.alu.clock(&dp.alu, sig.flag_mask);
        self.pau.clock(pc_load, false);
        self.control.clock(&sig, pc, prog_data, false);
        self.data.clock();
        self.tick += 1;

        event!(Level::TRACE, "{}", cycle);
        Ok(cycle)
    }

    /// Tick through the rest of the current instruction. Returns the number
    /// of ticks taken (1 while reset is held).
    pub fn step(&mut self) -> Result<u8, CoreError> {
        let mut ticks = 0;
        loop {
            let cycle = self.tick()?;
            ticks += 1;
            if cycle.last || cycle.reset {
                return Ok(ticks);
            }
        }
    }

    /// Run `ticks` clock periods and return their bus cycles.
    pub fn run(&mut self, ticks: u64) -> Result<Vec<BusCycle>, CoreError> {
        (0..ticks).map(|_| self.tick()).collect()
    }

    /// Reset edge: PC to 0, SP to all ones, NOP into the instruction
    /// register. Nothing else latches.
    fn clock_reset(&mut self) -> BusCycle {
        let pc = self.pau.pc;
        let prog_data = self.program.read(pc);
        let cycle = BusCycle {
            tick: self.tick,
            prog_addr: pc,
            prog_data,
            instr_addr: self.control.ir_addr,
            step: self.control.cycle,
            last: true,
            reset: true,
            ..Default::default()
        };
        let idle = ControlSignals::default();
        self.regs.reset();
        self.pau.clock(PcLoad::Next(0), true);
        self.control.clock(&idle, pc, prog_data, true);
        self.tick += 1;
        event!(Level::TRACE, "{}", cycle);
        cycle
    }

    /// Iterate decode and datapath until the fed-back values are stable.
    fn settle(&self) -> Result<(ControlSignals, Datapath), CoreError> {
        let mut fb = Feedback::default();
        for _ in 0..MAX_SETTLE_PASSES {
            let sig = self.control.decode(self.alu.status, &fb)?;
            let dp = self.datapath(&sig);
            let next = dp.feedback();
            if next == fb {
                return Ok((sig, dp));
            }
            fb = next;
        }
        Err(CoreError::Unsettled(MAX_SETTLE_PASSES))
    }

    /// Combinational evaluation of every unit for the given control lines.
    fn datapath(&self, sig: &ControlSignals) -> Datapath {
        let status = self.alu.status;
        let reg_a = self.regs.read(sig.reg_a, status);
        let reg_b = self.regs.read(sig.reg_b, status);
        let addr = data_addr::compute(sig.addr.base.map(|sel| self.regs.word(sel)), sig.addr.offset, sig.addr.pre);

        let [pc_lo, pc_hi] = self.pau.pc.to_le_bytes();
        let driven = match sig.data {
            DataAccess::Write(src) => {
                let value = match src {
                    DriveSource::RegB => reg_b,
                    DriveSource::PcHigh => pc_hi,
                    DriveSource::PcLow => pc_lo,
                };
                data_addr::drive(true, value)
            }
            _ => data_addr::drive(false, 0),
        };
        let sampled = match sig.data {
            DataAccess::Read if addr.internal => Some(self.regs.read(addr.address as usize, status)),
            DataAccess::Read => Some(self.data.read(addr.address)),
            _ => None,
        };
        let bus = driven.or(sampled);

        let a = match sig.operand_a {
            OperandA::Register => reg_a,
            OperandA::Zero => 0,
        };
        let b = match sig.operand_b {
            OperandB::Register => reg_b,
            OperandB::Immediate(k) => k,
            OperandB::DataBus => bus.unwrap_or(0),
        };
        let alu = self.alu.evaluate(sig.alu_op, a, b, sig.propagate_zero);

        Datapath { reg_a, addr, bus, alu }
    }

    /// Disassembly of the instruction in the instruction register.
    pub fn disasm_current(&self) -> String {
        disasm::disassemble_at(self.program.words(), self.control.ir_addr)
    }

    /// Dump registers as a formatted string (debug).
    pub fn dump_regs(&self) -> String {
        let mut s = String::new();
        for i in 0..32 {
            if i % 8 == 0 && i > 0 { s.push('\n'); }
            s.push_str(&format!("R{:2}={:02X} ", i, self.reg(i)));
        }
        s.push_str(&format!("\nPC={:04X} SP={:04X} SREG={} (0x{:02X})",
            self.pau.pc, self.sp(),
            disasm::format_sreg(self.alu.status), self.alu.status));
        s.push_str(&format!("\nX={:04X} Y={:04X} Z={:04X}  IR={:04X} @{:04X} cycle {}",
            self.regs.word(regfile::WordSelect::X),
            self.regs.word(regfile::WordSelect::Y),
            self.regs.z(),
            self.control.ir, self.control.ir_addr, self.control.cycle));
        s
    }
}
