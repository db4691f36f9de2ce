//! Control unit: instruction register, second-word register, cycle counter
//! and the decoder that drives every other unit.
//!
//! [`ControlUnit::decode`] is a pure function of the latched state, the
//! status register and the combinational [`Feedback`] from the datapath
//! (pre-latch zero flag, operand A, data address). It starts from safe
//! defaults (one cycle, PC + 1, no writes, no memory access, ALU idle) and
//! applies the overrides of the single instruction the IR holds, for the
//! current cycle index.

use serde::{Deserialize, Serialize};

use crate::alu::{AluOp, ShiftFill, LOGIC_AND, LOGIC_NOT_A, LOGIC_OR, LOGIC_XOR};
use crate::error::CoreError;
use crate::opcodes::{self, AddrMode, Instruction, Pointer};
use crate::regfile::WordSelect;
use crate::{IO_BASE, SREG_C, SREG_H, SREG_I, SREG_INDEX, SREG_N, SREG_S, SREG_T, SREG_V, SREG_Z};

/// H, S, V, N, Z, C
pub const MASK_ARITH: u8 = (1 << SREG_H) | MASK_SHIFT;
/// S, V, N, Z
pub const MASK_LOGIC: u8 = (1 << SREG_S) | (1 << SREG_V) | (1 << SREG_N) | (1 << SREG_Z);
/// S, V, N, Z, C
pub const MASK_SHIFT: u8 = MASK_LOGIC | (1 << SREG_C);

/// Operand A source. B-less unary ops still read A from `reg_a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandA {
    Register,
    /// Constant zero, for NEG (0 - Rd).
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandB {
    Register,
    Immediate(u8),
    /// The resolved data bus value.
    DataBus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegSource {
    Alu,
    DataBus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegWrite {
    pub index: usize,
    pub source: RegSource,
}

/// What the core drives onto the data bus during a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveSource {
    RegB,
    PcHigh,
    PcLow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataAccess {
    None,
    Read,
    Write(DriveSource),
}

/// Absolute jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    SecondWord,
    Z,
}

/// Next program counter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcControl {
    /// PC + k. `Relative(0)` holds the counter.
    Relative(i16),
    Absolute(Target),
    /// Low byte from the data bus.
    LoadLow,
    /// High byte from the data bus.
    LoadHigh,
}

/// Data address unit inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrControl {
    pub base: Option<WordSelect>,
    pub offset: i16,
    pub pre: bool,
}

/// Every control line for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSignals {
    /// Cycle count of the executing instruction.
    pub cycles: u8,
    /// Latch the program data bus into the second-word register.
    pub latch_second: bool,
    pub reg_a: usize,
    pub operand_a: OperandA,
    pub reg_b: usize,
    pub operand_b: OperandB,
    pub alu_op: AluOp,
    pub flag_mask: u8,
    pub propagate_zero: bool,
    pub reg_write: Option<RegWrite>,
    /// Write the data address unit's sum back to this pair.
    pub word_write: Option<WordSelect>,
    pub addr: AddrControl,
    pub data: DataAccess,
    /// The access targets the register file; no external strobe.
    pub internal: bool,
    pub pc: PcControl,
}

impl Default for ControlSignals {
    fn default() -> Self {
        ControlSignals {
            cycles: 1,
            latch_second: false,
            reg_a: 0,
            operand_a: OperandA::Register,
            reg_b: 0,
            operand_b: OperandB::Register,
            alu_op: AluOp::Nop,
            flag_mask: 0,
            propagate_zero: false,
            reg_write: None,
            word_write: None,
            addr: AddrControl { base: None, offset: 0, pre: false },
            data: DataAccess::None,
            internal: false,
            pc: PcControl::Relative(1),
        }
    }
}

/// Combinational values fed back from the datapath into the decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Feedback {
    pub alu_zero: bool,
    pub operand_a: u8,
    pub data_addr: u16,
    pub internal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlUnit {
    /// Instruction register.
    pub ir: u16,
    /// Second-word register.
    pub second: u16,
    /// Cycle index within the current instruction, from 1.
    pub cycle: u8,
    /// Program address the IR was fetched from.
    pub ir_addr: u16,
}

impl Default for ControlUnit {
    fn default() -> Self {
        Self::new()
    }
}

fn pair(ptr: Pointer) -> WordSelect {
    match ptr {
        Pointer::X => WordSelect::X,
        Pointer::Y => WordSelect::Y,
        Pointer::Z => WordSelect::Z,
    }
}

impl ControlSignals {
    fn alu_reg(&mut self, d: u8, r: u8, op: AluOp, mask: u8, write: bool) {
        self.reg_b = r as usize;
        self.operand_b = OperandB::Register;
        self.alu(d, op, mask, write);
    }

    fn alu_imm(&mut self, d: u8, k: u8, op: AluOp, mask: u8, write: bool) {
        self.operand_b = OperandB::Immediate(k);
        self.alu(d, op, mask, write);
    }

    fn alu(&mut self, d: u8, op: AluOp, mask: u8, write: bool) {
        self.reg_a = d as usize;
        self.alu_op = op;
        self.flag_mask = mask;
        if write {
            self.reg_write = Some(RegWrite { index: d as usize, source: RegSource::Alu });
        }
    }

    /// Address setup for LD/ST/LDD/STD. Returns the pair to write back for
    /// the auto-modify modes.
    fn indirect(&mut self, ptr: Pointer, mode: AddrMode) -> Option<WordSelect> {
        let sel = pair(ptr);
        let (offset, pre, writeback) = match mode {
            AddrMode::Plain => (0, false, false),
            AddrMode::PostInc => (1, false, true),
            AddrMode::PreDec => (-1, true, true),
            AddrMode::Disp(q) => (q as i16, true, false),
        };
        self.addr = AddrControl { base: Some(sel), offset, pre };
        writeback.then_some(sel)
    }

    /// Direct addressing through the second-word register.
    fn direct(&mut self, second: u16) {
        self.addr = AddrControl { base: None, offset: second as i16, pre: true };
    }

    /// Stack write at SP, then SP - 1.
    fn push(&mut self, src: DriveSource) {
        self.addr = AddrControl { base: Some(WordSelect::Sp), offset: -1, pre: false };
        self.data = DataAccess::Write(src);
        self.word_write = Some(WordSelect::Sp);
    }

    /// Stack read at SP + 1, SP incremented.
    fn pop(&mut self) {
        self.addr = AddrControl { base: Some(WordSelect::Sp), offset: 1, pre: true };
        self.data = DataAccess::Read;
        self.word_write = Some(WordSelect::Sp);
    }
}

impl ControlUnit {
    pub fn new() -> Self {
        ControlUnit { ir: 0, second: 0, cycle: 1, ir_addr: 0xFFFF }
    }

    pub fn is_last(&self, sig: &ControlSignals) -> bool {
        self.cycle >= sig.cycles
    }

    /// Skip sequence shared by CPSE/SBRC/SBRS.
    fn skip(&self, sig: &mut ControlSignals, taken: bool) {
        if self.cycle == 1 {
            sig.latch_second = true;
            sig.cycles = if taken { 2 } else { 1 };
        } else {
            sig.cycles = if opcodes::is_two_word(self.second) { 3 } else { 2 };
        }
    }

    /// ADIW/SBIW: low byte with K, then high byte with carry and sticky zero.
    fn word_arith(&self, sig: &mut ControlSignals, d: u8, k: u8, sub: bool) {
        sig.cycles = 2;
        let op = |carry| if sub { AluOp::Sub { carry } } else { AluOp::Add { carry } };
        if self.cycle == 1 {
            sig.alu_imm(d, k, op(false), (1 << SREG_Z) | (1 << SREG_C), true);
            sig.pc = PcControl::Relative(0);
        } else {
            sig.alu_imm(d + 1, 0, op(true), MASK_SHIFT, true);
            sig.propagate_zero = true;
        }
    }

    fn branch(sig: &mut ControlSignals, cycle: u8, taken: bool, k: i8) {
        if taken {
            sig.cycles = 2;
            if cycle == 1 {
                sig.pc = PcControl::Relative(k as i16);
            }
        }
    }

    /// Drive the control lines for the current cycle.
    pub fn decode(&self, status: u8, fb: &Feedback) -> Result<ControlSignals, CoreError> {
        let mut sig = ControlSignals::default();
        let c = self.cycle;
        let flag = |s: u8| (status >> s) & 1 != 0;

        match opcodes::decode(self.ir) {
            Instruction::Nop => {}

            Instruction::Add { d, r } => sig.alu_reg(d, r, AluOp::Add { carry: false }, MASK_ARITH, true),
            Instruction::Adc { d, r } => sig.alu_reg(d, r, AluOp::Add { carry: true }, MASK_ARITH, true),
            Instruction::Sub { d, r } => sig.alu_reg(d, r, AluOp::Sub { carry: false }, MASK_ARITH, true),
            Instruction::Subi { d, k } => sig.alu_imm(d, k, AluOp::Sub { carry: false }, MASK_ARITH, true),
            Instruction::Sbc { d, r } => {
                sig.alu_reg(d, r, AluOp::Sub { carry: true }, MASK_ARITH, true);
                sig.propagate_zero = true;
            }
            Instruction::Sbci { d, k } => {
                sig.alu_imm(d, k, AluOp::Sub { carry: true }, MASK_ARITH, true);
                sig.propagate_zero = true;
            }
            Instruction::Cp { d, r } => sig.alu_reg(d, r, AluOp::Sub { carry: false }, MASK_ARITH, false),
            Instruction::Cpc { d, r } => {
                sig.alu_reg(d, r, AluOp::Sub { carry: true }, MASK_ARITH, false);
                sig.propagate_zero = true;
            }
            Instruction::Cpi { d, k } => sig.alu_imm(d, k, AluOp::Sub { carry: false }, MASK_ARITH, false),
            Instruction::And { d, r } => sig.alu_reg(d, r, AluOp::Logic(LOGIC_AND), MASK_LOGIC, true),
            Instruction::Andi { d, k } => sig.alu_imm(d, k, AluOp::Logic(LOGIC_AND), MASK_LOGIC, true),
            Instruction::Or { d, r } => sig.alu_reg(d, r, AluOp::Logic(LOGIC_OR), MASK_LOGIC, true),
            Instruction::Ori { d, k } => sig.alu_imm(d, k, AluOp::Logic(LOGIC_OR), MASK_LOGIC, true),
            Instruction::Eor { d, r } => sig.alu_reg(d, r, AluOp::Logic(LOGIC_XOR), MASK_LOGIC, true),
            Instruction::Com { d } => sig.alu(d, AluOp::Logic(LOGIC_NOT_A), MASK_SHIFT, true),
            Instruction::Neg { d } => {
                sig.alu_reg(d, d, AluOp::Sub { carry: false }, MASK_ARITH, true);
                sig.operand_a = OperandA::Zero;
            }
            Instruction::Inc { d } => sig.alu_imm(d, 1, AluOp::Add { carry: false }, MASK_LOGIC, true),
            Instruction::Dec { d } => sig.alu_imm(d, 1, AluOp::Sub { carry: false }, MASK_LOGIC, true),
            Instruction::Lsr { d } => sig.alu(d, AluOp::Shift(ShiftFill::Zero), MASK_SHIFT, true),
            Instruction::Asr { d } => sig.alu(d, AluOp::Shift(ShiftFill::Sign), MASK_SHIFT, true),
            Instruction::Ror { d } => sig.alu(d, AluOp::Shift(ShiftFill::Carry), MASK_SHIFT, true),
            Instruction::Swap { d } => sig.alu(d, AluOp::Swap, 0, true),
            Instruction::Bst { d, b } => sig.alu(d, AluOp::Bst(b), 1 << SREG_T, false),
            Instruction::Bld { d, b } => sig.alu(d, AluOp::Bld(b), 0, true),
            Instruction::Bset { s } => sig.alu(0, AluOp::SetFlags, 1 << s, false),
            Instruction::Bclr { s } => sig.alu(0, AluOp::ClearFlags, 1 << s, false),

            Instruction::Mov { d, r } => sig.alu_reg(d, r, AluOp::PassB, 0, true),
            Instruction::Ldi { d, k } => sig.alu_imm(d, k, AluOp::PassB, 0, true),
            Instruction::In { d, a } => {
                sig.alu_reg(d, a + IO_BASE, AluOp::PassB, 0, true);
            }
            Instruction::Out { a, r } => {
                sig.alu_reg(a + IO_BASE, r, AluOp::PassB, 0, true);
            }

            Instruction::Adiw { d, k } => self.word_arith(&mut sig, d, k, false),
            Instruction::Sbiw { d, k } => self.word_arith(&mut sig, d, k, true),

            Instruction::Ld { d, ptr, mode } => {
                sig.cycles = 2;
                let writeback = sig.indirect(ptr, mode);
                if c == 1 {
                    sig.pc = PcControl::Relative(0);
                } else {
                    sig.data = DataAccess::Read;
                    sig.reg_write = Some(RegWrite { index: d as usize, source: RegSource::DataBus });
                    sig.word_write = writeback;
                }
            }
            Instruction::St { r, ptr, mode } => {
                sig.cycles = 2;
                sig.reg_b = r as usize;
                let writeback = sig.indirect(ptr, mode);
                if c == 1 {
                    sig.pc = PcControl::Relative(0);
                } else {
                    sig.data = DataAccess::Write(DriveSource::RegB);
                    sig.word_write = writeback;
                }
            }
            Instruction::Lds { d } => {
                sig.cycles = 2;
                sig.direct(self.second);
                if c == 1 {
                    sig.latch_second = true;
                } else {
                    sig.data = DataAccess::Read;
                    sig.reg_write = Some(RegWrite { index: d as usize, source: RegSource::DataBus });
                }
            }
            Instruction::Sts { r } => {
                sig.cycles = 2;
                sig.reg_b = r as usize;
                sig.direct(self.second);
                if c == 1 {
                    sig.latch_second = true;
                } else {
                    sig.data = DataAccess::Write(DriveSource::RegB);
                }
            }
            Instruction::Push { r } => {
                sig.cycles = 2;
                sig.reg_b = r as usize;
                sig.push(DriveSource::RegB);
                if c == 1 {
                    sig.data = DataAccess::None;
                    sig.word_write = None;
                    sig.pc = PcControl::Relative(0);
                }
            }
            Instruction::Pop { d } => {
                sig.cycles = 2;
                sig.pop();
                if c == 1 {
                    sig.data = DataAccess::None;
                    sig.word_write = None;
                    sig.pc = PcControl::Relative(0);
                } else {
                    sig.reg_write = Some(RegWrite { index: d as usize, source: RegSource::DataBus });
                }
            }

            Instruction::Rjmp { k } => {
                sig.cycles = 2;
                if c == 1 {
                    sig.pc = PcControl::Relative(k);
                }
            }
            Instruction::Ijmp => {
                sig.cycles = 2;
                if c == 1 {
                    sig.pc = PcControl::Absolute(Target::Z);
                }
            }
            Instruction::Jmp => {
                sig.cycles = 3;
                match c {
                    1 => sig.latch_second = true,
                    2 => sig.pc = PcControl::Absolute(Target::SecondWord),
                    _ => {}
                }
            }
            Instruction::Rcall { k } => {
                sig.cycles = 3;
                match c {
                    1 => {
                        sig.push(DriveSource::PcHigh);
                        sig.pc = PcControl::Relative(0);
                    }
                    2 => {
                        sig.push(DriveSource::PcLow);
                        sig.pc = PcControl::Relative(k);
                    }
                    _ => {}
                }
            }
            Instruction::Icall => {
                sig.cycles = 3;
                match c {
                    1 => {
                        sig.push(DriveSource::PcHigh);
                        sig.pc = PcControl::Relative(0);
                    }
                    2 => {
                        sig.push(DriveSource::PcLow);
                        sig.pc = PcControl::Absolute(Target::Z);
                    }
                    _ => {}
                }
            }
            Instruction::Call => {
                sig.cycles = 4;
                match c {
                    1 => sig.latch_second = true,
                    2 => {
                        sig.push(DriveSource::PcHigh);
                        sig.pc = PcControl::Relative(0);
                    }
                    3 => {
                        sig.push(DriveSource::PcLow);
                        sig.pc = PcControl::Absolute(Target::SecondWord);
                    }
                    _ => {}
                }
            }
            inst @ (Instruction::Ret | Instruction::Reti) => {
                sig.cycles = 4;
                match c {
                    1 => sig.pc = PcControl::Relative(0),
                    2 => {
                        sig.pop();
                        sig.pc = PcControl::LoadLow;
                    }
                    3 => {
                        sig.pop();
                        sig.pc = PcControl::LoadHigh;
                        if inst == Instruction::Reti {
                            sig.alu(0, AluOp::SetFlags, 1 << SREG_I, false);
                        }
                    }
                    _ => {}
                }
            }

            Instruction::Brbs { s, k } => Self::branch(&mut sig, c, flag(s), k),
            Instruction::Brbc { s, k } => Self::branch(&mut sig, c, !flag(s), k),
            Instruction::Cpse { d, r } => {
                sig.alu_reg(d, r, AluOp::Sub { carry: false }, 0, false);
                self.skip(&mut sig, fb.alu_zero);
            }
            Instruction::Sbrc { r, b } => {
                sig.reg_a = r as usize;
                self.skip(&mut sig, fb.operand_a & (1 << b) == 0);
            }
            Instruction::Sbrs { r, b } => {
                sig.reg_a = r as usize;
                self.skip(&mut sig, fb.operand_a & (1 << b) != 0);
            }

            Instruction::Unimplemented(opcode) => {
                return Err(CoreError::UnimplementedOpcode { opcode, address: self.ir_addr });
            }
        }

        // Memory-mapped addresses are serviced by the register file.
        if sig.data != DataAccess::None {
            sig.internal = fb.internal;
            if fb.internal && matches!(sig.data, DataAccess::Write(_)) {
                sig.reg_write = Some(RegWrite { index: fb.data_addr as usize, source: RegSource::DataBus });
            }
        }

        // Status register writes become a masked ALU write.
        if let Some(w) = sig.reg_write.filter(|w| w.index == SREG_INDEX) {
            sig.alu_op = AluOp::WriteStatus;
            sig.flag_mask = 0xFF;
            if w.source == RegSource::DataBus {
                sig.operand_b = OperandB::DataBus;
            }
            sig.reg_write = None;
        }

        Ok(sig)
    }

    /// Clock edge. On the last cycle the next instruction word is latched
    /// from the program data bus along with the address it came from.
    pub fn clock(&mut self, sig: &ControlSignals, prog_addr: u16, prog_data: u16, reset: bool) {
        if reset {
            self.ir = 0;
            self.cycle = 1;
            self.ir_addr = 0xFFFF;
            return;
        }
        if sig.latch_second {
            self.second = prog_data;
        }
        if self.is_last(sig) {
            self.ir = prog_data;
            self.ir_addr = prog_addr;
            self.cycle = 1;
        } else {
            self.cycle += 1;
        }
    }
}
