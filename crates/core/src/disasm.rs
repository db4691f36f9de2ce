//! AVR instruction disassembler.
//!
//! Converts decoded [`Instruction`] values back to assembly text for traces,
//! breakpoints and the step-mode listing. Addresses are word addresses.

use crate::opcodes::{self, AddrMode, Instruction, Pointer};

const SET_FLAG: [&str; 8] = ["SEC", "SEZ", "SEN", "SEV", "SES", "SEH", "SET", "SEI"];
const CLR_FLAG: [&str; 8] = ["CLC", "CLZ", "CLN", "CLV", "CLS", "CLH", "CLT", "CLI"];
const BR_SET: [&str; 8] = ["BRCS", "BREQ", "BRMI", "BRVS", "BRLT", "BRHS", "BRTS", "BRIE"];
const BR_CLR: [&str; 8] = ["BRCC", "BRNE", "BRPL", "BRVC", "BRGE", "BRHC", "BRTC", "BRID"];

fn pointer(ptr: Pointer, mode: AddrMode) -> String {
    let p = match ptr {
        Pointer::X => 'X',
        Pointer::Y => 'Y',
        Pointer::Z => 'Z',
    };
    match mode {
        AddrMode::Plain => format!("{}", p),
        AddrMode::PostInc => format!("{}+", p),
        AddrMode::PreDec => format!("-{}", p),
        AddrMode::Disp(q) => format!("{}+{}", p, q),
    }
}

fn relative(name: &str, pc: u16, k: i16) -> String {
    let target = pc.wrapping_add(1).wrapping_add(k as u16);
    format!("{} .{:+} ; 0x{:04X}", name, k, target)
}

/// Format a decoded instruction as an assembly string.
///
/// `pc` is the instruction's own word address, used to resolve relative
/// targets. `second` is the following program word, used by the two-word
/// instructions.
pub fn disassemble(inst: Instruction, pc: u16, second: u16) -> String {
    match inst {
        Instruction::Nop => "NOP".into(),
        // Arithmetic
        Instruction::Add { d, r }  => format!("ADD R{}, R{}", d, r),
        Instruction::Adc { d, r }  => format!("ADC R{}, R{}", d, r),
        Instruction::Sub { d, r }  => format!("SUB R{}, R{}", d, r),
        Instruction::Subi { d, k } => format!("SUBI R{}, 0x{:02X}", d, k),
        Instruction::Sbc { d, r }  => format!("SBC R{}, R{}", d, r),
        Instruction::Sbci { d, k } => format!("SBCI R{}, 0x{:02X}", d, k),
        Instruction::And { d, r }  => format!("AND R{}, R{}", d, r),
        Instruction::Andi { d, k } => format!("ANDI R{}, 0x{:02X}", d, k),
        Instruction::Or { d, r }   => format!("OR R{}, R{}", d, r),
        Instruction::Ori { d, k }  => format!("ORI R{}, 0x{:02X}", d, k),
        Instruction::Eor { d, r }  => format!("EOR R{}, R{}", d, r),
        Instruction::Com { d }     => format!("COM R{}", d),
        Instruction::Neg { d }     => format!("NEG R{}", d),
        Instruction::Inc { d }     => format!("INC R{}", d),
        Instruction::Dec { d }     => format!("DEC R{}", d),
        Instruction::Adiw { d, k } => format!("ADIW R{}:R{}, {}", d + 1, d, k),
        Instruction::Sbiw { d, k } => format!("SBIW R{}:R{}, {}", d + 1, d, k),
        // Compare
        Instruction::Cp { d, r }   => format!("CP R{}, R{}", d, r),
        Instruction::Cpc { d, r }  => format!("CPC R{}, R{}", d, r),
        Instruction::Cpi { d, k }  => format!("CPI R{}, 0x{:02X}", d, k),
        // Data transfer
        Instruction::Mov { d, r }  => format!("MOV R{}, R{}", d, r),
        Instruction::Ldi { d, k }  => format!("LDI R{}, 0x{:02X}", d, k),
        Instruction::Lds { d }     => format!("LDS R{}, 0x{:04X}", d, second),
        Instruction::Sts { r }     => format!("STS 0x{:04X}, R{}", second, r),
        Instruction::Ld { d, ptr, mode } => {
            let op = if matches!(mode, AddrMode::Disp(_)) { "LDD" } else { "LD" };
            format!("{} R{}, {}", op, d, pointer(ptr, mode))
        }
        Instruction::St { r, ptr, mode } => {
            let op = if matches!(mode, AddrMode::Disp(_)) { "STD" } else { "ST" };
            format!("{} {}, R{}", op, pointer(ptr, mode), r)
        }
        Instruction::Push { r }    => format!("PUSH R{}", r),
        Instruction::Pop { d }     => format!("POP R{}", d),
        Instruction::In { d, a }   => format!("IN R{}, 0x{:02X}", d, a),
        Instruction::Out { a, r }  => format!("OUT 0x{:02X}, R{}", a, r),
        // Shift/Bit
        Instruction::Lsr { d }     => format!("LSR R{}", d),
        Instruction::Asr { d }     => format!("ASR R{}", d),
        Instruction::Ror { d }     => format!("ROR R{}", d),
        Instruction::Swap { d }    => format!("SWAP R{}", d),
        Instruction::Bst { d, b }  => format!("BST R{}, {}", d, b),
        Instruction::Bld { d, b }  => format!("BLD R{}, {}", d, b),
        Instruction::Bset { s }    => SET_FLAG[(s & 7) as usize].into(),
        Instruction::Bclr { s }    => CLR_FLAG[(s & 7) as usize].into(),
        // Flow
        Instruction::Rjmp { k }    => relative("RJMP", pc, k),
        Instruction::Rcall { k }   => relative("RCALL", pc, k),
        Instruction::Jmp           => format!("JMP 0x{:04X}", second),
        Instruction::Call          => format!("CALL 0x{:04X}", second),
        Instruction::Ijmp          => "IJMP".into(),
        Instruction::Icall         => "ICALL".into(),
        Instruction::Ret           => "RET".into(),
        Instruction::Reti          => "RETI".into(),
        Instruction::Brbs { s, k } => relative(BR_SET[(s & 7) as usize], pc, k as i16),
        Instruction::Brbc { s, k } => relative(BR_CLR[(s & 7) as usize], pc, k as i16),
        Instruction::Cpse { d, r } => format!("CPSE R{}, R{}", d, r),
        Instruction::Sbrc { r, b } => format!("SBRC R{}, {}", r, b),
        Instruction::Sbrs { r, b } => format!("SBRS R{}, {}", r, b),
        Instruction::Unimplemented(w) => format!(".dw 0x{:04X}", w),
    }
}

/// Decode and format the instruction at `addr`.
pub fn disassemble_at(program: &[u16], addr: u16) -> String {
    let word = program.get(addr as usize).copied().unwrap_or(0);
    let second = program.get(addr as usize + 1).copied().unwrap_or(0);
    disassemble(opcodes::decode(word), addr, second)
}

/// Format the status byte as a flag string like "ithsvnzc" (lowercase=clear, UPPER=set).
pub fn format_sreg(sreg: u8) -> String {
    "ITHSVNZC"
        .chars()
        .enumerate()
        .map(|(i, f)| if sreg & (0x80 >> i) != 0 { f } else { f.to_ascii_lowercase() })
        .collect()
}

/// Disassemble the word range `start..end` of program memory.
///
/// Returns lines of `"AAAA: WORD [WORD2]  MNEMONIC"`.
pub fn disassemble_range(program: &[u16], start: u16, end: u16) -> Vec<String> {
    let mut lines = Vec::new();
    let mut addr = start as usize;
    while addr < end as usize && addr < program.len() {
        let word = program[addr];
        let next = program.get(addr + 1).copied().unwrap_or(0);
        let inst = opcodes::decode(word);
        let asm = disassemble(inst, addr as u16, next);
        if inst.words() == 2 {
            lines.push(format!("{:04X}: {:04X} {:04X}  {}", addr, word, next, asm));
            addr += 2;
        } else {
            lines.push(format!("{:04X}: {:04X}       {}", addr, word, asm));
            addr += 1;
        }
    }
    lines
}
