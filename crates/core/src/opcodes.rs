//! AVR instruction decoder.
//!
//! Instruction words are classified against a fixed table of
//! `(mask, match)` bit patterns, one per opcode family, then the operand
//! fields are extracted into a typed [`Instruction`]. Every pattern is tested;
//! the table is built so that no word matches more than one entry.
//!
//! The implemented set is the classic multi-cycle core: ALU register and
//! immediate forms, ADIW/SBIW, all LD/ST/LDD/STD addressing modes, LDS/STS,
//! PUSH/POP, IN/OUT, relative/absolute/indirect jumps and calls, RET/RETI,
//! BRBS/BRBC and the CPSE/SBRC/SBRS skips. Anything else (MUL family, MOVW,
//! LPM, SBI/CBI, SLEEP, ...) decodes to [`Instruction::Unimplemented`].

/// Address-pointer register pair used by indirect loads and stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    X,
    Y,
    Z,
}

/// Indirect addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    /// `(ptr)`
    Plain,
    /// `(ptr)`, then `ptr += 1`
    PostInc,
    /// `ptr -= 1`, then `(ptr)`
    PreDec,
    /// `(ptr + q)`, pointer unchanged. Only Y and Z.
    Disp(u8),
}

/// Decoded instruction with operands.
///
/// Register fields `d` and `r` are 0–31, `k` is an immediate or a relative
/// offset in words, `a` is an I/O address (0–63), `b` a bit number and `s`
/// a status-register bit number. Two-word instructions (`Jmp`, `Call`,
/// `Lds`, `Sts`) carry no address: it arrives through the second-word
/// register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    // Arithmetic and logic
    Add { d: u8, r: u8 },
    Adc { d: u8, r: u8 },
    Sub { d: u8, r: u8 },
    Subi { d: u8, k: u8 },
    Sbc { d: u8, r: u8 },
    Sbci { d: u8, k: u8 },
    And { d: u8, r: u8 },
    Andi { d: u8, k: u8 },
    Or { d: u8, r: u8 },
    Ori { d: u8, k: u8 },
    Eor { d: u8, r: u8 },
    Com { d: u8 },
    Neg { d: u8 },
    Inc { d: u8 },
    Dec { d: u8 },
    Adiw { d: u8, k: u8 },
    Sbiw { d: u8, k: u8 },
    // Compare
    Cp { d: u8, r: u8 },
    Cpc { d: u8, r: u8 },
    Cpi { d: u8, k: u8 },
    // Data transfer
    Mov { d: u8, r: u8 },
    Ldi { d: u8, k: u8 },
    Lds { d: u8 },
    Sts { r: u8 },
    Ld { d: u8, ptr: Pointer, mode: AddrMode },
    St { r: u8, ptr: Pointer, mode: AddrMode },
    Push { r: u8 },
    Pop { d: u8 },
    In { d: u8, a: u8 },
    Out { a: u8, r: u8 },
    // Shift and bit
    Lsr { d: u8 },
    Asr { d: u8 },
    Ror { d: u8 },
    Swap { d: u8 },
    Bst { d: u8, b: u8 },
    Bld { d: u8, b: u8 },
    Bset { s: u8 },
    Bclr { s: u8 },
    // Flow control
    Rjmp { k: i16 },
    Rcall { k: i16 },
    Ijmp,
    Icall,
    Jmp,
    Call,
    Ret,
    Reti,
    Brbs { s: u8, k: i8 },
    Brbc { s: u8, k: i8 },
    Cpse { d: u8, r: u8 },
    Sbrc { r: u8, b: u8 },
    Sbrs { r: u8, b: u8 },
    Unimplemented(u16),
}

impl Instruction {
    /// Encoded size in program words (1 or 2).
    pub fn words(&self) -> u8 {
        match self {
            Instruction::Jmp | Instruction::Call | Instruction::Lds { .. } | Instruction::Sts { .. } => 2,
            _ => 1,
        }
    }
}

/// Opcode family, one per pattern-table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Nop,
    Cpc, Sbc, Add, Cpse, Cp, Sub, Adc, And, Eor, Or, Mov,
    Cpi, Sbci, Subi, Ori, Andi, Ldi,
    LddZ, LddY, StdZ, StdY,
    Lds, LdZInc, LdZDec, LdYInc, LdYDec, LdX, LdXInc, LdXDec, Pop,
    Sts, StZInc, StZDec, StYInc, StYDec, StX, StXInc, StXDec, Push,
    Com, Neg, Swap, Inc, Asr, Lsr, Ror, Dec,
    Bset, Bclr,
    Ijmp, Icall, Ret, Reti, Jmp, Call,
    Adiw, Sbiw,
    In, Out,
    Rjmp, Rcall,
    Brbs, Brbc,
    Bld, Bst, Sbrc, Sbrs,
}

/// One row of the decode table: a word belongs to `op` when
/// `word & mask == bits`.
struct Pattern {
    mask: u16,
    bits: u16,
    op: Op,
}

impl Pattern {
    #[inline(always)]
    fn matches(&self, word: u16) -> bool {
        word & self.mask == self.bits
    }
}

const fn p(mask: u16, bits: u16, op: Op) -> Pattern {
    Pattern { mask, bits, op }
}

#[rustfmt::skip]
const PATTERNS: &[Pattern] = &[
    p(0xFFFF, 0x0000, Op::Nop),
    // 0000 01rd dddd rrrr .. 0010 11rd dddd rrrr
    p(0xFC00, 0x0400, Op::Cpc),
    p(0xFC00, 0x0800, Op::Sbc),
    p(0xFC00, 0x0C00, Op::Add),
    p(0xFC00, 0x1000, Op::Cpse),
    p(0xFC00, 0x1400, Op::Cp),
    p(0xFC00, 0x1800, Op::Sub),
    p(0xFC00, 0x1C00, Op::Adc),
    p(0xFC00, 0x2000, Op::And),
    p(0xFC00, 0x2400, Op::Eor),
    p(0xFC00, 0x2800, Op::Or),
    p(0xFC00, 0x2C00, Op::Mov),
    // xxxx KKKK dddd KKKK
    p(0xF000, 0x3000, Op::Cpi),
    p(0xF000, 0x4000, Op::Sbci),
    p(0xF000, 0x5000, Op::Subi),
    p(0xF000, 0x6000, Op::Ori),
    p(0xF000, 0x7000, Op::Andi),
    p(0xF000, 0xE000, Op::Ldi),
    // 10q0 qqsd dddd yqqq
    p(0xD208, 0x8000, Op::LddZ),
    p(0xD208, 0x8008, Op::LddY),
    p(0xD208, 0x8200, Op::StdZ),
    p(0xD208, 0x8208, Op::StdY),
    // 1001 000d dddd xxxx
    p(0xFE0F, 0x9000, Op::Lds),
    p(0xFE0F, 0x9001, Op::LdZInc),
    p(0xFE0F, 0x9002, Op::LdZDec),
    p(0xFE0F, 0x9009, Op::LdYInc),
    p(0xFE0F, 0x900A, Op::LdYDec),
    p(0xFE0F, 0x900C, Op::LdX),
    p(0xFE0F, 0x900D, Op::LdXInc),
    p(0xFE0F, 0x900E, Op::LdXDec),
    p(0xFE0F, 0x900F, Op::Pop),
    // 1001 001r rrrr xxxx
    p(0xFE0F, 0x9200, Op::Sts),
    p(0xFE0F, 0x9201, Op::StZInc),
    p(0xFE0F, 0x9202, Op::StZDec),
    p(0xFE0F, 0x9209, Op::StYInc),
    p(0xFE0F, 0x920A, Op::StYDec),
    p(0xFE0F, 0x920C, Op::StX),
    p(0xFE0F, 0x920D, Op::StXInc),
    p(0xFE0F, 0x920E, Op::StXDec),
    p(0xFE0F, 0x920F, Op::Push),
    // 1001 010d dddd xxxx
    p(0xFE0F, 0x9400, Op::Com),
    p(0xFE0F, 0x9401, Op::Neg),
    p(0xFE0F, 0x9402, Op::Swap),
    p(0xFE0F, 0x9403, Op::Inc),
    p(0xFE0F, 0x9405, Op::Asr),
    p(0xFE0F, 0x9406, Op::Lsr),
    p(0xFE0F, 0x9407, Op::Ror),
    p(0xFE0F, 0x940A, Op::Dec),
    // 1001 0100 Bsss 1000
    p(0xFF8F, 0x9408, Op::Bset),
    p(0xFF8F, 0x9488, Op::Bclr),
    p(0xFFFF, 0x9409, Op::Ijmp),
    p(0xFFFF, 0x9509, Op::Icall),
    p(0xFFFF, 0x9508, Op::Ret),
    p(0xFFFF, 0x9518, Op::Reti),
    // 1001 010k kkkk 11ck
    p(0xFE0E, 0x940C, Op::Jmp),
    p(0xFE0E, 0x940E, Op::Call),
    // 1001 011x KKdd KKKK
    p(0xFF00, 0x9600, Op::Adiw),
    p(0xFF00, 0x9700, Op::Sbiw),
    // 1011 oAAd dddd AAAA
    p(0xF800, 0xB000, Op::In),
    p(0xF800, 0xB800, Op::Out),
    // 110c kkkk kkkk kkkk
    p(0xF000, 0xC000, Op::Rjmp),
    p(0xF000, 0xD000, Op::Rcall),
    // 1111 0ckk kkkk ksss
    p(0xFC00, 0xF000, Op::Brbs),
    p(0xFC00, 0xF400, Op::Brbc),
    // 1111 1xxd dddd 0bbb
    p(0xFE08, 0xF800, Op::Bld),
    p(0xFE08, 0xFA00, Op::Bst),
    p(0xFE08, 0xFC00, Op::Sbrc),
    p(0xFE08, 0xFE00, Op::Sbrs),
];

/// Run the word past every pattern and return the family it belongs to.
fn classify(word: u16) -> Option<Op> {
    let mut found = None;
    let mut hits = 0;
    for pat in PATTERNS {
        if pat.matches(word) {
            found = Some(pat.op);
            hits += 1;
        }
    }
    debug_assert!(hits <= 1, "overlapping decode patterns for 0x{:04X}", word);
    found
}

/// True for the words that are followed by an address word
/// (JMP, CALL, LDS, STS). Used to size a skipped instruction.
pub fn is_two_word(word: u16) -> bool {
    matches!(classify(word), Some(Op::Jmp | Op::Call | Op::Lds | Op::Sts))
}

/// Decode one instruction word.
pub fn decode(word: u16) -> Instruction {
    let op = match classify(word) {
        Some(op) => op,
        None => return Instruction::Unimplemented(word),
    };
    let d = reg_d(word);
    let (d16, k8) = decode_4_8(word);
    match op {
        Op::Nop => Instruction::Nop,
        Op::Cpc => { let (d, r) = decode_5_5(word); Instruction::Cpc { d, r } }
        Op::Sbc => { let (d, r) = decode_5_5(word); Instruction::Sbc { d, r } }
        Op::Add => { let (d, r) = decode_5_5(word); Instruction::Add { d, r } }
        Op::Cpse => { let (d, r) = decode_5_5(word); Instruction::Cpse { d, r } }
        Op::Cp => { let (d, r) = decode_5_5(word); Instruction::Cp { d, r } }
        Op::Sub => { let (d, r) = decode_5_5(word); Instruction::Sub { d, r } }
        Op::Adc => { let (d, r) = decode_5_5(word); Instruction::Adc { d, r } }
        Op::And => { let (d, r) = decode_5_5(word); Instruction::And { d, r } }
        Op::Eor => { let (d, r) = decode_5_5(word); Instruction::Eor { d, r } }
        Op::Or => { let (d, r) = decode_5_5(word); Instruction::Or { d, r } }
        Op::Mov => { let (d, r) = decode_5_5(word); Instruction::Mov { d, r } }

        Op::Cpi => Instruction::Cpi { d: d16, k: k8 },
        Op::Sbci => Instruction::Sbci { d: d16, k: k8 },
        Op::Subi => Instruction::Subi { d: d16, k: k8 },
        Op::Ori => Instruction::Ori { d: d16, k: k8 },
        Op::Andi => Instruction::Andi { d: d16, k: k8 },
        Op::Ldi => Instruction::Ldi { d: d16, k: k8 },

        Op::LddZ => Instruction::Ld { d, ptr: Pointer::Z, mode: displacement(word) },
        Op::LddY => Instruction::Ld { d, ptr: Pointer::Y, mode: displacement(word) },
        Op::StdZ => Instruction::St { r: d, ptr: Pointer::Z, mode: displacement(word) },
        Op::StdY => Instruction::St { r: d, ptr: Pointer::Y, mode: displacement(word) },

        Op::Lds => Instruction::Lds { d },
        Op::LdZInc => Instruction::Ld { d, ptr: Pointer::Z, mode: AddrMode::PostInc },
        Op::LdZDec => Instruction::Ld { d, ptr: Pointer::Z, mode: AddrMode::PreDec },
        Op::LdYInc => Instruction::Ld { d, ptr: Pointer::Y, mode: AddrMode::PostInc },
        Op::LdYDec => Instruction::Ld { d, ptr: Pointer::Y, mode: AddrMode::PreDec },
        Op::LdX => Instruction::Ld { d, ptr: Pointer::X, mode: AddrMode::Plain },
        Op::LdXInc => Instruction::Ld { d, ptr: Pointer::X, mode: AddrMode::PostInc },
        Op::LdXDec => Instruction::Ld { d, ptr: Pointer::X, mode: AddrMode::PreDec },
        Op::Pop => Instruction::Pop { d },

        Op::Sts => Instruction::Sts { r: d },
        Op::StZInc => Instruction::St { r: d, ptr: Pointer::Z, mode: AddrMode::PostInc },
        Op::StZDec => Instruction::St { r: d, ptr: Pointer::Z, mode: AddrMode::PreDec },
        Op::StYInc => Instruction::St { r: d, ptr: Pointer::Y, mode: AddrMode::PostInc },
        Op::StYDec => Instruction::St { r: d, ptr: Pointer::Y, mode: AddrMode::PreDec },
        Op::StX => Instruction::St { r: d, ptr: Pointer::X, mode: AddrMode::Plain },
        Op::StXInc => Instruction::St { r: d, ptr: Pointer::X, mode: AddrMode::PostInc },
        Op::StXDec => Instruction::St { r: d, ptr: Pointer::X, mode: AddrMode::PreDec },
        Op::Push => Instruction::Push { r: d },

        Op::Com => Instruction::Com { d },
        Op::Neg => Instruction::Neg { d },
        Op::Swap => Instruction::Swap { d },
        Op::Inc => Instruction::Inc { d },
        Op::Asr => Instruction::Asr { d },
        Op::Lsr => Instruction::Lsr { d },
        Op::Ror => Instruction::Ror { d },
        Op::Dec => Instruction::Dec { d },

        Op::Bset => Instruction::Bset { s: ((word >> 4) & 7) as u8 },
        Op::Bclr => Instruction::Bclr { s: ((word >> 4) & 7) as u8 },
        Op::Ijmp => Instruction::Ijmp,
        Op::Icall => Instruction::Icall,
        Op::Ret => Instruction::Ret,
        Op::Reti => Instruction::Reti,
        Op::Jmp => Instruction::Jmp,
        Op::Call => Instruction::Call,

        Op::Adiw => { let (d, k) = decode_pair_6(word); Instruction::Adiw { d, k } }
        Op::Sbiw => { let (d, k) = decode_pair_6(word); Instruction::Sbiw { d, k } }

        Op::In => Instruction::In { d, a: io_addr(word) },
        Op::Out => Instruction::Out { a: io_addr(word), r: d },

        Op::Rjmp => Instruction::Rjmp { k: sign_extend_12(word & 0x0FFF) },
        Op::Rcall => Instruction::Rcall { k: sign_extend_12(word & 0x0FFF) },

        Op::Brbs => Instruction::Brbs { s: (word & 7) as u8, k: sign_extend_7(word) },
        Op::Brbc => Instruction::Brbc { s: (word & 7) as u8, k: sign_extend_7(word) },

        Op::Bld => Instruction::Bld { d, b: (word & 7) as u8 },
        Op::Bst => Instruction::Bst { d, b: (word & 7) as u8 },
        Op::Sbrc => Instruction::Sbrc { r: d, b: (word & 7) as u8 },
        Op::Sbrs => Instruction::Sbrs { r: d, b: (word & 7) as u8 },
    }
}

// --- Field extraction ---

/// 5-bit register field at bits 8:4.
#[inline(always)]
fn reg_d(word: u16) -> u8 {
    ((word >> 4) & 0x1F) as u8
}

/// Decode 5-bit d, 5-bit r from: xxxx xxrd dddd rrrr
#[inline(always)]
fn decode_5_5(word: u16) -> (u8, u8) {
    let d = ((word >> 4) & 0x1F) as u8;
    let r = ((word & 0x0F) | ((word >> 5) & 0x10)) as u8;
    (d, r)
}

/// Decode 4-bit d (R16–R31), 8-bit K from: xxxx KKKK dddd KKKK
#[inline(always)]
fn decode_4_8(word: u16) -> (u8, u8) {
    let d = ((word >> 4) & 0x0F) as u8 + 16;
    let k = (((word >> 4) & 0xF0) | (word & 0x0F)) as u8;
    (d, k)
}

/// Decode register pair (R24/R26/R28/R30) and 6-bit K from: xxxx xxxx KKdd KKKK
#[inline(always)]
fn decode_pair_6(word: u16) -> (u8, u8) {
    let d = (((word >> 4) & 3) * 2 + 24) as u8;
    let k = (((word >> 2) & 0x30) | (word & 0x0F)) as u8;
    (d, k)
}

/// 6-bit displacement from: 10q0 qqxd dddd xqqq
#[inline(always)]
fn displacement(word: u16) -> AddrMode {
    let q = (((word >> 8) & 0x20) | ((word >> 7) & 0x18) | (word & 7)) as u8;
    if q == 0 { AddrMode::Plain } else { AddrMode::Disp(q) }
}

/// 6-bit I/O address from: 1011 xAAd dddd AAAA
#[inline(always)]
fn io_addr(word: u16) -> u8 {
    (((word >> 5) & 0x30) | (word & 0x0F)) as u8
}

/// Sign-extend 12-bit value to i16
#[inline(always)]
fn sign_extend_12(val: u16) -> i16 {
    if val & 0x800 != 0 {
        (val | 0xF000) as i16
    } else {
        val as i16
    }
}

/// Sign-extend the 7-bit branch offset at bits 9:3.
#[inline(always)]
fn sign_extend_7(word: u16) -> i8 {
    ((((word >> 3) & 0x7F) as u8) << 1) as i8 >> 1
}
