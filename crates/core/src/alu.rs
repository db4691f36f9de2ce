//! Arithmetic/logic unit.
//!
//! The ALU owns the status register. Each cycle it computes a result byte
//! and a full candidate flag byte for the selected operation; on the clock
//! edge only the flag bits selected by the control unit's write mask are
//! latched into the status register.

use serde::{Deserialize, Serialize};

use crate::{SREG_C, SREG_H, SREG_N, SREG_S, SREG_T, SREG_V, SREG_Z};

/// Truth tables for [`AluOp::Logic`], indexed by `(a_bit << 1) | b_bit`.
pub const LOGIC_AND: u8 = 0b1000;
pub const LOGIC_OR: u8 = 0b1110;
pub const LOGIC_XOR: u8 = 0b0110;
pub const LOGIC_NOT_A: u8 = 0b0011;

/// Bit shifted into bit 7 by [`AluOp::Shift`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftFill {
    /// LSR
    Zero,
    /// ASR
    Sign,
    /// ROR
    Carry,
}

/// Operation selected by the control unit for the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    /// No result; flags unchanged.
    Nop,
    /// Result = B. Used for MOV, LDI, IN and loads.
    PassB,
    /// Bitwise operation given by a 4-entry truth table.
    Logic(u8),
    /// A + B, plus the carry flag when `carry` is set.
    Add { carry: bool },
    /// A - B, minus the carry flag when `carry` is set.
    Sub { carry: bool },
    /// Shift right one place.
    Shift(ShiftFill),
    /// Exchange nibbles.
    Swap,
    /// Copy T into bit `n` of A.
    Bld(u8),
    /// Copy bit `n` of A into T.
    Bst(u8),
    /// All candidate flags set; the mask picks which.
    SetFlags,
    /// All candidate flags clear; the mask picks which.
    ClearFlags,
    /// Candidate flags = B (status register direct write).
    WriteStatus,
}

/// Combinational output of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AluOutput {
    pub result: u8,
    /// Candidate status byte; latched through the write mask.
    pub flags: u8,
    /// Pre-latch zero flag, for compare-and-skip.
    pub zero: bool,
}

/// The ALU and its status register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alu {
    pub status: u8,
}

#[inline(always)]
fn bit(v: u8, n: u8) -> bool {
    (v >> n) & 1 != 0
}

#[inline(always)]
fn put(flags: &mut u8, n: u8, v: bool) {
    if v { *flags |= 1 << n; } else { *flags &= !(1 << n); }
}

/// 8-bit ripple-carry adder. Returns the sum and the carries into bit 4,
/// into bit 7 and out of bit 7.
fn ripple(a: u8, b: u8, carry_in: bool) -> (u8, bool, bool, bool) {
    let mut carry = carry_in;
    let mut sum = 0u8;
    let (mut c4, mut c7) = (false, false);
    for i in 0..8 {
        if i == 4 { c4 = carry; }
        if i == 7 { c7 = carry; }
        let (x, y) = (bit(a, i), bit(b, i));
        if x ^ y ^ carry {
            sum |= 1 << i;
        }
        carry = (x && y) || (carry && (x ^ y));
    }
    (sum, c4, c7, carry)
}

impl Alu {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn flag(&self, n: u8) -> bool {
        bit(self.status, n)
    }

    /// Evaluate `op` on operands `a` and `b`.
    ///
    /// When `propagate_zero` is set the zero flag is sticky: it can only
    /// stay set if it was already set, so an 8-bit compare chained after
    /// another reports zero for the combined width.
    pub fn evaluate(&self, op: AluOp, a: u8, b: u8, propagate_zero: bool) -> AluOutput {
        let mut flags = self.status;
        let c_in = self.flag(SREG_C);

        let result = match op {
            AluOp::Nop => 0,
            AluOp::PassB => b,
            AluOp::Logic(table) => {
                let mut r = 0u8;
                for i in 0..8 {
                    let idx = ((bit(a, i) as u8) << 1) | bit(b, i) as u8;
                    if bit(table, idx) {
                        r |= 1 << i;
                    }
                }
                put(&mut flags, SREG_C, true);
                put(&mut flags, SREG_V, false);
                r
            }
            AluOp::Add { carry } => {
                let (r, c4, c7, c8) = ripple(a, b, carry && c_in);
                put(&mut flags, SREG_C, c8);
                put(&mut flags, SREG_H, c4);
                put(&mut flags, SREG_V, c7 ^ c8);
                r
            }
            AluOp::Sub { carry } => {
                let (r, c4, c7, c8) = ripple(a, !b, !(carry && c_in));
                put(&mut flags, SREG_C, !c8);
                put(&mut flags, SREG_H, !c4);
                put(&mut flags, SREG_V, c7 ^ c8);
                r
            }
            AluOp::Shift(fill) => {
                let top = match fill {
                    ShiftFill::Zero => false,
                    ShiftFill::Sign => bit(a, 7),
                    ShiftFill::Carry => c_in,
                };
                let r = ((top as u8) << 7) | (a >> 1);
                let c = bit(a, 0);
                put(&mut flags, SREG_C, c);
                put(&mut flags, SREG_V, bit(r, 7) ^ c);
                r
            }
            AluOp::Swap => a.rotate_left(4),
            AluOp::Bld(n) => {
                let n = n & 7;
                if self.flag(SREG_T) { a | (1 << n) } else { a & !(1 << n) }
            }
            AluOp::Bst(n) => {
                put(&mut flags, SREG_T, bit(a, n & 7));
                a
            }
            AluOp::SetFlags => {
                flags = 0xFF;
                a
            }
            AluOp::ClearFlags => {
                flags = 0x00;
                a
            }
            AluOp::WriteStatus => {
                flags = b;
                b
            }
        };

        let zero = result == 0 && (!propagate_zero || self.flag(SREG_Z));
        if !matches!(op, AluOp::SetFlags | AluOp::ClearFlags | AluOp::WriteStatus) {
            let n = bit(result, 7);
            put(&mut flags, SREG_Z, zero);
            put(&mut flags, SREG_N, n);
            let v = bit(flags, SREG_V);
            put(&mut flags, SREG_S, n ^ v);
        }

        AluOutput { result, flags, zero }
    }

    /// Clock edge: latch the masked candidate flags.
    #[inline(always)]
    pub fn clock(&mut self, out: &AluOutput, mask: u8) {
        self.status = (self.status & !mask) | (out.flags & mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SREG_I;
    use proptest::prelude::*;

    const ARITH: u8 = 0x3F;

    /// Reference flags for ADD/ADC from the datasheet bit equations.
    fn ref_add(rd: u8, rr: u8, c: bool) -> (u8, u8) {
        let r = rd.wrapping_add(rr).wrapping_add(c as u8);
        let (r7, rd7, rr7) = ((r >> 7) & 1, (rd >> 7) & 1, (rr >> 7) & 1);
        let (r3, rd3, rr3) = ((r >> 3) & 1, (rd >> 3) & 1, (rr >> 3) & 1);
        let h = (rd3 & rr3) | (rr3 & (r3 ^ 1)) | ((r3 ^ 1) & rd3);
        let v = (rd7 & rr7 & (r7 ^ 1)) | ((rd7 ^ 1) & (rr7 ^ 1) & r7);
        let cf = (rd7 & rr7) | (rr7 & (r7 ^ 1)) | ((r7 ^ 1) & rd7);
        let z = (r == 0) as u8;
        (r, (h << 5) | ((r7 ^ v) << 4) | (v << 3) | (r7 << 2) | (z << 1) | cf)
    }

    /// Reference flags for SUB/SBC, with the chained zero rule when `sticky`.
    fn ref_sub(rd: u8, rr: u8, c: bool, sticky: bool, z_old: bool) -> (u8, u8) {
        let r = rd.wrapping_sub(rr).wrapping_sub(c as u8);
        let (r7, rd7, rr7) = ((r >> 7) & 1, (rd >> 7) & 1, (rr >> 7) & 1);
        let (r3, rd3, rr3) = ((r >> 3) & 1, (rd >> 3) & 1, (rr >> 3) & 1);
        let h = ((rd3 ^ 1) & rr3) | (rr3 & r3) | (r3 & (rd3 ^ 1));
        let v = (rd7 & (rr7 ^ 1) & (r7 ^ 1)) | ((rd7 ^ 1) & rr7 & r7);
        let cf = ((rd7 ^ 1) & rr7) | (rr7 & r7) | (r7 & (rd7 ^ 1));
        let z = (r == 0 && (!sticky || z_old)) as u8;
        (r, (h << 5) | ((r7 ^ v) << 4) | (v << 3) | (r7 << 2) | (z << 1) | cf)
    }

    fn run(alu: &mut Alu, op: AluOp, a: u8, b: u8, mask: u8, prop: bool) -> u8 {
        let out = alu.evaluate(op, a, b, prop);
        alu.clock(&out, mask);
        out.result
    }

    #[test]
    fn test_adc_half_carry() {
        let mut alu = Alu { status: 1 << SREG_C };
        let r = run(&mut alu, AluOp::Add { carry: true }, 0x1E, 0x1B, ARITH, false);
        assert_eq!(r, 0x3A);
        assert_eq!(alu.status, 1 << SREG_H);
    }

    #[test]
    fn test_boundary_pairs() {
        for (a, b) in [(0u8, 0u8), (0xFF, 0xFF), (0x7F, 0x7F), (0x80, 0x80)] {
            for c in [false, true] {
                let alu = Alu { status: (c as u8) << SREG_C };
                let out = alu.evaluate(AluOp::Add { carry: true }, a, b, false);
                assert_eq!((out.result, out.flags & ARITH), ref_add(a, b, c), "adc {a:02X} {b:02X} {c}");
                let out = alu.evaluate(AluOp::Sub { carry: true }, a, b, false);
                assert_eq!((out.result, out.flags & ARITH), ref_sub(a, b, c, false, false), "sbc {a:02X} {b:02X} {c}");
            }
        }
    }

    #[test]
    fn test_signed_overflow() {
        let alu = Alu::new();
        let out = alu.evaluate(AluOp::Add { carry: false }, 0x7F, 0x01, false);
        assert_eq!(out.result, 0x80);
        assert!(bit(out.flags, SREG_V));
        assert!(bit(out.flags, SREG_N));
        assert!(!bit(out.flags, SREG_S));
    }

    #[test]
    fn test_sticky_zero() {
        // Low byte compare left Z clear: an equal high byte must not set it.
        let alu = Alu { status: 0 };
        let out = alu.evaluate(AluOp::Sub { carry: true }, 0x12, 0x12, true);
        assert!(!out.zero);
        let alu = Alu { status: 1 << SREG_Z };
        let out = alu.evaluate(AluOp::Sub { carry: true }, 0x12, 0x12, true);
        assert!(out.zero);
        // Without propagation the previous Z is ignored.
        let alu = Alu { status: 0 };
        assert!(alu.evaluate(AluOp::Sub { carry: false }, 5, 5, false).zero);
    }

    #[test]
    fn test_logic_tables() {
        let alu = Alu::new();
        assert_eq!(alu.evaluate(AluOp::Logic(LOGIC_AND), 0xCA, 0x0F, false).result, 0x0A);
        assert_eq!(alu.evaluate(AluOp::Logic(LOGIC_OR), 0xCA, 0x0F, false).result, 0xCF);
        assert_eq!(alu.evaluate(AluOp::Logic(LOGIC_XOR), 0xCA, 0x0F, false).result, 0xC5);
        let com = alu.evaluate(AluOp::Logic(LOGIC_NOT_A), 0xCA, 0x00, false);
        assert_eq!(com.result, 0x35);
        assert!(bit(com.flags, SREG_C));
        assert!(!bit(com.flags, SREG_V));
    }

    #[test]
    fn test_logic_mask_keeps_carry() {
        let mut alu = Alu { status: 0 };
        run(&mut alu, AluOp::Logic(LOGIC_AND), 0x80, 0x80, 0x1E, false);
        assert!(!alu.flag(SREG_C));
        assert!(alu.flag(SREG_N));
        assert!(alu.flag(SREG_S));
    }

    #[test]
    fn test_shifts() {
        let alu = Alu { status: 1 << SREG_C };
        let lsr = alu.evaluate(AluOp::Shift(ShiftFill::Zero), 0x81, 0, false);
        assert_eq!(lsr.result, 0x40);
        assert!(bit(lsr.flags, SREG_C));
        assert!(bit(lsr.flags, SREG_V)); // N=0 ^ C=1
        let asr = alu.evaluate(AluOp::Shift(ShiftFill::Sign), 0x81, 0, false);
        assert_eq!(asr.result, 0xC0);
        assert!(!bit(asr.flags, SREG_V)); // N=1 ^ C=1
        let ror = alu.evaluate(AluOp::Shift(ShiftFill::Carry), 0x02, 0, false);
        assert_eq!(ror.result, 0x81);
        assert!(!bit(ror.flags, SREG_C));
    }

    #[test]
    fn test_swap_bld_bst() {
        let mut alu = Alu::new();
        assert_eq!(alu.evaluate(AluOp::Swap, 0x3C, 0, false).result, 0xC3);
        run(&mut alu, AluOp::Bst(6), 0x40, 0, 1 << SREG_T, false);
        assert!(alu.flag(SREG_T));
        assert_eq!(alu.evaluate(AluOp::Bld(0), 0x10, 0, false).result, 0x11);
        alu.status = 0;
        assert_eq!(alu.evaluate(AluOp::Bld(4), 0x10, 0, false).result, 0x00);
    }

    #[test]
    fn test_flag_set_clear_write() {
        let mut alu = Alu::new();
        run(&mut alu, AluOp::SetFlags, 0, 0, 1 << SREG_I, false);
        assert_eq!(alu.status, 0x80);
        run(&mut alu, AluOp::SetFlags, 0, 0, 1 << SREG_C, false);
        assert_eq!(alu.status, 0x81);
        run(&mut alu, AluOp::ClearFlags, 0, 0, 1 << SREG_I, false);
        assert_eq!(alu.status, 0x01);
        run(&mut alu, AluOp::WriteStatus, 0, 0xA5, 0xFF, false);
        assert_eq!(alu.status, 0xA5);
    }

    #[test]
    fn test_mask_zero_latches_nothing() {
        let mut alu = Alu { status: 0x5A };
        run(&mut alu, AluOp::Sub { carry: false }, 0, 1, 0, false);
        assert_eq!(alu.status, 0x5A);
    }

    proptest! {
        #[test]
        fn prop_add_matches_reference(a: u8, b: u8, c: bool, with_carry: bool) {
            let alu = Alu { status: (c as u8) << SREG_C };
            let out = alu.evaluate(AluOp::Add { carry: with_carry }, a, b, false);
            prop_assert_eq!((out.result, out.flags & ARITH), ref_add(a, b, c && with_carry));
        }

        #[test]
        fn prop_sub_matches_reference(a: u8, b: u8, c: bool, z: bool, with_carry: bool) {
            let status = ((c as u8) << SREG_C) | ((z as u8) << SREG_Z);
            let alu = Alu { status };
            let out = alu.evaluate(AluOp::Sub { carry: with_carry }, a, b, with_carry);
            prop_assert_eq!(
                (out.result, out.flags & ARITH),
                ref_sub(a, b, c && with_carry, with_carry, z)
            );
        }

        #[test]
        fn prop_upper_flags_untouched_by_arith(a: u8, b: u8, status: u8) {
            let alu = Alu { status };
            let out = alu.evaluate(AluOp::Add { carry: true }, a, b, false);
            prop_assert_eq!(out.flags & 0xC0, status & 0xC0);
        }
    }
}
