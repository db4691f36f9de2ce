//! Instruction encoder for building test programs.
//!
//! Each function returns the encoded words of one instruction; [`program`]
//! concatenates them into an image. Register and operand ranges are the
//! caller's responsibility.

use crate::opcodes::{AddrMode, Pointer};

pub type Words = Vec<u16>;

pub fn program(parts: &[Words]) -> Vec<u16> {
    parts.concat()
}

fn rr(base: u16, d: u8, r: u8) -> Words {
    let (d, r) = (d as u16, r as u16);
    vec![base | ((r & 0x10) << 5) | ((d & 0x1F) << 4) | (r & 0x0F)]
}

fn ri(base: u16, d: u8, k: u8) -> Words {
    let (d, k) = (d as u16 - 16, k as u16);
    vec![base | ((k & 0xF0) << 4) | ((d & 0x0F) << 4) | (k & 0x0F)]
}

fn one(base: u16, d: u8) -> Words {
    vec![base | ((d as u16 & 0x1F) << 4)]
}

fn bit(base: u16, d: u8, b: u8) -> Words {
    vec![base | ((d as u16 & 0x1F) << 4) | (b as u16 & 7)]
}

pub fn nop() -> Words { vec![0x0000] }

pub fn add(d: u8, r: u8) -> Words { rr(0x0C00, d, r) }
pub fn adc(d: u8, r: u8) -> Words { rr(0x1C00, d, r) }
pub fn sub(d: u8, r: u8) -> Words { rr(0x1800, d, r) }
pub fn sbc(d: u8, r: u8) -> Words { rr(0x0800, d, r) }
pub fn and(d: u8, r: u8) -> Words { rr(0x2000, d, r) }
pub fn or(d: u8, r: u8) -> Words { rr(0x2800, d, r) }
pub fn eor(d: u8, r: u8) -> Words { rr(0x2400, d, r) }
pub fn mov(d: u8, r: u8) -> Words { rr(0x2C00, d, r) }
pub fn cp(d: u8, r: u8) -> Words { rr(0x1400, d, r) }
pub fn cpc(d: u8, r: u8) -> Words { rr(0x0400, d, r) }
pub fn cpse(d: u8, r: u8) -> Words { rr(0x1000, d, r) }

pub fn ldi(d: u8, k: u8) -> Words { ri(0xE000, d, k) }
pub fn subi(d: u8, k: u8) -> Words { ri(0x5000, d, k) }
pub fn sbci(d: u8, k: u8) -> Words { ri(0x4000, d, k) }
pub fn andi(d: u8, k: u8) -> Words { ri(0x7000, d, k) }
pub fn ori(d: u8, k: u8) -> Words { ri(0x6000, d, k) }
pub fn cpi(d: u8, k: u8) -> Words { ri(0x3000, d, k) }

pub fn com(d: u8) -> Words { one(0x9400, d) }
pub fn neg(d: u8) -> Words { one(0x9401, d) }
pub fn swap(d: u8) -> Words { one(0x9402, d) }
pub fn inc(d: u8) -> Words { one(0x9403, d) }
pub fn asr(d: u8) -> Words { one(0x9405, d) }
pub fn lsr(d: u8) -> Words { one(0x9406, d) }
pub fn ror(d: u8) -> Words { one(0x9407, d) }
pub fn dec(d: u8) -> Words { one(0x940A, d) }
pub fn push(r: u8) -> Words { one(0x920F, r) }
pub fn pop(d: u8) -> Words { one(0x900F, d) }

fn word_imm(base: u16, d: u8, k: u8) -> Words {
    let (p, k) = (((d - 24) / 2) as u16, k as u16);
    vec![base | ((k & 0x30) << 2) | (p << 4) | (k & 0x0F)]
}

pub fn adiw(d: u8, k: u8) -> Words { word_imm(0x9600, d, k) }
pub fn sbiw(d: u8, k: u8) -> Words { word_imm(0x9700, d, k) }

fn indirect(load: u16, d: u8, ptr: Pointer, mode: AddrMode) -> Words {
    let base = match (ptr, mode) {
        (Pointer::X, AddrMode::Plain) => 0x900C,
        (Pointer::X, AddrMode::PostInc) => 0x900D,
        (Pointer::X, AddrMode::PreDec) => 0x900E,
        (Pointer::Y, AddrMode::PostInc) => 0x9009,
        (Pointer::Y, AddrMode::PreDec) => 0x900A,
        (Pointer::Z, AddrMode::PostInc) => 0x9001,
        (Pointer::Z, AddrMode::PreDec) => 0x9002,
        (Pointer::Y, AddrMode::Plain) => 0x8008,
        (Pointer::Z, AddrMode::Plain) => 0x8000,
        (Pointer::Y, AddrMode::Disp(q)) => 0x8008 | disp(q),
        (Pointer::Z, AddrMode::Disp(q)) => 0x8000 | disp(q),
        (Pointer::X, AddrMode::Disp(_)) => panic!("X has no displacement mode"),
    };
    one(base | load, d)
}

fn disp(q: u8) -> u16 {
    let q = q as u16;
    ((q & 0x20) << 8) | ((q & 0x18) << 7) | (q & 7)
}

pub fn ld(d: u8, ptr: Pointer, mode: AddrMode) -> Words { indirect(0x0000, d, ptr, mode) }
pub fn st(ptr: Pointer, mode: AddrMode, r: u8) -> Words { indirect(0x0200, r, ptr, mode) }

pub fn lds(d: u8, k: u16) -> Words { vec![0x9000 | ((d as u16) << 4), k] }
pub fn sts(k: u16, r: u8) -> Words { vec![0x9200 | ((r as u16) << 4), k] }

pub fn in_(d: u8, a: u8) -> Words {
    let a = a as u16;
    vec![0xB000 | ((a & 0x30) << 5) | ((d as u16) << 4) | (a & 0x0F)]
}

pub fn out(a: u8, r: u8) -> Words {
    let a = a as u16;
    vec![0xB800 | ((a & 0x30) << 5) | ((r as u16) << 4) | (a & 0x0F)]
}

pub fn rjmp(k: i16) -> Words { vec![0xC000 | (k as u16 & 0x0FFF)] }
pub fn rcall(k: i16) -> Words { vec![0xD000 | (k as u16 & 0x0FFF)] }
pub fn jmp(k: u16) -> Words { vec![0x940C, k] }
pub fn call(k: u16) -> Words { vec![0x940E, k] }
pub fn ijmp() -> Words { vec![0x9409] }
pub fn icall() -> Words { vec![0x9509] }
pub fn ret() -> Words { vec![0x9508] }
pub fn reti() -> Words { vec![0x9518] }

pub fn brbs(s: u8, k: i8) -> Words { vec![0xF000 | ((k as u16 & 0x7F) << 3) | (s as u16 & 7)] }
pub fn brbc(s: u8, k: i8) -> Words { vec![0xF400 | ((k as u16 & 0x7F) << 3) | (s as u16 & 7)] }
pub fn bset(s: u8) -> Words { vec![0x9408 | ((s as u16 & 7) << 4)] }
pub fn bclr(s: u8) -> Words { vec![0x9488 | ((s as u16 & 7) << 4)] }

pub fn bld(d: u8, b: u8) -> Words { bit(0xF800, d, b) }
pub fn bst(d: u8, b: u8) -> Words { bit(0xFA00, d, b) }
pub fn sbrc(r: u8, b: u8) -> Words { bit(0xFC00, r, b) }
pub fn sbrs(r: u8, b: u8) -> Words { bit(0xFE00, r, b) }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::{decode, Instruction};

    #[test]
    fn test_encodings_decode_back() {
        assert_eq!(decode(ldi(16, 0x7E)[0]), Instruction::Ldi { d: 16, k: 0x7E });
        assert_eq!(decode(adc(16, 20)[0]), Instruction::Adc { d: 16, r: 20 });
        assert_eq!(decode(sbiw(30, 33)[0]), Instruction::Sbiw { d: 30, k: 33 });
        assert_eq!(decode(out(0x3F, 5)[0]), Instruction::Out { a: 0x3F, r: 5 });
        assert_eq!(decode(brbc(1, -3)[0]), Instruction::Brbc { s: 1, k: -3 });
        assert_eq!(
            decode(st(Pointer::Z, AddrMode::Disp(42), 7)[0]),
            Instruction::St { r: 7, ptr: Pointer::Z, mode: AddrMode::Disp(42) }
        );
        assert_eq!(
            decode(ld(9, Pointer::X, AddrMode::PreDec)[0]),
            Instruction::Ld { d: 9, ptr: Pointer::X, mode: AddrMode::PreDec }
        );
        assert_eq!(sts(0x1111, 3), vec![0x9230, 0x1111]);
    }
}
