//! Instruction encoders for the MIPS32 subset used by the payloads.
//!
//! Register aliases use the conventional names. The two-word
//! pseudo-instructions (`li`, `blt`) return arrays so call sites stay flat.

#![allow(missing_docs)]

use crate::{LABEL_MARKER, LABEL_MASK};

pub const ZERO: u32 = 0;
pub const AT: u32 = 1;
pub const V0: u32 = 2;
pub const V1: u32 = 3;
pub const A0: u32 = 4;
pub const A1: u32 = 5;
pub const A2: u32 = 6;
pub const A3: u32 = 7;
pub const T0: u32 = 8;
pub const T1: u32 = 9;
pub const T2: u32 = 10;
pub const T3: u32 = 11;
pub const T4: u32 = 12;
pub const T5: u32 = 13;
pub const T6: u32 = 14;
pub const T7: u32 = 15;
pub const S0: u32 = 16;
pub const S1: u32 = 17;
pub const S2: u32 = 18;
pub const S3: u32 = 19;
pub const S4: u32 = 20;
pub const S5: u32 = 21;
pub const S6: u32 = 22;
pub const S7: u32 = 23;
pub const SP: u32 = 29;
pub const RA: u32 = 31;

// o32 passes the fifth and sixth argument in t0/t1
pub const A4: u32 = T0;
pub const A5: u32 = T1;

/// The opcode carrying label definitions (`addiu`).
pub const LABEL_OPCODE: u32 = 0x09;

// R-type: zero(6) | rs(5) | rt(5) | rd(5) | sa(5) | fn(6)
const fn asm_r(rs: u32, rt: u32, rd: u32, sa: u32, func: u32) -> u32 {
    ((rs & 0x1f) << 21) | ((rt & 0x1f) << 16) | ((rd & 0x1f) << 11) | ((sa & 0x1f) << 6) | (func & 0x3f)
}

// I-type: op(6) | rs(5) | rt(5) | imm(16)
const fn asm_i(op: u32, rs: u32, rt: u32, imm: u32) -> u32 {
    ((op & 0x3f) << 26) | ((rs & 0x1f) << 21) | ((rt & 0x1f) << 16) | (imm & 0xffff)
}

// J-type: op(6) | target(26)
const fn asm_j(op: u32, addr: u32) -> u32 {
    ((op & 0x3f) << 26) | ((addr & 0x0fff_ffff) >> 2)
}

pub const fn addi(rt: u32, rs: u32, imm: u32) -> u32 {
    asm_i(0x08, rs, rt, imm)
}

pub const fn addiu(rt: u32, rs: u32, imm: u32) -> u32 {
    asm_i(0x09, rs, rt, imm)
}

pub const fn addu(rd: u32, rs: u32, rt: u32) -> u32 {
    asm_r(rs, rt, rd, 0, 0x21)
}

pub const fn and(rd: u32, rs: u32, rt: u32) -> u32 {
    asm_r(rs, rt, rd, 0, 0x24)
}

pub const fn andi(rt: u32, rs: u32, imm: u32) -> u32 {
    asm_i(0x0c, rs, rt, imm)
}

pub const fn beq(rs: u32, rt: u32, target: u32) -> u32 {
    asm_i(0x04, rs, rt, target)
}

pub const fn b(target: u32) -> u32 {
    beq(ZERO, ZERO, target)
}

pub const fn beqz(rs: u32, target: u32) -> u32 {
    beq(rs, ZERO, target)
}

pub const fn bgtz(rs: u32, target: u32) -> u32 {
    asm_i(0x07, rs, 0, target)
}

pub const fn bne(rs: u32, rt: u32, target: u32) -> u32 {
    asm_i(0x05, rs, rt, target)
}

pub const fn bnez(rs: u32, target: u32) -> u32 {
    bne(rs, ZERO, target)
}

pub const fn bal(target: u32) -> u32 {
    // bgezal zero, target
    asm_i(0x01, ZERO, 0x11, target)
}

pub const fn j(addr: u32) -> u32 {
    asm_j(0x02, addr)
}

pub const fn jal(addr: u32) -> u32 {
    asm_j(0x03, addr)
}

pub const fn jalr(rs: u32) -> u32 {
    asm_r(rs, 0, RA, 0, 0x09)
}

pub const fn jr(rs: u32) -> u32 {
    asm_r(rs, 0, 0, 0, 0x08)
}

pub const fn lb(rt: u32, imm: u32, rs: u32) -> u32 {
    asm_i(0x20, rs, rt, imm)
}

pub const fn lbu(rt: u32, imm: u32, rs: u32) -> u32 {
    asm_i(0x24, rs, rt, imm)
}

pub const fn lui(rt: u32, imm: u32) -> u32 {
    asm_i(0x0f, 0, rt, imm)
}

pub const fn lw(rt: u32, imm: u32, rs: u32) -> u32 {
    asm_i(0x23, rs, rt, imm)
}

pub const fn li(rt: u32, imm32: u32) -> [u32; 2] {
    [lui(rt, imm32 >> 16), ori(rt, rt, imm32 & 0xffff)]
}

pub const fn mov(rt: u32, rs: u32) -> u32 {
    addu(rt, rs, ZERO)
}

pub const fn movn(rd: u32, rs: u32, rt: u32) -> u32 {
    asm_r(rs, rt, rd, 0, 0x0b)
}

pub const fn movz(rd: u32, rs: u32, rt: u32) -> u32 {
    asm_r(rs, rt, rd, 0, 0x0a)
}

pub const fn nop() -> u32 {
    0
}

pub const fn or(rd: u32, rs: u32, rt: u32) -> u32 {
    asm_r(rs, rt, rd, 0, 0x25)
}

pub const fn ori(rt: u32, rs: u32, imm: u32) -> u32 {
    asm_i(0x0d, rs, rt, imm)
}

pub const fn sb(rt: u32, imm: u32, rs: u32) -> u32 {
    asm_i(0x28, rs, rt, imm)
}

pub const fn sll(rd: u32, rt: u32, sa: u32) -> u32 {
    asm_r(0, rt, rd, sa, 0x00)
}

pub const fn slt(rd: u32, rs: u32, rt: u32) -> u32 {
    asm_r(rs, rt, rd, 0, 0x2a)
}

pub const fn sltiu(rt: u32, rs: u32, imm: u32) -> u32 {
    asm_i(0x0b, rs, rt, imm)
}

pub const fn srl(rd: u32, rt: u32, sa: u32) -> u32 {
    asm_r(0, rt, rd, sa, 0x02)
}

pub const fn subu(rd: u32, rs: u32, rt: u32) -> u32 {
    asm_r(rs, rt, rd, 0, 0x23)
}

pub const fn sw(rt: u32, imm: u32, rs: u32) -> u32 {
    asm_i(0x2b, rs, rt, imm)
}

/// A label definition: a dummy `addiu zero, zero` carrying the id, removed
/// by the resolver.
pub const fn label(id: u32) -> u32 {
    asm_i(LABEL_OPCODE, ZERO, ZERO, label_ref(id))
}

/// A label reference, usable as the target of any branch encoder.
pub const fn label_ref(id: u32) -> u32 {
    LABEL_MARKER | (id & LABEL_MASK)
}
