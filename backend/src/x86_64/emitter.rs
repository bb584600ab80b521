#![allow(non_upper_case_globals)]

use crate::code_buffer::CodeBuffer;
use crate::x86_64::regs::Reg;
use crate::{AluOp, BitOp, HostCond, Mem, ShiftOp, Width};

// -- Prefix flags --

pub const P_EXT: u32 = 0x100; // 0x0F prefix
pub const P_DATA16: u32 = 0x400; // 0x66 prefix
pub const P_REXW: u32 = 0x1000; // REX.W = 1
pub const P_REXB_R: u32 = 0x2000; // REG field as byte register
pub const P_REXB_RM: u32 = 0x4000; // R/M field as byte register

// -- Opcode constants (OPC_*) --

// Arithmetic
pub const OPC_ARITH_EbIb: u32 = 0x80;
pub const OPC_ARITH_EvIz: u32 = 0x81;
pub const OPC_ARITH_EvIb: u32 = 0x83;
pub const OPC_ARITH_GvEv: u32 = 0x03;

// Shift
pub const OPC_SHIFT_1: u32 = 0xD1;
pub const OPC_SHIFT_Ib: u32 = 0xC1;

// Data movement
pub const OPC_MOVL_EvGv: u32 = 0x89;
pub const OPC_MOVL_GvEv: u32 = 0x8B;
pub const OPC_MOVL_EvIz: u32 = 0xC7;
pub const OPC_MOVL_Iv: u32 = 0xB8;

// Extensions
pub const OPC_MOVZBL: u32 = 0xB6 | P_EXT | P_REXB_RM;
pub const OPC_MOVZWL: u32 = 0xB7 | P_EXT;
pub const OPC_MOVSBL: u32 = 0xBE | P_EXT | P_REXB_RM;
pub const OPC_MOVSWL: u32 = 0xBF | P_EXT;

// Branch
pub const OPC_JCC_long: u32 = 0x80 | P_EXT;
pub const OPC_JMP_long: u32 = 0xE9;
pub const OPC_JRCXZ: u32 = 0xE3;

// Bit operations
pub const OPC_BSWAP: u32 = 0xC8 | P_EXT;
pub const OPC_BT_EvGv: u32 = 0xA3 | P_EXT;

// Compare / conditional
pub const OPC_SETCC: u32 = 0x90 | P_EXT | P_REXB_RM;
pub const OPC_TESTL: u32 = 0x85;

// Group opcodes
pub const OPC_GRP3_Ev: u32 = 0xF7;
pub const OPC_GRP5: u32 = 0xFF;
pub const OPC_GRPBT: u32 = 0xBA | P_EXT;

// Misc
pub const OPC_LEA: u32 = 0x8D;
pub const OPC_PUSH_r32: u32 = 0x50;
pub const OPC_POP_r32: u32 = 0x58;
pub const OPC_PUSHF: u32 = 0x9C;
pub const OPC_POPF: u32 = 0x9D;
pub const OPC_RET: u32 = 0xC3;

/// Group 3 extension codes (used in /r field of 0xF7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ext3Op {
    Test = 0,
    Not = 2,
    Neg = 3,
}

/// Group 5 extension codes (used in /r field of 0xFF).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ext5Op {
    CallN = 2,
    JmpN = 4,
}

// -- Core encoding functions --

/// Select the opcode variant for an operand width.
///
/// Works for the classic "Ev" opcodes whose byte form sits one below
/// (0x01/0x03/0x85/0x89/0x8B/0xC1/0xC7/0xD1/0xF7).
#[inline]
fn sized(opc: u32, w: Width) -> u32 {
    match w {
        Width::W8 => (opc - 1) | P_REXB_R | P_REXB_RM,
        Width::W16 => opc | P_DATA16,
        Width::W32 => opc,
        Width::W64 => opc | P_REXW,
    }
}

fn emit_prefixes(buf: &mut CodeBuffer, opc: u32, rex: u8) {
    if opc & P_DATA16 != 0 {
        buf.emit_u8(0x66);
    }
    if rex != 0 {
        buf.emit_u8(0x40 | rex);
    }
    if opc & P_EXT != 0 {
        buf.emit_u8(0x0F);
    }
    buf.emit_u8(opc as u8);
}

/// Emit opcode with REX prefix. `r` is the reg field, `rm` is the r/m field.
/// Both are raw register numbers (0-15). Pass 0 for unused fields.
pub fn emit_opc(buf: &mut CodeBuffer, opc: u32, r: u8, rm: u8) {
    emit_opc_3(buf, opc, r, rm, 0);
}

/// Emit opcode with REX prefix, 3-register variant (r, rm, index).
///
/// Byte-register flags force an empty REX so that encodings 4-7
/// select SPL/BPL/SIL/DIL rather than AH/CH/DH/BH.
fn emit_opc_3(buf: &mut CodeBuffer, opc: u32, r: u8, rm: u8, index: u8) {
    let mut rex: u8 = 0;
    if opc & P_REXW != 0 {
        rex |= 0x08;
    }
    if r >= 8 {
        rex |= 0x04;
    }
    if index >= 8 {
        rex |= 0x02;
    }
    if rm >= 8 {
        rex |= 0x01;
    }
    let byte_r = opc & P_REXB_R != 0 && (4..8).contains(&r);
    let byte_rm = opc & P_REXB_RM != 0 && (4..8).contains(&rm);
    if rex == 0 && (byte_r || byte_rm) {
        rex = 0x40;
    }
    emit_prefixes(buf, opc, rex);
}

/// Emit opcode + ModR/M for register-register operation.
pub fn emit_modrm(buf: &mut CodeBuffer, opc: u32, r: Reg, rm: Reg) {
    emit_opc(buf, opc, r as u8, rm as u8);
    buf.emit_u8(0xC0 | (r.low3() << 3) | rm.low3());
}

/// Emit opcode + ModR/M with /r extension (for group opcodes).
pub fn emit_modrm_ext(buf: &mut CodeBuffer, opc: u32, ext: u8, rm: Reg) {
    emit_opc(buf, opc, ext, rm as u8);
    buf.emit_u8(0xC0 | (ext << 3) | rm.low3());
}

/// Emit opcode + ModR/M (+ SIB) + displacement for a memory operand.
/// `r` is a register number or a /r extension.
///
/// RBP/R13 as base need an explicit disp8; RSP/R12 need a SIB byte.
pub fn emit_modrm_mem(buf: &mut CodeBuffer, opc: u32, r: u8, m: &Mem) {
    let base = Reg::from_u8(m.base);
    let r3 = r & 7;
    let b3 = base.low3();
    let (mode, disp_len) = if m.disp == 0 && b3 != 5 {
        (0x00, 0)
    } else if (-128..=127).contains(&m.disp) {
        (0x40, 1)
    } else {
        (0x80, 4)
    };

    match m.index {
        None => {
            emit_opc(buf, opc, r, base as u8);
            if b3 == 4 {
                buf.emit_u8(mode | (r3 << 3) | 0x04);
                buf.emit_u8(0x24);
            } else {
                buf.emit_u8(mode | (r3 << 3) | b3);
            }
        }
        Some(index) => {
            let index = Reg::from_u8(index);
            debug_assert!(index != Reg::Rsp, "rsp cannot be an index");
            emit_opc_3(buf, opc, r, base as u8, index as u8);
            buf.emit_u8(mode | (r3 << 3) | 0x04);
            buf.emit_u8((m.shift << 6) | (index.low3() << 3) | b3);
        }
    }
    match disp_len {
        1 => buf.emit_u8(m.disp as u8),
        4 => buf.emit_u32(m.disp as u32),
        _ => {}
    }
}

// -- Arithmetic instructions --

/// Emit arithmetic reg, reg (ADD/SUB/AND/OR/XOR/CMP/ADC/SBB).
pub fn emit_arith_rr(buf: &mut CodeBuffer, op: AluOp, w: Width, dst: Reg, src: Reg) {
    let opc = sized(OPC_ARITH_GvEv + ((op as u32) << 3), w);
    emit_modrm(buf, opc, dst, src);
}

fn emit_arith_imm(buf: &mut CodeBuffer, w: Width, imm: i32, emit: impl FnOnce(&mut CodeBuffer, u32)) {
    match w {
        Width::W8 => {
            emit(buf, OPC_ARITH_EbIb | P_REXB_RM);
            buf.emit_u8(imm as u8);
        }
        _ if (-128..=127).contains(&imm) => {
            emit(buf, sized(OPC_ARITH_EvIb, w));
            buf.emit_u8(imm as u8);
        }
        Width::W16 => {
            emit(buf, OPC_ARITH_EvIz | P_DATA16);
            buf.emit_u16(imm as u16);
        }
        _ => {
            emit(buf, sized(OPC_ARITH_EvIz, w));
            buf.emit_u32(imm as u32);
        }
    }
}

/// Emit arithmetic reg, imm (auto-selects imm8 vs full immediate).
pub fn emit_arith_ri(buf: &mut CodeBuffer, op: AluOp, w: Width, dst: Reg, imm: i32) {
    emit_arith_imm(buf, w, imm, |buf, opc| emit_modrm_ext(buf, opc, op as u8, dst));
}

/// Emit arithmetic reg, mem (load-op).
pub fn emit_arith_rm(buf: &mut CodeBuffer, op: AluOp, w: Width, dst: Reg, m: &Mem) {
    let opc = sized(OPC_ARITH_GvEv + ((op as u32) << 3), w);
    emit_modrm_mem(buf, opc, dst as u8, m);
}

/// Emit arithmetic mem, imm.
pub fn emit_arith_mi(buf: &mut CodeBuffer, op: AluOp, w: Width, m: &Mem, imm: i32) {
    emit_arith_imm(buf, w, imm, |buf, opc| {
        emit_modrm_mem(buf, opc & !P_REXB_RM, op as u8, m)
    });
}

pub fn emit_neg(buf: &mut CodeBuffer, w: Width, reg: Reg) {
    emit_modrm_ext(buf, sized(OPC_GRP3_Ev, w), Ext3Op::Neg as u8, reg);
}

pub fn emit_not(buf: &mut CodeBuffer, w: Width, reg: Reg) {
    emit_modrm_ext(buf, sized(OPC_GRP3_Ev, w), Ext3Op::Not as u8, reg);
}

pub fn emit_test_rr(buf: &mut CodeBuffer, w: Width, r1: Reg, r2: Reg) {
    emit_modrm(buf, sized(OPC_TESTL, w), r1, r2);
}

/// Emit TEST reg, imm with an immediate of the operand width.
pub fn emit_test_ri(buf: &mut CodeBuffer, w: Width, reg: Reg, imm: u32) {
    emit_modrm_ext(buf, sized(OPC_GRP3_Ev, w), Ext3Op::Test as u8, reg);
    match w {
        Width::W8 => buf.emit_u8(imm as u8),
        Width::W16 => buf.emit_u16(imm as u16),
        _ => buf.emit_u32(imm),
    }
}

// -- Shift instructions --

/// Emit shift reg, imm8.
pub fn emit_shift_ri(buf: &mut CodeBuffer, op: ShiftOp, w: Width, dst: Reg, imm: u8) {
    if imm == 1 {
        emit_modrm_ext(buf, sized(OPC_SHIFT_1, w), op as u8, dst);
    } else {
        emit_modrm_ext(buf, sized(OPC_SHIFT_Ib, w), op as u8, dst);
        buf.emit_u8(imm);
    }
}

// -- Data movement --

pub fn emit_mov_rr(buf: &mut CodeBuffer, w: Width, dst: Reg, src: Reg) {
    emit_modrm(buf, sized(OPC_MOVL_EvGv, w), src, dst);
}

/// Emit MOV r32, imm32. Zero is loaded with a plain move as well so
/// the host flags survive.
pub fn emit_mov_ri(buf: &mut CodeBuffer, reg: Reg, val: u32) {
    emit_opc(buf, OPC_MOVL_Iv + (reg.low3() as u32), 0, reg as u8);
    buf.emit_u32(val);
}

pub fn emit_mov_ri64(buf: &mut CodeBuffer, reg: Reg, val: u64) {
    if val <= u32::MAX as u64 {
        emit_mov_ri(buf, reg, val as u32);
    } else {
        emit_opc(buf, (OPC_MOVL_Iv + (reg.low3() as u32)) | P_REXW, 0, reg as u8);
        buf.emit_u64(val);
    }
}

/// Emit MOVZX/MOVSX from an 8- or 16-bit register into a 32-bit one.
pub fn emit_extend(buf: &mut CodeBuffer, dst: Reg, src: Reg, from: Width, signed: bool) {
    let opc = match (from, signed) {
        (Width::W8, false) => OPC_MOVZBL,
        (Width::W8, true) => OPC_MOVSBL,
        (Width::W16, false) => OPC_MOVZWL,
        (Width::W16, true) => OPC_MOVSWL,
        _ => {
            emit_mov_rr(buf, Width::W32, dst, src);
            return;
        }
    };
    emit_modrm(buf, opc, dst, src);
}

/// Emit BSWAP r32.
pub fn emit_bswap(buf: &mut CodeBuffer, reg: Reg) {
    // BSWAP encodes register in the opcode byte: 0F C8+rd
    emit_opc(buf, OPC_BSWAP + reg.low3() as u32, 0, reg as u8);
}

// -- Memory operations --

/// Zero-extending load of `w` bits.
pub fn emit_load(buf: &mut CodeBuffer, w: Width, dst: Reg, m: &Mem) {
    let opc = match w {
        Width::W8 => OPC_MOVZBL & !P_REXB_RM,
        Width::W16 => OPC_MOVZWL,
        Width::W32 => OPC_MOVL_GvEv,
        Width::W64 => OPC_MOVL_GvEv | P_REXW,
    };
    emit_modrm_mem(buf, opc, dst as u8, m);
}

pub fn emit_store(buf: &mut CodeBuffer, w: Width, src: Reg, m: &Mem) {
    emit_modrm_mem(buf, sized(OPC_MOVL_EvGv, w) & !P_REXB_RM, src as u8, m);
}

/// Emit MOV dword [mem], imm32.
pub fn emit_store_imm(buf: &mut CodeBuffer, m: &Mem, imm: u32) {
    emit_modrm_mem(buf, OPC_MOVL_EvIz, 0, m);
    buf.emit_u32(imm);
}

pub fn emit_lea(buf: &mut CodeBuffer, rexw: bool, dst: Reg, m: &Mem) {
    let opc = if rexw { OPC_LEA | P_REXW } else { OPC_LEA };
    emit_modrm_mem(buf, opc, dst as u8, m);
}

// -- Bit operations --

/// Emit BT/BTS/BTR/BTC r32, imm8.
pub fn emit_bit_ri(buf: &mut CodeBuffer, op: BitOp, reg: Reg, bit: u8) {
    emit_modrm_ext(buf, OPC_GRPBT, op as u8, reg);
    buf.emit_u8(bit);
}

/// Emit BT/BTS/BTR/BTC r32, r32.
pub fn emit_bit_rr(buf: &mut CodeBuffer, op: BitOp, reg: Reg, bit: Reg) {
    let opc = OPC_BT_EvGv + (((op as u32) - BitOp::Bt as u32) << 3);
    emit_modrm(buf, opc, bit, reg);
}

// -- Branches and comparisons --

/// Emit Jcc rel32 to a known offset.
pub fn emit_jcc(buf: &mut CodeBuffer, cond: HostCond, target_offset: usize) {
    emit_opc(buf, OPC_JCC_long + (cond as u32), 0, 0);
    let after = buf.offset() + 4;
    let disp = target_offset as i64 - after as i64;
    buf.emit_u32(disp as u32);
}

/// Emit JMP rel32 to a known offset.
pub fn emit_jmp(buf: &mut CodeBuffer, target_offset: usize) {
    buf.emit_u8(OPC_JMP_long as u8);
    let after = buf.offset() + 4;
    let disp = target_offset as i64 - after as i64;
    buf.emit_u32(disp as u32);
}

/// Emit indirect JMP through register.
pub fn emit_jmp_reg(buf: &mut CodeBuffer, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP5, Ext5Op::JmpN as u8, reg);
}

/// Emit indirect CALL through register.
pub fn emit_call_reg(buf: &mut CodeBuffer, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP5, Ext5Op::CallN as u8, reg);
}

/// Emit SETcc dst (set byte on condition).
pub fn emit_setcc(buf: &mut CodeBuffer, cond: HostCond, dst: Reg) {
    emit_modrm_ext(buf, OPC_SETCC + (cond as u32), 0, dst);
}

// -- Stack --

pub fn emit_push(buf: &mut CodeBuffer, reg: Reg) {
    emit_opc(buf, OPC_PUSH_r32 + (reg.low3() as u32), 0, reg as u8);
}

pub fn emit_pop(buf: &mut CodeBuffer, reg: Reg) {
    emit_opc(buf, OPC_POP_r32 + (reg.low3() as u32), 0, reg as u8);
}

pub fn emit_pushf(buf: &mut CodeBuffer) {
    buf.emit_u8(OPC_PUSHF as u8);
}

pub fn emit_popf(buf: &mut CodeBuffer) {
    buf.emit_u8(OPC_POPF as u8);
}

pub fn emit_ret(buf: &mut CodeBuffer) {
    buf.emit_u8(OPC_RET as u8);
}
