use std::cell::Cell;

use crate::code_buffer::CodeBuffer;
use crate::label::{Label, RelocKind};
use crate::x86_64::emitter::*;
use crate::x86_64::regs::{
    self, Reg, ALLOCATABLE, CALLEE_SAVED, CALLER_SAVED, CALL_ARG_REGS, ENV_REG, PC_REG,
    SCRATCH, SPILL_SLOTS, SR_REG, STACK_ADDEND, STATIC_CALL_ARGS_SIZE,
};
use crate::{AluOp, BitOp, HostCodeGen, HostCond, HostReg, Mem, ShiftOp, Width};
use jit68_core::cpu::{PC_OFFSET, SR_OFFSET};
use jit68_core::{CcMask, ExitCode, RegSet};

const RFLAGS_CF: u16 = 1 << 0;
const RFLAGS_ZF: u16 = 1 << 6;
const RFLAGS_SF: u16 = 1 << 7;
const RFLAGS_OF: u16 = 1 << 11;
/// Bit 1 of RFLAGS always reads as one.
const RFLAGS_FIXED: u16 = 1 << 1;

const fn ccr_to_rflags(ccr: usize) -> u16 {
    let mut f = RFLAGS_FIXED;
    if ccr & 1 != 0 {
        f |= RFLAGS_CF;
    }
    if ccr & 2 != 0 {
        f |= RFLAGS_OF;
    }
    if ccr & 4 != 0 {
        f |= RFLAGS_ZF;
    }
    if ccr & 8 != 0 {
        f |= RFLAGS_SF;
    }
    f
}

/// RFLAGS image for every XNZVC combination; X has no host flag.
pub static CCR_TO_RFLAGS: [u16; 32] = {
    let mut t = [0u16; 32];
    let mut i = 0;
    while i < 32 {
        t[i] = ccr_to_rflags(i);
        i += 1;
    }
    t
};

/// x86-64 backend code generator.
pub struct X86_64CodeGen {
    pub prologue_offset: usize,
    pub tb_ret_offset: usize,
    pub code_gen_start: usize,
    insns: Cell<u64>,
}

impl X86_64CodeGen {
    pub fn new() -> Self {
        Self {
            prologue_offset: 0,
            tb_ret_offset: 0,
            code_gen_start: 0,
            insns: Cell::new(0),
        }
    }

    #[inline]
    fn count(&self, n: u64) {
        self.insns.set(self.insns.get() + n);
    }

    fn patch_rel32(buf: &mut CodeBuffer, field: usize, target: usize) {
        let disp = target as i64 - (field as i64 + 4);
        assert!(
            (i32::MIN as i64..=i32::MAX as i64).contains(&disp),
            "jump displacement out of i32 range"
        );
        buf.patch_u32(field, disp as u32);
    }
}

impl Default for X86_64CodeGen {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn r(n: HostReg) -> Reg {
    Reg::from_u8(n)
}

impl HostCodeGen for X86_64CodeGen {
    fn env_reg(&self) -> HostReg {
        ENV_REG as u8
    }

    fn sr_reg(&self) -> HostReg {
        SR_REG as u8
    }

    fn pc_reg(&self) -> HostReg {
        PC_REG as u8
    }

    fn stack_reg(&self) -> HostReg {
        Reg::Rsp as u8
    }

    fn scratch_regs(&self) -> [HostReg; 2] {
        [SCRATCH[0] as u8, SCRATCH[1] as u8]
    }

    fn allocatable_regs(&self) -> &'static [HostReg] {
        ALLOCATABLE
    }

    fn caller_saved(&self) -> RegSet {
        CALLER_SAVED
    }

    fn call_arg_regs(&self) -> &'static [HostReg] {
        CALL_ARG_REGS
    }

    fn return_reg(&self) -> HostReg {
        Reg::Rax as u8
    }

    fn spill_area(&self) -> (i32, usize) {
        (STATIC_CALL_ARGS_SIZE as i32, SPILL_SLOTS)
    }

    fn emit_prologue(&mut self, buf: &mut CodeBuffer) {
        self.prologue_offset = buf.offset();

        for &reg in CALLEE_SAVED {
            emit_push(buf, reg);
        }

        // mov rbp, rdi (first argument = guest state)
        emit_mov_rr(buf, Width::W64, ENV_REG, Reg::Rdi);
        emit_arith_ri(buf, AluOp::Sub, Width::W64, Reg::Rsp, STACK_ADDEND as i32);

        emit_load(buf, Width::W32, SR_REG, &Mem::base(ENV_REG as u8, SR_OFFSET as i32));
        emit_load(buf, Width::W32, PC_REG, &Mem::base(ENV_REG as u8, PC_OFFSET as i32));

        // jmp *rsi (second argument = unit host code)
        emit_jmp_reg(buf, Reg::Rsi);
    }

    fn emit_epilogue(&mut self, buf: &mut CodeBuffer) {
        // eax holds the exit code.
        self.tb_ret_offset = buf.offset();

        emit_store(buf, Width::W32, PC_REG, &Mem::base(ENV_REG as u8, PC_OFFSET as i32));
        emit_store(buf, Width::W32, SR_REG, &Mem::base(ENV_REG as u8, SR_OFFSET as i32));
        emit_arith_ri(buf, AluOp::Add, Width::W64, Reg::Rsp, STACK_ADDEND as i32);

        for &reg in CALLEE_SAVED.iter().rev() {
            emit_pop(buf, reg);
        }

        emit_ret(buf);
        self.code_gen_start = buf.offset();
    }

    fn epilogue_offset(&self) -> usize {
        self.tb_ret_offset
    }

    fn code_gen_start(&self) -> usize {
        self.code_gen_start
    }

    fn insn_count(&self) -> u64 {
        self.insns.get()
    }

    fn mov_rr(&self, buf: &mut CodeBuffer, w: Width, dst: HostReg, src: HostReg) {
        if dst == src && w != Width::W32 {
            return;
        }
        self.count(1);
        emit_mov_rr(buf, w, r(dst), r(src));
    }

    fn mov_ri(&self, buf: &mut CodeBuffer, dst: HostReg, imm: u32) {
        self.count(1);
        emit_mov_ri(buf, r(dst), imm);
    }

    fn mov_ri64(&self, buf: &mut CodeBuffer, dst: HostReg, imm: u64) {
        self.count(1);
        emit_mov_ri64(buf, r(dst), imm);
    }

    fn load(&self, buf: &mut CodeBuffer, w: Width, dst: HostReg, mem: Mem) {
        self.count(1);
        emit_load(buf, w, r(dst), &mem);
    }

    fn store(&self, buf: &mut CodeBuffer, w: Width, src: HostReg, mem: Mem) {
        self.count(1);
        emit_store(buf, w, r(src), &mem);
    }

    fn store_imm(&self, buf: &mut CodeBuffer, mem: Mem, imm: u32) {
        self.count(1);
        emit_store_imm(buf, &mem, imm);
    }

    fn lea(&self, buf: &mut CodeBuffer, w: Width, dst: HostReg, mem: Mem) {
        self.count(1);
        emit_lea(buf, w == Width::W64, r(dst), &mem);
    }

    fn extend(&self, buf: &mut CodeBuffer, dst: HostReg, src: HostReg, from: Width, signed: bool) {
        self.count(1);
        emit_extend(buf, r(dst), r(src), from, signed);
    }

    fn bswap(&self, buf: &mut CodeBuffer, w: Width, reg: HostReg) {
        self.count(1);
        match w {
            Width::W16 => emit_shift_ri(buf, ShiftOp::Rol, Width::W16, r(reg), 8),
            _ => emit_bswap(buf, r(reg)),
        }
    }

    fn alu_rr(&self, buf: &mut CodeBuffer, op: AluOp, w: Width, dst: HostReg, src: HostReg) {
        self.count(1);
        emit_arith_rr(buf, op, w, r(dst), r(src));
    }

    fn alu_ri(&self, buf: &mut CodeBuffer, op: AluOp, w: Width, dst: HostReg, imm: i32) {
        self.count(1);
        emit_arith_ri(buf, op, w, r(dst), imm);
    }

    fn alu_rm(&self, buf: &mut CodeBuffer, op: AluOp, w: Width, dst: HostReg, mem: Mem) {
        self.count(1);
        emit_arith_rm(buf, op, w, r(dst), &mem);
    }

    fn alu_mi(&self, buf: &mut CodeBuffer, op: AluOp, w: Width, mem: Mem, imm: i32) {
        self.count(1);
        emit_arith_mi(buf, op, w, &mem, imm);
    }

    fn test_rr(&self, buf: &mut CodeBuffer, w: Width, a: HostReg, b: HostReg) {
        self.count(1);
        emit_test_rr(buf, w, r(a), r(b));
    }

    fn test_ri(&self, buf: &mut CodeBuffer, w: Width, reg: HostReg, imm: u32) {
        self.count(1);
        emit_test_ri(buf, w, r(reg), imm);
    }

    fn neg(&self, buf: &mut CodeBuffer, w: Width, reg: HostReg) {
        self.count(1);
        emit_neg(buf, w, r(reg));
    }

    fn not(&self, buf: &mut CodeBuffer, w: Width, reg: HostReg) {
        self.count(1);
        emit_not(buf, w, r(reg));
    }

    fn shift_ri(&self, buf: &mut CodeBuffer, op: ShiftOp, w: Width, reg: HostReg, imm: u8) {
        self.count(1);
        emit_shift_ri(buf, op, w, r(reg), imm);
    }

    fn bit_ri(&self, buf: &mut CodeBuffer, op: BitOp, reg: HostReg, bit: u8) {
        self.count(1);
        emit_bit_ri(buf, op, r(reg), bit);
    }

    fn bit_rr(&self, buf: &mut CodeBuffer, op: BitOp, reg: HostReg, bit: HostReg) {
        self.count(1);
        emit_bit_rr(buf, op, r(reg), r(bit));
    }

    fn setcc(&self, buf: &mut CodeBuffer, cond: HostCond, dst: HostReg) {
        self.count(1);
        emit_setcc(buf, cond, r(dst));
    }

    fn save_flags(&self, buf: &mut CodeBuffer, dst: HostReg) {
        self.count(2);
        emit_pushf(buf);
        emit_pop(buf, r(dst));
    }

    fn restore_flags(&self, buf: &mut CodeBuffer, src: HostReg) {
        self.count(2);
        emit_push(buf, r(src));
        emit_popf(buf);
    }

    fn ccr_from_flags(&self, buf: &mut CodeBuffer, mask: CcMask) {
        let [flags, tmp] = SCRATCH;
        let keep = !(mask.raw() as u32 & 0x1F);
        self.save_flags(buf, flags as u8);
        self.count(1);
        emit_arith_ri(buf, AluOp::And, Width::W32, SR_REG, keep as i32);

        // (mask bits, right shift, left shift) per RFLAGS field group
        let mut fold = |bits: u8, shr: u8, shl: u8| {
            let bits = mask.raw() & bits;
            if bits == 0 {
                return;
            }
            self.count(3);
            emit_mov_rr(buf, Width::W32, tmp, flags);
            if shr != 0 {
                self.count(1);
                emit_shift_ri(buf, ShiftOp::Shr, Width::W32, tmp, shr);
            } else if shl != 0 {
                self.count(1);
                emit_shift_ri(buf, ShiftOp::Shl, Width::W32, tmp, shl);
            }
            emit_arith_ri(buf, AluOp::And, Width::W32, tmp, bits as i32);
            emit_arith_rr(buf, AluOp::Or, Width::W32, SR_REG, tmp);
        };
        fold(CcMask::C.raw(), 0, 0);
        fold(CcMask::V.raw(), 10, 0);
        fold(CcMask::Z.raw() | CcMask::N.raw(), 4, 0);
        fold(CcMask::X.raw(), 0, 4);
        self.restore_flags(buf, flags as u8);
    }

    fn flags_from_ccr(&self, buf: &mut CodeBuffer) {
        let [flags, table] = SCRATCH;
        self.count(5);
        emit_mov_rr(buf, Width::W32, flags, SR_REG);
        emit_arith_ri(buf, AluOp::And, Width::W32, flags, 0x1F);
        emit_mov_ri64(buf, table, CCR_TO_RFLAGS.as_ptr() as u64);
        emit_load(
            buf,
            Width::W16,
            flags,
            &Mem::indexed(table as u8, flags as u8, 1, 0),
        );
        self.restore_flags(buf, flags as u8);
    }

    fn jcc(&self, buf: &mut CodeBuffer, cond: HostCond, label: &mut Label) {
        self.count(1);
        match label.value() {
            Some(target) => emit_jcc(buf, cond, target),
            None => {
                emit_opc(buf, OPC_JCC_long + (cond as u32), 0, 0);
                label.add_use(buf.offset(), RelocKind::Rel32);
                buf.emit_u32(0);
            }
        }
    }

    fn jmp(&self, buf: &mut CodeBuffer, label: &mut Label) {
        self.count(1);
        match label.value() {
            Some(target) => emit_jmp(buf, target),
            None => {
                buf.emit_u8(OPC_JMP_long as u8);
                label.add_use(buf.offset(), RelocKind::Rel32);
                buf.emit_u32(0);
            }
        }
    }

    fn jnz_mem_keep_flags(&self, buf: &mut CodeBuffer, mem: Mem, label: &mut Label) {
        self.count(2);
        // mov ecx, [mem]; jrcxz over a rel32 jmp
        emit_load(buf, Width::W32, SCRATCH[1], &mem);
        buf.emit_u8(OPC_JRCXZ as u8);
        buf.emit_u8(5);
        buf.emit_u8(OPC_JMP_long as u8);
        let field = buf.offset();
        buf.emit_u32(0);
        match label.value() {
            Some(target) => Self::patch_rel32(buf, field, target),
            None => label.add_use(field, RelocKind::Rel32),
        }
    }

    fn bind(&self, buf: &mut CodeBuffer, label: &mut Label) {
        let here = buf.offset();
        for u in label.set_value(here) {
            match u.kind {
                RelocKind::Rel32 => Self::patch_rel32(buf, u.offset, here),
            }
        }
    }

    fn call(&self, buf: &mut CodeBuffer, target: usize) {
        self.count(2);
        emit_mov_ri64(buf, Reg::Rax, target as u64);
        emit_call_reg(buf, Reg::Rax);
    }

    fn exit(&self, buf: &mut CodeBuffer, code: ExitCode) {
        self.count(2);
        emit_mov_ri(buf, Reg::Rax, code as u32);
        emit_jmp(buf, self.tb_ret_offset);
    }
}

const _: () = assert!(regs::FRAME_SIZE % regs::STACK_ALIGN == 0);
