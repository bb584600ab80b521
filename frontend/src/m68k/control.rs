//! Branches, subroutine linkage, status register access and traps.

use jit68_backend::{AluOp, BitOp, CodeBuffer, HostCodeGen, HostCond, HostReg, Label, Mem, ShiftOp, Width};
use jit68_core::cpu::{
    guest_reg_offset, A0, CCR_N, CODE_DIRTY_OFFSET, IRQ_ACK_OFFSET, IRQ_OFFSET,
    IRQ_SHUTDOWN_OFFSET, SP, SR_CCR_MASK, SR_IPL_SHIFT, STOPPED_OFFSET, USP_OFFSET,
};
use jit68_core::exception::vector;
use jit68_core::{CcMask, Cond, ExitCode, Size};

use super::decode::{ArithKind, Ea, Op};
use super::ea::{self, env_mem, Addr, Arg, Pc};
use super::M68kDisasContext as Ctx;
use crate::DisasJumpType;

pub(super) fn translate<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    op: &Op,
) -> DisasJumpType {
    use Op::*;
    let pc = ctx.insn.pc;
    let next = ctx.insn.next_pc();
    match *op {
        Bcc { cond, target } => return bcc(ctx, buf, cond, target),
        Dbcc { cond, dn, target } => dbcc(ctx, buf, cond, dn, target),
        Scc { cond, dst } => scc(ctx, buf, cond, dst),
        Bsr { target } => {
            push_return(ctx, buf, next);
            ea::end_block(ctx, buf, Pc::Imm(target), ExitCode::Lookup);
            return DisasJumpType::NoReturn;
        }
        Jmp { ea } => {
            let target = ea::address(ctx, buf, ea);
            leave(ctx, buf, target);
            return DisasJumpType::NoReturn;
        }
        Jsr { ea } => {
            let target = match ea::address(ctx, buf, ea) {
                // Copied so pushing through A7 cannot disturb it.
                Addr::Reg(r) => Addr::Reg(ea::addr_temp(ctx, buf, Addr::Reg(r))),
                c @ Addr::Const(_) => c,
            };
            push_return(ctx, buf, next);
            leave(ctx, buf, target);
            return DisasJumpType::NoReturn;
        }
        Rts => return return_from(ctx, buf, 0),
        Rtd { disp } => return return_from(ctx, buf, disp),
        Rtr => return rtr(ctx, buf),
        MoveFromSr { dst } => read_sr(ctx, buf, dst, Width::W16),
        MoveFromCcr { dst } => read_sr(ctx, buf, dst, Width::W8),
        MoveToCcr { src } => {
            let s = ea::resolve(ctx, buf, src, Size::Word);
            let v = ea::load(ctx, buf, &s, Size::Word);
            ea::finish(ctx, buf, &s);
            let cg = ctx.cg;
            let [_, rcx] = cg.scratch_regs();
            ctx.flags.before_clobber(cg, buf);
            cg.mov_rr(buf, Width::W32, rcx, v);
            cg.alu_ri(buf, AluOp::And, Width::W32, rcx, SR_CCR_MASK as i32);
            cg.alu_ri(buf, AluOp::And, Width::W32, cg.sr_reg(), !(SR_CCR_MASK as i32));
            cg.alu_rr(buf, AluOp::Or, Width::W32, cg.sr_reg(), rcx);
            ctx.flags.wrote_sr(op.sets());
            ctx.alloc.release(v);
        }
        LogicCcr { op: kind, imm } => {
            let cg = ctx.cg;
            let imm = imm as u32 & SR_CCR_MASK;
            ctx.flags.before_clobber(cg, buf);
            let (aop, v) = match kind {
                ArithKind::And => (AluOp::And, imm | !SR_CCR_MASK),
                ArithKind::Or => (AluOp::Or, imm),
                _ => (AluOp::Xor, imm),
            };
            cg.alu_ri(buf, aop, Width::W32, cg.sr_reg(), v as i32);
            ctx.flags.wrote_sr(op.sets());
        }
        MoveToSr { src } => {
            let s = ea::resolve(ctx, buf, src, Size::Word);
            let v = ea::load(ctx, buf, &s, Size::Word);
            ea::finish(ctx, buf, &s);
            let t = ctx.alloc.alloc_temp(ctx.cg, buf);
            ctx.cg.extend(buf, t, v, Width::W16, false);
            ctx.alloc.release(v);
            write_sr(ctx, buf, t);
            ea::end_block(ctx, buf, Pc::Imm(next), ExitCode::Lookup);
            return DisasJumpType::NoReturn;
        }
        LogicSr { op: kind, imm } => {
            let cg = ctx.cg;
            ctx.flags.before_clobber(cg, buf);
            let t = ctx.alloc.alloc_temp(cg, buf);
            cg.mov_rr(buf, Width::W32, t, cg.sr_reg());
            let aop = match kind {
                ArithKind::And => AluOp::And,
                ArithKind::Or => AluOp::Or,
                _ => AluOp::Xor,
            };
            cg.alu_ri(buf, aop, Width::W32, t, imm as i32);
            write_sr(ctx, buf, t);
            ea::end_block(ctx, buf, Pc::Imm(next), ExitCode::Lookup);
            return DisasJumpType::NoReturn;
        }
        MoveUsp { to_usp, an } => {
            let cg = ctx.cg;
            let usp = env_mem(ctx, USP_OFFSET);
            if to_usp {
                let h = ctx.alloc.bind(cg, buf, A0 + an);
                cg.store(buf, Width::W32, h, usp);
            } else {
                let h = ctx.alloc.bind_for_write(cg, buf, A0 + an);
                cg.load(buf, Width::W32, h, usp);
                ctx.alloc.mark_dirty(A0 + an);
            }
        }
        Movec { to_ctrl, ctrl, reg } => {
            movec(ctx, buf, to_ctrl, ctrl, reg);
            return DisasJumpType::NoReturn;
        }
        Rte => {
            rte(ctx, buf);
            return DisasJumpType::NoReturn;
        }
        Stop { sr } => {
            let t = ctx.alloc.alloc_temp(ctx.cg, buf);
            ctx.cg.mov_ri(buf, t, sr as u32);
            write_sr(ctx, buf, t);
            ctx.cg.store_imm(buf, env_mem(ctx, STOPPED_OFFSET), 1);
            ea::end_block(ctx, buf, Pc::Imm(next), ExitCode::Stop);
            return DisasJumpType::NoReturn;
        }
        Reset => {
            ea::end_block(ctx, buf, Pc::Imm(next), ExitCode::Reset);
            return DisasJumpType::NoReturn;
        }
        Trap { vector: v } => return trap(ctx, buf, vector::TRAP_BASE + v, next),
        Trapv => {
            let cg = ctx.cg;
            let mut ok = Label::new();
            ctx.flags.require(cg, buf, op.uses());
            cg.jcc(buf, HostCond::NoOverflow, &mut ok);
            ea::raise(ctx, buf, Some(vector::TRAPV), next);
            cg.bind(buf, &mut ok);
        }
        Chk { size, src, dn } => chk(ctx, buf, size, src, dn),
        Illegal => return trap(ctx, buf, vector::ILLEGAL, pc),
        LineA => return trap(ctx, buf, vector::LINE_A, pc),
        LineF { fpu } => {
            if let Some(fpu) = fpu {
                tracing::warn!(
                    pc = format_args!("{pc:#x}"),
                    ?fpu,
                    "FPU instruction not emulated"
                );
            }
            return trap(ctx, buf, vector::LINE_F, pc);
        }
        _ => {
            tracing::error!(op = op.mnemonic(), "no emitter for instruction");
            return trap(ctx, buf, vector::ILLEGAL, pc);
        }
    }
    DisasJumpType::Next
}

/// Host condition equivalent to `cond` on flags produced by the
/// matching host operation. `None` for the constant conditions.
fn host_cond(cond: Cond) -> Option<HostCond> {
    Some(match cond {
        Cond::True | Cond::False => return None,
        Cond::Hi => HostCond::Above,
        Cond::Ls => HostCond::BelowEq,
        Cond::Cc => HostCond::AboveEq,
        Cond::Cs => HostCond::Below,
        Cond::Ne => HostCond::Ne,
        Cond::Eq => HostCond::Eq,
        Cond::Vc => HostCond::NoOverflow,
        Cond::Vs => HostCond::Overflow,
        Cond::Pl => HostCond::NoSign,
        Cond::Mi => HostCond::Sign,
        Cond::Ge => HostCond::GreaterEq,
        Cond::Lt => HostCond::Less,
        Cond::Gt => HostCond::Greater,
        Cond::Le => HostCond::LessEq,
    })
}

// ---------------------------------------------------------------
// Per-instruction checks
// ---------------------------------------------------------------

/// Raise a privilege violation unless S is set.
pub(super) fn privilege_check<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer) {
    let cg = ctx.cg;
    let mut ok = Label::new();
    let pc = ctx.insn.pc;
    ctx.flags.before_clobber(cg, buf);
    cg.bit_ri(buf, BitOp::Bt, cg.sr_reg(), 13);
    cg.jcc(buf, HostCond::Below, &mut ok);
    ea::raise(ctx, buf, Some(vector::PRIVILEGE), pc);
    cg.bind(buf, &mut ok);
    ctx.flags.clobbered();
}

/// Leave the block after a store that hit translated code.
pub(super) fn smc_check<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer) {
    let cg = ctx.cg;
    let mut dirty = Label::new();
    let mut clean = Label::new();
    cg.jnz_mem_keep_flags(buf, env_mem(ctx, CODE_DIRTY_OFFSET), &mut dirty);
    cg.jmp(buf, &mut clean);
    cg.bind(buf, &mut dirty);
    let next = ctx.insn.next_pc();
    ea::side_exit(ctx, buf, Pc::Imm(next), ExitCode::Lookup);
    cg.bind(buf, &mut clean);
}

// ---------------------------------------------------------------
// Branches
// ---------------------------------------------------------------

/// Backward edge of a folded branch: poll for interrupts, then jump
/// to the join point. The translation state is left as it was for the
/// fall-through path.
fn taken_path<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, target: u32) {
    let cg = ctx.cg;
    if ctx.join_label(target).is_none() {
        ea::side_exit(ctx, buf, Pc::Imm(target), ExitCode::Lookup);
        return;
    }
    let [rax, rcx] = cg.scratch_regs();
    let mut irq = Label::new();

    ctx.alloc.emit_writeback(cg, buf);
    ctx.flags.emit_materialize(cg, buf);

    cg.load(buf, Width::W64, rax, env_mem(ctx, IRQ_OFFSET));
    cg.alu_mi(buf, AluOp::Cmp, Width::W32, Mem::base(rax, IRQ_SHUTDOWN_OFFSET), 0);
    cg.jcc(buf, HostCond::Ne, &mut irq);
    cg.load(buf, Width::W32, rcx, Mem::base(rax, 0));
    cg.mov_rr(buf, Width::W32, rax, cg.sr_reg());
    cg.shift_ri(buf, ShiftOp::Shr, Width::W32, rax, SR_IPL_SHIFT as u8);
    cg.alu_ri(buf, AluOp::And, Width::W32, rax, 7);
    cg.alu_rr(buf, AluOp::Cmp, Width::W32, rcx, rax);
    cg.jcc(buf, HostCond::Above, &mut irq);
    // Level 7 ignores the mask but only fires on a new assertion.
    cg.alu_ri(buf, AluOp::Cmp, Width::W32, rcx, 7);
    if let Some(join) = ctx.join_label(target) {
        cg.jcc(buf, HostCond::Ne, join);
    }
    cg.alu_rm(buf, AluOp::Cmp, Width::W32, rcx, env_mem(ctx, IRQ_ACK_OFFSET));
    cg.jcc(buf, HostCond::Ne, &mut irq);
    if let Some(join) = ctx.join_label(target) {
        cg.jmp(buf, join);
    }

    cg.bind(buf, &mut irq);
    cg.mov_ri(buf, cg.pc_reg(), target);
    cg.exit(buf, ExitCode::Interrupt);
}

fn bcc<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    cond: Cond,
    target: u32,
) -> DisasJumpType {
    let cg = ctx.cg;
    let next = ctx.insn.next_pc();
    let hc = host_cond(cond);

    if ctx.plan.folded[ctx.idx] {
        return match hc {
            None if cond == Cond::True => {
                taken_path(ctx, buf, target);
                DisasJumpType::NoReturn
            }
            None => DisasJumpType::Next,
            Some(hc) => {
                let mut fall = Label::new();
                ctx.flags.require(cg, buf, cond.uses());
                cg.jcc(buf, hc.invert(), &mut fall);
                taken_path(ctx, buf, target);
                cg.bind(buf, &mut fall);
                DisasJumpType::Next
            }
        };
    }

    match hc {
        None if cond == Cond::True => {
            ea::end_block(ctx, buf, Pc::Imm(target), ExitCode::Lookup);
        }
        None => ea::end_block(ctx, buf, Pc::Imm(next), ExitCode::Lookup),
        Some(hc) => {
            let mut exit = Label::new();
            ctx.flags.require(cg, buf, cond.uses());
            ctx.alloc.flush_all(cg, buf);
            ctx.flags.materialize(cg, buf);
            cg.mov_ri(buf, cg.pc_reg(), target);
            cg.jcc(buf, hc, &mut exit);
            cg.mov_ri(buf, cg.pc_reg(), next);
            cg.bind(buf, &mut exit);
            cg.exit(buf, ExitCode::Lookup);
        }
    }
    DisasJumpType::NoReturn
}

/// DBcc: exit on `cond`, otherwise decrement the low word of `dn` and
/// branch unless it wrapped to -1.
fn dbcc<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, cond: Cond, dn: u8, target: u32) {
    if cond == Cond::True {
        return;
    }
    let cg = ctx.cg;
    let hc = host_cond(cond);
    if hc.is_some() {
        ctx.flags.require(cg, buf, cond.uses());
    }
    let h = ctx.alloc.bind(cg, buf, dn);
    ctx.alloc.mark_dirty(dn);

    if ctx.plan.folded[ctx.idx] {
        let mut done = Label::new();
        ctx.flags.materialize(cg, buf);
        if let Some(hc) = hc {
            cg.jcc(buf, hc, &mut done);
        }
        cg.alu_ri(buf, AluOp::Sub, Width::W16, h, 1);
        cg.jcc(buf, HostCond::Below, &mut done);
        ctx.flags.clobbered();
        taken_path(ctx, buf, target);
        cg.bind(buf, &mut done);
        return;
    }

    let next = ctx.insn.next_pc();
    let mut exit = Label::new();
    ctx.flags.materialize(cg, buf);
    cg.mov_ri(buf, cg.pc_reg(), next);
    if let Some(hc) = hc {
        cg.jcc(buf, hc, &mut exit);
    }
    cg.alu_ri(buf, AluOp::Sub, Width::W16, h, 1);
    cg.jcc(buf, HostCond::Below, &mut exit);
    cg.mov_ri(buf, cg.pc_reg(), target);
    cg.bind(buf, &mut exit);
    ctx.flags.clobbered();
    ctx.alloc.flush_all(cg, buf);
    cg.exit(buf, ExitCode::Lookup);
}

/// Scc: 0xFF when `cond` holds, else 0.
fn scc<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, cond: Cond, dst: Ea) {
    let cg = ctx.cg;
    let t = ctx.alloc.alloc_temp(cg, buf);
    match host_cond(cond) {
        None => cg.mov_ri(buf, t, if cond == Cond::True { 0xFF } else { 0 }),
        Some(hc) => {
            ctx.flags.require(cg, buf, cond.uses());
            cg.mov_ri(buf, t, 0);
            cg.setcc(buf, hc.invert(), t);
            cg.lea(buf, Width::W32, t, Mem::base(t, -1));
        }
    }
    let d = ea::resolve(ctx, buf, dst, Size::Byte);
    ea::store(ctx, buf, &d, Size::Byte, t, false);
    ea::finish(ctx, buf, &d);
    ctx.alloc.release(t);
}

// ---------------------------------------------------------------
// Subroutines
// ---------------------------------------------------------------

fn push_return<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, ret: u32) {
    let t = ctx.alloc.alloc_temp(ctx.cg, buf);
    ctx.cg.mov_ri(buf, t, ret);
    ea::push_long(ctx, buf, t);
    ctx.alloc.release(t);
}

fn leave<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, target: Addr) {
    match target {
        Addr::Const(a) => ea::end_block(ctx, buf, Pc::Imm(a), ExitCode::Lookup),
        Addr::Reg(r) => {
            ea::end_block(ctx, buf, Pc::Reg(r), ExitCode::Lookup);
            ctx.alloc.release(r);
        }
    }
}

/// RTS, and RTD with a nonzero `disp`.
fn return_from<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, disp: i32) -> DisasJumpType {
    let cg = ctx.cg;
    let t = ctx.alloc.alloc_temp(cg, buf);
    ea::pop(ctx, buf, Size::Long, t);
    if disp != 0 {
        let sp = ctx.alloc.bind(cg, buf, SP);
        cg.lea(buf, Width::W32, sp, Mem::base(sp, disp));
        ctx.alloc.mark_dirty(SP);
    }
    leave(ctx, buf, Addr::Reg(t));
    DisasJumpType::NoReturn
}

fn rtr<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer) -> DisasJumpType {
    let cg = ctx.cg;
    let t = ctx.alloc.alloc_temp(cg, buf);
    ea::pop(ctx, buf, Size::Word, t);
    ctx.flags.before_clobber(cg, buf);
    cg.alu_ri(buf, AluOp::And, Width::W32, t, SR_CCR_MASK as i32);
    cg.alu_ri(buf, AluOp::And, Width::W32, cg.sr_reg(), !(SR_CCR_MASK as i32));
    cg.alu_rr(buf, AluOp::Or, Width::W32, cg.sr_reg(), t);
    ctx.flags.wrote_sr(ctx.insn.op.sets());
    ea::pop(ctx, buf, Size::Long, t);
    leave(ctx, buf, Addr::Reg(t));
    DisasJumpType::NoReturn
}

// ---------------------------------------------------------------
// Status register
// ---------------------------------------------------------------

/// MOVE from SR or CCR.
fn read_sr<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, dst: Ea, w: Width) {
    let cg = ctx.cg;
    ctx.flags.materialize(cg, buf);
    let t = ctx.alloc.alloc_temp(cg, buf);
    cg.extend(buf, t, cg.sr_reg(), w, false);
    let d = ea::resolve(ctx, buf, dst, Size::Word);
    ea::store(ctx, buf, &d, Size::Word, t, false);
    ea::finish(ctx, buf, &d);
    ctx.alloc.release(t);
}

/// Replace the whole SR with the value in temp `t` through the
/// runtime, which also switches stacks. Releases `t`.
fn write_sr<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, t: HostReg) {
    let cg = ctx.cg;
    ctx.flags.before_clobber(cg, buf);
    ctx.flags.materialize(cg, buf);
    ctx.alloc.flush_all(cg, buf);
    let set_sr = ctx.helpers.set_sr;
    ea::call_helper(ctx, buf, set_sr, &[Arg::Reg(t)], true);
    ctx.alloc.release(t);
    ctx.flags.wrote_sr(CcMask::ALL);
}

fn movec<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, to_ctrl: bool, ctrl: u16, reg: u8) {
    let cg = ctx.cg;
    let [rax, _] = cg.scratch_regs();
    ctx.flags.materialize(cg, buf);
    ctx.alloc.flush_all(cg, buf);
    let slot = env_mem(ctx, guest_reg_offset(reg));
    let value = if to_ctrl {
        let t = ctx.alloc.alloc_temp(cg, buf);
        cg.load(buf, Width::W32, t, slot);
        Some(t)
    } else {
        None
    };
    let movec = ctx.helpers.movec;
    let args = [
        Arg::Imm(to_ctrl as u32),
        Arg::Imm(ctrl as u32),
        value.map_or(Arg::Imm(0), Arg::Reg),
    ];
    ea::call_helper(ctx, buf, movec, &args, true);
    if let Some(t) = value {
        ctx.alloc.release(t);
    }
    ctx.flags.clobbered();
    // An unknown control register is an illegal instruction.
    let pc = ctx.insn.pc;
    ea::check_exception(ctx, buf, pc);
    if !to_ctrl {
        cg.store(buf, Width::W32, rax, slot);
    }
    let next = ctx.insn.next_pc();
    ea::end_block(ctx, buf, Pc::Imm(next), ExitCode::Lookup);
}

fn rte<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer) {
    let cg = ctx.cg;
    let [rax, _] = cg.scratch_regs();
    ctx.flags.materialize(cg, buf);
    ctx.alloc.flush_all(cg, buf);
    let rte = ctx.helpers.rte;
    ea::call_helper(ctx, buf, rte, &[], true);
    ctx.flags.wrote_sr(CcMask::ALL);
    cg.mov_rr(buf, Width::W32, cg.pc_reg(), rax);
    // A bad frame format leaves SR and the stack alone.
    let pc = ctx.insn.pc;
    ea::check_exception(ctx, buf, pc);
    cg.exit(buf, ExitCode::Lookup);
}

// ---------------------------------------------------------------
// Traps
// ---------------------------------------------------------------

fn trap<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, v: u8, stacked_pc: u32) -> DisasJumpType {
    let cg = ctx.cg;
    ctx.alloc.flush_all(cg, buf);
    ctx.flags.materialize(cg, buf);
    ea::raise(ctx, buf, Some(v), stacked_pc);
    DisasJumpType::NoReturn
}

/// CHK: trap when `dn` is negative or above the bound.
fn chk<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, size: Size, src: Ea, dn: u8) {
    let s = ea::resolve(ctx, buf, src, size);
    let bound = ea::load(ctx, buf, &s, size);
    ea::finish(ctx, buf, &s);
    let cg = ctx.cg;
    let h = ctx.alloc.bind(cg, buf, dn);
    let w = Width::from(size);
    let next = ctx.insn.next_pc();
    let mut neg = Label::new();
    let mut over = Label::new();
    let mut ok = Label::new();

    ctx.flags.before_clobber(cg, buf);
    cg.test_rr(buf, w, h, h);
    cg.jcc(buf, HostCond::Sign, &mut neg);
    cg.alu_rr(buf, AluOp::Cmp, w, h, bound);
    cg.jcc(buf, HostCond::Greater, &mut over);
    cg.jmp(buf, &mut ok);

    cg.bind(buf, &mut neg);
    cg.alu_ri(buf, AluOp::Or, Width::W32, cg.sr_reg(), CCR_N as i32);
    ea::raise(ctx, buf, Some(vector::CHK), next);
    cg.bind(buf, &mut over);
    cg.alu_ri(buf, AluOp::And, Width::W32, cg.sr_reg(), !(CCR_N as i32));
    ea::raise(ctx, buf, Some(vector::CHK), next);

    cg.bind(buf, &mut ok);
    ctx.alloc.release(bound);
    ctx.flags.clobbered();
}
