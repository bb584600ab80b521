//! Data movement, arithmetic and logic.
//!
//! Instructions whose flags map onto the host ALU run inline and hand
//! their flags to the lazy model with `set_host`. Shifts, multiply,
//! divide and BCD go through [`helper_alu`](super::helpers::helper_alu),
//! which writes SR itself.

use jit68_backend::{AluOp, BitOp, CodeBuffer, HostCodeGen, HostCond, HostReg, Label, Mem, ShiftOp, Width};
use jit68_core::cpu::{A0, CCR_Z, HELPER_HI_OFFSET, SP};
use jit68_core::{CcMask, Size};

use super::control;
use super::decode::{ArithKind, BitKind, BitNum, Ea, Op, ShiftCount, ShiftKind};
use super::ea::{self, Addr, Arg, Loc, MemRef};
use super::helpers::AluHelper;
use super::M68kDisasContext as Ctx;
use crate::DisasJumpType;

/// Emit `op`. Control flow and system instructions are handed to
/// [`control`].
pub(super) fn translate<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    op: &Op,
) -> DisasJumpType {
    use Op::*;
    match *op {
        Move { size, src, dst } => mov(ctx, buf, size, src, dst),
        Movea { size, src, an } => movea(ctx, buf, size, src, an),
        Moveq { value, dn } => {
            let h = ctx.alloc.bind_for_write(ctx.cg, buf, dn);
            ctx.cg.mov_ri(buf, h, value);
            logic_flags(ctx, buf, Size::Long, h);
        }
        Movem {
            size,
            to_mem,
            mask,
            ea,
        } => movem(ctx, buf, size, to_mem, mask, ea),
        Movep {
            size,
            to_mem,
            dn,
            an,
            disp,
        } => movep(ctx, buf, size, to_mem, dn, an, disp),
        Lea { src, an } => lea(ctx, buf, src, an),
        Pea { src } => pea(ctx, buf, src),
        Exg { rx, ry } => {
            ctx.alloc.bind(ctx.cg, buf, rx);
            ctx.alloc.bind(ctx.cg, buf, ry);
            ctx.alloc.swap_bindings(rx, ry);
        }
        Swap { dn } => {
            let h = ctx.alloc.bind(ctx.cg, buf, dn);
            ctx.flags.before_clobber(ctx.cg, buf);
            ctx.cg.shift_ri(buf, ShiftOp::Rol, Width::W32, h, 16);
            ctx.alloc.mark_dirty(dn);
            logic_flags(ctx, buf, Size::Long, h);
        }
        Link { an, disp } => link(ctx, buf, an, disp),
        Unlk { an } => unlk(ctx, buf, an),
        Clr { size, dst } => clr(ctx, buf, size, dst),
        Ext {
            size,
            dn,
            from_byte,
        } => ext(ctx, buf, size, dn, from_byte),
        Arith { op, size, src, dst } => arith(ctx, buf, op, size, src, dst),
        ArithA { op, size, src, an } => arith_a(ctx, buf, op, size, src, an),
        ArithX {
            sub,
            size,
            mem,
            src,
            dst,
        } => arith_x(ctx, buf, sub, size, mem, src, dst),
        Cmpm { size, src, dst } => cmpm(ctx, buf, size, src, dst),
        Neg { size, dst, extend } => neg(ctx, buf, size, dst, extend),
        Not { size, dst } => not(ctx, buf, size, dst),
        Tst { size, src } => {
            let s = ea::resolve(ctx, buf, src, size);
            let v = ea::load(ctx, buf, &s, size);
            ea::finish(ctx, buf, &s);
            logic_flags(ctx, buf, size, v);
            ctx.alloc.release(v);
        }
        Mul {
            signed,
            long,
            src,
            dl,
            dh,
        } => mul(ctx, buf, signed, long, src, dl, dh),
        Div {
            signed,
            long,
            src,
            dq,
            dr,
            wide,
        } => div(ctx, buf, signed, long, src, dq, dr, wide),
        Shift {
            kind,
            left,
            size,
            count,
            dst,
        } => shift(ctx, buf, kind, left, size, count, dst),
        Bit { kind, bit, dst } => bit_op(ctx, buf, kind, bit, dst),
        Bcd { sub, mem, src, dst } => bcd(ctx, buf, sub, mem, src, dst),
        Nbcd { dst } => nbcd(ctx, buf, dst),
        Tas { dst } => tas(ctx, buf, dst),
        Nop => {}
        _ => return control::translate(ctx, buf, op),
    }
    DisasJumpType::Next
}

// ---------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Src {
    Reg(HostReg),
    Imm(i32),
}

fn alu<B: HostCodeGen>(cg: &B, buf: &mut CodeBuffer, op: AluOp, w: Width, dst: HostReg, src: Src) {
    match src {
        Src::Reg(r) => cg.alu_rr(buf, op, w, dst, r),
        Src::Imm(i) => cg.alu_ri(buf, op, w, dst, i),
    }
}

fn skip_flags<B: HostCodeGen>(ctx: &mut Ctx<'_, B>) {
    let sets = ctx.insn.op.sets();
    ctx.flags.skip(sets);
}

/// N and Z from `v`, V and C clear.
fn logic_flags<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, size: Size, v: HostReg) {
    if ctx.wanted.is_empty() {
        skip_flags(ctx);
        return;
    }
    let cg = ctx.cg;
    ctx.flags.before_clobber(cg, buf);
    cg.test_rr(buf, size.into(), v, v);
    ctx.flags.set_host(cg, buf, CcMask::NZVC, ctx.wanted);
}

/// Destination value for a read-modify-write operand: the binding
/// itself for registers, a temp for memory.
fn rmw_value<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, d: &Loc, size: Size) -> HostReg {
    match *d {
        Loc::Reg(g) => ctx.alloc.bind(ctx.cg, buf, g),
        _ => ea::load(ctx, buf, d, size),
    }
}

/// Complete a read-modify-write started with [`rmw_value`].
fn rmw_done<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    d: &Loc,
    size: Size,
    v: HostReg,
    keep_flags: bool,
) {
    match *d {
        Loc::Reg(g) => ctx.alloc.mark_dirty(g),
        _ => ea::store(ctx, buf, d, size, v, keep_flags),
    }
    ea::finish(ctx, buf, d);
    ctx.alloc.release(v);
}

fn call_alu<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, op: AluHelper, size: Size, src: Arg, dst: HostReg) {
    let alu = ctx.helpers.alu;
    ea::call_helper(ctx, buf, alu, &[Arg::Imm(op.encode(size)), src, Arg::Reg(dst)], true);
}

/// Operands of the register and `-(Ay),-(Ax)` pair forms.
fn pair<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    mem: bool,
    size: Size,
    src: u8,
    dst: u8,
) -> (HostReg, Loc) {
    if mem {
        let s = ea::resolve(ctx, buf, Ea::PreDec(src), size);
        let sv = ea::load(ctx, buf, &s, size);
        ea::finish(ctx, buf, &s);
        (sv, ea::resolve(ctx, buf, Ea::PreDec(dst), size))
    } else {
        (ctx.alloc.bind(ctx.cg, buf, src), Loc::Reg(dst))
    }
}

// ---------------------------------------------------------------
// Data movement
// ---------------------------------------------------------------

fn mov<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, size: Size, src: Ea, dst: Ea) {
    let s = ea::resolve(ctx, buf, src, size);
    let mut v = ea::load(ctx, buf, &s, size);
    ea::finish(ctx, buf, &s);
    // MOVE An,-(An) and MOVE An,(An)+ store the value An had before.
    if let (Loc::Reg(g), Ea::PreDec(n) | Ea::PostInc(n)) = (s, dst) {
        if g == A0 + n {
            let t = ctx.alloc.alloc_temp(ctx.cg, buf);
            ctx.cg.mov_rr(buf, Width::W32, t, v);
            v = t;
        }
    }
    let d = ea::resolve(ctx, buf, dst, size);
    ea::store(ctx, buf, &d, size, v, false);
    ea::finish(ctx, buf, &d);
    logic_flags(ctx, buf, size, v);
    ctx.alloc.release(v);
}

fn movea<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, size: Size, src: Ea, an: u8) {
    let cg = ctx.cg;
    let s = ea::resolve(ctx, buf, src, size);
    let v = ea::load(ctx, buf, &s, size);
    ea::finish(ctx, buf, &s);
    let h = ctx.alloc.bind_for_write(cg, buf, A0 + an);
    if size == Size::Word {
        cg.extend(buf, h, v, Width::W16, true);
    } else {
        cg.mov_rr(buf, Width::W32, h, v);
    }
    ctx.alloc.release(v);
}

fn lea<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, src: Ea, an: u8) {
    let cg = ctx.cg;
    let addr = ea::address(ctx, buf, src);
    let h = ctx.alloc.bind_for_write(cg, buf, A0 + an);
    match addr {
        Addr::Reg(r) => {
            cg.mov_rr(buf, Width::W32, h, r);
            ctx.alloc.release(r);
        }
        Addr::Const(a) => cg.mov_ri(buf, h, a),
    }
}

fn pea<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, src: Ea) {
    let addr = ea::address(ctx, buf, src);
    let t = ea::addr_temp(ctx, buf, addr);
    ea::push_long(ctx, buf, t);
    ctx.alloc.release(t);
}

fn movem<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    size: Size,
    to_mem: bool,
    mask: u16,
    ea: Ea,
) {
    let cg = ctx.cg;
    let step = size.bytes() as i32;
    let value = ctx.alloc.alloc_temp(cg, buf);

    if let Ea::PreDec(n) = ea {
        // Highest register first, at descending addresses. A stored An
        // is its initial value on the 68000/010 and the initial value
        // minus one operand size on the 68020.
        let an = ctx.alloc.bind(cg, buf, A0 + n);
        let a = ctx.alloc.alloc_temp(cg, buf);
        cg.mov_rr(buf, Width::W32, a, an);
        for bit in (0..16u8).filter(|b| mask & (1 << b) != 0) {
            let g = 15 - bit;
            cg.lea(buf, Width::W32, a, Mem::base(a, -step));
            let v = if g == A0 + n && ctx.model.at_least_020() {
                cg.lea(buf, Width::W32, value, Mem::base(an, -step));
                value
            } else {
                ea::peek_reg(ctx, buf, g, value)
            };
            ea::emit_write(ctx, buf, &MemRef::at(Addr::Reg(a)), size, v, false);
        }
        cg.mov_rr(buf, Width::W32, an, a);
        ctx.alloc.mark_dirty(A0 + n);
        ctx.alloc.release(a);
        ctx.alloc.release(value);
        return;
    }

    let addr = ea::address(ctx, buf, ea);
    let a = ea::addr_temp(ctx, buf, addr);
    for g in (0..16u8).filter(|g| mask & (1 << g) != 0) {
        let m = MemRef::at(Addr::Reg(a));
        if to_mem {
            let v = ea::peek_reg(ctx, buf, g, value);
            ea::emit_write(ctx, buf, &m, size, v, false);
        } else {
            ea::emit_read(ctx, buf, &m, size, value);
            if size == Size::Word {
                cg.extend(buf, value, value, Width::W16, true);
            }
            ea::poke_reg(ctx, buf, g, value);
        }
        cg.lea(buf, Width::W32, a, Mem::base(a, step));
    }
    // (An)+ ends with the final address, even when An was loaded.
    if let Ea::PostInc(n) = ea {
        let an = ctx.alloc.bind(cg, buf, A0 + n);
        cg.mov_rr(buf, Width::W32, an, a);
        ctx.alloc.mark_dirty(A0 + n);
    }
    ctx.alloc.release(a);
    ctx.alloc.release(value);
}

/// Bytes at every other address, high byte first.
fn movep<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    size: Size,
    to_mem: bool,
    dn: u8,
    an: u8,
    disp: i32,
) {
    let cg = ctx.cg;
    let n = size.bytes();
    let base = ctx.alloc.bind(cg, buf, A0 + an);
    let a = ctx.alloc.alloc_temp(cg, buf);
    cg.lea(buf, Width::W32, a, Mem::base(base, disp));
    let t = ctx.alloc.alloc_temp(cg, buf);
    ctx.flags.before_clobber(cg, buf);

    if to_mem {
        let hd = ctx.alloc.bind(cg, buf, dn);
        for k in 0..n {
            cg.mov_rr(buf, Width::W32, t, hd);
            let sh = 8 * (n - 1 - k);
            if sh > 0 {
                cg.shift_ri(buf, ShiftOp::Shr, Width::W32, t, sh as u8);
            }
            ea::emit_write(ctx, buf, &MemRef::at(Addr::Reg(a)), Size::Byte, t, false);
            cg.lea(buf, Width::W32, a, Mem::base(a, 2));
        }
    } else {
        let acc = ctx.alloc.alloc_temp(cg, buf);
        cg.mov_ri(buf, acc, 0);
        for _ in 0..n {
            ea::emit_read(ctx, buf, &MemRef::at(Addr::Reg(a)), Size::Byte, t);
            cg.shift_ri(buf, ShiftOp::Shl, Width::W32, acc, 8);
            cg.alu_rr(buf, AluOp::Or, Width::W32, acc, t);
            cg.lea(buf, Width::W32, a, Mem::base(a, 2));
        }
        let hd = ctx.alloc.bind(cg, buf, dn);
        cg.mov_rr(buf, size.into(), hd, acc);
        ctx.alloc.mark_dirty(dn);
        ctx.alloc.release(acc);
    }
    ctx.alloc.release(t);
    ctx.alloc.release(a);
}

fn link<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, an: u8, disp: i32) {
    let cg = ctx.cg;
    let g = A0 + an;
    let v = ctx.alloc.bind(cg, buf, g);
    let sp = ctx.alloc.bind(cg, buf, SP);
    cg.lea(buf, Width::W32, sp, Mem::base(sp, -4));
    ctx.alloc.mark_dirty(SP);
    // LINK A7 pushes the decremented stack pointer.
    ea::emit_write(ctx, buf, &MemRef::at(Addr::Reg(sp)), Size::Long, v, false);
    if g != SP {
        cg.mov_rr(buf, Width::W32, v, sp);
        ctx.alloc.mark_dirty(g);
    }
    cg.lea(buf, Width::W32, sp, Mem::base(sp, disp));
}

fn unlk<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, an: u8) {
    let cg = ctx.cg;
    let g = A0 + an;
    let v = ctx.alloc.bind(cg, buf, g);
    if g == SP {
        let t = ctx.alloc.alloc_temp(cg, buf);
        ea::emit_read(ctx, buf, &MemRef::at(Addr::Reg(v)), Size::Long, t);
        cg.mov_rr(buf, Width::W32, v, t);
        ctx.alloc.mark_dirty(SP);
        ctx.alloc.release(t);
        return;
    }
    let sp = ctx.alloc.bind_for_write(cg, buf, SP);
    cg.mov_rr(buf, Width::W32, sp, v);
    ea::emit_read(ctx, buf, &MemRef::at(Addr::Reg(sp)), Size::Long, v);
    ctx.alloc.mark_dirty(g);
    cg.lea(buf, Width::W32, sp, Mem::base(sp, 4));
}

fn clr<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, size: Size, dst: Ea) {
    let t = ctx.alloc.alloc_temp(ctx.cg, buf);
    ctx.cg.mov_ri(buf, t, 0);
    let d = ea::resolve(ctx, buf, dst, size);
    ea::store(ctx, buf, &d, size, t, false);
    ea::finish(ctx, buf, &d);
    logic_flags(ctx, buf, size, t);
    ctx.alloc.release(t);
}

fn ext<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, size: Size, dn: u8, from_byte: bool) {
    let cg = ctx.cg;
    let h = ctx.alloc.bind(cg, buf, dn);
    match (size, from_byte) {
        (Size::Long, true) => cg.extend(buf, h, h, Width::W8, true),
        (Size::Long, false) => cg.extend(buf, h, h, Width::W16, true),
        _ => {
            let [_, rcx] = cg.scratch_regs();
            cg.extend(buf, rcx, h, Width::W8, true);
            cg.mov_rr(buf, Width::W16, h, rcx);
        }
    }
    ctx.alloc.mark_dirty(dn);
    logic_flags(ctx, buf, size, h);
}

// ---------------------------------------------------------------
// Arithmetic and logic
// ---------------------------------------------------------------

fn host_op(op: ArithKind) -> AluOp {
    match op {
        ArithKind::Add => AluOp::Add,
        ArithKind::Sub => AluOp::Sub,
        ArithKind::And => AluOp::And,
        ArithKind::Or => AluOp::Or,
        ArithKind::Eor => AluOp::Xor,
        ArithKind::Cmp => AluOp::Cmp,
    }
}

fn arith<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    op: ArithKind,
    size: Size,
    src: Ea,
    dst: Ea,
) {
    let cg = ctx.cg;
    let w: Width = size.into();
    let s = ea::resolve(ctx, buf, src, size);
    let sv = match s {
        Loc::Imm(v) => Src::Imm(size.sign_extend(v) as i32),
        _ => Src::Reg(ea::load(ctx, buf, &s, size)),
    };
    ea::finish(ctx, buf, &s);
    let d = ea::resolve(ctx, buf, dst, size);
    let dv = rmw_value(ctx, buf, &d, size);

    // Long register ADD/SUB nobody reads the flags of.
    let flagless = match (op, sv) {
        (ArithKind::Add, Src::Reg(r)) => Some(Mem::indexed(dv, r, 0, 0)),
        (ArithKind::Add, Src::Imm(i)) => Some(Mem::base(dv, i)),
        (ArithKind::Sub, Src::Imm(i)) => Some(Mem::base(dv, i.wrapping_neg())),
        _ => None,
    }
    .filter(|_| ctx.wanted.is_empty() && size == Size::Long && matches!(d, Loc::Reg(_)));
    if let Some(mem) = flagless {
        cg.lea(buf, Width::W32, dv, mem);
        skip_flags(ctx);
    } else {
        ctx.flags.before_clobber(cg, buf);
        alu(cg, buf, host_op(op), w, dv, sv);
        ctx.flags.set_host(cg, buf, CcMask::NZVC, ctx.wanted);
    }

    if let Src::Reg(r) = sv {
        ctx.alloc.release(r);
    }
    if op == ArithKind::Cmp {
        ea::finish(ctx, buf, &d);
        ctx.alloc.release(dv);
    } else {
        rmw_done(ctx, buf, &d, size, dv, true);
    }
}

/// ADDA, SUBA and CMPA: always 32-bit, word sources sign-extended.
fn arith_a<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    op: ArithKind,
    size: Size,
    src: Ea,
    an: u8,
) {
    let cg = ctx.cg;
    let g = A0 + an;
    let s = ea::resolve(ctx, buf, src, size);
    let sv = match s {
        Loc::Imm(v) => Src::Imm(size.sign_extend(v) as i32),
        _ => {
            let r = ea::load(ctx, buf, &s, size);
            if size == Size::Word {
                let t = ctx.alloc.alloc_temp(cg, buf);
                cg.extend(buf, t, r, Width::W16, true);
                ctx.alloc.release(r);
                Src::Reg(t)
            } else {
                Src::Reg(r)
            }
        }
    };
    ea::finish(ctx, buf, &s);
    let h = ctx.alloc.bind(cg, buf, g);

    match (op, sv) {
        (ArithKind::Add, Src::Imm(i)) => cg.lea(buf, Width::W32, h, Mem::base(h, i)),
        (ArithKind::Sub, Src::Imm(i)) => cg.lea(buf, Width::W32, h, Mem::base(h, i.wrapping_neg())),
        (ArithKind::Add, Src::Reg(r)) => cg.lea(buf, Width::W32, h, Mem::indexed(h, r, 0, 0)),
        (ArithKind::Sub, Src::Reg(r)) => {
            // h - r == h + !r + 1, without touching flags.
            let t = ctx.alloc.alloc_temp(cg, buf);
            cg.mov_rr(buf, Width::W32, t, r);
            cg.not(buf, Width::W32, t);
            cg.lea(buf, Width::W32, h, Mem::indexed(h, t, 0, 1));
            ctx.alloc.release(t);
        }
        _ => {
            ctx.flags.before_clobber(cg, buf);
            alu(cg, buf, AluOp::Cmp, Width::W32, h, sv);
            ctx.flags.set_host(cg, buf, CcMask::NZVC, ctx.wanted);
        }
    }
    if op != ArithKind::Cmp {
        ctx.alloc.mark_dirty(g);
    }
    if let Src::Reg(r) = sv {
        ctx.alloc.release(r);
    }
}

/// `dst = dst op src op X` for ADDX, SUBX and NEGX. Z is only ever
/// cleared, so every flag goes straight to SR.
fn extended_op<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    op: AluOp,
    w: Width,
    dst: HostReg,
    src: HostReg,
) {
    let cg = ctx.cg;
    let sr = cg.sr_reg();
    ctx.flags.before_clobber(cg, buf);
    // CF = X
    cg.bit_ri(buf, BitOp::Bt, sr, 4);
    cg.alu_rr(buf, op, w, dst, src);
    cg.ccr_from_flags(buf, CcMask::X.union(CcMask::N).union(CcMask::V).union(CcMask::C));
    let mut keep_z = Label::new();
    cg.jcc(buf, HostCond::Eq, &mut keep_z);
    cg.alu_ri(buf, AluOp::And, Width::W32, sr, !CCR_Z as i32);
    cg.bind(buf, &mut keep_z);
    ctx.flags.wrote_sr(CcMask::ALL);
}

fn arith_x<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    sub: bool,
    size: Size,
    mem: bool,
    src: u8,
    dst: u8,
) {
    let (sv, d) = pair(ctx, buf, mem, size, src, dst);
    let dv = rmw_value(ctx, buf, &d, size);
    let op = if sub { AluOp::Sbb } else { AluOp::Adc };
    extended_op(ctx, buf, op, size.into(), dv, sv);
    ctx.alloc.release(sv);
    rmw_done(ctx, buf, &d, size, dv, false);
}

fn cmpm<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, size: Size, src: u8, dst: u8) {
    let cg = ctx.cg;
    let s = ea::resolve(ctx, buf, Ea::PostInc(src), size);
    let sv = ea::load(ctx, buf, &s, size);
    ea::finish(ctx, buf, &s);
    let d = ea::resolve(ctx, buf, Ea::PostInc(dst), size);
    let dv = ea::load(ctx, buf, &d, size);
    ea::finish(ctx, buf, &d);
    ctx.flags.before_clobber(cg, buf);
    cg.alu_rr(buf, AluOp::Cmp, size.into(), dv, sv);
    ctx.flags.set_host(cg, buf, CcMask::NZVC, ctx.wanted);
    ctx.alloc.release(sv);
    ctx.alloc.release(dv);
}

fn neg<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, size: Size, dst: Ea, extend: bool) {
    let cg = ctx.cg;
    let w: Width = size.into();
    let d = ea::resolve(ctx, buf, dst, size);
    let v = rmw_value(ctx, buf, &d, size);
    if extend {
        let t = ctx.alloc.alloc_temp(cg, buf);
        cg.mov_ri(buf, t, 0);
        extended_op(ctx, buf, AluOp::Sbb, w, t, v);
        cg.mov_rr(buf, w, v, t);
        ctx.alloc.release(t);
        rmw_done(ctx, buf, &d, size, v, false);
    } else {
        ctx.flags.before_clobber(cg, buf);
        cg.neg(buf, w, v);
        ctx.flags.set_host(cg, buf, CcMask::NZVC, ctx.wanted);
        rmw_done(ctx, buf, &d, size, v, true);
    }
}

fn not<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, size: Size, dst: Ea) {
    let d = ea::resolve(ctx, buf, dst, size);
    let v = rmw_value(ctx, buf, &d, size);
    ctx.cg.not(buf, size.into(), v);
    match d {
        Loc::Reg(g) => ctx.alloc.mark_dirty(g),
        _ => ea::store(ctx, buf, &d, size, v, false),
    }
    ea::finish(ctx, buf, &d);
    logic_flags(ctx, buf, size, v);
    ctx.alloc.release(v);
}

fn mul<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    signed: bool,
    long: bool,
    src: Ea,
    dl: u8,
    dh: Option<u8>,
) {
    let cg = ctx.cg;
    let size = if long { Size::Long } else { Size::Word };
    let s = ea::resolve(ctx, buf, src, size);
    let v = ea::load(ctx, buf, &s, size);
    ea::finish(ctx, buf, &s);
    ctx.flags.before_clobber(cg, buf);
    let hl = ctx.alloc.bind(cg, buf, dl);
    let op = match (dh.is_some(), signed) {
        (false, false) => AluHelper::Mulu,
        (false, true) => AluHelper::Muls,
        (true, false) => AluHelper::Mulu64,
        (true, true) => AluHelper::Muls64,
    };
    call_alu(ctx, buf, op, size, Arg::Reg(v), hl);
    cg.mov_rr(buf, Width::W32, hl, cg.return_reg());
    ctx.alloc.mark_dirty(dl);
    if let Some(dh) = dh {
        let hh = ctx.alloc.bind_for_write(cg, buf, dh);
        cg.load(buf, Width::W32, hh, ea::env_mem(ctx, HELPER_HI_OFFSET));
    }
    ctx.flags.wrote_sr(CcMask::NZVC);
    ctx.alloc.release(v);
}

#[allow(clippy::too_many_arguments)]
fn div<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    signed: bool,
    long: bool,
    src: Ea,
    dq: u8,
    dr: Option<u8>,
    wide: bool,
) {
    let cg = ctx.cg;
    let size = if long { Size::Long } else { Size::Word };
    let s = ea::resolve(ctx, buf, src, size);
    let v = ea::load(ctx, buf, &s, size);
    ea::finish(ctx, buf, &s);
    ctx.flags.before_clobber(cg, buf);
    let hq = ctx.alloc.bind(cg, buf, dq);
    // The helper leaves helper_hi alone unless the divide succeeds.
    let hr = dr.map(|r| ctx.alloc.bind(cg, buf, r));
    if let Some(hr) = hr {
        cg.store(buf, Width::W32, hr, ea::env_mem(ctx, HELPER_HI_OFFSET));
    }
    let op = match (wide, signed) {
        (false, false) => AluHelper::Divu,
        (false, true) => AluHelper::Divs,
        (true, false) => AluHelper::Divu64,
        (true, true) => AluHelper::Divs64,
    };
    call_alu(ctx, buf, op, size, Arg::Reg(v), hq);
    cg.mov_rr(buf, Width::W32, hq, cg.return_reg());
    ctx.alloc.mark_dirty(dq);
    if let (Some(r), Some(hr)) = (dr, hr) {
        cg.load(buf, Width::W32, hr, ea::env_mem(ctx, HELPER_HI_OFFSET));
        ctx.alloc.mark_dirty(r);
    }
    ctx.flags.wrote_sr(CcMask::NZVC);
    ctx.alloc.release(v);
    let next = ctx.insn.next_pc();
    ea::check_exception(ctx, buf, next);
}

fn shift_helper(kind: ShiftKind, left: bool) -> AluHelper {
    match (kind, left) {
        (ShiftKind::Arith, true) => AluHelper::Asl,
        (ShiftKind::Arith, false) => AluHelper::Asr,
        (ShiftKind::Logical, true) => AluHelper::Lsl,
        (ShiftKind::Logical, false) => AluHelper::Lsr,
        (ShiftKind::RotateX, true) => AluHelper::Roxl,
        (ShiftKind::RotateX, false) => AluHelper::Roxr,
        (ShiftKind::Rotate, true) => AluHelper::Rol,
        (ShiftKind::Rotate, false) => AluHelper::Ror,
    }
}

/// Host shift computing the same value, for when no flag is read.
fn host_shift(kind: ShiftKind, left: bool) -> Option<ShiftOp> {
    match (kind, left) {
        (ShiftKind::Arith | ShiftKind::Logical, true) => Some(ShiftOp::Shl),
        (ShiftKind::Logical, false) => Some(ShiftOp::Shr),
        (ShiftKind::Arith, false) => Some(ShiftOp::Sar),
        (ShiftKind::Rotate, true) => Some(ShiftOp::Rol),
        (ShiftKind::Rotate, false) => Some(ShiftOp::Ror),
        (ShiftKind::RotateX, _) => None,
    }
}

fn shift<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    kind: ShiftKind,
    left: bool,
    size: Size,
    count: ShiftCount,
    dst: Ea,
) {
    let cg = ctx.cg;
    let w: Width = size.into();
    let d = ea::resolve(ctx, buf, dst, size);
    let v = rmw_value(ctx, buf, &d, size);

    if let (ShiftCount::Imm(n), Loc::Reg(_), Some(sop)) = (count, d, host_shift(kind, left)) {
        if ctx.wanted.is_empty() {
            ctx.flags.before_clobber(cg, buf);
            cg.shift_ri(buf, sop, w, v, n);
            skip_flags(ctx);
            rmw_done(ctx, buf, &d, size, v, false);
            return;
        }
    }

    let count = match count {
        ShiftCount::Imm(n) => Arg::Imm(n as u32),
        ShiftCount::Reg(r) => Arg::Reg(ctx.alloc.bind(cg, buf, r)),
    };
    ctx.flags.before_clobber(cg, buf);
    call_alu(ctx, buf, shift_helper(kind, left), size, count, v);
    let rw = if matches!(d, Loc::Reg(_)) { w } else { Width::W32 };
    cg.mov_rr(buf, rw, v, cg.return_reg());
    let sets = ctx.insn.op.sets();
    ctx.flags.wrote_sr(sets);
    rmw_done(ctx, buf, &d, size, v, false);
}

fn bit_op<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, kind: BitKind, bit: BitNum, dst: Ea) {
    let cg = ctx.cg;
    let sr = cg.sr_reg();
    let [_, rcx] = cg.scratch_regs();
    // Bit numbers are modulo 32 on registers, modulo 8 in memory.
    let size = if matches!(dst, Ea::DReg(_)) {
        Size::Long
    } else {
        Size::Byte
    };
    let d = ea::resolve(ctx, buf, dst, size);
    let v = rmw_value(ctx, buf, &d, size);
    let bit_reg = match bit {
        BitNum::Reg(r) => Some(ctx.alloc.bind(cg, buf, r)),
        BitNum::Imm(_) => None,
    };
    ctx.flags.before_clobber(cg, buf);
    if let Some(b) = bit_reg {
        cg.mov_rr(buf, Width::W32, rcx, b);
        if size == Size::Byte {
            cg.alu_ri(buf, AluOp::And, Width::W32, rcx, 7);
        }
    }
    cg.alu_ri(buf, AluOp::And, Width::W32, sr, !CCR_Z as i32);
    let bop = match kind {
        BitKind::Test => BitOp::Bt,
        BitKind::Change => BitOp::Btc,
        BitKind::Clear => BitOp::Btr,
        BitKind::Set => BitOp::Bts,
    };
    match bit {
        BitNum::Imm(n) => cg.bit_ri(buf, bop, v, n & (size.bits() as u8 - 1)),
        BitNum::Reg(_) => cg.bit_rr(buf, bop, v, rcx),
    }
    // Z is the inverse of the tested bit.
    let mut was_set = Label::new();
    cg.jcc(buf, HostCond::Below, &mut was_set);
    cg.alu_ri(buf, AluOp::Or, Width::W32, sr, CCR_Z as i32);
    cg.bind(buf, &mut was_set);
    ctx.flags.wrote_sr(CcMask::Z);

    if kind == BitKind::Test {
        ea::finish(ctx, buf, &d);
        ctx.alloc.release(v);
    } else {
        rmw_done(ctx, buf, &d, size, v, false);
    }
}

fn bcd<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, sub: bool, mem: bool, src: u8, dst: u8) {
    let cg = ctx.cg;
    let (sv, d) = pair(ctx, buf, mem, Size::Byte, src, dst);
    let dv = rmw_value(ctx, buf, &d, Size::Byte);
    ctx.flags.before_clobber(cg, buf);
    let op = if sub { AluHelper::Sbcd } else { AluHelper::Abcd };
    call_alu(ctx, buf, op, Size::Byte, Arg::Reg(sv), dv);
    cg.mov_rr(buf, Width::W8, dv, cg.return_reg());
    ctx.flags.wrote_sr(ctx.insn.op.sets());
    ctx.alloc.release(sv);
    rmw_done(ctx, buf, &d, Size::Byte, dv, false);
}

fn nbcd<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, dst: Ea) {
    let cg = ctx.cg;
    let d = ea::resolve(ctx, buf, dst, Size::Byte);
    let v = rmw_value(ctx, buf, &d, Size::Byte);
    ctx.flags.before_clobber(cg, buf);
    call_alu(ctx, buf, AluHelper::Nbcd, Size::Byte, Arg::Imm(0), v);
    cg.mov_rr(buf, Width::W8, v, cg.return_reg());
    ctx.flags.wrote_sr(ctx.insn.op.sets());
    rmw_done(ctx, buf, &d, Size::Byte, v, false);
}

/// Test and set bit 7; the flags describe the old value.
fn tas<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, dst: Ea) {
    let cg = ctx.cg;
    let d = ea::resolve(ctx, buf, dst, Size::Byte);
    let v = rmw_value(ctx, buf, &d, Size::Byte);
    let t = ctx.alloc.alloc_temp(cg, buf);
    ctx.flags.before_clobber(cg, buf);
    cg.mov_rr(buf, Width::W32, t, v);
    cg.alu_ri(buf, AluOp::Or, Width::W8, t, Size::Byte.sign_extend(0x80) as i32);
    cg.test_rr(buf, Width::W8, v, v);
    ctx.flags.set_host(cg, buf, CcMask::NZVC, ctx.wanted);
    cg.mov_rr(buf, Width::W8, v, t);
    ctx.alloc.release(t);
    rmw_done(ctx, buf, &d, Size::Byte, v, true);
}
