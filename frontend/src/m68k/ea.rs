//! Operand access: effective addresses, guest memory and helper calls.
//!
//! Address arithmetic never touches host flags (`lea` and `mov`
//! only). Memory accesses do, so each one calls
//! [`FlagsState::before_clobber`](crate::flags::FlagsState::before_clobber)
//! first, unless the caller asked to keep the flags alive.

use jit68_backend::{
    AluOp, CodeBuffer, HostCodeGen, HostCond, HostReg, Label, Mem, ShiftOp, Width,
};
use jit68_core::cpu::{
    guest_reg_offset, A0, CODE_PAGES_OFFSET, CODE_PAGE_SHIFT, EXCEPTION_OFFSET, FAULT_LEN_OFFSET,
    FAULT_OPCODE_OFFSET, FAULT_PC_OFFSET, RAM_BASE_OFFSET, RAM_SIZE_OFFSET, SP, SR_OFFSET,
};
use jit68_core::{ExitCode, Size};

use super::decode::{Ea, Index};
use super::M68kDisasContext as Ctx;

/// Where a memory operand's address lives.
#[derive(Debug, Clone, Copy)]
pub(super) enum Addr {
    Reg(HostReg),
    Const(u32),
}

#[derive(Debug, Clone, Copy)]
pub(super) struct MemRef {
    pub addr: Addr,
    /// Post-increment `(guest An, step)` applied by [`finish`].
    post: Option<(u8, u32)>,
}

impl MemRef {
    pub fn at(addr: Addr) -> Self {
        Self { addr, post: None }
    }
}

/// A resolved operand.
#[derive(Debug, Clone, Copy)]
pub(super) enum Loc {
    /// Guest register number.
    Reg(u8),
    Imm(u32),
    Mem(MemRef),
}

/// Helper call argument.
#[derive(Debug, Clone, Copy)]
pub(super) enum Arg {
    Reg(HostReg),
    Imm(u32),
}

/// New guest PC on block exit.
#[derive(Debug, Clone, Copy)]
pub(super) enum Pc {
    Reg(HostReg),
    Imm(u32),
}

/// Address register step for `(An)+` and `-(An)`; A7 stays even.
pub(super) fn step(an: u8, size: Size) -> u32 {
    if an == 7 && size == Size::Byte {
        2
    } else {
        size.bytes()
    }
}

pub(super) fn env_mem<B: HostCodeGen>(ctx: &Ctx<'_, B>, disp: i32) -> Mem {
    Mem::base(ctx.cg.env_reg(), disp)
}

pub(super) fn guest_mem<B: HostCodeGen>(ctx: &Ctx<'_, B>, g: u8) -> Mem {
    env_mem(ctx, guest_reg_offset(g))
}

// ---------------------------------------------------------------
// Effective addresses
// ---------------------------------------------------------------

/// Resolve `ea` for an access of `size`. `-(An)` is applied here,
/// `(An)+` by [`finish`].
pub(super) fn resolve<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    ea: Ea,
    size: Size,
) -> Loc {
    let cg = ctx.cg;
    match ea {
        Ea::DReg(n) => Loc::Reg(n),
        Ea::AReg(n) => Loc::Reg(A0 + n),
        Ea::Imm(v) => Loc::Imm(v),
        Ea::PostInc(n) => {
            let h = ctx.alloc.bind(cg, buf, A0 + n);
            Loc::Mem(MemRef {
                addr: Addr::Reg(h),
                post: Some((A0 + n, step(n, size))),
            })
        }
        Ea::PreDec(n) => {
            let h = ctx.alloc.bind(cg, buf, A0 + n);
            cg.lea(buf, Width::W32, h, Mem::base(h, -(step(n, size) as i32)));
            ctx.alloc.mark_dirty(A0 + n);
            Loc::Mem(MemRef::at(Addr::Reg(h)))
        }
        _ => Loc::Mem(MemRef::at(address(ctx, buf, ea))),
    }
}

/// Address of a control-mode operand.
pub(super) fn address<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, ea: Ea) -> Addr {
    let cg = ctx.cg;
    match ea {
        Ea::Ind(n) | Ea::PostInc(n) | Ea::PreDec(n) => Addr::Reg(ctx.alloc.bind(cg, buf, A0 + n)),
        Ea::Disp(n, d) => {
            let h = ctx.alloc.bind(cg, buf, A0 + n);
            let t = ctx.alloc.alloc_temp(cg, buf);
            cg.lea(buf, Width::W32, t, Mem::base(h, d));
            Addr::Reg(t)
        }
        Ea::Indexed {
            base, index, disp, ..
        } => indexed(ctx, buf, base, index, disp),
        Ea::Abs(a) | Ea::PcDisp(a) => Addr::Const(a),
        // Register and immediate operands have no address.
        Ea::DReg(_) | Ea::AReg(_) | Ea::Imm(_) => Addr::Const(0),
    }
}

fn indexed<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    base: Option<u8>,
    index: Option<Index>,
    disp: u32,
) -> Addr {
    let cg = ctx.cg;
    let [_, rcx] = cg.scratch_regs();
    let base = base.map(|n| ctx.alloc.bind(cg, buf, A0 + n));
    let index = index.map(|ix| {
        let h = ctx.alloc.bind(cg, buf, ix.reg);
        if ix.long {
            (h, ix.scale)
        } else {
            cg.extend(buf, rcx, h, Width::W16, true);
            (rcx, ix.scale)
        }
    });
    let disp = disp as i32;
    match (base, index) {
        (None, None) => Addr::Const(disp as u32),
        (Some(b), None) => {
            let t = ctx.alloc.alloc_temp(cg, buf);
            cg.lea(buf, Width::W32, t, Mem::base(b, disp));
            Addr::Reg(t)
        }
        (Some(b), Some((i, scale))) => {
            let t = ctx.alloc.alloc_temp(cg, buf);
            cg.lea(buf, Width::W32, t, Mem::indexed(b, i, scale, disp));
            Addr::Reg(t)
        }
        (None, Some((i, scale))) => {
            let t = ctx.alloc.alloc_temp(cg, buf);
            cg.mov_ri(buf, t, disp as u32);
            cg.lea(buf, Width::W32, t, Mem::indexed(t, i, scale, 0));
            Addr::Reg(t)
        }
    }
}

/// Apply a pending post-increment and drop the address temp.
pub(super) fn finish<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, loc: &Loc) {
    if let Loc::Mem(m) = loc {
        if let Some((g, step)) = m.post {
            let h = ctx.alloc.bind(ctx.cg, buf, g);
            ctx.cg.lea(buf, Width::W32, h, Mem::base(h, step as i32));
            ctx.alloc.mark_dirty(g);
        }
        if let Addr::Reg(h) = m.addr {
            ctx.alloc.release(h);
        }
    }
}

// ---------------------------------------------------------------
// Operand values
// ---------------------------------------------------------------

/// Value of `loc`, zero-extended from `size`. For a register operand
/// this is the binding itself; callers must not modify it unless it
/// is also the destination.
pub(super) fn load<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    loc: &Loc,
    size: Size,
) -> HostReg {
    let cg = ctx.cg;
    match *loc {
        Loc::Reg(g) => ctx.alloc.bind(cg, buf, g),
        Loc::Imm(v) => {
            let t = ctx.alloc.alloc_temp(cg, buf);
            cg.mov_ri(buf, t, v);
            t
        }
        Loc::Mem(m) => {
            let t = ctx.alloc.alloc_temp(cg, buf);
            emit_read(ctx, buf, &m, size, t);
            t
        }
    }
}

/// Store the low `size` bits of `value` to `loc`.
pub(super) fn store<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    loc: &Loc,
    size: Size,
    value: HostReg,
    keep_flags: bool,
) {
    let cg = ctx.cg;
    match *loc {
        Loc::Reg(g) => {
            let h = if size == Size::Long {
                ctx.alloc.bind_for_write(cg, buf, g)
            } else {
                ctx.alloc.bind(cg, buf, g)
            };
            cg.mov_rr(buf, size.into(), h, value);
            ctx.alloc.mark_dirty(g);
        }
        Loc::Mem(m) => emit_write(ctx, buf, &m, size, value, keep_flags),
        Loc::Imm(_) => debug_assert!(false, "store to immediate operand"),
    }
}

/// Value of guest register `g` in a host register, without binding
/// it when it is not bound already.
pub(super) fn peek_reg<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    g: u8,
    scratch: HostReg,
) -> HostReg {
    match ctx.alloc.host_of(g) {
        Some(h) => h,
        None => {
            ctx.cg.load(buf, Width::W32, scratch, guest_mem(ctx, g));
            scratch
        }
    }
}

/// Write guest register `g`, through its binding if it has one.
pub(super) fn poke_reg<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    g: u8,
    value: HostReg,
) {
    match ctx.alloc.host_of(g) {
        Some(h) => {
            ctx.cg.mov_rr(buf, Width::W32, h, value);
            ctx.alloc.mark_dirty(g);
        }
        None => ctx.cg.store(buf, Width::W32, value, guest_mem(ctx, g)),
    }
}

/// Copy an address into a fresh temp.
pub(super) fn addr_temp<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, addr: Addr) -> HostReg {
    let cg = ctx.cg;
    let t = ctx.alloc.alloc_temp(cg, buf);
    match addr {
        Addr::Reg(r) => {
            cg.mov_rr(buf, Width::W32, t, r);
            ctx.alloc.release(r);
        }
        Addr::Const(a) => cg.mov_ri(buf, t, a),
    }
    t
}

// ---------------------------------------------------------------
// Guest memory
// ---------------------------------------------------------------

fn load_addr<B: HostCodeGen>(cg: &B, buf: &mut CodeBuffer, addr: Addr, dst: HostReg) {
    match addr {
        Addr::Reg(h) => cg.mov_rr(buf, Width::W32, dst, h),
        Addr::Const(a) => cg.mov_ri(buf, dst, a),
    }
}

/// Branch to `slow` unless `[rax, rax + size)` lies inside RAM.
fn bounds_check<B: HostCodeGen>(cg: &B, buf: &mut CodeBuffer, size: Size, slow: &mut Label) {
    let [rax, rcx] = cg.scratch_regs();
    let env = cg.env_reg();
    cg.lea(buf, Width::W64, rcx, Mem::base(rax, size.bytes() as i32));
    cg.alu_rm(buf, AluOp::Cmp, Width::W64, rcx, Mem::base(env, RAM_SIZE_OFFSET));
    cg.jcc(buf, HostCond::Above, slow);
}

/// Load `size` bytes at `m` into `dst`, zero-extended.
pub(super) fn emit_read<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    m: &MemRef,
    size: Size,
    dst: HostReg,
) {
    let cg = ctx.cg;
    ctx.flags.before_clobber(cg, buf);
    let [rax, _] = cg.scratch_regs();
    let env = cg.env_reg();
    let w = Width::from(size);
    let mut slow = Label::new();
    let mut done = Label::new();

    load_addr(cg, buf, m.addr, rax);
    bounds_check(cg, buf, size, &mut slow);
    cg.alu_rm(buf, AluOp::Add, Width::W64, rax, Mem::base(env, RAM_BASE_OFFSET));
    cg.load(buf, w, dst, Mem::base(rax, 0));
    if size != Size::Byte {
        cg.bswap(buf, w, dst);
    }
    cg.jmp(buf, &mut done);

    cg.bind(buf, &mut slow);
    let read = ctx.helpers.read;
    call_helper(ctx, buf, read, &[Arg::Reg(rax), Arg::Imm(size.bytes())], false);
    cg.mov_rr(buf, Width::W32, dst, rax);
    cg.bind(buf, &mut done);
}

/// Store the low `size` bytes of `src` at `m`. With `keep_flags` the
/// host flags survive (saved around the access when some are still
/// pending).
pub(super) fn emit_write<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    m: &MemRef,
    size: Size,
    src: HostReg,
    keep_flags: bool,
) {
    let cg = ctx.cg;
    let stash = if keep_flags && !ctx.flags.pending().is_empty() {
        let t = ctx.alloc.alloc_temp(cg, buf);
        cg.save_flags(buf, t);
        Some(t)
    } else {
        ctx.flags.before_clobber(cg, buf);
        None
    };
    let [rax, rcx] = cg.scratch_regs();
    let env = cg.env_reg();
    let w = Width::from(size);
    let mut slow = Label::new();
    let mut done = Label::new();

    load_addr(cg, buf, m.addr, rax);
    bounds_check(cg, buf, size, &mut slow);
    // Pages holding translated code take the slow path.
    cg.mov_rr(buf, Width::W32, rcx, rax);
    cg.shift_ri(buf, ShiftOp::Shr, Width::W32, rcx, CODE_PAGE_SHIFT as u8);
    cg.alu_rm(buf, AluOp::Add, Width::W64, rcx, Mem::base(env, CODE_PAGES_OFFSET));
    cg.alu_mi(buf, AluOp::Cmp, Width::W8, Mem::base(rcx, 0), 0);
    cg.jcc(buf, HostCond::Ne, &mut slow);
    cg.alu_rm(buf, AluOp::Add, Width::W64, rax, Mem::base(env, RAM_BASE_OFFSET));
    cg.mov_rr(buf, Width::W32, rcx, src);
    if size != Size::Byte {
        cg.bswap(buf, w, rcx);
    }
    cg.store(buf, w, rcx, Mem::base(rax, 0));
    cg.jmp(buf, &mut done);

    cg.bind(buf, &mut slow);
    let write = ctx.helpers.write;
    call_helper(
        ctx,
        buf,
        write,
        &[Arg::Reg(rax), Arg::Reg(src), Arg::Imm(size.bytes())],
        false,
    );
    cg.bind(buf, &mut done);

    if let Some(t) = stash {
        cg.restore_flags(buf, t);
        ctx.alloc.release(t);
    }
}

/// Push a long onto the active stack.
pub(super) fn push_long<B: HostCodeGen>(ctx: &mut Ctx<'_, B>, buf: &mut CodeBuffer, value: HostReg) {
    let cg = ctx.cg;
    let sp = ctx.alloc.bind(cg, buf, SP);
    cg.lea(buf, Width::W32, sp, Mem::base(sp, -4));
    ctx.alloc.mark_dirty(SP);
    emit_write(ctx, buf, &MemRef::at(Addr::Reg(sp)), Size::Long, value, false);
}

/// Pop `size` bytes from the active stack into `dst`.
pub(super) fn pop<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    size: Size,
    dst: HostReg,
) {
    let cg = ctx.cg;
    let sp = ctx.alloc.bind(cg, buf, SP);
    emit_read(ctx, buf, &MemRef::at(Addr::Reg(sp)), size, dst);
    cg.lea(buf, Width::W32, sp, Mem::base(sp, size.bytes() as i32));
    ctx.alloc.mark_dirty(SP);
}

// ---------------------------------------------------------------
// Helper calls
// ---------------------------------------------------------------

/// Call `target(env, args..)`; the result is left in the return
/// register. Live caller-saved registers are parked in the spill
/// area across the call. The caller has already dealt with host
/// flags.
pub(super) fn call_helper<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    target: usize,
    args: &[Arg],
    reload_sr: bool,
) {
    let cg = ctx.cg;
    let env = cg.env_reg();
    let sr = cg.sr_reg();
    let (spill_base, _) = cg.spill_area();
    let slot = |r: HostReg| Mem::base(cg.stack_reg(), spill_base + 8 * r as i32);
    let caller_saved = cg.caller_saved();
    let live: Vec<HostReg> = ctx
        .alloc
        .live_regs()
        .iter()
        .filter(|&r| caller_saved.contains(r))
        .collect();

    for &r in &live {
        cg.store(buf, Width::W32, r, slot(r));
    }
    cg.store(buf, Width::W32, sr, env_mem(ctx, SR_OFFSET));

    let arg_regs = cg.call_arg_regs();
    cg.mov_rr(buf, Width::W64, arg_regs[0], env);
    for (arg, &dst) in args.iter().zip(&arg_regs[1..]) {
        match *arg {
            Arg::Reg(r) if live.contains(&r) => cg.load(buf, Width::W32, dst, slot(r)),
            Arg::Reg(r) => cg.mov_rr(buf, Width::W32, dst, r),
            Arg::Imm(v) => cg.mov_ri(buf, dst, v),
        }
    }
    cg.call(buf, target);

    if reload_sr {
        cg.load(buf, Width::W32, sr, env_mem(ctx, SR_OFFSET));
    }
    for &r in &live {
        cg.load(buf, Width::W32, r, slot(r));
    }
}

// ---------------------------------------------------------------
// Exits
// ---------------------------------------------------------------

fn set_pc<B: HostCodeGen>(cg: &B, buf: &mut CodeBuffer, pc: Pc) {
    match pc {
        Pc::Imm(v) => cg.mov_ri(buf, cg.pc_reg(), v),
        Pc::Reg(r) => cg.mov_rr(buf, Width::W32, cg.pc_reg(), r),
    }
}

/// Leave the block for good: everything back to `CpuState`.
pub(super) fn end_block<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    pc: Pc,
    code: ExitCode,
) {
    let cg = ctx.cg;
    ctx.alloc.flush_all(cg, buf);
    ctx.flags.materialize(cg, buf);
    set_pc(cg, buf, pc);
    cg.exit(buf, code);
}

/// Side exit that leaves the translation state untouched for the
/// fall-through path.
pub(super) fn side_exit<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    pc: Pc,
    code: ExitCode,
) {
    let cg = ctx.cg;
    ctx.alloc.emit_writeback(cg, buf);
    ctx.flags.emit_materialize(cg, buf);
    set_pc(cg, buf, pc);
    cg.exit(buf, code);
}

/// Side exit raising an exception. With `vector` unset a helper has
/// already stored it. `stacked_pc` is the PC the frame will hold.
pub(super) fn raise<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    vector: Option<u8>,
    stacked_pc: u32,
) {
    let cg = ctx.cg;
    let insn = ctx.insn;
    ctx.alloc.emit_writeback(cg, buf);
    ctx.flags.emit_materialize(cg, buf);
    if let Some(v) = vector {
        cg.store_imm(buf, env_mem(ctx, EXCEPTION_OFFSET), v as u32);
    }
    cg.store_imm(buf, env_mem(ctx, FAULT_PC_OFFSET), insn.pc);
    cg.store_imm(buf, env_mem(ctx, FAULT_OPCODE_OFFSET), insn.opcode as u32);
    cg.store_imm(buf, env_mem(ctx, FAULT_LEN_OFFSET), insn.len);
    set_pc(cg, buf, Pc::Imm(stacked_pc));
    cg.exit(buf, ExitCode::Exception);
}

/// Raise when a helper left an exception vector behind.
pub(super) fn check_exception<B: HostCodeGen>(
    ctx: &mut Ctx<'_, B>,
    buf: &mut CodeBuffer,
    stacked_pc: u32,
) {
    let cg = ctx.cg;
    let mut ok = Label::new();
    cg.alu_mi(buf, AluOp::Cmp, Width::W32, env_mem(ctx, EXCEPTION_OFFSET), 0);
    cg.jcc(buf, HostCond::Eq, &mut ok);
    raise(ctx, buf, None, stacked_pc);
    cg.bind(buf, &mut ok);
}
