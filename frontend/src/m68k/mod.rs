//! M68k guest translation.
//!
//! A block is decoded up front by [`block::scan`], then emitted one
//! instruction at a time through the generic translator loop. Guest
//! registers live in host registers chosen by the allocator; condition
//! codes follow the lazy model in [`crate::flags`].

pub mod block;
mod control;
pub mod decode;
mod ea;
pub mod fpu;
pub mod helpers;
mod trans;

use std::marker::PhantomData;

use jit68_backend::{CodeBuffer, HostCodeGen, Label};
use jit68_core::{Boundary, CcMask, CodeFetch, CpuModel, ExitCode, JitConfig, TranslationUnit};

use crate::flags::FlagsState;
use crate::regalloc::RegisterAllocator;
use crate::{translator_loop, DisasContextBase, DisasJumpType, TranslatorOps};

pub use block::{scan, BlockPlan, ScanOptions};
pub use decode::{decode, Ea, Insn, Op};
pub use helpers::{helper_alu, AluHelper};

/// Worst-case host bytes for one guest instruction, including the
/// block tail that may follow it.
pub const MAX_INSN_BYTES: usize = 4096;

/// Free code buffer space below which the buffer must be flushed
/// before translating.
pub const MIN_BUFFER_HEADROOM: usize = 4 * MAX_INSN_BYTES;

/// Addresses of the runtime entry points generated code calls.
///
/// Signatures (System V, `env` is `*mut CpuState`):
/// - `read(env, addr, size) -> u32`
/// - `write(env, addr, value, size)`
/// - `set_sr(env, value)`
/// - `rte(env) -> u32` new PC
/// - `movec(env, to_ctrl, ctrl, value) -> u32`
/// - `alu(env, op, src, dst) -> u32`, see [`helper_alu`]
#[derive(Debug, Clone, Copy)]
pub struct HelperTable {
    pub read: usize,
    pub write: usize,
    pub set_sr: usize,
    pub rte: usize,
    pub movec: usize,
    pub alu: usize,
}

impl HelperTable {
    /// Table using the built-in arithmetic helper.
    pub fn new(read: usize, write: usize, set_sr: usize, rte: usize, movec: usize) -> Self {
        Self {
            read,
            write,
            set_sr,
            rte,
            movec,
            alu: helper_alu as *const () as usize,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TranslateOptions {
    pub model: CpuModel,
    pub max_insns: u32,
    pub lazy_flags: bool,
    pub fold_branches: bool,
    pub record_boundaries: bool,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self::from(&JitConfig::default())
    }
}

impl From<&JitConfig> for TranslateOptions {
    fn from(config: &JitConfig) -> Self {
        Self {
            model: config.cpu_model,
            max_insns: config.max_block_insns,
            lazy_flags: config.lazy_flags,
            fold_branches: config.fold_branches,
            record_boundaries: config.record_boundaries,
        }
    }
}

// ---------------------------------------------------------------
// Disassembly context
// ---------------------------------------------------------------

pub struct M68kDisasContext<'a, B: HostCodeGen> {
    pub base: DisasContextBase,
    pub(crate) cg: &'a B,
    pub(crate) plan: BlockPlan,
    pub(crate) alloc: RegisterAllocator,
    pub(crate) flags: FlagsState,
    pub(crate) helpers: HelperTable,
    pub(crate) model: CpuModel,
    /// Index of the instruction being translated.
    pub(crate) idx: usize,
    pub(crate) insn: Insn,
    /// Condition codes of `insn` someone reads.
    pub(crate) wanted: CcMask,
    /// Entry label of each instruction; bound only at join points.
    joins: Vec<Label>,
    boundaries: Option<Vec<Boundary>>,
    unit_start: usize,
    body_start: usize,
    body_end: usize,
}

impl<'a, B: HostCodeGen> M68kDisasContext<'a, B> {
    fn new(cg: &'a B, plan: BlockPlan, opts: &TranslateOptions, helpers: HelperTable) -> Self {
        let first = plan.insns[0];
        let n = plan.len();
        Self {
            base: DisasContextBase::new(first.pc, n as u32),
            cg,
            alloc: RegisterAllocator::new(cg),
            flags: FlagsState::new(opts.lazy_flags),
            helpers,
            model: opts.model,
            idx: 0,
            insn: first,
            wanted: CcMask::NONE,
            joins: (0..n).map(|_| Label::new()).collect(),
            boundaries: opts.record_boundaries.then(Vec::new),
            unit_start: 0,
            body_start: 0,
            body_end: 0,
            plan,
        }
    }

    /// Label of the folded branch target `pc`.
    pub(crate) fn join_label(&mut self, pc: u32) -> Option<&mut Label> {
        let t = self.plan.index_of(pc)?;
        self.joins.get_mut(t).filter(|l| l.is_bound())
    }
}

pub struct M68kTranslator<'a, B>(PhantomData<&'a B>);

impl<'a, B: HostCodeGen> TranslatorOps for M68kTranslator<'a, B> {
    type DisasContext = M68kDisasContext<'a, B>;

    fn init_disas_context(ctx: &mut Self::DisasContext, buf: &mut CodeBuffer) {
        ctx.unit_start = buf.offset();
    }

    fn tb_start(ctx: &mut Self::DisasContext, buf: &mut CodeBuffer) {
        ctx.body_start = buf.offset();
    }

    fn insn_start(ctx: &mut Self::DisasContext, buf: &mut CodeBuffer) {
        let i = ctx.idx;
        if ctx.plan.join[i] {
            // Every path into a join point arrives canonical.
            ctx.alloc.flush_all(ctx.cg, buf);
            ctx.flags.materialize(ctx.cg, buf);
            ctx.flags.reset();
            ctx.cg.bind(buf, &mut ctx.joins[i]);
        }
        if let Some(b) = &mut ctx.boundaries {
            b.push(Boundary {
                guest_pc: ctx.plan.insns[i].pc,
                host_offset: (buf.offset() - ctx.unit_start) as u32,
                bindings: ctx.alloc.snapshot(),
            });
        }
        ctx.base.num_insns += 1;
    }

    fn translate_insn(ctx: &mut Self::DisasContext, buf: &mut CodeBuffer) {
        let i = ctx.idx;
        let insn = ctx.plan.insns[i];
        let op = insn.op;
        ctx.insn = insn;
        ctx.wanted = if ctx.flags.is_lazy() {
            op.sets().intersect(ctx.plan.needed_after[i])
        } else {
            op.sets()
        };
        let overwrites = if block::exits_early(&insn, ctx.model) {
            CcMask::NONE
        } else {
            op.sets().subtract(op.uses())
        };
        ctx.flags.begin_insn(overwrites);
        ctx.alloc.begin_insn();

        tracing::trace!(pc = format_args!("{:#x}", insn.pc), op = op.mnemonic(), "translate");

        if op.privileged(ctx.model) {
            control::privilege_check(ctx, buf);
        }
        let jmp = trans::translate(ctx, buf, &op);
        if jmp == DisasJumpType::Next {
            if op.writes_memory() {
                control::smc_check(ctx, buf);
            }
            ctx.flags.end_insn(ctx.cg, buf);
        }

        ctx.base.pc_next = insn.next_pc();
        ctx.base.is_jmp = jmp;
        ctx.idx += 1;
        ctx.body_end = buf.offset();
    }

    fn tb_stop(ctx: &mut Self::DisasContext, buf: &mut CodeBuffer) {
        match ctx.base.is_jmp {
            DisasJumpType::Next | DisasJumpType::TooMany => {
                let pc = ctx.base.pc_next;
                ea::end_block(ctx, buf, ea::Pc::Imm(pc), ExitCode::Next);
            }
            DisasJumpType::NoReturn => {}
        }
    }

    fn base(ctx: &Self::DisasContext) -> &DisasContextBase {
        &ctx.base
    }

    fn base_mut(ctx: &mut Self::DisasContext) -> &mut DisasContextBase {
        &mut ctx.base
    }
}

/// Translate the block at `pc` into `buf`.
///
/// The caller guarantees at least [`MIN_BUFFER_HEADROOM`] free bytes;
/// the block is shortened to fit what is left.
pub fn translate_block<B: HostCodeGen>(
    cg: &B,
    buf: &mut CodeBuffer,
    fetch: &mut dyn CodeFetch,
    pc: u32,
    opts: &TranslateOptions,
    helpers: &HelperTable,
) -> TranslationUnit {
    let budget = (buf.remaining() / MAX_INSN_BYTES).saturating_sub(1).max(1) as u32;
    let scan_opts = ScanOptions {
        model: opts.model,
        max_insns: opts.max_insns.min(budget),
        fold_branches: opts.fold_branches,
    };
    let plan = block::scan(fetch, pc, &scan_opts);
    let end_pc = plan.end_pc();
    let host_insns_before = cg.insn_count();

    let mut ctx = M68kDisasContext::new(cg, plan, opts, *helpers);
    translator_loop::<M68kTranslator<'_, B>>(&mut ctx, buf);

    let end = buf.offset();
    let mut unit = TranslationUnit::new(pc);
    unit.high = end_pc;
    unit.host_offset = ctx.unit_start;
    unit.host_size = end - ctx.unit_start;
    unit.prologue_size = (ctx.body_start - ctx.unit_start) as u32;
    unit.epilogue_size = (end - ctx.body_end) as u32;
    unit.guest_insns = ctx.base.num_insns;
    unit.host_insns = (cg.insn_count() - host_insns_before) as u32;
    unit.boundaries = ctx.boundaries.map(Vec::into_boxed_slice);

    tracing::debug!(
        pc = format_args!("{pc:#x}"),
        high = format_args!("{end_pc:#x}"),
        guest_insns = unit.guest_insns,
        host_bytes = unit.host_size,
        evictions = ctx.alloc.evictions(),
        "translated block"
    );
    unit
}
