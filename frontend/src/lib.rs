//! jit68 frontend: guest instruction decoding and host code emission.
//!
//! Provides the generic translation framework (`TranslatorOps` trait
//! and `translator_loop`), the register allocator and the lazy flags
//! model, plus the M68k decoder and emitter built on top of them.

pub mod flags;
pub mod m68k;
pub mod regalloc;

use jit68_backend::CodeBuffer;

pub use m68k::{translate_block, HelperTable, TranslateOptions};

// ---------------------------------------------------------------
// Generic translation framework
// ---------------------------------------------------------------

/// Block termination reason set by `translate_insn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisasJumpType {
    /// Continue to the next sequential instruction.
    Next,
    /// Reached the maximum number of instructions per block.
    TooMany,
    /// Unconditional branch / exit; no fall-through.
    NoReturn,
}

/// Base context shared by all guest architectures.
pub struct DisasContextBase {
    /// PC of the first instruction in this block.
    pub pc_first: u32,
    /// PC of the *next* instruction to translate.
    pub pc_next: u32,
    /// How the current instruction terminates.
    pub is_jmp: DisasJumpType,
    /// Number of guest instructions translated so far.
    pub num_insns: u32,
    /// Maximum instructions allowed in one block.
    pub max_insns: u32,
}

impl DisasContextBase {
    pub fn new(pc: u32, max_insns: u32) -> Self {
        Self {
            pc_first: pc,
            pc_next: pc,
            is_jmp: DisasJumpType::Next,
            num_insns: 0,
            max_insns,
        }
    }
}

/// Per-architecture translation operations.
pub trait TranslatorOps {
    /// Architecture-specific disassembly context.
    type DisasContext;

    /// One-time setup before the translation loop.
    fn init_disas_context(ctx: &mut Self::DisasContext, buf: &mut CodeBuffer);

    /// Called once at the start of the block (after init).
    fn tb_start(ctx: &mut Self::DisasContext, buf: &mut CodeBuffer);

    /// Instruction boundary bookkeeping for the current guest PC.
    fn insn_start(ctx: &mut Self::DisasContext, buf: &mut CodeBuffer);

    /// Translate one guest instruction.
    ///
    /// Must advance `base().pc_next` and set `base().is_jmp`
    /// when the instruction terminates the block.
    fn translate_insn(ctx: &mut Self::DisasContext, buf: &mut CodeBuffer);

    /// Emit the block tail (exit for fall-through).
    fn tb_stop(ctx: &mut Self::DisasContext, buf: &mut CodeBuffer);

    /// Access the base context embedded in the arch context.
    fn base(ctx: &Self::DisasContext) -> &DisasContextBase;

    /// Mutable access to the base context.
    fn base_mut(ctx: &mut Self::DisasContext) -> &mut DisasContextBase;
}

/// Generic translation loop; drives the translate cycle.
pub fn translator_loop<T: TranslatorOps>(ctx: &mut T::DisasContext, buf: &mut CodeBuffer) {
    T::init_disas_context(ctx, buf);
    T::tb_start(ctx, buf);

    loop {
        T::insn_start(ctx, buf);
        T::translate_insn(ctx, buf);

        let base = T::base(ctx);
        if base.is_jmp != DisasJumpType::Next {
            break;
        }
        if base.num_insns >= base.max_insns {
            T::base_mut(ctx).is_jmp = DisasJumpType::TooMany;
            break;
        }
    }

    T::tb_stop(ctx, buf);
}
