//! Lazy condition-code model.
//!
//! Host CF/OF/ZF/SF carry the guest C/V/Z/N bits directly. The model
//! tracks which guest bits the host flags currently hold (`in_host`)
//! and which of those the SR register has not caught up with yet
//! (`pending`). X never lives in host flags: whenever X is wanted it
//! is written to SR straight away.
//!
//! Per instruction the emitter calls [`FlagsState::begin_insn`] with
//! the bits it overwrites, [`FlagsState::before_clobber`] ahead of any
//! flag-destroying host sequence, and one of [`FlagsState::set_host`],
//! [`FlagsState::skip`] or [`FlagsState::wrote_sr`] for the bits it
//! produced.

use jit68_backend::{CodeBuffer, HostCodeGen};
use jit68_core::CcMask;

#[derive(Debug, Clone, Copy)]
pub struct FlagsState {
    in_host: CcMask,
    pending: CcMask,
    /// Bits the current instruction redefines before anyone reads
    /// them; pending copies of these need not be saved.
    overwrites: CcMask,
    lazy: bool,
}

impl FlagsState {
    pub fn new(lazy: bool) -> Self {
        Self {
            in_host: CcMask::NONE,
            pending: CcMask::NONE,
            overwrites: CcMask::NONE,
            lazy,
        }
    }

    #[inline]
    pub fn in_host(&self) -> CcMask {
        self.in_host
    }

    #[inline]
    pub fn pending(&self) -> CcMask {
        self.pending
    }

    #[inline]
    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub fn begin_insn(&mut self, overwrites: CcMask) {
        self.overwrites = overwrites.intersect(CcMask::NZVC);
    }

    /// Save whatever pending bits outlive this instruction; the host
    /// flags are about to be destroyed.
    pub fn before_clobber(&mut self, cg: &impl HostCodeGen, buf: &mut CodeBuffer) {
        let live = self.pending.subtract(self.overwrites);
        if !live.is_empty() {
            cg.ccr_from_flags(buf, live);
        }
        self.pending = CcMask::NONE;
        self.in_host = CcMask::NONE;
    }

    /// Write every pending bit to SR. Host flags stay valid.
    pub fn materialize(&mut self, cg: &impl HostCodeGen, buf: &mut CodeBuffer) {
        self.emit_materialize(cg, buf);
        self.pending = CcMask::NONE;
    }

    /// Emit the SR update for pending bits without changing the
    /// model, for side exits.
    pub fn emit_materialize(&self, cg: &impl HostCodeGen, buf: &mut CodeBuffer) {
        if !self.pending.is_empty() {
            cg.ccr_from_flags(buf, self.pending);
        }
    }

    /// Make `bits` available in host flags, reloading them from SR if
    /// needed.
    pub fn require(&mut self, cg: &impl HostCodeGen, buf: &mut CodeBuffer, bits: CcMask) {
        let bits = bits.intersect(CcMask::NZVC);
        if self.in_host.contains(bits) {
            return;
        }
        self.materialize(cg, buf);
        cg.flags_from_ccr(buf);
        self.in_host = CcMask::NZVC;
    }

    /// A host flag-producing operation defined all four host flags;
    /// `produced` of them hold guest values and `wanted` of those
    /// must eventually reach SR. X, if wanted, takes the carry and is
    /// written immediately.
    pub fn set_host(
        &mut self,
        cg: &impl HostCodeGen,
        buf: &mut CodeBuffer,
        produced: CcMask,
        wanted: CcMask,
    ) {
        if wanted.contains(CcMask::X) {
            cg.ccr_from_flags(buf, CcMask::X);
        }
        let produced = produced.intersect(CcMask::NZVC);
        self.in_host = produced;
        self.pending = self
            .pending
            .subtract(produced)
            .union(wanted.intersect(produced));
        self.overwrites = CcMask::NONE;
    }

    /// The instruction skipped computing `bits`: the old values are
    /// dead everywhere.
    pub fn skip(&mut self, bits: CcMask) {
        self.in_host = self.in_host.subtract(bits);
        self.pending = self.pending.subtract(bits);
    }

    /// The instruction wrote `bits` into SR directly.
    pub fn wrote_sr(&mut self, bits: CcMask) {
        self.in_host = self.in_host.subtract(bits);
        self.pending = self.pending.subtract(bits);
        self.overwrites = CcMask::NONE;
    }

    /// Host flags were destroyed after [`FlagsState::before_clobber`]
    /// or on one of two merging paths.
    pub fn clobbered(&mut self) {
        debug_assert!(self.pending.is_empty(), "pending flags lost");
        self.in_host = CcMask::NONE;
    }

    /// State at a join point or after a helper that rewrote SR.
    pub fn reset(&mut self) {
        debug_assert!(self.pending.is_empty(), "pending flags lost");
        self.in_host = CcMask::NONE;
        self.overwrites = CcMask::NONE;
    }

    /// End of an instruction. Without laziness every computed bit
    /// goes to SR right away.
    pub fn end_insn(&mut self, cg: &impl HostCodeGen, buf: &mut CodeBuffer) {
        if !self.lazy {
            self.materialize(cg, buf);
        }
        self.overwrites = CcMask::NONE;
    }
}
