//! Block scanner.
//!
//! Decodes a whole block before any code is emitted. That fixes
//! where the block ends, which backward branches fold into it, and
//! for each instruction the condition codes still needed after it.

use jit68_core::{CcMask, CodeFetch, Cond, CpuModel};

use super::decode::{decode, Flow, Insn};

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub model: CpuModel,
    pub max_insns: u32,
    pub fold_branches: bool,
}

#[derive(Debug, Clone)]
pub struct BlockPlan {
    pub insns: Vec<Insn>,
    /// Condition codes read after instruction `i` before being
    /// redefined, or that must reach SR because control may leave.
    pub needed_after: Vec<CcMask>,
    /// Instruction `i` is the target of a folded branch.
    pub join: Vec<bool>,
    /// Instruction `i` is a branch folded into the block.
    pub folded: Vec<bool>,
}

impl BlockPlan {
    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// Index of the instruction starting at `pc`.
    pub fn index_of(&self, pc: u32) -> Option<usize> {
        self.insns.iter().position(|i| i.pc == pc)
    }

    /// First guest address past the block.
    pub fn end_pc(&self) -> u32 {
        self.insns.last().map_or(0, Insn::next_pc)
    }
}

/// Control may leave the block during or after `insn`.
pub fn is_exit(insn: &Insn, model: CpuModel) -> bool {
    insn.op.flow() != Flow::Next
        || insn.op.writes_memory()
        || insn.op.may_trap()
        || insn.op.privileged(model)
}

/// Control may leave the block before `insn` has defined its flags.
pub fn exits_early(insn: &Insn, model: CpuModel) -> bool {
    insn.op.may_trap() || insn.op.privileged(model)
}

pub fn scan(fetch: &mut dyn CodeFetch, start: u32, opts: &ScanOptions) -> BlockPlan {
    let max = opts.max_insns.max(1) as usize;
    let mut insns: Vec<Insn> = Vec::new();
    let mut join = Vec::new();
    let mut folded = Vec::new();
    let mut pc = start;

    loop {
        let insn = decode(fetch, pc, opts.model);
        insns.push(insn);
        join.push(false);
        folded.push(false);
        let i = insns.len() - 1;

        let fold_target = |target: u32| {
            if !opts.fold_branches {
                return None;
            }
            insns.iter().position(|x| x.pc == target)
        };

        let stop = match insn.op.flow() {
            Flow::Next => false,
            Flow::Branch { cond, target } | Flow::Loop { cond, target } => {
                match fold_target(target) {
                    Some(t) => {
                        join[t] = true;
                        folded[i] = true;
                        // Nothing follows an unconditional branch.
                        cond == Cond::True && matches!(insn.op.flow(), Flow::Branch { .. })
                    }
                    None => true,
                }
            }
            Flow::End => true,
        };
        if stop || insns.len() >= max {
            break;
        }
        pc = insn.next_pc();
    }

    let needed_after = lookahead(&insns, &join, opts.model);
    BlockPlan {
        insns,
        needed_after,
        join,
        folded,
    }
}

/// Backward pass computing `needed_after` for every instruction.
fn lookahead(insns: &[Insn], join: &[bool], model: CpuModel) -> Vec<CcMask> {
    let n = insns.len();
    let mut needed = vec![CcMask::ALL; n];
    for i in (0..n.saturating_sub(1)).rev() {
        let next = &insns[i + 1];
        needed[i] = if is_exit(&insns[i], model) || join[i + 1] || exits_early(next, model) {
            CcMask::ALL
        } else {
            next.op
                .uses()
                .union(needed[i + 1].subtract(next.op.sets()))
        };
    }
    needed
}
