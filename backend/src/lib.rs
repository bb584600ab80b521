//! Host code generation for the jit68 translator.
//!
//! The frontend talks to the host through [`HostCodeGen`], a small
//! code-builder interface (move, load, store, ALU, flags transfer,
//! branches, helper calls). One implementation exists per host
//! architecture and is selected once when the dispatcher is built.

pub mod code_buffer;
pub mod label;
pub mod x86_64;

pub use code_buffer::CodeBuffer;
pub use label::{Label, LabelUse, RelocKind};
pub use x86_64::X86_64CodeGen;

use jit68_core::{CcMask, ExitCode, RegSet, Size};

/// Host register number in the backend's own encoding.
pub type HostReg = u8;

/// Host operand width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
}

impl From<Size> for Width {
    fn from(size: Size) -> Self {
        match size {
            Size::Byte => Width::W8,
            Size::Word => Width::W16,
            Size::Long => Width::W32,
        }
    }
}

/// Two-operand ALU operations. Discriminants match the x86 /r
/// encoding of the 0x81/0x83 group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AluOp {
    Add = 0,
    Or = 1,
    Adc = 2,
    Sbb = 3,
    And = 4,
    Sub = 5,
    Xor = 6,
    Cmp = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShiftOp {
    Rol = 0,
    Ror = 1,
    Shl = 4,
    Shr = 5,
    Sar = 7,
}

/// Bit test operations; the tested bit is left in the carry flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BitOp {
    Bt = 4,
    Bts = 5,
    Btr = 6,
    Btc = 7,
}

/// Predicates over host arithmetic flags.
///
/// The host flags carry the guest C/V/Z/N bits directly, so each
/// guest condition maps to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HostCond {
    Overflow = 0x0,
    NoOverflow = 0x1,
    Below = 0x2,
    AboveEq = 0x3,
    Eq = 0x4,
    Ne = 0x5,
    BelowEq = 0x6,
    Above = 0x7,
    Sign = 0x8,
    NoSign = 0x9,
    Less = 0xC,
    GreaterEq = 0xD,
    LessEq = 0xE,
    Greater = 0xF,
}

impl HostCond {
    pub const fn invert(self) -> HostCond {
        match self {
            HostCond::Overflow => HostCond::NoOverflow,
            HostCond::NoOverflow => HostCond::Overflow,
            HostCond::Below => HostCond::AboveEq,
            HostCond::AboveEq => HostCond::Below,
            HostCond::Eq => HostCond::Ne,
            HostCond::Ne => HostCond::Eq,
            HostCond::BelowEq => HostCond::Above,
            HostCond::Above => HostCond::BelowEq,
            HostCond::Sign => HostCond::NoSign,
            HostCond::NoSign => HostCond::Sign,
            HostCond::Less => HostCond::GreaterEq,
            HostCond::GreaterEq => HostCond::Less,
            HostCond::LessEq => HostCond::Greater,
            HostCond::Greater => HostCond::LessEq,
        }
    }
}

/// Memory operand `[base + index << shift + disp]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mem {
    pub base: HostReg,
    pub index: Option<HostReg>,
    pub shift: u8,
    pub disp: i32,
}

impl Mem {
    pub const fn base(base: HostReg, disp: i32) -> Self {
        Self {
            base,
            index: None,
            shift: 0,
            disp,
        }
    }

    pub const fn indexed(base: HostReg, index: HostReg, shift: u8, disp: i32) -> Self {
        Self {
            base,
            index: Some(index),
            shift,
            disp,
        }
    }
}

/// Trait for host architecture code generators.
///
/// All 32-bit and narrower operations must leave the upper half of a
/// 64-bit host register zeroed (or untouched for 8/16-bit partial
/// writes), and `mov_*`, `load`, `store`, `lea`, `extend`, `bswap`
/// (32-bit), `setcc` and `call` must not modify host flags except
/// where stated.
pub trait HostCodeGen {
    // -- Fixed register roles --

    /// Guest state base pointer.
    fn env_reg(&self) -> HostReg;
    /// Live guest status register.
    fn sr_reg(&self) -> HostReg;
    /// Guest PC handed back to the dispatcher on exit.
    fn pc_reg(&self) -> HostReg;
    fn stack_reg(&self) -> HostReg;
    /// Two registers the backend sequences may clobber freely.
    fn scratch_regs(&self) -> [HostReg; 2];
    /// Allocation pool, in first-fit order.
    fn allocatable_regs(&self) -> &'static [HostReg];
    fn caller_saved(&self) -> RegSet;
    fn call_arg_regs(&self) -> &'static [HostReg];
    fn return_reg(&self) -> HostReg;
    /// Stack offset and slot count of the 8-byte spill area used
    /// around helper calls.
    fn spill_area(&self) -> (i32, usize);

    // -- Entry and exit --

    /// Emit the prologue: save callee-saved registers, set up the
    /// env pointer, load the live guest registers and jump to the
    /// unit code.
    fn emit_prologue(&mut self, buf: &mut CodeBuffer);

    /// Emit the epilogue: store the live guest registers back,
    /// restore callee-saved registers and return the exit code.
    fn emit_epilogue(&mut self, buf: &mut CodeBuffer);

    fn epilogue_offset(&self) -> usize;

    /// First offset after prologue and epilogue.
    fn code_gen_start(&self) -> usize;

    /// Host instructions emitted so far.
    fn insn_count(&self) -> u64;

    // -- Data movement --

    fn mov_rr(&self, buf: &mut CodeBuffer, w: Width, dst: HostReg, src: HostReg);
    /// Load a 32-bit constant, zeroing the upper half. Never touches flags.
    fn mov_ri(&self, buf: &mut CodeBuffer, dst: HostReg, imm: u32);
    fn mov_ri64(&self, buf: &mut CodeBuffer, dst: HostReg, imm: u64);
    /// Zero-extending load.
    fn load(&self, buf: &mut CodeBuffer, w: Width, dst: HostReg, mem: Mem);
    fn store(&self, buf: &mut CodeBuffer, w: Width, src: HostReg, mem: Mem);
    fn store_imm(&self, buf: &mut CodeBuffer, mem: Mem, imm: u32);
    fn lea(&self, buf: &mut CodeBuffer, w: Width, dst: HostReg, mem: Mem);
    /// Widen `from` bits of `src` into the 32-bit `dst`.
    fn extend(&self, buf: &mut CodeBuffer, dst: HostReg, src: HostReg, from: Width, signed: bool);
    /// Byte-reverse the low `w` bits (16 or 32). The 16-bit form
    /// modifies carry and overflow.
    fn bswap(&self, buf: &mut CodeBuffer, w: Width, reg: HostReg);

    // -- Arithmetic --

    fn alu_rr(&self, buf: &mut CodeBuffer, op: AluOp, w: Width, dst: HostReg, src: HostReg);
    fn alu_ri(&self, buf: &mut CodeBuffer, op: AluOp, w: Width, dst: HostReg, imm: i32);
    fn alu_rm(&self, buf: &mut CodeBuffer, op: AluOp, w: Width, dst: HostReg, mem: Mem);
    fn alu_mi(&self, buf: &mut CodeBuffer, op: AluOp, w: Width, mem: Mem, imm: i32);
    fn test_rr(&self, buf: &mut CodeBuffer, w: Width, a: HostReg, b: HostReg);
    fn test_ri(&self, buf: &mut CodeBuffer, w: Width, reg: HostReg, imm: u32);
    fn neg(&self, buf: &mut CodeBuffer, w: Width, reg: HostReg);
    fn not(&self, buf: &mut CodeBuffer, w: Width, reg: HostReg);
    fn shift_ri(&self, buf: &mut CodeBuffer, op: ShiftOp, w: Width, reg: HostReg, imm: u8);
    fn bit_ri(&self, buf: &mut CodeBuffer, op: BitOp, reg: HostReg, bit: u8);
    /// Bit number taken modulo 32 from `bit`.
    fn bit_rr(&self, buf: &mut CodeBuffer, op: BitOp, reg: HostReg, bit: HostReg);

    // -- Flags --

    fn setcc(&self, buf: &mut CodeBuffer, cond: HostCond, dst: HostReg);
    /// Copy the host flags word into `dst`.
    fn save_flags(&self, buf: &mut CodeBuffer, dst: HostReg);
    /// Load the host flags word from `src`.
    fn restore_flags(&self, buf: &mut CodeBuffer, src: HostReg);
    /// Copy the guest condition codes in `mask` from the host flags
    /// into the SR register; X, when asked for, takes the carry.
    /// Host flags survive; both scratch registers are clobbered.
    fn ccr_from_flags(&self, buf: &mut CodeBuffer, mask: CcMask);
    /// Load the host flags from the NZVC bits of the SR register.
    /// Clobbers both scratch registers.
    fn flags_from_ccr(&self, buf: &mut CodeBuffer);

    // -- Control flow --

    fn jcc(&self, buf: &mut CodeBuffer, cond: HostCond, label: &mut Label);
    fn jmp(&self, buf: &mut CodeBuffer, label: &mut Label);
    /// Branch to `label` when the 32-bit word at `mem` is non-zero,
    /// without touching host flags. Clobbers the second scratch
    /// register.
    fn jnz_mem_keep_flags(&self, buf: &mut CodeBuffer, mem: Mem, label: &mut Label);
    /// Place `label` at the current offset and patch pending uses.
    fn bind(&self, buf: &mut CodeBuffer, label: &mut Label);
    /// Call an `extern "C"` function. Clobbers flags and every
    /// caller-saved register.
    fn call(&self, buf: &mut CodeBuffer, target: usize);
    /// Return to the dispatcher with `code`.
    fn exit(&self, buf: &mut CodeBuffer, code: ExitCode);
}
