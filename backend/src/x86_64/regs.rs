use jit68_core::RegSet;

/// x86-64 general-purpose register indices.
///
/// Encoding matches the x86-64 ModR/M and REX register numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

const ALL: [Reg; 16] = [
    Reg::Rax,
    Reg::Rcx,
    Reg::Rdx,
    Reg::Rbx,
    Reg::Rsp,
    Reg::Rbp,
    Reg::Rsi,
    Reg::Rdi,
    Reg::R8,
    Reg::R9,
    Reg::R10,
    Reg::R11,
    Reg::R12,
    Reg::R13,
    Reg::R14,
    Reg::R15,
];

impl Reg {
    #[inline]
    pub const fn from_u8(n: u8) -> Reg {
        ALL[(n & 0xF) as usize]
    }

    /// Low 3 bits of the register encoding (for ModR/M).
    #[inline]
    pub const fn low3(self) -> u8 {
        (self as u8) & 0x7
    }

    /// Whether this register requires a REX prefix (R8-R15).
    #[inline]
    pub const fn needs_rex(self) -> bool {
        (self as u8) >= 8
    }
}

/// Guest state pointer, live for the whole unit.
pub const ENV_REG: Reg = Reg::Rbp;
/// Live guest SR.
pub const SR_REG: Reg = Reg::R12;
/// Guest PC reported to the dispatcher at exit.
pub const PC_REG: Reg = Reg::R13;
/// Clobbered freely by emitted sequences; never allocated.
pub const SCRATCH: [Reg; 2] = [Reg::Rax, Reg::Rcx];

/// Registers available for guest register bindings. Callee-saved
/// ones come first so the common case survives helper calls.
pub const ALLOCATABLE: &[u8] = &[
    Reg::Rbx as u8,
    Reg::R14 as u8,
    Reg::R15 as u8,
    Reg::Rsi as u8,
    Reg::Rdi as u8,
    Reg::R8 as u8,
    Reg::R9 as u8,
    Reg::R10 as u8,
    Reg::R11 as u8,
    Reg::Rdx as u8,
];

/// Callee-saved registers that the prologue must save/restore
/// (System V ABI).
pub const CALLEE_SAVED: &[Reg] = &[Reg::Rbp, Reg::Rbx, Reg::R12, Reg::R13, Reg::R14, Reg::R15];

pub const CALLER_SAVED: RegSet = RegSet::from_raw(
    (1 << Reg::Rax as u32)
        | (1 << Reg::Rcx as u32)
        | (1 << Reg::Rdx as u32)
        | (1 << Reg::Rsi as u32)
        | (1 << Reg::Rdi as u32)
        | (1 << Reg::R8 as u32)
        | (1 << Reg::R9 as u32)
        | (1 << Reg::R10 as u32)
        | (1 << Reg::R11 as u32),
);

/// Function argument registers (System V AMD64 ABI).
pub const CALL_ARG_REGS: &[u8] = &[
    Reg::Rdi as u8,
    Reg::Rsi as u8,
    Reg::Rdx as u8,
    Reg::Rcx as u8,
    Reg::R8 as u8,
    Reg::R9 as u8,
];

pub const STACK_ALIGN: usize = 16;
/// Space reserved for outgoing call arguments on the stack.
pub const STATIC_CALL_ARGS_SIZE: usize = 128;
/// 8-byte slots for registers spilled around helper calls.
pub const SPILL_SLOTS: usize = 16;

/// Total push size: return address (implicit) + callee-saved pushes.
pub const PUSH_SIZE: usize = (1 + CALLEE_SAVED.len()) * 8;

/// Total frame size (16-byte aligned).
pub const FRAME_SIZE: usize = {
    let raw = PUSH_SIZE + STATIC_CALL_ARGS_SIZE + SPILL_SLOTS * 8;
    (raw + STACK_ALIGN - 1) & !(STACK_ALIGN - 1)
};

/// Stack adjustment after pushes.
pub const STACK_ADDEND: usize = FRAME_SIZE - PUSH_SIZE;
