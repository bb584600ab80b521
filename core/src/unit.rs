use crate::cpu::NUM_GUEST_REGS;

/// Reason generated code returned to the dispatcher, passed in RAX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ExitCode {
    /// Fell off the end of the block; `pc` is the next sequential
    /// instruction.
    Next = 0,
    /// Branch or jump whose target needs a cache lookup.
    Lookup = 1,
    /// `exception` holds a vector to raise.
    Exception = 2,
    /// A folded loop saw a pending interrupt or shutdown request.
    Interrupt = 3,
    /// STOP executed.
    Stop = 4,
    /// RESET executed.
    Reset = 5,
}

impl ExitCode {
    pub const fn from_raw(v: usize) -> Option<ExitCode> {
        match v {
            0 => Some(ExitCode::Next),
            1 => Some(ExitCode::Lookup),
            2 => Some(ExitCode::Exception),
            3 => Some(ExitCode::Interrupt),
            4 => Some(ExitCode::Stop),
            5 => Some(ExitCode::Reset),
            _ => None,
        }
    }
}

/// Register bindings at one guest-instruction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub guest_pc: u32,
    /// Offset of the first host byte of this instruction, relative
    /// to the unit start.
    pub host_offset: u32,
    /// Host register number bound to each guest register.
    pub bindings: [Option<u8>; NUM_GUEST_REGS],
}

/// A cached translated block.
///
/// Covers the guest range `[low, high)`. Identity is `low`.
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    pub low: u32,
    pub high: u32,
    /// Offset into the code buffer where host code starts.
    pub host_offset: usize,
    pub host_size: usize,
    /// Bytes emitted before the first guest instruction.
    pub prologue_size: u32,
    /// Bytes emitted after the last guest instruction.
    pub epilogue_size: u32,
    pub guest_insns: u32,
    pub host_insns: u32,
    pub use_count: u64,
    pub boundaries: Option<Box<[Boundary]>>,
}

impl TranslationUnit {
    pub fn new(low: u32) -> Self {
        Self {
            low,
            high: low,
            host_offset: 0,
            host_size: 0,
            prologue_size: 0,
            epilogue_size: 0,
            guest_insns: 0,
            host_insns: 0,
            use_count: 0,
            boundaries: None,
        }
    }

    #[inline]
    pub fn contains(&self, addr: u32) -> bool {
        self.low <= addr && addr < self.high
    }

    /// Whether `[lo, hi)` intersects the guest range.
    #[inline]
    pub fn overlaps(&self, lo: u32, hi: u32) -> bool {
        lo < self.high && self.low < hi
    }

    #[inline]
    pub fn contains_host(&self, offset: usize) -> bool {
        self.host_offset <= offset && offset < self.host_offset + self.host_size
    }

    /// Boundary record for the instruction at `pc`, if recorded.
    pub fn boundary_at(&self, pc: u32) -> Option<&Boundary> {
        self.boundaries
            .as_deref()?
            .iter()
            .find(|b| b.guest_pc == pc)
    }
}
