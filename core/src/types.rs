/// Guest operand size.
///
/// Encoded the way most 68k instructions encode it in bits 7..6
/// (`00` byte, `01` word, `10` long).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Size {
    Byte = 0,
    Word = 1,
    Long = 2,
}

impl Size {
    /// Decode the common two-bit size field. `0b11` is not a size.
    pub const fn from_bits(bits: u16) -> Option<Size> {
        match bits & 3 {
            0 => Some(Size::Byte),
            1 => Some(Size::Word),
            2 => Some(Size::Long),
            _ => None,
        }
    }

    pub const fn from_bytes(bytes: u32) -> Option<Size> {
        match bytes {
            1 => Some(Size::Byte),
            2 => Some(Size::Word),
            4 => Some(Size::Long),
            _ => None,
        }
    }

    pub const fn bytes(self) -> u32 {
        match self {
            Size::Byte => 1,
            Size::Word => 2,
            Size::Long => 4,
        }
    }

    pub const fn bits(self) -> u32 {
        self.bytes() * 8
    }

    pub const fn mask(self) -> u32 {
        match self {
            Size::Byte => 0xFF,
            Size::Word => 0xFFFF,
            Size::Long => 0xFFFF_FFFF,
        }
    }

    pub const fn msb(self) -> u32 {
        1 << (self.bits() - 1)
    }

    /// Sign-extend the low `self` bits of `v` to 32 bits.
    pub const fn sign_extend(self, v: u32) -> u32 {
        match self {
            Size::Byte => v as u8 as i8 as i32 as u32,
            Size::Word => v as u16 as i16 as i32 as u32,
            Size::Long => v,
        }
    }

    pub const fn suffix(self) -> &'static str {
        match self {
            Size::Byte => "b",
            Size::Word => "w",
            Size::Long => "l",
        }
    }
}

/// 68k bus function code presented with every access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    UserData = 1,
    UserProgram = 2,
    SupervisorData = 5,
    SupervisorProgram = 6,
    CpuSpace = 7,
}

impl FunctionCode {
    /// Function code for an access made with status register `sr`.
    pub const fn from_sr(sr: u32, program: bool) -> FunctionCode {
        let supervisor = sr & crate::cpu::SR_S != 0;
        match (supervisor, program) {
            (false, false) => FunctionCode::UserData,
            (false, true) => FunctionCode::UserProgram,
            (true, false) => FunctionCode::SupervisorData,
            (true, true) => FunctionCode::SupervisorProgram,
        }
    }
}

/// Set of condition-code bits, laid out like the CCR (`XNZVC`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CcMask(u8);

impl CcMask {
    pub const NONE: CcMask = CcMask(0);
    pub const C: CcMask = CcMask(0x01);
    pub const V: CcMask = CcMask(0x02);
    pub const Z: CcMask = CcMask(0x04);
    pub const N: CcMask = CcMask(0x08);
    pub const X: CcMask = CcMask(0x10);
    pub const NZVC: CcMask = CcMask(0x0F);
    pub const ALL: CcMask = CcMask(0x1F);

    pub const fn from_raw(bits: u8) -> Self {
        Self(bits & 0x1F)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn union(self, other: CcMask) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn intersect(self, other: CcMask) -> Self {
        Self(self.0 & other.0)
    }

    pub const fn subtract(self, other: CcMask) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn contains(self, other: CcMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: CcMask) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Debug for CcMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = [(0x10, 'X'), (0x08, 'N'), (0x04, 'Z'), (0x02, 'V'), (0x01, 'C')];
        write!(f, "CcMask(")?;
        for (bit, name) in names {
            let c = if self.0 & bit != 0 { name } else { '-' };
            write!(f, "{c}")?;
        }
        write!(f, ")")
    }
}

/// 68k condition predicate, numbered as in the Bcc/Scc/DBcc field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Cond {
    True = 0,
    False = 1,
    Hi = 2,
    Ls = 3,
    Cc = 4,
    Cs = 5,
    Ne = 6,
    Eq = 7,
    Vc = 8,
    Vs = 9,
    Pl = 10,
    Mi = 11,
    Ge = 12,
    Lt = 13,
    Gt = 14,
    Le = 15,
}

impl Cond {
    const ALL: [Cond; 16] = [
        Cond::True,
        Cond::False,
        Cond::Hi,
        Cond::Ls,
        Cond::Cc,
        Cond::Cs,
        Cond::Ne,
        Cond::Eq,
        Cond::Vc,
        Cond::Vs,
        Cond::Pl,
        Cond::Mi,
        Cond::Ge,
        Cond::Lt,
        Cond::Gt,
        Cond::Le,
    ];

    pub const fn from_bits(bits: u16) -> Cond {
        Self::ALL[(bits & 0xF) as usize]
    }

    /// Predicates pair up on the low bit.
    pub const fn invert(self) -> Cond {
        Self::ALL[(self as usize) ^ 1]
    }

    /// Condition-code bits this predicate reads.
    pub const fn uses(self) -> CcMask {
        match self {
            Cond::True | Cond::False => CcMask::NONE,
            Cond::Hi | Cond::Ls => CcMask::from_raw(0x05),
            Cond::Cc | Cond::Cs => CcMask::C,
            Cond::Ne | Cond::Eq => CcMask::Z,
            Cond::Vc | Cond::Vs => CcMask::V,
            Cond::Pl | Cond::Mi => CcMask::N,
            Cond::Ge | Cond::Lt => CcMask::from_raw(0x0A),
            Cond::Gt | Cond::Le => CcMask::from_raw(0x0E),
        }
    }

    /// Evaluate against a CCR value.
    pub const fn test(self, ccr: u32) -> bool {
        let c = ccr & 1 != 0;
        let v = ccr & 2 != 0;
        let z = ccr & 4 != 0;
        let n = ccr & 8 != 0;
        match self {
            Cond::True => true,
            Cond::False => false,
            Cond::Hi => !c && !z,
            Cond::Ls => c || z,
            Cond::Cc => !c,
            Cond::Cs => c,
            Cond::Ne => !z,
            Cond::Eq => z,
            Cond::Vc => !v,
            Cond::Vs => v,
            Cond::Pl => !n,
            Cond::Mi => n,
            Cond::Ge => n == v,
            Cond::Lt => n != v,
            Cond::Gt => !z && n == v,
            Cond::Le => z || n != v,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Cond::True => "t",
            Cond::False => "f",
            Cond::Hi => "hi",
            Cond::Ls => "ls",
            Cond::Cc => "cc",
            Cond::Cs => "cs",
            Cond::Ne => "ne",
            Cond::Eq => "eq",
            Cond::Vc => "vc",
            Cond::Vs => "vs",
            Cond::Pl => "pl",
            Cond::Mi => "mi",
            Cond::Ge => "ge",
            Cond::Lt => "lt",
            Cond::Gt => "gt",
            Cond::Le => "le",
        }
    }
}

/// Bitmap of host registers.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegSet(u32);

impl RegSet {
    pub const EMPTY: RegSet = RegSet(0);

    pub const fn from_raw(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn set(self, reg: u8) -> Self {
        Self(self.0 | (1u32 << reg))
    }

    pub const fn clear(self, reg: u8) -> Self {
        Self(self.0 & !(1u32 << reg))
    }

    pub const fn contains(self, reg: u8) -> bool {
        self.0 & (1u32 << reg) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    pub fn iter(self) -> impl Iterator<Item = u8> {
        (0..32u8).filter(move |&r| self.contains(r))
    }
}

impl Default for RegSet {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl std::fmt::Debug for RegSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RegSet(0x{:08x})", self.0)
    }
}
