//! M68k instruction decoder.
//!
//! Turns the big-endian instruction stream into [`Insn`] values with
//! fully decoded operands. Encodings without defined behaviour on the
//! configured model decode to [`Op::Illegal`].

use jit68_core::cpu::A0;
use jit68_core::{CcMask, CodeFetch, Cond, CpuModel, Size};

use super::fpu::{self, FpuOp};

// ---------------------------------------------------------------
// Operands
// ---------------------------------------------------------------

/// Index register of an indexed addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Index {
    /// Guest register number (D0..D7 = 0..7, A0..A7 = 8..15).
    pub reg: u8,
    /// Use the full register instead of the sign-extended low word.
    pub long: bool,
    /// log2 of the scale factor.
    pub scale: u8,
}

/// Decoded effective address.
///
/// Register numbers inside `AReg`, `Ind`, `PostInc`, `PreDec`, `Disp`
/// and `Indexed::base` are address register numbers 0..7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ea {
    DReg(u8),
    AReg(u8),
    Ind(u8),
    PostInc(u8),
    PreDec(u8),
    Disp(u8, i32),
    /// `(disp, base, index)`. A PC base has already been folded into
    /// `disp`; with both base and index suppressed this is absolute.
    Indexed {
        base: Option<u8>,
        index: Option<Index>,
        disp: u32,
        pc_rel: bool,
    },
    Abs(u32),
    /// PC-relative with the target already resolved.
    PcDisp(u32),
    Imm(u32),
}

impl Ea {
    pub const fn is_memory(&self) -> bool {
        !matches!(self, Ea::DReg(_) | Ea::AReg(_) | Ea::Imm(_))
    }

    pub const fn is_data(&self) -> bool {
        !matches!(self, Ea::AReg(_))
    }

    pub const fn is_control(&self) -> bool {
        matches!(
            self,
            Ea::Ind(_) | Ea::Disp(..) | Ea::Indexed { .. } | Ea::Abs(_) | Ea::PcDisp(_)
        )
    }

    pub const fn is_alterable(&self) -> bool {
        !matches!(
            self,
            Ea::PcDisp(_) | Ea::Imm(_) | Ea::Indexed { pc_rel: true, .. }
        )
    }

    /// Guest register number of a register-direct operand.
    pub const fn reg(&self) -> Option<u8> {
        match *self {
            Ea::DReg(n) => Some(n),
            Ea::AReg(n) => Some(A0 + n),
            _ => None,
        }
    }
}

/// Addressing-mode category an instruction accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    All,
    Data,
    DataNoImm,
    Control,
    DataAlterable,
    MemoryAlterable,
    ControlOrPostInc,
    ControlAlterableOrPreDec,
}

impl Class {
    fn accepts(self, ea: &Ea) -> bool {
        match self {
            Class::All => true,
            Class::Data => ea.is_data(),
            Class::DataNoImm => ea.is_data() && !matches!(ea, Ea::Imm(_)),
            Class::Control => ea.is_control(),
            Class::DataAlterable => ea.is_data() && ea.is_alterable(),
            Class::MemoryAlterable => ea.is_memory() && ea.is_alterable(),
            Class::ControlOrPostInc => ea.is_control() || matches!(ea, Ea::PostInc(_)),
            Class::ControlAlterableOrPreDec => {
                (ea.is_control() && ea.is_alterable()) || matches!(ea, Ea::PreDec(_))
            }
        }
    }
}

// ---------------------------------------------------------------
// Operations
// ---------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithKind {
    Add,
    Sub,
    And,
    Or,
    Eor,
    Cmp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftKind {
    Arith,
    Logical,
    RotateX,
    Rotate,
}

impl ShiftKind {
    const fn from_bits(bits: u16) -> ShiftKind {
        match bits & 3 {
            0 => ShiftKind::Arith,
            1 => ShiftKind::Logical,
            2 => ShiftKind::RotateX,
            _ => ShiftKind::Rotate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftCount {
    Imm(u8),
    /// Count taken modulo 64 from a data register.
    Reg(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitKind {
    Test,
    Change,
    Clear,
    Set,
}

impl BitKind {
    const fn from_bits(bits: u16) -> BitKind {
        match bits & 3 {
            0 => BitKind::Test,
            1 => BitKind::Change,
            2 => BitKind::Clear,
            _ => BitKind::Set,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitNum {
    Imm(u8),
    Reg(u8),
}

/// Decoded instruction body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Move { size: Size, src: Ea, dst: Ea },
    Movea { size: Size, src: Ea, an: u8 },
    Moveq { value: u32, dn: u8 },
    /// Register list in instruction order: bit 0 is D0 for every mode
    /// except `-(An)`, where it is A7.
    Movem { size: Size, to_mem: bool, mask: u16, ea: Ea },
    Movep { size: Size, to_mem: bool, dn: u8, an: u8, disp: i32 },
    Lea { src: Ea, an: u8 },
    Pea { src: Ea },
    /// Guest register numbers.
    Exg { rx: u8, ry: u8 },
    Swap { dn: u8 },
    Link { an: u8, disp: i32 },
    Unlk { an: u8 },
    Clr { size: Size, dst: Ea },
    /// Sign-extend byte to word, word to long, or byte to long.
    Ext { size: Size, dn: u8, from_byte: bool },
    Arith { op: ArithKind, size: Size, src: Ea, dst: Ea },
    /// ADDA/SUBA/CMPA and the quick forms targeting An. Always
    /// operates on the full address register.
    ArithA { op: ArithKind, size: Size, src: Ea, an: u8 },
    /// ADDX/SUBX; `mem` selects the `-(Ay),-(Ax)` form.
    ArithX { sub: bool, size: Size, mem: bool, src: u8, dst: u8 },
    Cmpm { size: Size, src: u8, dst: u8 },
    Neg { size: Size, dst: Ea, extend: bool },
    Not { size: Size, dst: Ea },
    Tst { size: Size, src: Ea },
    /// `dh` is set for the 64-bit product form.
    Mul { signed: bool, long: bool, src: Ea, dl: u8, dh: Option<u8> },
    /// `dr` receives the remainder of the long forms when distinct
    /// from `dq`; `wide` selects the 64-bit dividend `dr:dq`.
    Div { signed: bool, long: bool, src: Ea, dq: u8, dr: Option<u8>, wide: bool },
    Shift { kind: ShiftKind, left: bool, size: Size, count: ShiftCount, dst: Ea },
    Bit { kind: BitKind, bit: BitNum, dst: Ea },
    /// ABCD/SBCD; `mem` selects the `-(Ay),-(Ax)` form.
    Bcd { sub: bool, mem: bool, src: u8, dst: u8 },
    Nbcd { dst: Ea },
    Tas { dst: Ea },
    Bcc { cond: Cond, target: u32 },
    Bsr { target: u32 },
    Dbcc { cond: Cond, dn: u8, target: u32 },
    Scc { cond: Cond, dst: Ea },
    Jmp { ea: Ea },
    Jsr { ea: Ea },
    Rts,
    Rtr,
    Rtd { disp: i32 },
    Nop,
    MoveFromSr { dst: Ea },
    MoveToSr { src: Ea },
    MoveFromCcr { dst: Ea },
    MoveToCcr { src: Ea },
    LogicCcr { op: ArithKind, imm: u16 },
    LogicSr { op: ArithKind, imm: u16 },
    MoveUsp { to_usp: bool, an: u8 },
    /// `reg` is a guest register number.
    Movec { to_ctrl: bool, ctrl: u16, reg: u8 },
    Rte,
    Stop { sr: u16 },
    Reset,
    Trap { vector: u8 },
    Trapv,
    Chk { size: Size, src: Ea, dn: u8 },
    Illegal,
    LineA,
    LineF { fpu: Option<FpuOp> },
}

/// How an instruction continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Next,
    Branch { cond: Cond, target: u32 },
    /// DBcc: exits on `cond`, otherwise decrements and branches.
    Loop { cond: Cond, target: u32 },
    /// Leaves the block unconditionally.
    End,
}

impl Op {
    /// Condition codes the instruction defines on every path.
    pub fn sets(&self) -> CcMask {
        use Op::*;
        match *self {
            Move { .. }
            | Moveq { .. }
            | Clr { .. }
            | Ext { .. }
            | Swap { .. }
            | Tst { .. }
            | Not { .. }
            | Tas { .. }
            | Mul { .. }
            | Div { .. }
            | Cmpm { .. } => CcMask::NZVC,
            Arith { op, .. } => match op {
                ArithKind::Add | ArithKind::Sub => CcMask::ALL,
                _ => CcMask::NZVC,
            },
            ArithA { op: ArithKind::Cmp, .. } => CcMask::NZVC,
            ArithX { .. } | Neg { .. } => CcMask::ALL,
            Shift { kind, count, .. } => match (kind, count) {
                (ShiftKind::Rotate, _) => CcMask::NZVC,
                (ShiftKind::RotateX, _) => CcMask::ALL,
                (_, ShiftCount::Imm(_)) => CcMask::ALL,
                // A zero count leaves X alone.
                (_, ShiftCount::Reg(_)) => CcMask::NZVC,
            },
            Bit { .. } => CcMask::Z,
            Bcd { .. } | Nbcd { .. } => CcMask::X.union(CcMask::Z).union(CcMask::C),
            MoveToCcr { .. } | MoveToSr { .. } | LogicCcr { .. } | LogicSr { .. } | Rtr | Rte => {
                CcMask::ALL
            }
            _ => CcMask::NONE,
        }
    }

    /// Condition codes the instruction reads.
    pub fn uses(&self) -> CcMask {
        use Op::*;
        match *self {
            ArithX { .. } | Neg { extend: true, .. } | Bcd { .. } | Nbcd { .. } => {
                CcMask::X.union(CcMask::Z)
            }
            Shift {
                kind: ShiftKind::RotateX,
                ..
            } => CcMask::X,
            Bcc { cond, .. } | Dbcc { cond, .. } | Scc { cond, .. } => cond.uses(),
            Trapv => CcMask::V,
            MoveFromSr { .. } | MoveFromCcr { .. } | LogicCcr { .. } | LogicSr { .. } => {
                CcMask::ALL
            }
            _ => CcMask::NONE,
        }
    }

    pub fn flow(&self) -> Flow {
        use Op::*;
        match *self {
            Bcc { cond, target } => Flow::Branch { cond, target },
            Dbcc {
                cond: Cond::True, ..
            } => Flow::Next,
            Dbcc { cond, target, .. } => Flow::Loop { cond, target },
            Bsr { .. } | Jmp { .. } | Jsr { .. } | Rts | Rtr | Rtd { .. } | Rte | Trap { .. }
            | Illegal | LineA | LineF { .. } | Stop { .. } | Reset | MoveToSr { .. }
            | LogicSr { .. } | Movec { .. } => Flow::End,
            _ => Flow::Next,
        }
    }

    /// Can raise an exception and continue elsewhere.
    pub fn may_trap(&self) -> bool {
        matches!(self, Op::Trapv | Op::Chk { .. } | Op::Div { .. })
    }

    pub fn privileged(&self, model: CpuModel) -> bool {
        use Op::*;
        match self {
            MoveToSr { .. } | LogicSr { .. } | MoveUsp { .. } | Movec { .. } | Rte | Stop { .. }
            | Reset => true,
            MoveFromSr { .. } => model.at_least_010(),
            _ => false,
        }
    }

    /// Stores to guest memory.
    pub fn writes_memory(&self) -> bool {
        use Op::*;
        match *self {
            Move { dst, .. }
            | Clr { dst, .. }
            | Neg { dst, .. }
            | Not { dst, .. }
            | Scc { dst, .. }
            | Tas { dst }
            | Nbcd { dst }
            | MoveFromSr { dst }
            | MoveFromCcr { dst }
            | Shift { dst, .. } => dst.is_memory(),
            Arith { op, dst, .. } => op != ArithKind::Cmp && dst.is_memory(),
            Bit { kind, dst, .. } => kind != BitKind::Test && dst.is_memory(),
            Movem { to_mem, .. } | Movep { to_mem, .. } => to_mem,
            ArithX { mem, .. } | Bcd { mem, .. } => mem,
            Pea { .. } | Link { .. } | Jsr { .. } | Bsr { .. } => true,
            _ => false,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        use Op::*;
        match *self {
            Move { .. } => "move",
            Movea { .. } => "movea",
            Moveq { .. } => "moveq",
            Movem { .. } => "movem",
            Movep { .. } => "movep",
            Lea { .. } => "lea",
            Pea { .. } => "pea",
            Exg { .. } => "exg",
            Swap { .. } => "swap",
            Link { .. } => "link",
            Unlk { .. } => "unlk",
            Clr { .. } => "clr",
            Ext {
                size: Size::Long,
                from_byte: true,
                ..
            } => "extb",
            Ext { .. } => "ext",
            Arith { op, .. } => match op {
                ArithKind::Add => "add",
                ArithKind::Sub => "sub",
                ArithKind::And => "and",
                ArithKind::Or => "or",
                ArithKind::Eor => "eor",
                ArithKind::Cmp => "cmp",
            },
            ArithA { op, .. } => match op {
                ArithKind::Add => "adda",
                ArithKind::Sub => "suba",
                _ => "cmpa",
            },
            ArithX { sub: false, .. } => "addx",
            ArithX { sub: true, .. } => "subx",
            Cmpm { .. } => "cmpm",
            Neg { extend: false, .. } => "neg",
            Neg { extend: true, .. } => "negx",
            Not { .. } => "not",
            Tst { .. } => "tst",
            Mul { signed: false, .. } => "mulu",
            Mul { signed: true, .. } => "muls",
            Div { signed: false, .. } => "divu",
            Div { signed: true, .. } => "divs",
            Shift { kind, left, .. } => match (kind, left) {
                (ShiftKind::Arith, true) => "asl",
                (ShiftKind::Arith, false) => "asr",
                (ShiftKind::Logical, true) => "lsl",
                (ShiftKind::Logical, false) => "lsr",
                (ShiftKind::RotateX, true) => "roxl",
                (ShiftKind::RotateX, false) => "roxr",
                (ShiftKind::Rotate, true) => "rol",
                (ShiftKind::Rotate, false) => "ror",
            },
            Bit { kind, .. } => match kind {
                BitKind::Test => "btst",
                BitKind::Change => "bchg",
                BitKind::Clear => "bclr",
                BitKind::Set => "bset",
            },
            Bcd { sub: false, .. } => "abcd",
            Bcd { sub: true, .. } => "sbcd",
            Nbcd { .. } => "nbcd",
            Tas { .. } => "tas",
            Bcc { cond: Cond::True, .. } => "bra",
            Bcc { .. } => "bcc",
            Bsr { .. } => "bsr",
            Dbcc { .. } => "dbcc",
            Scc { .. } => "scc",
            Jmp { .. } => "jmp",
            Jsr { .. } => "jsr",
            Rts => "rts",
            Rtr => "rtr",
            Rtd { .. } => "rtd",
            Nop => "nop",
            MoveFromSr { .. } | MoveToSr { .. } => "move sr",
            MoveFromCcr { .. } | MoveToCcr { .. } => "move ccr",
            LogicCcr { .. } => "logic ccr",
            LogicSr { .. } => "logic sr",
            MoveUsp { .. } => "move usp",
            Movec { .. } => "movec",
            Rte => "rte",
            Stop { .. } => "stop",
            Reset => "reset",
            Trap { .. } => "trap",
            Trapv => "trapv",
            Chk { .. } => "chk",
            Illegal => "illegal",
            LineA => "line-a",
            LineF { .. } => "line-f",
        }
    }
}

/// One decoded guest instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insn {
    pub pc: u32,
    pub opcode: u16,
    /// Total length in bytes including extension words.
    pub len: u32,
    pub op: Op,
}

impl Insn {
    #[inline]
    pub fn next_pc(&self) -> u32 {
        self.pc.wrapping_add(self.len)
    }
}

// ---------------------------------------------------------------
// Opcode groups
// ---------------------------------------------------------------

/// Top-nibble opcode line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpGroup {
    BitImm,
    MoveByte,
    MoveLong,
    MoveWord,
    Misc,
    QuickScc,
    Branch,
    Moveq,
    OrDiv,
    Sub,
    LineA,
    CmpEor,
    AndMul,
    Add,
    Shift,
    LineF,
}

impl OpGroup {
    const ALL: [OpGroup; 16] = [
        OpGroup::BitImm,
        OpGroup::MoveByte,
        OpGroup::MoveLong,
        OpGroup::MoveWord,
        OpGroup::Misc,
        OpGroup::QuickScc,
        OpGroup::Branch,
        OpGroup::Moveq,
        OpGroup::OrDiv,
        OpGroup::Sub,
        OpGroup::LineA,
        OpGroup::CmpEor,
        OpGroup::AndMul,
        OpGroup::Add,
        OpGroup::Shift,
        OpGroup::LineF,
    ];

    pub const fn of(opcode: u16) -> OpGroup {
        Self::ALL[(opcode >> 12) as usize]
    }
}

/// Bits 8..6 of the ALU lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpMode {
    /// `<ea>,Dn`
    ToReg(Size),
    /// `Dn,<ea>`, or the register/predecrement pair forms.
    ToEa(Size),
    /// DIVU.W, MULU.W, SUBA.W, CMPA.W, ADDA.W
    Word,
    /// DIVS.W, MULS.W, SUBA.L, CMPA.L, ADDA.L
    Long,
}

const OPMODES: [OpMode; 8] = [
    OpMode::ToReg(Size::Byte),
    OpMode::ToReg(Size::Word),
    OpMode::ToReg(Size::Long),
    OpMode::Word,
    OpMode::ToEa(Size::Byte),
    OpMode::ToEa(Size::Word),
    OpMode::ToEa(Size::Long),
    OpMode::Long,
];

// ---------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------

pub(super) struct Decoder<'a> {
    fetch: &'a mut dyn CodeFetch,
    model: CpuModel,
    next: u32,
}

/// Decode the instruction at `pc`.
pub fn decode(fetch: &mut dyn CodeFetch, pc: u32, model: CpuModel) -> Insn {
    let mut d = Decoder {
        fetch,
        model,
        next: pc,
    };
    let opcode = d.word();
    let op = d.op(opcode).unwrap_or(Op::Illegal);
    let len = match op {
        Op::Illegal | Op::LineA | Op::LineF { fpu: None } => 2,
        _ => d.next.wrapping_sub(pc),
    };
    Insn {
        pc,
        opcode,
        len,
        op,
    }
}

impl Decoder<'_> {
    pub(super) fn word(&mut self) -> u16 {
        let w = self.fetch.fetch_word(self.next);
        self.next = self.next.wrapping_add(2);
        w
    }

    pub(super) fn long(&mut self) -> u32 {
        let hi = self.word() as u32;
        let lo = self.word() as u32;
        (hi << 16) | lo
    }

    fn imm(&mut self, size: Size) -> u32 {
        match size {
            Size::Byte => (self.word() & 0xFF) as u32,
            Size::Word => self.word() as u32,
            Size::Long => self.long(),
        }
    }

    pub(super) fn ea(&mut self, mode: u16, reg: u16, size: Size) -> Option<Ea> {
        let r = (reg & 7) as u8;
        Some(match mode & 7 {
            0 => Ea::DReg(r),
            1 => Ea::AReg(r),
            2 => Ea::Ind(r),
            3 => Ea::PostInc(r),
            4 => Ea::PreDec(r),
            5 => Ea::Disp(r, self.word() as i16 as i32),
            6 => self.indexed(Some(r))?,
            _ => match reg & 7 {
                0 => Ea::Abs(self.word() as i16 as i32 as u32),
                1 => Ea::Abs(self.long()),
                2 => {
                    let base = self.next;
                    Ea::PcDisp(base.wrapping_add(self.word() as i16 as i32 as u32))
                }
                3 => self.indexed(None)?,
                4 => Ea::Imm(self.imm(size)),
                _ => return None,
            },
        })
    }

    /// Decode and check an operand. Byte access to an address
    /// register is never valid.
    fn ea_in(&mut self, mode: u16, reg: u16, size: Size, class: Class) -> Option<Ea> {
        let ea = self.ea(mode, reg, size)?;
        if !class.accepts(&ea) || (size == Size::Byte && matches!(ea, Ea::AReg(_))) {
            return None;
        }
        Some(ea)
    }

    /// Consume the extension words of an operand whose immediate form
    /// is `imm_bytes` long.
    pub(super) fn skip_ea(&mut self, mode: u16, reg: u16, imm_bytes: u32) -> Option<()> {
        if mode & 7 == 7 && reg & 7 == 4 {
            for _ in 0..imm_bytes.div_ceil(2).max(1) {
                self.word();
            }
            return Some(());
        }
        self.ea(mode, reg, Size::Long).map(|_| ())
    }

    fn indexed(&mut self, an: Option<u8>) -> Option<Ea> {
        let ext_pc = self.next;
        let ext = self.word();
        let pc_rel = an.is_none();
        let full = self.model.at_least_020();
        let index = Index {
            reg: ((ext >> 12) & 0xF) as u8,
            long: ext & 0x0800 != 0,
            scale: if full { ((ext >> 9) & 3) as u8 } else { 0 },
        };
        let rebase = |disp: u32| {
            if pc_rel {
                ext_pc.wrapping_add(disp)
            } else {
                disp
            }
        };

        if ext & 0x0100 == 0 || !full {
            return Some(Ea::Indexed {
                base: an,
                index: Some(index),
                disp: rebase(ext as u8 as i8 as i32 as u32),
                pc_rel,
            });
        }

        // Full format. Memory indirection is not supported.
        if ext & 0x000F != 0 {
            return None;
        }
        let base_suppressed = ext & 0x0080 != 0;
        let index = (ext & 0x0040 == 0).then_some(index);
        let bd = match (ext >> 4) & 3 {
            0 => return None,
            1 => 0,
            2 => self.word() as i16 as i32 as u32,
            _ => self.long(),
        };
        Some(if base_suppressed {
            Ea::Indexed {
                base: None,
                index,
                disp: bd,
                pc_rel,
            }
        } else {
            Ea::Indexed {
                base: an,
                index,
                disp: rebase(bd),
                pc_rel,
            }
        })
    }

    fn op(&mut self, op: u16) -> Option<Op> {
        match OpGroup::of(op) {
            OpGroup::BitImm => self.bit_imm(op),
            g @ (OpGroup::MoveByte | OpGroup::MoveLong | OpGroup::MoveWord) => self.move_(g, op),
            OpGroup::Misc => self.misc(op),
            OpGroup::QuickScc => self.quick_scc(op),
            OpGroup::Branch => Some(self.branch(op)),
            OpGroup::Moveq => (op & 0x0100 == 0).then(|| Op::Moveq {
                value: op as u8 as i8 as i32 as u32,
                dn: ((op >> 9) & 7) as u8,
            }),
            g @ (OpGroup::OrDiv
            | OpGroup::Sub
            | OpGroup::CmpEor
            | OpGroup::AndMul
            | OpGroup::Add) => self.alu_line(g, op),
            OpGroup::Shift => self.shift(op),
            OpGroup::LineA => Some(Op::LineA),
            OpGroup::LineF => Some(Op::LineF {
                fpu: if self.model.at_least_020() && (op >> 9) & 7 == 1 {
                    fpu::classify(self, op)
                } else {
                    None
                },
            }),
        }
    }

    fn bit_dst(&mut self, mode: u16, reg: u16, kind: BitKind) -> Option<Ea> {
        let class = if kind == BitKind::Test {
            Class::DataNoImm
        } else {
            Class::DataAlterable
        };
        self.ea_in(mode, reg, Size::Byte, class)
    }

    fn bit_imm(&mut self, op: u16) -> Option<Op> {
        let mode = (op >> 3) & 7;
        let reg = op & 7;

        if op & 0x0100 != 0 {
            if mode == 1 {
                let opmode = (op >> 6) & 3;
                return Some(Op::Movep {
                    size: if opmode & 1 != 0 { Size::Long } else { Size::Word },
                    to_mem: opmode & 2 != 0,
                    dn: ((op >> 9) & 7) as u8,
                    an: reg as u8,
                    disp: self.word() as i16 as i32,
                });
            }
            let kind = BitKind::from_bits(op >> 6);
            let dst = self.bit_dst(mode, reg, kind)?;
            return Some(Op::Bit {
                kind,
                bit: BitNum::Reg(((op >> 9) & 7) as u8),
                dst,
            });
        }

        let sel = (op >> 9) & 7;
        if sel == 4 {
            let kind = BitKind::from_bits(op >> 6);
            let bit = (self.word() & 0xFF) as u8;
            let dst = self.bit_dst(mode, reg, kind)?;
            return Some(Op::Bit {
                kind,
                bit: BitNum::Imm(bit),
                dst,
            });
        }

        // Size 3 is CAS/CHK2/CMP2/CALLM.
        let size = Size::from_bits(op >> 6)?;
        let kind = match sel {
            0 => ArithKind::Or,
            1 => ArithKind::And,
            2 => ArithKind::Sub,
            3 => ArithKind::Add,
            5 => ArithKind::Eor,
            6 => ArithKind::Cmp,
            _ => return None,
        };

        if mode == 7 && reg == 4 {
            return match (kind, size) {
                (ArithKind::Or | ArithKind::And | ArithKind::Eor, Size::Byte) => {
                    Some(Op::LogicCcr {
                        op: kind,
                        imm: self.word() & 0xFF,
                    })
                }
                (ArithKind::Or | ArithKind::And | ArithKind::Eor, Size::Word) => {
                    Some(Op::LogicSr {
                        op: kind,
                        imm: self.word(),
                    })
                }
                _ => None,
            };
        }

        let imm = self.imm(size);
        let class = if kind == ArithKind::Cmp && self.model.at_least_020() {
            Class::DataNoImm
        } else {
            Class::DataAlterable
        };
        let dst = self.ea_in(mode, reg, size, class)?;
        Some(Op::Arith {
            op: kind,
            size,
            src: Ea::Imm(imm),
            dst,
        })
    }

    fn move_(&mut self, group: OpGroup, op: u16) -> Option<Op> {
        let size = match group {
            OpGroup::MoveByte => Size::Byte,
            OpGroup::MoveWord => Size::Word,
            _ => Size::Long,
        };
        let src = self.ea_in((op >> 3) & 7, op & 7, size, Class::All)?;
        let dmode = (op >> 6) & 7;
        let dreg = (op >> 9) & 7;
        if dmode == 1 {
            if size == Size::Byte {
                return None;
            }
            return Some(Op::Movea {
                size,
                src,
                an: dreg as u8,
            });
        }
        let dst = self.ea_in(dmode, dreg, size, Class::DataAlterable)?;
        Some(Op::Move { size, src, dst })
    }

    fn misc(&mut self, op: u16) -> Option<Op> {
        let mode = (op >> 3) & 7;
        let reg = op & 7;
        let r = reg as u8;
        let m010 = self.model.at_least_010();
        let m020 = self.model.at_least_020();

        match op {
            0x4AFC => return Some(Op::Illegal),
            0x4E70 => return Some(Op::Reset),
            0x4E71 => return Some(Op::Nop),
            0x4E72 => return Some(Op::Stop { sr: self.word() }),
            0x4E73 => return Some(Op::Rte),
            0x4E74 if m010 => {
                return Some(Op::Rtd {
                    disp: self.word() as i16 as i32,
                })
            }
            0x4E75 => return Some(Op::Rts),
            0x4E76 => return Some(Op::Trapv),
            0x4E77 => return Some(Op::Rtr),
            0x4E7A | 0x4E7B if m010 => {
                let ext = self.word();
                return Some(Op::Movec {
                    to_ctrl: op & 1 != 0,
                    ctrl: ext & 0x0FFF,
                    reg: ((ext >> 12) & 0xF) as u8,
                });
            }
            _ => {}
        }

        match op & 0xFFF8 {
            0x4E40 | 0x4E48 => {
                return Some(Op::Trap {
                    vector: (op & 0xF) as u8,
                })
            }
            0x4E50 => {
                return Some(Op::Link {
                    an: r,
                    disp: self.word() as i16 as i32,
                })
            }
            0x4E58 => return Some(Op::Unlk { an: r }),
            0x4E60 => return Some(Op::MoveUsp { to_usp: true, an: r }),
            0x4E68 => return Some(Op::MoveUsp { to_usp: false, an: r }),
            0x4808 if m020 => {
                return Some(Op::Link {
                    an: r,
                    disp: self.long() as i32,
                })
            }
            0x4840 => return Some(Op::Swap { dn: r }),
            0x4880 => {
                return Some(Op::Ext {
                    size: Size::Word,
                    dn: r,
                    from_byte: true,
                })
            }
            0x48C0 => {
                return Some(Op::Ext {
                    size: Size::Long,
                    dn: r,
                    from_byte: false,
                })
            }
            0x49C0 if m020 => {
                return Some(Op::Ext {
                    size: Size::Long,
                    dn: r,
                    from_byte: true,
                })
            }
            _ => {}
        }

        match op & 0xFFC0 {
            0x4E80 => {
                let ea = self.ea_in(mode, reg, Size::Long, Class::Control)?;
                return Some(Op::Jsr { ea });
            }
            0x4EC0 => {
                let ea = self.ea_in(mode, reg, Size::Long, Class::Control)?;
                return Some(Op::Jmp { ea });
            }
            0x40C0 => {
                let dst = self.ea_in(mode, reg, Size::Word, Class::DataAlterable)?;
                return Some(Op::MoveFromSr { dst });
            }
            0x42C0 if m010 => {
                let dst = self.ea_in(mode, reg, Size::Word, Class::DataAlterable)?;
                return Some(Op::MoveFromCcr { dst });
            }
            0x44C0 => {
                let src = self.ea_in(mode, reg, Size::Word, Class::Data)?;
                return Some(Op::MoveToCcr { src });
            }
            0x46C0 => {
                let src = self.ea_in(mode, reg, Size::Word, Class::Data)?;
                return Some(Op::MoveToSr { src });
            }
            0x4800 => {
                let dst = self.ea_in(mode, reg, Size::Byte, Class::DataAlterable)?;
                return Some(Op::Nbcd { dst });
            }
            0x4840 => {
                let src = self.ea_in(mode, reg, Size::Long, Class::Control)?;
                return Some(Op::Pea { src });
            }
            0x4AC0 => {
                let dst = self.ea_in(mode, reg, Size::Byte, Class::DataAlterable)?;
                return Some(Op::Tas { dst });
            }
            0x4C00 if m020 => {
                let ext = self.word();
                let src = self.ea_in(mode, reg, Size::Long, Class::Data)?;
                let wide = ext & 0x0400 != 0;
                return Some(Op::Mul {
                    signed: ext & 0x0800 != 0,
                    long: true,
                    src,
                    dl: ((ext >> 12) & 7) as u8,
                    dh: wide.then_some((ext & 7) as u8),
                });
            }
            0x4C40 if m020 => {
                let ext = self.word();
                let src = self.ea_in(mode, reg, Size::Long, Class::Data)?;
                let dq = ((ext >> 12) & 7) as u8;
                let dr = (ext & 7) as u8;
                let wide = ext & 0x0400 != 0;
                return Some(Op::Div {
                    signed: ext & 0x0800 != 0,
                    long: true,
                    src,
                    dq,
                    dr: (wide || dr != dq).then_some(dr),
                    wide,
                });
            }
            _ => {}
        }

        if op & 0xFB80 == 0x4880 && mode >= 2 {
            let to_mem = op & 0x0400 == 0;
            let size = if op & 0x0040 != 0 { Size::Long } else { Size::Word };
            let mask = self.word();
            let class = if to_mem {
                Class::ControlAlterableOrPreDec
            } else {
                Class::ControlOrPostInc
            };
            let ea = self.ea_in(mode, reg, size, class)?;
            return Some(Op::Movem {
                size,
                to_mem,
                mask,
                ea,
            });
        }

        let rx = ((op >> 9) & 7) as u8;
        match op & 0xF1C0 {
            0x41C0 => {
                let src = self.ea_in(mode, reg, Size::Long, Class::Control)?;
                return Some(Op::Lea { src, an: rx });
            }
            0x4180 => {
                let src = self.ea_in(mode, reg, Size::Word, Class::Data)?;
                return Some(Op::Chk {
                    size: Size::Word,
                    src,
                    dn: rx,
                });
            }
            0x4100 if m020 => {
                let src = self.ea_in(mode, reg, Size::Long, Class::Data)?;
                return Some(Op::Chk {
                    size: Size::Long,
                    src,
                    dn: rx,
                });
            }
            _ => {}
        }

        let size = Size::from_bits(op >> 6)?;
        match op & 0xFF00 {
            0x4000 => {
                let dst = self.ea_in(mode, reg, size, Class::DataAlterable)?;
                Some(Op::Neg {
                    size,
                    dst,
                    extend: true,
                })
            }
            0x4200 => {
                let dst = self.ea_in(mode, reg, size, Class::DataAlterable)?;
                Some(Op::Clr { size, dst })
            }
            0x4400 => {
                let dst = self.ea_in(mode, reg, size, Class::DataAlterable)?;
                Some(Op::Neg {
                    size,
                    dst,
                    extend: false,
                })
            }
            0x4600 => {
                let dst = self.ea_in(mode, reg, size, Class::DataAlterable)?;
                Some(Op::Not { size, dst })
            }
            0x4A00 => {
                let class = if m020 { Class::All } else { Class::DataAlterable };
                let src = self.ea_in(mode, reg, size, class)?;
                Some(Op::Tst { size, src })
            }
            _ => None,
        }
    }

    fn quick_scc(&mut self, op: u16) -> Option<Op> {
        let mode = (op >> 3) & 7;
        let reg = op & 7;

        let Some(size) = Size::from_bits(op >> 6) else {
            let cond = Cond::from_bits(op >> 8);
            if mode == 1 {
                let base = self.next;
                let disp = self.word() as i16 as i32 as u32;
                return Some(Op::Dbcc {
                    cond,
                    dn: reg as u8,
                    target: base.wrapping_add(disp),
                });
            }
            // TRAPcc
            if mode == 7 && reg >= 2 {
                return None;
            }
            let dst = self.ea_in(mode, reg, Size::Byte, Class::DataAlterable)?;
            return Some(Op::Scc { cond, dst });
        };

        let data = match (op >> 9) & 7 {
            0 => 8,
            n => n as u32,
        };
        let kind = if op & 0x0100 != 0 {
            ArithKind::Sub
        } else {
            ArithKind::Add
        };
        if mode == 1 {
            if size == Size::Byte {
                return None;
            }
            return Some(Op::ArithA {
                op: kind,
                size,
                src: Ea::Imm(data),
                an: reg as u8,
            });
        }
        let dst = self.ea_in(mode, reg, size, Class::DataAlterable)?;
        Some(Op::Arith {
            op: kind,
            size,
            src: Ea::Imm(data),
            dst,
        })
    }

    fn branch(&mut self, op: u16) -> Op {
        let cond = Cond::from_bits(op >> 8);
        let base = self.next;
        let disp = match op & 0xFF {
            0 => self.word() as i16 as i32,
            0xFF if self.model.at_least_020() => self.long() as i32,
            d => d as u8 as i8 as i32,
        };
        let target = base.wrapping_add(disp as u32);
        match cond {
            Cond::False => Op::Bsr { target },
            _ => Op::Bcc { cond, target },
        }
    }

    fn alu_line(&mut self, group: OpGroup, op: u16) -> Option<Op> {
        let mode = (op >> 3) & 7;
        let reg = op & 7;
        let rx = ((op >> 9) & 7) as u8;
        let arith = match group {
            OpGroup::OrDiv => ArithKind::Or,
            OpGroup::Sub => ArithKind::Sub,
            OpGroup::CmpEor => ArithKind::Cmp,
            OpGroup::AndMul => ArithKind::And,
            _ => ArithKind::Add,
        };

        match OPMODES[((op >> 6) & 7) as usize] {
            mode_kind @ (OpMode::Word | OpMode::Long) => {
                let long = mode_kind == OpMode::Long;
                match group {
                    OpGroup::OrDiv => {
                        let src = self.ea_in(mode, reg, Size::Word, Class::Data)?;
                        Some(Op::Div {
                            signed: long,
                            long: false,
                            src,
                            dq: rx,
                            dr: None,
                            wide: false,
                        })
                    }
                    OpGroup::AndMul => {
                        let src = self.ea_in(mode, reg, Size::Word, Class::Data)?;
                        Some(Op::Mul {
                            signed: long,
                            long: false,
                            src,
                            dl: rx,
                            dh: None,
                        })
                    }
                    _ => {
                        let size = if long { Size::Long } else { Size::Word };
                        let src = self.ea_in(mode, reg, size, Class::All)?;
                        Some(Op::ArithA {
                            op: arith,
                            size,
                            src,
                            an: rx,
                        })
                    }
                }
            }
            OpMode::ToReg(size) => {
                let class = match group {
                    OpGroup::OrDiv | OpGroup::AndMul => Class::Data,
                    _ => Class::All,
                };
                let src = self.ea_in(mode, reg, size, class)?;
                Some(Op::Arith {
                    op: arith,
                    size,
                    src,
                    dst: Ea::DReg(rx),
                })
            }
            OpMode::ToEa(size) => {
                if group == OpGroup::CmpEor {
                    if mode == 1 {
                        return Some(Op::Cmpm {
                            size,
                            src: reg as u8,
                            dst: rx,
                        });
                    }
                    let dst = self.ea_in(mode, reg, size, Class::DataAlterable)?;
                    return Some(Op::Arith {
                        op: ArithKind::Eor,
                        size,
                        src: Ea::DReg(rx),
                        dst,
                    });
                }
                if mode <= 1 {
                    return self.pair_form(group, size, mode == 1, reg as u8, rx);
                }
                let dst = self.ea_in(mode, reg, size, Class::MemoryAlterable)?;
                Some(Op::Arith {
                    op: arith,
                    size,
                    src: Ea::DReg(rx),
                    dst,
                })
            }
        }
    }

    /// Register-pair forms sharing the `Dn,<ea>` opmodes: ABCD, SBCD,
    /// ADDX, SUBX, EXG.
    fn pair_form(&mut self, group: OpGroup, size: Size, mem: bool, ry: u8, rx: u8) -> Option<Op> {
        match (group, size) {
            (OpGroup::OrDiv, Size::Byte) => Some(Op::Bcd {
                sub: true,
                mem,
                src: ry,
                dst: rx,
            }),
            (OpGroup::AndMul, Size::Byte) => Some(Op::Bcd {
                sub: false,
                mem,
                src: ry,
                dst: rx,
            }),
            (OpGroup::AndMul, Size::Word) => Some(if mem {
                Op::Exg {
                    rx: A0 + rx,
                    ry: A0 + ry,
                }
            } else {
                Op::Exg { rx, ry }
            }),
            (OpGroup::AndMul, Size::Long) if mem => Some(Op::Exg { rx, ry: A0 + ry }),
            (OpGroup::Add | OpGroup::Sub, _) => Some(Op::ArithX {
                sub: group == OpGroup::Sub,
                size,
                mem,
                src: ry,
                dst: rx,
            }),
            // PACK/UNPK
            _ => None,
        }
    }

    fn shift(&mut self, op: u16) -> Option<Op> {
        let left = op & 0x0100 != 0;
        match Size::from_bits(op >> 6) {
            None => {
                // Bit-field instructions share the memory-shift space.
                if op & 0x0800 != 0 {
                    return None;
                }
                let dst = self.ea_in((op >> 3) & 7, op & 7, Size::Word, Class::MemoryAlterable)?;
                Some(Op::Shift {
                    kind: ShiftKind::from_bits(op >> 9),
                    left,
                    size: Size::Word,
                    count: ShiftCount::Imm(1),
                    dst,
                })
            }
            Some(size) => {
                let cnt = ((op >> 9) & 7) as u8;
                let count = if op & 0x0020 != 0 {
                    ShiftCount::Reg(cnt)
                } else {
                    ShiftCount::Imm(if cnt == 0 { 8 } else { cnt })
                };
                Some(Op::Shift {
                    kind: ShiftKind::from_bits(op >> 3),
                    left,
                    size,
                    count,
                    dst: Ea::DReg((op & 7) as u8),
                })
            }
        }
    }
}
