//! Random programs run under every flags mode and block size, checked
//! against a small reference model.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use jit68_core::{JitConfig, OpenBus};
use jit68_exec::{Dispatcher, ExitReason};

use crate::frontend::code;

const C: u32 = 0x01;
const V: u32 = 0x02;
const Z: u32 = 0x04;
const N: u32 = 0x08;
const X: u32 = 0x10;

/// Scratch memory the programs read and write. A0 stays at its
/// start, A1 walks up from `POST_START`, A2 down from `PRE_START`.
const MEM_LO: u32 = 0x4000;
const MEM_HI: u32 = 0x6000;
const POST_START: u32 = 0x4800;
const PRE_START: u32 = 0x5800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sz {
    B,
    W,
    L,
}

impl Sz {
    fn random(rng: &mut StdRng) -> Sz {
        [Sz::B, Sz::W, Sz::L][rng.gen_range(0..3)]
    }

    fn bits(self) -> u32 {
        match self {
            Sz::B => 8,
            Sz::W => 16,
            Sz::L => 32,
        }
    }

    fn bytes(self) -> u32 {
        self.bits() / 8
    }

    fn mask(self) -> u32 {
        (u64::MAX >> (64 - self.bits())) as u32
    }

    fn msb(self) -> u32 {
        1 << (self.bits() - 1)
    }

    /// Size field of the ALU and single-operand forms.
    fn field(self) -> u16 {
        match self {
            Sz::B => 0,
            Sz::W => 1,
            Sz::L => 2,
        }
    }

    /// Size field of MOVE.
    fn move_field(self) -> u16 {
        match self {
            Sz::B => 1,
            Sz::W => 3,
            Sz::L => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Alu {
    Add,
    Sub,
    Cmp,
    And,
    Or,
    Eor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shift {
    As,
    Ls,
    Rox,
    Ro,
}

#[derive(Debug, Clone, Copy)]
enum Insn {
    Moveq(u8, i8),
    Alu(Alu, Sz, u8, u8),
    Neg(Sz, u8),
    Negx(Sz, u8),
    Not(Sz, u8),
    Addx(Sz, u8, u8),
    Subx(Sz, u8, u8),
    Addq(Sz, u8, u8),
    Subq(Sz, u8, u8),
    Shift(Shift, bool, Sz, u8, u8),
    /// `add Ds,d16(A0)`
    AddMem(Sz, u8, u16),
    /// `move d16(A0),Dd`
    Load(Sz, u8, u16),
    /// `move Ds,d16(A0)`
    Store(Sz, u8, u16),
    /// `move (A1)+,Dd`
    LoadPost(Sz, u8),
    /// `move Ds,-(A2)`
    StorePre(Sz, u8),
}

impl Insn {
    fn random(rng: &mut StdRng) -> Insn {
        // D7 is kept for the final SR capture.
        let r = |rng: &mut StdRng| rng.gen_range(0..7u8);
        let disp = |rng: &mut StdRng| 2 * rng.gen_range(0..0x100u16);
        let sz = Sz::random(rng);
        match rng.gen_range(0..15) {
            0 => Insn::Moveq(r(rng), rng.gen()),
            1 | 2 => {
                let op = [Alu::Add, Alu::Sub, Alu::Cmp, Alu::And, Alu::Or, Alu::Eor]
                    [rng.gen_range(0..6)];
                Insn::Alu(op, sz, r(rng), r(rng))
            }
            3 => Insn::Neg(sz, r(rng)),
            4 => Insn::Negx(sz, r(rng)),
            5 => Insn::Not(sz, r(rng)),
            6 => Insn::Addx(sz, r(rng), r(rng)),
            7 => Insn::Subx(sz, r(rng), r(rng)),
            8 => Insn::Addq(sz, rng.gen_range(1..=8), r(rng)),
            9 => Insn::Subq(sz, rng.gen_range(1..=8), r(rng)),
            10 => {
                let kind = [Shift::As, Shift::Ls, Shift::Rox, Shift::Ro][rng.gen_range(0..4)];
                Insn::Shift(kind, rng.gen(), sz, rng.gen_range(1..=8), r(rng))
            }
            11 => Insn::AddMem(sz, r(rng), disp(rng)),
            12 => {
                if rng.gen() {
                    Insn::Load(sz, r(rng), disp(rng))
                } else {
                    Insn::Store(sz, r(rng), disp(rng))
                }
            }
            13 => Insn::LoadPost(sz, r(rng)),
            _ => Insn::StorePre(sz, r(rng)),
        }
    }

    fn encode(self, out: &mut Vec<u16>) {
        let reg = |r: u8| r as u16;
        match self {
            Insn::Moveq(d, v) => out.push(0x7000 | reg(d) << 9 | v as u8 as u16),
            Insn::Alu(Alu::Eor, sz, s, d) => {
                out.push(0xB000 | reg(s) << 9 | (4 + sz.field()) << 6 | reg(d))
            }
            Insn::Alu(op, sz, s, d) => {
                let base = match op {
                    Alu::Add => 0xD000,
                    Alu::Sub => 0x9000,
                    Alu::Cmp => 0xB000,
                    Alu::And => 0xC000,
                    _ => 0x8000,
                };
                out.push(base | reg(d) << 9 | sz.field() << 6 | reg(s));
            }
            Insn::Neg(sz, d) => out.push(0x4400 | sz.field() << 6 | reg(d)),
            Insn::Negx(sz, d) => out.push(0x4000 | sz.field() << 6 | reg(d)),
            Insn::Not(sz, d) => out.push(0x4600 | sz.field() << 6 | reg(d)),
            Insn::Addx(sz, s, d) => out.push(0xD100 | reg(d) << 9 | sz.field() << 6 | reg(s)),
            Insn::Subx(sz, s, d) => out.push(0x9100 | reg(d) << 9 | sz.field() << 6 | reg(s)),
            Insn::Addq(sz, q, d) => {
                out.push(0x5000 | ((q & 7) as u16) << 9 | sz.field() << 6 | reg(d))
            }
            Insn::Subq(sz, q, d) => {
                out.push(0x5100 | ((q & 7) as u16) << 9 | sz.field() << 6 | reg(d))
            }
            Insn::Shift(kind, left, sz, n, d) => {
                let ty = match kind {
                    Shift::As => 0,
                    Shift::Ls => 1,
                    Shift::Rox => 2,
                    Shift::Ro => 3,
                };
                out.push(
                    0xE000
                        | ((n & 7) as u16) << 9
                        | (left as u16) << 8
                        | sz.field() << 6
                        | ty << 3
                        | reg(d),
                );
            }
            Insn::AddMem(sz, s, disp) => {
                out.extend([0xD000 | reg(s) << 9 | (4 + sz.field()) << 6 | 0x28, disp])
            }
            Insn::Load(sz, d, disp) => {
                out.extend([sz.move_field() << 12 | reg(d) << 9 | 0x28, disp])
            }
            Insn::Store(sz, s, disp) => {
                out.extend([sz.move_field() << 12 | 5 << 6 | reg(s), disp])
            }
            Insn::LoadPost(sz, d) => out.push(sz.move_field() << 12 | reg(d) << 9 | 0x19),
            Insn::StorePre(sz, s) => out.push(sz.move_field() << 12 | 2 << 9 | 4 << 6 | reg(s)),
        }
    }
}

/// Guest state the reference model tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Model {
    d: [u32; 8],
    a1: u32,
    a2: u32,
    ccr: u32,
    mem: Vec<u8>,
}

fn nz(sz: Sz, r: u32) -> u32 {
    let mut f = 0;
    if r & sz.mask() == 0 {
        f |= Z;
    }
    if r & sz.msb() != 0 {
        f |= N;
    }
    f
}

/// `d + s + x` at `sz`: result, carry, overflow.
fn add(sz: Sz, s: u32, d: u32, x: u32) -> (u32, bool, bool) {
    let (s, d) = (s & sz.mask(), d & sz.mask());
    let wide = s as u64 + d as u64 + x as u64;
    let r = wide as u32 & sz.mask();
    let v = (s ^ r) & (d ^ r) & sz.msb() != 0;
    (r, wide > sz.mask() as u64, v)
}

/// `d - s - x` at `sz`: result, borrow, overflow.
fn sub(sz: Sz, s: u32, d: u32, x: u32) -> (u32, bool, bool) {
    let (s, d) = (s & sz.mask(), d & sz.mask());
    let r = d.wrapping_sub(s).wrapping_sub(x) & sz.mask();
    let v = (s ^ d) & (r ^ d) & sz.msb() != 0;
    (r, s as u64 + x as u64 > d as u64, v)
}

fn arith_ccr(sz: Sz, r: u32, c: bool, v: bool) -> u32 {
    let mut f = nz(sz, r);
    if v {
        f |= V;
    }
    if c {
        f |= C | X;
    }
    f
}

/// Shift or rotate by `n` in 1..=8: result, carry out, overflow.
fn shift(kind: Shift, left: bool, sz: Sz, n: u32, d: u32, x: bool) -> (u32, bool, bool) {
    let w = sz.bits();
    let mask = sz.mask();
    let d = d & mask;
    match (kind, left) {
        (Shift::As | Shift::Ls, true) => {
            let r = ((d as u64) << n) as u32 & mask;
            let c = (d >> (w - n)) & 1 != 0;
            // The sign changes if the n + 1 bits that pass through the
            // top are not all equal; zeros follow the last data bit.
            let v = kind == Shift::As && {
                let ext = (d as u64) << 8;
                let window = (ext >> (w - 1 + 8 - n)) & ((1 << (n + 1)) - 1);
                window != 0 && window != (1 << (n + 1)) - 1
            };
            (r, c, v)
        }
        (Shift::As, false) => {
            let sd = ((d << (32 - w)) as i32 >> (32 - w)) as i64;
            ((sd >> n) as u32 & mask, (sd >> (n - 1)) & 1 != 0, false)
        }
        (Shift::Ls, false) => (d >> n, (d >> (n - 1)) & 1 != 0, false),
        (Shift::Ro, true) => {
            let n = n % w;
            let r = ((d << n) | (d >> ((w - n) % w))) & mask;
            (r, r & 1 != 0, false)
        }
        (Shift::Ro, false) => {
            let n = n % w;
            let r = ((d >> n) | (d << ((w - n) % w))) & mask;
            (r, r & sz.msb() != 0, false)
        }
        (Shift::Rox, true) => {
            let (mut r, mut x) = (d, x as u32);
            for _ in 0..n {
                let out = (r >> (w - 1)) & 1;
                r = ((r << 1) | x) & mask;
                x = out;
            }
            (r, x != 0, false)
        }
        (Shift::Rox, false) => {
            let (mut r, mut x) = (d, x as u32);
            for _ in 0..n {
                let out = r & 1;
                r = (r >> 1) | (x << (w - 1));
                x = out;
            }
            (r, x != 0, false)
        }
    }
}

impl Model {
    fn new(mem: Vec<u8>) -> Self {
        Self {
            d: [0; 8],
            a1: POST_START,
            a2: PRE_START,
            ccr: 0,
            mem,
        }
    }

    fn read(&self, addr: u32, sz: Sz) -> u32 {
        let i = (addr - MEM_LO) as usize;
        self.mem[i..i + sz.bytes() as usize]
            .iter()
            .fold(0, |acc, &b| (acc << 8) | b as u32)
    }

    fn write(&mut self, addr: u32, sz: Sz, value: u32) {
        let i = (addr - MEM_LO) as usize;
        let be = value.to_be_bytes();
        self.mem[i..i + sz.bytes() as usize].copy_from_slice(&be[4 - sz.bytes() as usize..]);
    }

    fn set_d(&mut self, r: u8, sz: Sz, value: u32) {
        let d = &mut self.d[r as usize];
        *d = (*d & !sz.mask()) | (value & sz.mask());
    }

    fn x(&self) -> u32 {
        (self.ccr & X != 0) as u32
    }

    fn logic(&mut self, sz: Sz, r: u32) {
        self.ccr = (self.ccr & X) | nz(sz, r);
    }

    fn step(&mut self, insn: Insn) {
        match insn {
            Insn::Moveq(r, v) => {
                self.d[r as usize] = v as i32 as u32;
                self.logic(Sz::L, v as i32 as u32);
            }
            Insn::Alu(op, sz, s, t) => {
                let (sv, dv) = (self.d[s as usize], self.d[t as usize]);
                match op {
                    Alu::Add | Alu::Sub => {
                        let (r, c, v) = if op == Alu::Add {
                            add(sz, sv, dv, 0)
                        } else {
                            sub(sz, sv, dv, 0)
                        };
                        self.set_d(t, sz, r);
                        self.ccr = arith_ccr(sz, r, c, v);
                    }
                    Alu::Cmp => {
                        let (r, c, v) = sub(sz, sv, dv, 0);
                        self.ccr = (self.ccr & X) | (arith_ccr(sz, r, c, v) & !X);
                    }
                    _ => {
                        let r = match op {
                            Alu::And => dv & sv,
                            Alu::Or => dv | sv,
                            _ => dv ^ sv,
                        };
                        self.set_d(t, sz, r);
                        self.logic(sz, r);
                    }
                }
            }
            Insn::Neg(sz, t) => {
                let (r, c, v) = sub(sz, self.d[t as usize], 0, 0);
                self.set_d(t, sz, r);
                self.ccr = arith_ccr(sz, r, c, v);
            }
            Insn::Not(sz, t) => {
                let r = !self.d[t as usize];
                self.set_d(t, sz, r);
                self.logic(sz, r);
            }
            Insn::Negx(sz, t) => {
                let (r, c, v) = sub(sz, self.d[t as usize], 0, self.x());
                self.set_d(t, sz, r);
                self.extended(sz, r, c, v);
            }
            Insn::Addx(sz, s, t) | Insn::Subx(sz, s, t) => {
                let (sv, dv) = (self.d[s as usize], self.d[t as usize]);
                let (r, c, v) = match insn {
                    Insn::Addx(..) => add(sz, sv, dv, self.x()),
                    _ => sub(sz, sv, dv, self.x()),
                };
                self.set_d(t, sz, r);
                self.extended(sz, r, c, v);
            }
            Insn::Addq(sz, q, t) | Insn::Subq(sz, q, t) => {
                let dv = self.d[t as usize];
                let (r, c, v) = match insn {
                    Insn::Addq(..) => add(sz, q as u32, dv, 0),
                    _ => sub(sz, q as u32, dv, 0),
                };
                self.set_d(t, sz, r);
                self.ccr = arith_ccr(sz, r, c, v);
            }
            Insn::Shift(kind, left, sz, n, t) => {
                let x = self.ccr & X != 0;
                let (r, c, v) = shift(kind, left, sz, n as u32, self.d[t as usize], x);
                self.set_d(t, sz, r);
                let mut f = nz(sz, r);
                if v {
                    f |= V;
                }
                if c {
                    f |= C;
                }
                // Plain rotates leave X alone; the rest copy C into it.
                f |= match kind {
                    Shift::Ro => self.ccr & X,
                    _ if c => X,
                    _ => 0,
                };
                self.ccr = f;
            }
            Insn::AddMem(sz, s, disp) => {
                let addr = MEM_LO + disp as u32;
                let (r, c, v) = add(sz, self.d[s as usize], self.read(addr, sz), 0);
                self.write(addr, sz, r);
                self.ccr = arith_ccr(sz, r, c, v);
            }
            Insn::Load(sz, t, disp) => {
                let value = self.read(MEM_LO + disp as u32, sz);
                self.set_d(t, sz, value);
                self.logic(sz, value);
            }
            Insn::Store(sz, s, disp) => {
                let value = self.d[s as usize];
                self.write(MEM_LO + disp as u32, sz, value);
                self.logic(sz, value);
            }
            Insn::LoadPost(sz, t) => {
                let value = self.read(self.a1, sz);
                self.a1 += sz.bytes();
                self.set_d(t, sz, value);
                self.logic(sz, value);
            }
            Insn::StorePre(sz, s) => {
                self.a2 -= sz.bytes();
                let value = self.d[s as usize];
                self.write(self.a2, sz, value);
                self.logic(sz, value);
            }
        }
    }

    /// ADDX/SUBX/NEGX flags: Z only ever cleared.
    fn extended(&mut self, sz: Sz, r: u32, c: bool, v: bool) {
        let z = self.ccr & Z;
        let f = arith_ccr(sz, r, c, v);
        self.ccr = (f & !Z) | if r & sz.mask() == 0 { z } else { 0 };
    }
}

fn run(prog: &[Insn], mem: &[u8], config: JitConfig) -> Model {
    let mut words = vec![
        0x41F8, MEM_LO as u16, // lea MEM_LO.w,a0
        0x43F8, POST_START as u16, // lea POST_START.w,a1
        0x45F8, PRE_START as u16, // lea PRE_START.w,a2
        0x44FC, 0x0000, // move #0,ccr
    ];
    for insn in prog {
        insn.encode(&mut words);
    }
    words.extend([0x40C7, 0x4E72, 0x2700]); // move sr,d7; stop #$2700

    let mut d = Dispatcher::new(config, 64 * 1024, Box::new(OpenBus)).unwrap();
    d.write_memory(0, &0x8000u32.to_be_bytes());
    d.write_memory(4, &0x1000u32.to_be_bytes());
    d.write_memory(0x1000, &code(&words));
    d.write_memory(MEM_LO, mem);
    d.reset();
    assert_eq!(d.run(), ExitReason::Stopped);

    let cpu = d.cpu();
    assert_eq!(cpu.a[0], MEM_LO);
    let mut d_regs = cpu.d;
    let ccr = d_regs[7] & 0x1F;
    d_regs[7] = 0;
    Model {
        d: d_regs,
        a1: cpu.a[1],
        a2: cpu.a[2],
        ccr,
        mem: d.ram()[MEM_LO as usize..MEM_HI as usize].to_vec(),
    }
}

#[test]
fn random_programs_match_reference() {
    let mut rng = StdRng::seed_from_u64(0x6802_0000);
    for round in 0..60 {
        let len = rng.gen_range(1..48);
        let prog: Vec<Insn> = (0..len).map(|_| Insn::random(&mut rng)).collect();
        let mem: Vec<u8> = (MEM_LO..MEM_HI).map(|_| rng.gen()).collect();

        let mut want = Model::new(mem.clone());
        for &insn in &prog {
            want.step(insn);
        }

        for (lazy_flags, max_block_insns) in [(true, 64), (false, 64), (true, 3), (false, 1)] {
            let config = JitConfig {
                lazy_flags,
                max_block_insns,
                code_buffer_size: 1 << 20,
                ..JitConfig::default()
            };
            let got = run(&prog, &mem, config);
            assert_eq!(
                got, want,
                "round {round}, lazy_flags {lazy_flags}, block {max_block_insns}: {prog:?}"
            );
        }
    }
}

#[test]
fn extended_arithmetic_keeps_zero_sticky() {
    // 64-bit add of 0xFFFFFFFF_FFFFFFFF + 1 through d1:d0 += d3:d2.
    let prog = [
        Insn::Moveq(0, -1),
        Insn::Moveq(1, -1),
        Insn::Moveq(2, 1),
        Insn::Moveq(3, 0),
        Insn::Alu(Alu::Add, Sz::L, 2, 0),
        Insn::Addx(Sz::L, 3, 1),
    ];
    let mem = vec![0; (MEM_HI - MEM_LO) as usize];
    for lazy_flags in [true, false] {
        let config = JitConfig {
            lazy_flags,
            code_buffer_size: 1 << 20,
            ..JitConfig::default()
        };
        let got = run(&prog, &mem, config);
        assert_eq!(got.d[0], 0);
        assert_eq!(got.d[1], 0);
        assert_eq!(got.ccr, X | Z | C, "lazy_flags = {lazy_flags}");
    }
}

#[test]
fn memory_operands_match_sizes() {
    let prog = [
        Insn::Moveq(0, -128),
        Insn::Store(Sz::B, 0, 0),
        Insn::Store(Sz::W, 0, 2),
        Insn::Load(Sz::L, 1, 0),
        Insn::StorePre(Sz::L, 1),
        Insn::LoadPost(Sz::W, 2),
    ];
    let mem = vec![0; (MEM_HI - MEM_LO) as usize];
    let got = run(&prog, &mem, JitConfig {
        code_buffer_size: 1 << 20,
        ..JitConfig::default()
    });
    assert_eq!(got.d[1], 0x8000_FF80);
    assert_eq!(got.d[2], 0);
    assert_eq!(got.a1, POST_START + 2);
    assert_eq!(got.a2, PRE_START - 4);
    let pre = (PRE_START - 4 - MEM_LO) as usize;
    assert_eq!(&got.mem[pre..pre + 4], &[0x80, 0x00, 0xFF, 0x80]);
}
