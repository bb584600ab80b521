//! Arithmetic helpers called from generated code.
//!
//! Shifts, rotates, multiply, divide and BCD run here instead of
//! inline. They touch nothing but the `CpuState` they are handed:
//! the condition codes in `sr`, the second result word in
//! `helper_hi` and, for a zero divisor, `exception`.

use jit68_core::cpu::{CpuState, CCR_C, CCR_N, CCR_V, CCR_X, CCR_Z};
use jit68_core::exception::vector;
use jit68_core::Size;

/// Operation selector of [`helper_alu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AluHelper {
    Asl = 0,
    Asr = 1,
    Lsl = 2,
    Lsr = 3,
    Roxl = 4,
    Roxr = 5,
    Rol = 6,
    Ror = 7,
    Mulu = 8,
    Muls = 9,
    Mulu64 = 10,
    Muls64 = 11,
    Divu = 12,
    Divs = 13,
    Divu64 = 14,
    Divs64 = 15,
    Abcd = 16,
    Sbcd = 17,
    Nbcd = 18,
}

impl AluHelper {
    const ALL: [AluHelper; 19] = [
        AluHelper::Asl,
        AluHelper::Asr,
        AluHelper::Lsl,
        AluHelper::Lsr,
        AluHelper::Roxl,
        AluHelper::Roxr,
        AluHelper::Rol,
        AluHelper::Ror,
        AluHelper::Mulu,
        AluHelper::Muls,
        AluHelper::Mulu64,
        AluHelper::Muls64,
        AluHelper::Divu,
        AluHelper::Divs,
        AluHelper::Divu64,
        AluHelper::Divs64,
        AluHelper::Abcd,
        AluHelper::Sbcd,
        AluHelper::Nbcd,
    ];

    /// Selector word: operation in the low byte, size above it.
    pub const fn encode(self, size: Size) -> u32 {
        self as u32 | (size as u32) << 8
    }

    pub fn decode(word: u32) -> Option<(AluHelper, Size)> {
        let op = *Self::ALL.get((word & 0xFF) as usize)?;
        let size = Size::from_bits(((word >> 8) & 3) as u16)?;
        Some((op, size))
    }
}

/// Result of one helper operation.
struct Outcome {
    value: u32,
    /// CCR bits written.
    mask: u32,
    ccr: u32,
}

impl Outcome {
    fn new(value: u32, mask: u32, ccr: u32) -> Self {
        Self { value, mask, ccr }
    }

    /// Result with N and Z taken from `value` at `size`.
    fn nz(value: u32, size: Size, mask: u32, ccr: u32) -> Self {
        let value = value & size.mask();
        Self::new(value, mask | CCR_N | CCR_Z, ccr | nz_bits(value, size))
    }
}

fn nz_bits(value: u32, size: Size) -> u32 {
    let value = value & size.mask();
    let mut f = 0;
    if value == 0 {
        f |= CCR_Z;
    }
    if value & size.msb() != 0 {
        f |= CCR_N;
    }
    f
}

/// `extern "C"` entry point. `src` is the count for shifts and the
/// source operand otherwise; `dst` is the destination operand.
///
/// # Safety
/// `env` must point to a live `CpuState` not otherwise borrowed.
pub unsafe extern "C" fn helper_alu(env: *mut CpuState, op: u32, src: u32, dst: u32) -> u32 {
    let cpu = &mut *env;
    match AluHelper::decode(op) {
        Some((op, size)) => alu(cpu, op, size, src, dst),
        None => dst,
    }
}

/// Safe form of [`helper_alu`].
pub fn alu(cpu: &mut CpuState, op: AluHelper, size: Size, src: u32, dst: u32) -> u32 {
    let x = cpu.sr & CCR_X != 0;
    let out = match op {
        AluHelper::Asl => asl(dst, src & 63, size),
        AluHelper::Asr => asr(dst, src & 63, size),
        AluHelper::Lsl => lsl(dst, src & 63, size),
        AluHelper::Lsr => lsr(dst, src & 63, size),
        AluHelper::Roxl => roxl(dst, src & 63, size, x),
        AluHelper::Roxr => roxr(dst, src & 63, size, x),
        AluHelper::Rol => rol(dst, src & 63, size),
        AluHelper::Ror => ror(dst, src & 63, size),
        AluHelper::Mulu | AluHelper::Muls => mul(op == AluHelper::Muls, size, src, dst),
        AluHelper::Mulu64 | AluHelper::Muls64 => {
            let (out, hi) = mul64(op == AluHelper::Muls64, src, dst);
            cpu.helper_hi = hi;
            out
        }
        AluHelper::Divu | AluHelper::Divs | AluHelper::Divu64 | AluHelper::Divs64 => {
            return divide(cpu, op, size, src, dst);
        }
        AluHelper::Abcd => abcd(src, dst, x, cpu.sr),
        AluHelper::Sbcd => sbcd(src, dst, x, cpu.sr),
        AluHelper::Nbcd => sbcd(dst, 0, x, cpu.sr),
    };
    cpu.sr = (cpu.sr & !out.mask) | (out.ccr & out.mask);
    out.value
}

// ---------------------------------------------------------------
// Shifts and rotates
// ---------------------------------------------------------------

const SHIFT_FLAGS: u32 = CCR_X | CCR_V | CCR_C;

fn asl(v: u32, count: u32, size: Size) -> Outcome {
    let bits = size.bits();
    let v = v & size.mask();
    if count == 0 {
        return Outcome::nz(v, size, CCR_V | CCR_C, 0);
    }
    let (res, carry, overflow) = if count < bits {
        // The sign must not change in any of the top count+1 bits.
        let mask = size.mask() as u64;
        let top = (mask & !(mask >> (count + 1))) as u32;
        let top_bits = v & top;
        (
            v << count,
            (v >> (bits - count)) & 1 != 0,
            top_bits != 0 && top_bits != top,
        )
    } else {
        (0, count == bits && v & 1 != 0, v != 0)
    };
    let mut f = 0;
    if carry {
        f |= CCR_X | CCR_C;
    }
    if overflow {
        f |= CCR_V;
    }
    Outcome::nz(res, size, SHIFT_FLAGS, f)
}

fn asr(v: u32, count: u32, size: Size) -> Outcome {
    let bits = size.bits();
    let v = v & size.mask();
    if count == 0 {
        return Outcome::nz(v, size, CCR_V | CCR_C, 0);
    }
    let sv = size.sign_extend(v) as i32;
    let (res, carry) = if count < bits {
        ((sv >> count) as u32, (sv >> (count - 1)) & 1 != 0)
    } else {
        let neg = sv < 0;
        (if neg { u32::MAX } else { 0 }, neg)
    };
    let f = if carry { CCR_X | CCR_C } else { 0 };
    Outcome::nz(res, size, SHIFT_FLAGS, f)
}

fn lsl(v: u32, count: u32, size: Size) -> Outcome {
    let bits = size.bits();
    let v = v & size.mask();
    if count == 0 {
        return Outcome::nz(v, size, CCR_V | CCR_C, 0);
    }
    let (res, carry) = if count <= bits {
        let res = if count == 32 { 0 } else { v << count };
        (res, (v >> (bits - count)) & 1 != 0)
    } else {
        (0, false)
    };
    let f = if carry { CCR_X | CCR_C } else { 0 };
    Outcome::nz(res, size, SHIFT_FLAGS, f)
}

fn lsr(v: u32, count: u32, size: Size) -> Outcome {
    let bits = size.bits();
    let v = v & size.mask();
    if count == 0 {
        return Outcome::nz(v, size, CCR_V | CCR_C, 0);
    }
    let (res, carry) = if count <= bits {
        let res = if count == 32 { 0 } else { v >> count };
        (res, (v >> (count - 1)) & 1 != 0)
    } else {
        (0, false)
    };
    let f = if carry { CCR_X | CCR_C } else { 0 };
    Outcome::nz(res, size, SHIFT_FLAGS, f)
}

fn rol(v: u32, count: u32, size: Size) -> Outcome {
    let bits = size.bits();
    let v = v & size.mask();
    if count == 0 {
        return Outcome::nz(v, size, CCR_V | CCR_C, 0);
    }
    let c = count % bits;
    let res = if c == 0 {
        v
    } else {
        ((v << c) | (v >> (bits - c))) & size.mask()
    };
    let f = if res & 1 != 0 { CCR_C } else { 0 };
    Outcome::nz(res, size, CCR_V | CCR_C, f)
}

fn ror(v: u32, count: u32, size: Size) -> Outcome {
    let bits = size.bits();
    let v = v & size.mask();
    if count == 0 {
        return Outcome::nz(v, size, CCR_V | CCR_C, 0);
    }
    let c = count % bits;
    let res = if c == 0 {
        v
    } else {
        ((v >> c) | (v << (bits - c))) & size.mask()
    };
    let f = if res & size.msb() != 0 { CCR_C } else { 0 };
    Outcome::nz(res, size, CCR_V | CCR_C, f)
}

fn roxl(v: u32, count: u32, size: Size, x: bool) -> Outcome {
    let msb = size.msb();
    let mut v = v & size.mask();
    let mut x = x;
    for _ in 0..count % (size.bits() + 1) {
        let out = v & msb != 0;
        v = ((v << 1) | x as u32) & size.mask();
        x = out;
    }
    // A zero count copies X into C and leaves X alone.
    let f = if x { CCR_X | CCR_C } else { 0 };
    Outcome::nz(v, size, SHIFT_FLAGS, f)
}

fn roxr(v: u32, count: u32, size: Size, x: bool) -> Outcome {
    let msb = size.msb();
    let mut v = v & size.mask();
    let mut x = x;
    for _ in 0..count % (size.bits() + 1) {
        let out = v & 1 != 0;
        v = (v >> 1) | if x { msb } else { 0 };
        x = out;
    }
    let f = if x { CCR_X | CCR_C } else { 0 };
    Outcome::nz(v, size, SHIFT_FLAGS, f)
}

// ---------------------------------------------------------------
// Multiply and divide
// ---------------------------------------------------------------

const MUL_FLAGS: u32 = CCR_N | CCR_Z | CCR_V | CCR_C;

/// 16x16→32 for `Size::Word`, 32x32→32 with overflow for `Size::Long`.
fn mul(signed: bool, size: Size, src: u32, dst: u32) -> Outcome {
    let (res, overflow) = match (size, signed) {
        (Size::Long, false) => {
            let wide = src as u64 * dst as u64;
            (wide as u32, wide >> 32 != 0)
        }
        (Size::Long, true) => {
            let wide = src as i32 as i64 * dst as i32 as i64;
            (wide as u32, wide != wide as i32 as i64)
        }
        (_, false) => ((src & 0xFFFF) * (dst & 0xFFFF), false),
        (_, true) => (
            (src as u16 as i16 as i32).wrapping_mul(dst as u16 as i16 as i32) as u32,
            false,
        ),
    };
    let f = if overflow { CCR_V } else { 0 };
    Outcome::nz(res, Size::Long, MUL_FLAGS, f)
}

/// 32x32→64. Returns the low word and the high word.
fn mul64(signed: bool, src: u32, dst: u32) -> (Outcome, u32) {
    let wide = if signed {
        (src as i32 as i64 * dst as i32 as i64) as u64
    } else {
        src as u64 * dst as u64
    };
    let mut f = 0;
    if wide == 0 {
        f |= CCR_Z;
    }
    if wide >> 63 != 0 {
        f |= CCR_N;
    }
    (Outcome::new(wide as u32, MUL_FLAGS, f), (wide >> 32) as u32)
}

/// Divide. On success `helper_hi` receives the remainder of the long
/// forms; on overflow or a zero divisor every register operand is
/// left as it was.
fn divide(cpu: &mut CpuState, op: AluHelper, size: Size, src: u32, dst: u32) -> u32 {
    let set = |cpu: &mut CpuState, mask: u32, ccr: u32| {
        cpu.sr = (cpu.sr & !mask) | (ccr & mask);
    };
    let divisor = match size {
        Size::Long => src,
        _ => src & 0xFFFF,
    };
    if divisor == 0 {
        cpu.exception = vector::ZERO_DIVIDE as u32;
        set(cpu, CCR_C, 0);
        return dst;
    }
    let overflow = |cpu: &mut CpuState| {
        set(cpu, MUL_FLAGS, CCR_N | CCR_V);
        dst
    };

    let (quot, rem) = match (op, size) {
        (AluHelper::Divu, Size::Word) => {
            let q = dst / divisor;
            if q > 0xFFFF {
                return overflow(cpu);
            }
            (q, dst % divisor)
        }
        (AluHelper::Divs, Size::Word) => {
            let n = dst as i32 as i64;
            let d = divisor as u16 as i16 as i64;
            let q = n / d;
            if q != q as i16 as i64 {
                return overflow(cpu);
            }
            (q as u32, (n % d) as u32)
        }
        (AluHelper::Divu, _) => (dst / divisor, dst % divisor),
        (AluHelper::Divs, _) => {
            let n = dst as i32 as i64;
            let d = divisor as i32 as i64;
            let q = n / d;
            if q != q as i32 as i64 {
                return overflow(cpu);
            }
            (q as u32, (n % d) as u32)
        }
        (AluHelper::Divu64, _) => {
            let n = ((cpu.helper_hi as u64) << 32) | dst as u64;
            let q = n / divisor as u64;
            if q > u32::MAX as u64 {
                return overflow(cpu);
            }
            (q as u32, (n % divisor as u64) as u32)
        }
        _ => {
            let n = (((cpu.helper_hi as u64) << 32) | dst as u64) as i64 as i128;
            let d = divisor as i32 as i128;
            let q = n / d;
            if q != q as i32 as i128 {
                return overflow(cpu);
            }
            (q as u32, (n % d) as u32)
        }
    };

    match size {
        Size::Long => {
            cpu.helper_hi = rem;
            set(cpu, MUL_FLAGS, nz_bits(quot, Size::Long));
            quot
        }
        _ => {
            set(cpu, MUL_FLAGS, nz_bits(quot, Size::Word));
            (rem << 16) | (quot & 0xFFFF)
        }
    }
}

// ---------------------------------------------------------------
// BCD
// ---------------------------------------------------------------

const BCD_FLAGS: u32 = CCR_X | CCR_C | CCR_Z;

/// Z is only ever cleared; N and V are left alone.
fn bcd_outcome(res: u32, carry: bool, sr: u32) -> Outcome {
    let res = res & 0xFF;
    let mut f = sr & CCR_Z;
    if res != 0 {
        f &= !CCR_Z;
    }
    if carry {
        f |= CCR_X | CCR_C;
    }
    Outcome::new(res, BCD_FLAGS, f)
}

fn abcd(src: u32, dst: u32, x: bool, sr: u32) -> Outcome {
    let mut res = (src & 0x0F) + (dst & 0x0F) + x as u32;
    if res > 9 {
        res += 6;
    }
    res += (src & 0xF0) + (dst & 0xF0);
    let carry = res > 0x99;
    if carry {
        res = res.wrapping_sub(0xA0);
    }
    bcd_outcome(res, carry, sr)
}

/// `dst - src - X`. NBCD is `0 - operand - X`.
fn sbcd(src: u32, dst: u32, x: bool, sr: u32) -> Outcome {
    let mut res = (dst & 0x0F)
        .wrapping_sub(src & 0x0F)
        .wrapping_sub(x as u32);
    if res > 9 {
        res = res.wrapping_sub(6);
    }
    res = res.wrapping_add(dst & 0xF0).wrapping_sub(src & 0xF0);
    let carry = res > 0x99;
    if carry {
        res = res.wrapping_add(0xA0);
    }
    bcd_outcome(res, carry, sr)
}
