use jit68_core::cpu::{CCR_C, CCR_N, CCR_V, CCR_X, CCR_Z};
use jit68_core::exception::vector;
use jit68_core::{CpuModel, CpuState, Size};
use jit68_frontend::m68k::helpers::{alu, helper_alu, AluHelper};

fn cpu() -> CpuState {
    CpuState::new(CpuModel::M68020)
}

fn ccr(cpu: &CpuState) -> u32 {
    cpu.sr & 0x1F
}

#[test]
fn arithmetic_shift_overflow() {
    let mut c = cpu();
    assert_eq!(alu(&mut c, AluHelper::Asl, Size::Byte, 1, 0x40), 0x80);
    assert_eq!(ccr(&c), CCR_N | CCR_V);

    let mut c = cpu();
    assert_eq!(alu(&mut c, AluHelper::Asr, Size::Word, 4, 0x8000), 0xF800);
    assert_eq!(ccr(&c), CCR_N);
}

#[test]
fn logical_shifts() {
    let mut c = cpu();
    assert_eq!(alu(&mut c, AluHelper::Lsr, Size::Long, 1, 1), 0);
    assert_eq!(ccr(&c), CCR_X | CCR_Z | CCR_C);

    // A zero count leaves X and clears C.
    let mut c = cpu();
    c.sr |= CCR_X | CCR_C;
    assert_eq!(alu(&mut c, AluHelper::Lsl, Size::Long, 0, 5), 5);
    assert_eq!(ccr(&c), CCR_X);
}

#[test]
fn rotates() {
    let mut c = cpu();
    assert_eq!(alu(&mut c, AluHelper::Roxl, Size::Byte, 1, 0x80), 0);
    assert_eq!(ccr(&c), CCR_X | CCR_Z | CCR_C);

    let mut c = cpu();
    assert_eq!(alu(&mut c, AluHelper::Rol, Size::Word, 1, 0x8001), 0x0003);
    assert_eq!(ccr(&c), CCR_C);
}

#[test]
fn word_divide_packs_remainder() {
    let mut c = cpu();
    assert_eq!(alu(&mut c, AluHelper::Divu, Size::Word, 7, 100), 0x0002_000E);
    assert_eq!(ccr(&c), 0);
}

#[test]
fn divide_overflow_keeps_destination() {
    let mut c = cpu();
    c.sr |= CCR_Z | CCR_C;
    assert_eq!(alu(&mut c, AluHelper::Divu, Size::Word, 1, 0x1_0000), 0x1_0000);
    assert_eq!(ccr(&c), CCR_N | CCR_V);
    assert_eq!(c.exception, 0);
}

#[test]
fn divide_by_zero_raises() {
    let mut c = cpu();
    c.sr |= CCR_C;
    assert_eq!(alu(&mut c, AluHelper::Divs, Size::Long, 0, 1234), 1234);
    assert_eq!(c.exception, vector::ZERO_DIVIDE as u32);
    assert_eq!(c.sr & CCR_C, 0);
}

#[test]
fn signed_long_divide() {
    let mut c = cpu();
    assert_eq!(
        alu(&mut c, AluHelper::Divs, Size::Long, 2, 0xFFFF_FFF9),
        0xFFFF_FFFD
    );
    assert_eq!(c.helper_hi, 0xFFFF_FFFF);
    assert_eq!(ccr(&c), CCR_N);
}

#[test]
fn multiply() {
    let mut c = cpu();
    assert_eq!(
        alu(&mut c, AluHelper::Mulu, Size::Word, 0xFFFF, 0xFFFF),
        0xFFFE_0001
    );
    assert_eq!(ccr(&c), CCR_N);

    let mut c = cpu();
    assert_eq!(
        alu(&mut c, AluHelper::Muls, Size::Long, 0x1_0000, 0x1_0000),
        0
    );
    assert_eq!(ccr(&c), CCR_Z | CCR_V);

    let mut c = cpu();
    assert_eq!(
        alu(&mut c, AluHelper::Mulu64, Size::Long, 2, 0xFFFF_FFFF),
        0xFFFF_FFFE
    );
    assert_eq!(c.helper_hi, 1);
    assert_eq!(ccr(&c), 0);
}

#[test]
fn bcd() {
    let mut c = cpu();
    c.sr |= CCR_Z;
    assert_eq!(alu(&mut c, AluHelper::Abcd, Size::Byte, 0x19, 0x28), 0x47);
    assert_eq!(ccr(&c), 0);

    // A zero result leaves Z as it was.
    let mut c = cpu();
    c.sr |= CCR_Z | CCR_N;
    assert_eq!(alu(&mut c, AluHelper::Abcd, Size::Byte, 0x01, 0x99), 0);
    assert_eq!(ccr(&c), CCR_X | CCR_N | CCR_Z | CCR_C);

    let mut c = cpu();
    assert_eq!(alu(&mut c, AluHelper::Sbcd, Size::Byte, 0x01, 0x10), 0x09);
    assert_eq!(ccr(&c), 0);

    let mut c = cpu();
    assert_eq!(alu(&mut c, AluHelper::Nbcd, Size::Byte, 0, 0x01), 0x99);
    assert_eq!(ccr(&c), CCR_X | CCR_C);
}

#[test]
fn extern_entry_point() {
    let mut c = cpu();
    let op = AluHelper::Lsr.encode(Size::Long);
    let r = unsafe { helper_alu(&mut c, op, 4, 0x100) };
    assert_eq!(r, 0x10);

    assert_eq!(AluHelper::decode(op), Some((AluHelper::Lsr, Size::Long)));
    assert_eq!(AluHelper::decode(0xFF), None);
    // Unknown selectors pass the destination through.
    assert_eq!(unsafe { helper_alu(&mut c, 0xFF, 1, 42) }, 42);
}
