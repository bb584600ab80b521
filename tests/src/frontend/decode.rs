use jit68_core::{CcMask, Cond, CpuModel, Size};
use jit68_frontend::m68k::decode::{decode, ArithKind, Ea, Flow, Insn, Op};

use super::code;

fn dec_at(pc: u32, words: &[u16], model: CpuModel) -> Insn {
    let mut image = vec![0u8; pc as usize];
    image.extend(code(words));
    let mut fetch: &[u8] = &image;
    decode(&mut fetch, pc, model)
}

fn dec(words: &[u16]) -> Insn {
    dec_at(0, words, CpuModel::M68020)
}

#[test]
fn moveq() {
    let i = dec(&[0x7005]);
    assert_eq!(i.op, Op::Moveq { value: 5, dn: 0 });
    assert_eq!(i.len, 2);
    assert_eq!(i.opcode, 0x7005);

    let i = dec(&[0x74FF]);
    assert_eq!(
        i.op,
        Op::Moveq {
            value: 0xFFFF_FFFF,
            dn: 2
        }
    );
    assert_eq!(i.op.sets(), CcMask::NZVC);
    assert_eq!(i.op.mnemonic(), "moveq");
}

#[test]
fn add_register_form() {
    let i = dec(&[0xD081]);
    assert_eq!(
        i.op,
        Op::Arith {
            op: ArithKind::Add,
            size: Size::Long,
            src: Ea::DReg(1),
            dst: Ea::DReg(0),
        }
    );
    assert_eq!(i.op.sets(), CcMask::ALL);
    assert!(!i.op.writes_memory());
}

#[test]
fn short_branch() {
    let i = dec_at(0x100, &[0x6604], CpuModel::M68020);
    assert_eq!(
        i.op,
        Op::Bcc {
            cond: Cond::Ne,
            target: 0x106
        }
    );
    assert_eq!(
        i.op.flow(),
        Flow::Branch {
            cond: Cond::Ne,
            target: 0x106
        }
    );
    assert_eq!(i.op.uses(), CcMask::Z);
}

#[test]
fn long_branch_is_020_only() {
    let i = dec(&[0x60FF, 0x0000, 0x0010]);
    assert_eq!(
        i.op,
        Op::Bcc {
            cond: Cond::True,
            target: 0x12
        }
    );
    assert_eq!(i.len, 6);

    // An 8-bit displacement of -1 on the 68000.
    let i = dec_at(0, &[0x60FF], CpuModel::M68000);
    assert_eq!(i.len, 2);
    assert_eq!(
        i.op,
        Op::Bcc {
            cond: Cond::True,
            target: 1
        }
    );
}

#[test]
fn bsr_uses_false_condition_slot() {
    let i = dec_at(0x1002, &[0x6104], CpuModel::M68020);
    assert_eq!(i.op, Op::Bsr { target: 0x1008 });
    assert_eq!(i.op.flow(), Flow::End);
    assert!(i.op.writes_memory());
}

#[test]
fn dbra() {
    let i = dec_at(0x10, &[0x51C8, 0xFFFC], CpuModel::M68020);
    assert_eq!(
        i.op,
        Op::Dbcc {
            cond: Cond::False,
            dn: 0,
            target: 0x0E
        }
    );
    assert_eq!(i.len, 4);
    assert_eq!(i.next_pc(), 0x14);
    assert_eq!(
        i.op.flow(),
        Flow::Loop {
            cond: Cond::False,
            target: 0x0E
        }
    );
}

#[test]
fn traps_and_control() {
    assert_eq!(dec(&[0x4E43]).op, Op::Trap { vector: 3 });
    assert_eq!(dec(&[0x4E4F]).op, Op::Trap { vector: 15 });

    let i = dec(&[0x4AFC]);
    assert_eq!(i.op, Op::Illegal);
    assert_eq!(i.len, 2);

    let i = dec(&[0x4E72, 0x2700]);
    assert_eq!(i.op, Op::Stop { sr: 0x2700 });
    assert_eq!(i.len, 4);
    assert!(i.op.privileged(CpuModel::M68000));

    assert_eq!(dec(&[0x4E71]).op, Op::Nop);
    assert_eq!(dec(&[0x4E75]).op, Op::Rts);
    assert_eq!(dec(&[0xA123]).op, Op::LineA);
}

#[test]
fn move_from_sr_privilege_depends_on_model() {
    let op = dec(&[0x40C7]).op;
    assert_eq!(op, Op::MoveFromSr { dst: Ea::DReg(7) });
    assert!(!op.privileged(CpuModel::M68000));
    assert!(op.privileged(CpuModel::M68010));
}

#[test]
fn movec_needs_68010() {
    let i = dec_at(0, &[0x4E7B, 0x0801], CpuModel::M68010);
    assert_eq!(
        i.op,
        Op::Movec {
            to_ctrl: true,
            ctrl: 0x801,
            reg: 0
        }
    );
    assert_eq!(dec_at(0, &[0x4E7B, 0x0801], CpuModel::M68000).op, Op::Illegal);
}

#[test]
fn move_immediate_to_absolute() {
    let i = dec(&[0x31FC, 0x7063, 0x1008]);
    assert_eq!(
        i.op,
        Op::Move {
            size: Size::Word,
            src: Ea::Imm(0x7063),
            dst: Ea::Abs(0x1008),
        }
    );
    assert_eq!(i.len, 6);
    assert!(i.op.writes_memory());
}

#[test]
fn postincrement_copy() {
    let op = dec(&[0x22D8]).op;
    assert_eq!(
        op,
        Op::Move {
            size: Size::Long,
            src: Ea::PostInc(0),
            dst: Ea::PostInc(1),
        }
    );
}

#[test]
fn lea_absolute_word() {
    assert_eq!(
        dec(&[0x41F8, 0x3000]).op,
        Op::Lea {
            src: Ea::Abs(0x3000),
            an: 0
        }
    );
    // Absolute short addresses are sign-extended.
    assert_eq!(
        dec(&[0x43F8, 0x8000]).op,
        Op::Lea {
            src: Ea::Abs(0xFFFF_8000),
            an: 1
        }
    );
}

#[test]
fn quick_forms() {
    assert_eq!(
        dec(&[0x5280]).op,
        Op::Arith {
            op: ArithKind::Add,
            size: Size::Long,
            src: Ea::Imm(1),
            dst: Ea::DReg(0),
        }
    );
    // A zero data field means 8.
    assert_eq!(
        dec(&[0x5188]).op,
        Op::ArithA {
            op: ArithKind::Sub,
            size: Size::Long,
            src: Ea::Imm(8),
            an: 0,
        }
    );
    assert_eq!(
        dec(&[0x55C1]).op,
        Op::Scc {
            cond: Cond::Cs,
            dst: Ea::DReg(1)
        }
    );
}

#[test]
fn byte_access_to_address_register_is_illegal() {
    // move.b a0,d0
    assert_eq!(dec(&[0x1008]).op, Op::Illegal);
}

#[test]
fn fetch_past_end_reads_ones() {
    let i = dec_at(0, &[], CpuModel::M68020);
    assert_eq!(i.opcode, 0xFFFF);
    assert!(matches!(i.op, Op::LineF { .. }));
}
