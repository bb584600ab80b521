use jit68_backend::code_buffer::CodeBuffer;
use jit68_backend::x86_64::codegen::CCR_TO_RFLAGS;
use jit68_backend::x86_64::emitter::*;
use jit68_backend::x86_64::Reg;
use jit68_backend::{
    AluOp, HostCodeGen, HostCond, Label, Mem, ShiftOp, Width, X86_64CodeGen,
};
use jit68_core::Size;

fn emitted(f: impl FnOnce(&mut CodeBuffer)) -> Vec<u8> {
    let mut buf = CodeBuffer::new(4096).unwrap();
    f(&mut buf);
    buf.as_slice().to_vec()
}

#[test]
fn mov_imm() {
    assert_eq!(
        emitted(|b| emit_mov_ri(b, Reg::Rax, 5)),
        [0xB8, 0x05, 0x00, 0x00, 0x00]
    );
    assert_eq!(
        emitted(|b| emit_mov_ri(b, Reg::R8, 1)),
        [0x41, 0xB8, 0x01, 0x00, 0x00, 0x00]
    );
}

#[test]
fn arith_imm_forms() {
    // add rsp, 8
    assert_eq!(
        emitted(|b| emit_arith_ri(b, AluOp::Add, Width::W64, Reg::Rsp, 8)),
        [0x48, 0x83, 0xC4, 0x08]
    );
    // sub ebx, 0x1000
    assert_eq!(
        emitted(|b| emit_arith_ri(b, AluOp::Sub, Width::W32, Reg::Rbx, 0x1000)),
        [0x81, 0xEB, 0x00, 0x10, 0x00, 0x00]
    );
}

#[test]
fn push_pop_ret() {
    let code = emitted(|b| {
        emit_push(b, Reg::Rbx);
        emit_push(b, Reg::R12);
        emit_pop(b, Reg::R15);
        emit_ret(b);
    });
    assert_eq!(code, [0x53, 0x41, 0x54, 0x41, 0x5F, 0xC3]);
}

#[test]
fn memory_operands() {
    // mov eax, [rbp + 0x40]
    assert_eq!(
        emitted(|b| emit_load(b, Width::W32, Reg::Rax, &Mem::base(Reg::Rbp as u8, 0x40))),
        [0x8B, 0x45, 0x40]
    );
    // mov ecx, [r12]
    assert_eq!(
        emitted(|b| emit_load(b, Width::W32, Reg::Rcx, &Mem::base(Reg::R12 as u8, 0))),
        [0x41, 0x8B, 0x0C, 0x24]
    );
    // mov [rbx], sil
    assert_eq!(
        emitted(|b| emit_store(b, Width::W8, Reg::Rsi, &Mem::base(Reg::Rbx as u8, 0))),
        [0x40, 0x88, 0x33]
    );
}

#[test]
fn byte_registers_get_rex() {
    // setb sil
    assert_eq!(
        emitted(|b| emit_setcc(b, HostCond::Below, Reg::Rsi)),
        [0x40, 0x0F, 0x92, 0xC6]
    );
}

#[test]
fn misc_register_ops() {
    assert_eq!(
        emitted(|b| emit_extend(b, Reg::Rax, Reg::Rcx, Width::W16, true)),
        [0x0F, 0xBF, 0xC1]
    );
    assert_eq!(emitted(|b| emit_bswap(b, Reg::Rdx)), [0x0F, 0xCA]);
    assert_eq!(
        emitted(|b| emit_test_rr(b, Width::W32, Reg::Rax, Reg::Rax)),
        [0x85, 0xC0]
    );
    assert_eq!(
        emitted(|b| emit_shift_ri(b, ShiftOp::Shl, Width::W32, Reg::Rax, 1)),
        [0xD1, 0xE0]
    );
    assert_eq!(
        emitted(|b| emit_shift_ri(b, ShiftOp::Sar, Width::W32, Reg::Rdx, 3)),
        [0xC1, 0xFA, 0x03]
    );
}

#[test]
fn jmp_to_known_offset() {
    assert_eq!(emitted(|b| emit_jmp(b, 0)), [0xE9, 0xFB, 0xFF, 0xFF, 0xFF]);
}

#[test]
fn forward_label_is_patched() {
    let cg = X86_64CodeGen::new();
    let mut buf = CodeBuffer::new(4096).unwrap();
    let mut label = Label::new();
    cg.jmp(&mut buf, &mut label);
    assert!(label.has_pending_uses());
    buf.emit_u8(0x90);
    cg.bind(&mut buf, &mut label);
    assert!(label.is_bound());
    assert!(!label.has_pending_uses());
    assert_eq!(label.value(), Some(6));
    assert_eq!(buf.read_u32(1), 1);
}

#[test]
fn backward_label_is_resolved_at_emit() {
    let cg = X86_64CodeGen::new();
    let mut buf = CodeBuffer::new(4096).unwrap();
    let mut top = Label::new();
    cg.bind(&mut buf, &mut top);
    cg.jcc(&mut buf, HostCond::Eq, &mut top);
    assert_eq!(&buf.as_slice()[..2], &[0x0F, 0x84]);
    assert_eq!(buf.read_u32(2) as i32, -6);
}

#[test]
fn prologue_saves_callee_saved() {
    let mut cg = X86_64CodeGen::new();
    let mut buf = CodeBuffer::new(4096).unwrap();
    cg.emit_prologue(&mut buf);
    cg.emit_epilogue(&mut buf);
    let code = buf.as_slice();
    assert_eq!(
        &code[..13],
        &[0x55, 0x53, 0x41, 0x54, 0x41, 0x55, 0x41, 0x56, 0x41, 0x57, 0x48, 0x89, 0xFD]
    );
    assert_eq!(*code.last().unwrap(), 0xC3);
    assert!(cg.epilogue_offset() > 0);
    assert_eq!(cg.code_gen_start(), buf.offset());
}

#[test]
fn ccr_to_rflags_table() {
    assert_eq!(CCR_TO_RFLAGS[0], 0x0002);
    // C V Z N map to CF OF ZF SF.
    assert_eq!(CCR_TO_RFLAGS[0x01], 0x0003);
    assert_eq!(CCR_TO_RFLAGS[0x02], 0x0802);
    assert_eq!(CCR_TO_RFLAGS[0x04], 0x0042);
    assert_eq!(CCR_TO_RFLAGS[0x08], 0x0082);
    assert_eq!(CCR_TO_RFLAGS[0x0F], 0x08C3);
    // X has no host counterpart.
    for ccr in 0..16 {
        assert_eq!(CCR_TO_RFLAGS[ccr | 0x10], CCR_TO_RFLAGS[ccr]);
    }
}

#[test]
fn host_cond_invert_pairs() {
    let all = [
        HostCond::Overflow,
        HostCond::NoOverflow,
        HostCond::Below,
        HostCond::AboveEq,
        HostCond::Eq,
        HostCond::Ne,
        HostCond::BelowEq,
        HostCond::Above,
        HostCond::Sign,
        HostCond::NoSign,
        HostCond::Less,
        HostCond::GreaterEq,
        HostCond::LessEq,
        HostCond::Greater,
    ];
    for c in all {
        assert_ne!(c.invert(), c);
        assert_eq!(c.invert().invert(), c);
        // x86 condition codes pair on the low bit.
        assert_eq!(c.invert() as u8, c as u8 ^ 1);
    }
}

#[test]
fn width_from_size() {
    assert_eq!(Width::from(Size::Byte), Width::W8);
    assert_eq!(Width::from(Size::Word), Width::W16);
    assert_eq!(Width::from(Size::Long), Width::W32);
}
