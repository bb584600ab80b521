use jit68_core::cpu::{SR_IPL_MASK, SR_M, SR_S};
use jit68_core::exception::vector;
use jit68_core::{
    CpuModel, CpuState, ExceptionEntry, FaultInfo, FunctionCode, GuestMemory, Size,
    StackFrameEntry,
};

use super::VecMem;

fn word(mem: &mut VecMem, addr: u32) -> u32 {
    mem.read(addr, Size::Word, FunctionCode::SupervisorData)
}

fn long(mem: &mut VecMem, addr: u32) -> u32 {
    mem.read(addr, Size::Long, FunctionCode::SupervisorData)
}

#[test]
fn trap_from_user_mode_on_68000() {
    let mut mem = VecMem::new(0x4000);
    mem.put_long(0x80, 0x500);
    let mut cpu = CpuState::new(CpuModel::M68000);
    cpu.a[7] = 0x1000;
    cpu.set_sr(0x0004);
    cpu.a[7] = 0x3000;
    cpu.pc = 0x402;

    StackFrameEntry.raise_exception(
        &mut cpu,
        &mut mem,
        vector::TRAP_BASE,
        &FaultInfo {
            pc: 0x400,
            opcode: 0x4E40,
            length: 2,
        },
    );

    assert_eq!(cpu.pc, 0x500);
    assert!(cpu.supervisor());
    assert_eq!(cpu.usp, 0x3000);
    // Six-byte frame on the supervisor stack.
    assert_eq!(cpu.a[7], 0x0FFA);
    assert_eq!(word(&mut mem, 0x0FFA), 0x0004);
    assert_eq!(long(&mut mem, 0x0FFC), 0x402);
}

#[test]
fn vbr_is_ignored_on_68000() {
    let mut mem = VecMem::new(0x4000);
    mem.put_long(0x10, 0x600);
    mem.put_long(0x2010, 0x700);
    let mut cpu = CpuState::new(CpuModel::M68000);
    cpu.vbr = 0x2000;
    cpu.a[7] = 0x1000;
    StackFrameEntry.raise_exception(&mut cpu, &mut mem, vector::ILLEGAL, &FaultInfo::default());
    assert_eq!(cpu.pc, 0x600);
}

#[test]
fn zero_divide_frame_on_68020() {
    let mut mem = VecMem::new(0x4000);
    mem.put_long(0x800 + 0x14, 0x900);
    let mut cpu = CpuState::new(CpuModel::M68020);
    cpu.vbr = 0x800;
    cpu.a[7] = 0x1000;
    cpu.pc = 0x1204;

    StackFrameEntry.raise_exception(
        &mut cpu,
        &mut mem,
        vector::ZERO_DIVIDE,
        &FaultInfo {
            pc: 0x1200,
            opcode: 0x81C1,
            length: 2,
        },
    );

    assert_eq!(cpu.pc, 0x900);
    assert_eq!(cpu.a[7], 0x1000 - 12);
    assert_eq!(word(&mut mem, 0x0FF4), 0x2700);
    assert_eq!(long(&mut mem, 0x0FF6), 0x1204);
    // Format 2 with the vector offset, then the instruction address.
    assert_eq!(word(&mut mem, 0x0FFA), 0x2014);
    assert_eq!(long(&mut mem, 0x0FFC), 0x1200);
}

#[test]
fn trap_frame_on_68010_is_format_zero() {
    let mut mem = VecMem::new(0x4000);
    let mut cpu = CpuState::new(CpuModel::M68010);
    cpu.a[7] = 0x1000;
    cpu.pc = 0x300;
    StackFrameEntry.raise_exception(
        &mut cpu,
        &mut mem,
        vector::TRAP_BASE + 15,
        &FaultInfo::default(),
    );
    assert_eq!(cpu.a[7], 0x1000 - 8);
    assert_eq!(word(&mut mem, 0x0FFE), (vector::TRAP_BASE as u32 + 15) * 4);
}

#[test]
fn interrupt_raises_mask_and_leaves_master_stack() {
    let mut mem = VecMem::new(0x4000);
    mem.put_long((vector::AUTOVECTOR_BASE as u32 + 3) * 4, 0xA00);
    let mut cpu = CpuState::new(CpuModel::M68020);
    cpu.a[7] = 0x2000;
    cpu.set_sr(SR_S | SR_M);
    cpu.a[7] = 0x1800;
    cpu.pc = 0x1234;

    StackFrameEntry.raise_interrupt(&mut cpu, &mut mem, 3);

    assert_eq!(cpu.pc, 0xA00);
    assert_eq!(cpu.sr & SR_IPL_MASK, 0x300);
    assert_eq!(cpu.sr & SR_M, 0);
    assert_eq!(cpu.msp, 0x1800);
    assert_eq!(cpu.a[7], 0x2000 - 8);
    assert_eq!(word(&mut mem, 0x2000 - 8), SR_S | SR_M);
    assert_eq!(long(&mut mem, 0x2000 - 6), 0x1234);
    assert_eq!(word(&mut mem, 0x2000 - 2), 0x6C);
}

#[test]
fn exception_clears_stop_and_trace() {
    let mut mem = VecMem::new(0x4000);
    let mut cpu = CpuState::new(CpuModel::M68000);
    cpu.a[7] = 0x1000;
    cpu.sr = 0xA700;
    cpu.stopped = 1;
    StackFrameEntry.raise_exception(&mut cpu, &mut mem, vector::CHK, &FaultInfo::default());
    assert_eq!(cpu.stopped, 0);
    assert_eq!(cpu.sr & 0x8000, 0);
}
