use jit68_core::cpu::SR_S;
use jit68_core::exception::vector;
use jit68_core::{CpuModel, CpuState, FunctionCode, GuestMemory, Size};
use jit68_exec::helpers::{movec, rte};

use crate::core::VecMem;

fn put_word(mem: &mut VecMem, addr: u32, value: u32) {
    mem.write(addr, Size::Word, FunctionCode::SupervisorData, value);
}

/// Supervisor CPU with the interrupt stack at `sp`.
fn cpu_at(model: CpuModel, sp: u32) -> CpuState {
    let mut cpu = CpuState::new(model);
    cpu.a[7] = sp;
    cpu
}

#[test]
fn rte_pops_format_zero_frame() {
    let mut cpu = cpu_at(CpuModel::M68020, 0x1000);
    let mut mem = VecMem::new(0x4000);
    put_word(&mut mem, 0x1000, 0x2004);
    mem.put_long(0x1002, 0x4000);
    put_word(&mut mem, 0x1006, 0x0080);

    assert_eq!(rte(&mut cpu, &mut mem), 0x4000);
    assert_eq!(cpu.a[7], 0x1008);
    assert_eq!(cpu.sr, 0x2004);
    assert_eq!(cpu.exception, 0);
}

#[test]
fn rte_returning_to_user_mode_swaps_stacks() {
    let mut cpu = cpu_at(CpuModel::M68010, 0x1000);
    cpu.usp = 0x3000;
    let mut mem = VecMem::new(0x4000);
    put_word(&mut mem, 0x1000, 0x0000);
    mem.put_long(0x1002, 0x4000);
    put_word(&mut mem, 0x1006, 0x0000);

    assert_eq!(rte(&mut cpu, &mut mem), 0x4000);
    assert_eq!(cpu.sr & SR_S, 0);
    assert_eq!(cpu.a[7], 0x3000);
    assert_eq!(cpu.interrupt_sp(), 0x1008);
}

#[test]
fn rte_rejects_unknown_format() {
    let mut cpu = cpu_at(CpuModel::M68020, 0x1000);
    cpu.pc = 0x2222;
    let mut mem = VecMem::new(0x4000);
    put_word(&mut mem, 0x1000, 0x0000);
    mem.put_long(0x1002, 0x4000);
    put_word(&mut mem, 0x1006, 0x7000);

    assert_eq!(rte(&mut cpu, &mut mem), 0x2222);
    assert_eq!(cpu.exception, vector::FORMAT_ERROR as u32);
    assert_eq!(cpu.a[7], 0x1000);
    assert_eq!(cpu.sr, 0x2700);
}

#[test]
fn rte_on_68000_has_no_format_word() {
    let mut cpu = cpu_at(CpuModel::M68000, 0x1000);
    let mut mem = VecMem::new(0x4000);
    put_word(&mut mem, 0x1000, 0x2000);
    mem.put_long(0x1002, 0x0500);
    // Would be a bad format on a later model.
    put_word(&mut mem, 0x1006, 0xF000);

    assert_eq!(rte(&mut cpu, &mut mem), 0x0500);
    assert_eq!(cpu.a[7], 0x1006);
    assert_eq!(cpu.exception, 0);
}

#[test]
fn rte_follows_throwaway_frame() {
    let mut cpu = cpu_at(CpuModel::M68020, 0x1000);
    cpu.msp = 0x2000;
    let mut mem = VecMem::new(0x4000);
    // Throwaway frame on the interrupt stack selecting the master stack.
    put_word(&mut mem, 0x1000, 0x3000);
    mem.put_long(0x1002, 0);
    put_word(&mut mem, 0x1006, 0x1000);
    // The real frame on the master stack.
    put_word(&mut mem, 0x2000, 0x2000);
    mem.put_long(0x2002, 0x4444);
    put_word(&mut mem, 0x2006, 0x0000);

    assert_eq!(rte(&mut cpu, &mut mem), 0x4444);
    assert_eq!(cpu.sr, 0x2000);
    assert_eq!(cpu.master_sp(), 0x2008);
    assert_eq!(cpu.interrupt_sp(), 0x1008);
    assert_eq!(cpu.a[7], 0x1008);
}

#[test]
fn movec_control_registers() {
    let mut cpu = CpuState::new(CpuModel::M68020);
    assert_eq!(movec(&mut cpu, true, 0x801, 0x800), 0x800);
    assert_eq!(cpu.vbr, 0x800);
    assert_eq!(movec(&mut cpu, false, 0x801, 0), 0x800);

    movec(&mut cpu, true, 0x002, 0xFF);
    assert_eq!(cpu.cacr, 0x3);
    assert_eq!(movec(&mut cpu, false, 0x802, 0), 0);

    // USP and MSP are not active in interrupt-stack supervisor mode.
    movec(&mut cpu, true, 0x800, 0x5000);
    movec(&mut cpu, true, 0x803, 0x6000);
    assert_eq!(cpu.usp, 0x5000);
    assert_eq!(cpu.msp, 0x6000);
    movec(&mut cpu, true, 0x804, 0x7000);
    assert_eq!(cpu.a[7], 0x7000);
    assert_eq!(cpu.exception, 0);

    movec(&mut cpu, false, 0x123, 0);
    assert_eq!(cpu.exception, vector::ILLEGAL as u32);
}

#[test]
fn movec_registers_depend_on_model() {
    let mut cpu = CpuState::new(CpuModel::M68010);
    movec(&mut cpu, true, 0x001, 0xF);
    assert_eq!(cpu.dfc, 0x7);
    assert_eq!(cpu.exception, 0);

    movec(&mut cpu, true, 0x002, 1);
    assert_eq!(cpu.exception, vector::ILLEGAL as u32);
    assert_eq!(cpu.cacr, 0);
}
