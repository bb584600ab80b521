use jit68_core::cpu::{guest_reg_offset, A_OFFSET, D_OFFSET, SR_M, SR_S};
use jit68_core::{Boundary, CpuModel, CpuState, ExitCode, TranslationUnit};

#[test]
fn reset_state() {
    let cpu = CpuState::new(CpuModel::M68020);
    assert_eq!(cpu.sr, 0x2700);
    assert!(cpu.supervisor());
    assert_eq!(cpu.interrupt_mask(), 7);
    assert_eq!(cpu.exception, 0);
}

#[test]
fn register_numbering() {
    let mut cpu = CpuState::new(CpuModel::M68000);
    cpu.set_reg(3, 0x33);
    cpu.set_reg(8 + 2, 0xA2);
    assert_eq!(cpu.d[3], 0x33);
    assert_eq!(cpu.a[2], 0xA2);
    assert_eq!(cpu.reg(10), 0xA2);
    assert_eq!(guest_reg_offset(0), D_OFFSET);
    assert_eq!(guest_reg_offset(8), A_OFFSET);
    assert_eq!(guest_reg_offset(15), A_OFFSET + 28);
}

#[test]
fn set_sr_swaps_stack_pointers() {
    let mut cpu = CpuState::new(CpuModel::M68000);
    cpu.a[7] = 0x8000;
    cpu.usp = 0x4000;

    cpu.set_sr(0x0000);
    assert!(!cpu.supervisor());
    assert_eq!(cpu.a[7], 0x4000);
    assert_eq!(cpu.isp, 0x8000);
    assert_eq!(cpu.user_sp(), 0x4000);

    cpu.a[7] = 0x3FF0;
    cpu.set_sr(SR_S);
    assert_eq!(cpu.a[7], 0x8000);
    assert_eq!(cpu.usp, 0x3FF0);
    assert_eq!(cpu.user_sp(), 0x3FF0);
}

#[test]
fn master_stack_on_020_only() {
    let mut cpu = CpuState::new(CpuModel::M68020);
    cpu.a[7] = 0x8000;
    cpu.msp = 0x6000;
    cpu.set_sr(SR_S | SR_M);
    assert_eq!(cpu.a[7], 0x6000);
    assert_eq!(cpu.interrupt_sp(), 0x8000);
    assert_eq!(cpu.master_sp(), 0x6000);

    // M is not implemented on the 68000.
    let mut cpu = CpuState::new(CpuModel::M68000);
    cpu.a[7] = 0x8000;
    cpu.set_sr(SR_S | SR_M);
    assert_eq!(cpu.sr & SR_M, 0);
    assert_eq!(cpu.a[7], 0x8000);
}

#[test]
fn ccr_accessors() {
    let mut cpu = CpuState::new(CpuModel::M68020);
    cpu.set_ccr(0xFF);
    assert_eq!(cpu.ccr(), 0x1F);
    assert_eq!(cpu.sr, 0x271F);
}

#[test]
fn exit_code_from_raw() {
    for code in [
        ExitCode::Next,
        ExitCode::Lookup,
        ExitCode::Exception,
        ExitCode::Interrupt,
        ExitCode::Stop,
        ExitCode::Reset,
    ] {
        assert_eq!(ExitCode::from_raw(code as usize), Some(code));
    }
    assert_eq!(ExitCode::from_raw(6), None);
}

#[test]
fn unit_ranges() {
    let mut u = TranslationUnit::new(0x1000);
    u.high = 0x1010;
    u.host_offset = 0x200;
    u.host_size = 0x40;
    assert!(u.contains(0x1000));
    assert!(!u.contains(0x1010));
    assert!(u.overlaps(0x100F, 0x1011));
    assert!(!u.overlaps(0x1010, 0x1020));
    assert!(!u.overlaps(0x0FF0, 0x1000));
    assert!(u.contains_host(0x23F));
    assert!(!u.contains_host(0x240));

    assert!(u.boundary_at(0x1000).is_none());
    u.boundaries = Some(
        vec![Boundary {
            guest_pc: 0x1004,
            host_offset: 12,
            bindings: [None; 16],
        }]
        .into_boxed_slice(),
    );
    assert_eq!(u.boundary_at(0x1004).map(|b| b.host_offset), Some(12));
}
