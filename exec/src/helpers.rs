//! Runtime entry points called from generated code.
//!
//! Every helper receives the env pointer first. Guest registers and
//! SR are in `CpuState` whenever a helper runs; the runtime object is
//! reached through `CpuState::runtime`.

use jit68_core::cpu::{CpuState, SR_S};
use jit68_core::exception::vector;
use jit68_core::{FunctionCode, GuestMemory, Size};
use jit68_frontend::HelperTable;

use crate::runtime::Runtime;

/// Entry points for [`jit68_frontend::translate_block`].
pub fn helper_table() -> HelperTable {
    HelperTable::new(
        helper_read as *const () as usize,
        helper_write as *const () as usize,
        helper_set_sr as *const () as usize,
        helper_rte as *const () as usize,
        helper_movec as *const () as usize,
    )
}

/// # Safety
/// `env` must point to a live `CpuState` whose `runtime` points to a
/// live [`Runtime`], neither otherwise borrowed.
unsafe fn split<'a>(env: *mut CpuState) -> (&'a mut CpuState, &'a mut Runtime) {
    let cpu = &mut *env;
    let rt = &mut *(cpu.runtime as *mut Runtime);
    (cpu, rt)
}

fn size_of(bytes: u32) -> Size {
    Size::from_bytes(bytes).unwrap_or(Size::Long)
}

/// Memory read slow path.
///
/// # Safety
/// See [`split`].
pub unsafe extern "C" fn helper_read(env: *mut CpuState, addr: u32, size: u32) -> u32 {
    let (cpu, rt) = split(env);
    let fc = FunctionCode::from_sr(cpu.sr, false);
    rt.load(addr, size_of(size), fc)
}

/// Memory write slow path. Flags the block for exit when the store
/// invalidated translated code.
///
/// # Safety
/// See [`split`].
pub unsafe extern "C" fn helper_write(env: *mut CpuState, addr: u32, value: u32, size: u32) {
    let (cpu, rt) = split(env);
    let fc = FunctionCode::from_sr(cpu.sr, false);
    if rt.store(addr, size_of(size), fc, value) {
        cpu.code_dirty = 1;
    }
}

/// # Safety
/// `env` must point to a live `CpuState`.
pub unsafe extern "C" fn helper_set_sr(env: *mut CpuState, value: u32) {
    (*env).set_sr(value);
}

/// # Safety
/// See [`split`].
pub unsafe extern "C" fn helper_rte(env: *mut CpuState) -> u32 {
    let (cpu, rt) = split(env);
    rte(cpu, rt)
}

/// # Safety
/// `env` must point to a live `CpuState`.
pub unsafe extern "C" fn helper_movec(env: *mut CpuState, to_ctrl: u32, ctrl: u32, value: u32) -> u32 {
    movec(&mut *env, to_ctrl != 0, ctrl as u16, value)
}

/// Stack frame size for a 68010/68020 format code, `None` when the
/// format cannot be returned from.
fn frame_size(format: u32) -> Option<u32> {
    match format {
        0x0 | 0x1 => Some(8),
        0x2 => Some(12),
        0x9 => Some(20),
        0xA => Some(32),
        0xB => Some(92),
        _ => None,
    }
}

/// Return from exception: pop SR and PC (and the format word on the
/// 68010 and later). An unknown format raises a format error and
/// leaves SR and the stack untouched. Returns the new PC.
pub fn rte(cpu: &mut CpuState, mem: &mut dyn GuestMemory) -> u32 {
    let fc = FunctionCode::SupervisorData;
    loop {
        let sp = cpu.a[7];
        let sr = mem.read(sp, Size::Word, fc);
        let pc = mem.read(sp.wrapping_add(2), Size::Long, fc);
        let (size, format) = if cpu.model.at_least_010() {
            let format = mem.read(sp.wrapping_add(6), Size::Word, fc) >> 12;
            match frame_size(format) {
                Some(size) => (size, format),
                None => {
                    tracing::warn!(format, sp = format_args!("{sp:#x}"), "bad RTE frame format");
                    cpu.exception = vector::FORMAT_ERROR as u32;
                    return cpu.pc;
                }
            }
        } else {
            (6, 0)
        };
        let throwaway = format == 0x1 && cpu.model.at_least_020();
        cpu.a[7] = sp.wrapping_add(size);
        cpu.set_sr(sr);
        // A throwaway frame continues on the stack the new SR selects.
        if !throwaway || cpu.sr & SR_S == 0 {
            return pc;
        }
    }
}

/// Control register numbers accepted by MOVEC.
mod ctrl {
    pub const SFC: u16 = 0x000;
    pub const DFC: u16 = 0x001;
    pub const CACR: u16 = 0x002;
    pub const USP: u16 = 0x800;
    pub const VBR: u16 = 0x801;
    pub const CAAR: u16 = 0x802;
    pub const MSP: u16 = 0x803;
    pub const ISP: u16 = 0x804;
}

/// MOVEC. Returns the control register value for reads; an
/// unknown register raises the illegal instruction exception.
pub fn movec(cpu: &mut CpuState, to_ctrl: bool, reg: u16, value: u32) -> u32 {
    let m020 = cpu.model.at_least_020();
    let known = match reg {
        ctrl::SFC | ctrl::DFC | ctrl::USP | ctrl::VBR => true,
        ctrl::CACR | ctrl::CAAR | ctrl::MSP | ctrl::ISP => m020,
        _ => false,
    };
    if !known {
        cpu.exception = vector::ILLEGAL as u32;
        return 0;
    }
    if to_ctrl {
        match reg {
            ctrl::SFC => cpu.sfc = value & 7,
            ctrl::DFC => cpu.dfc = value & 7,
            ctrl::CACR => cpu.cacr = value & 0x3,
            ctrl::USP => cpu.set_user_sp(value),
            ctrl::VBR => cpu.vbr = value,
            ctrl::MSP => cpu.set_master_sp(value),
            ctrl::ISP => cpu.set_interrupt_sp(value),
            _ => {}
        }
        value
    } else {
        match reg {
            ctrl::SFC => cpu.sfc,
            ctrl::DFC => cpu.dfc,
            ctrl::CACR => cpu.cacr,
            ctrl::USP => cpu.user_sp(),
            ctrl::VBR => cpu.vbr,
            ctrl::MSP => cpu.master_sp(),
            ctrl::ISP => cpu.interrupt_sp(),
            _ => 0,
        }
    }
}
