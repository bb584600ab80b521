//! Guest CPU state and its fixed layout.
//!
//! Generated code addresses every field through the `*_OFFSET`
//! constants below relative to the env pointer, so the struct is
//! `#[repr(C)]` and its layout never changes at run time.

use std::ffi::c_void;
use std::mem::offset_of;
use std::sync::atomic::AtomicU32;

use serde::{Deserialize, Serialize};

// -- Status register bits --

pub const SR_T1: u32 = 0x8000;
pub const SR_T0: u32 = 0x4000;
pub const SR_S: u32 = 0x2000;
pub const SR_M: u32 = 0x1000;
pub const SR_IPL_MASK: u32 = 0x0700;
pub const SR_IPL_SHIFT: u32 = 8;
pub const SR_CCR_MASK: u32 = 0x001F;

pub const CCR_C: u32 = 0x01;
pub const CCR_V: u32 = 0x02;
pub const CCR_Z: u32 = 0x04;
pub const CCR_N: u32 = 0x08;
pub const CCR_X: u32 = 0x10;

/// Guest register numbering used by the allocator: D0..D7 are 0..7,
/// A0..A7 are 8..15.
pub const NUM_GUEST_REGS: usize = 16;
pub const A0: u8 = 8;
pub const SP: u8 = 15;

/// Supported members of the family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuModel {
    M68000,
    M68010,
    #[default]
    M68020,
}

impl CpuModel {
    /// Implemented SR bits.
    pub const fn sr_mask(self) -> u32 {
        match self {
            CpuModel::M68000 | CpuModel::M68010 => 0xA71F,
            CpuModel::M68020 => 0xF71F,
        }
    }

    pub const fn at_least_010(self) -> bool {
        !matches!(self, CpuModel::M68000)
    }

    pub const fn at_least_020(self) -> bool {
        matches!(self, CpuModel::M68020)
    }
}

/// FPU register file. Only carried; FPU instruction bodies live
/// behind the F-line exception.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FpuState {
    pub fp: [f64; 8],
    pub fpcr: u32,
    pub fpsr: u32,
    pub fpiar: u32,
    pub _pad: u32,
}

/// Guest CPU state shared with generated code.
///
/// `a[7]` always holds the active stack pointer; the inactive ones
/// are kept in `usp`, `isp` and `msp`. Use [`CpuState::set_sr`] to
/// change the status register so the stack pointers stay coherent.
#[repr(C)]
#[derive(Debug)]
pub struct CpuState {
    pub d: [u32; 8],
    pub a: [u32; 8],
    pub pc: u32,
    pub sr: u32,
    pub usp: u32,
    pub isp: u32,
    pub msp: u32,
    pub vbr: u32,
    pub sfc: u32,
    pub dfc: u32,
    pub cacr: u32,
    /// Vector number of an exception raised by generated code or a
    /// helper, 0 when none is pending.
    pub exception: u32,
    pub fault_pc: u32,
    pub fault_opcode: u32,
    pub fault_len: u32,
    /// Second result/operand word for 64-bit multiply and divide.
    pub helper_hi: u32,
    pub stopped: u32,
    /// Set by the store helper when a write invalidated translated code.
    pub code_dirty: u32,
    /// Interrupt level last seen by the dispatcher; level 7 is only
    /// taken on a change.
    pub irq_ack: u32,
    pub _pad: u32,

    // Runtime plumbing, installed by the dispatcher before any
    // generated code runs.
    /// Interrupt line: level word followed by the shutdown word.
    pub irq: *const AtomicU32,
    pub ram_base: *mut u8,
    pub ram_size: u64,
    /// One byte per 4 KiB RAM page, non-zero if it holds translated code.
    pub code_pages: *const u8,
    pub runtime: *mut c_void,

    pub fpu: FpuState,
    pub model: CpuModel,
}

pub const D_OFFSET: i32 = offset_of!(CpuState, d) as i32;
pub const A_OFFSET: i32 = offset_of!(CpuState, a) as i32;
pub const PC_OFFSET: i32 = offset_of!(CpuState, pc) as i32;
pub const SR_OFFSET: i32 = offset_of!(CpuState, sr) as i32;
pub const USP_OFFSET: i32 = offset_of!(CpuState, usp) as i32;
pub const ISP_OFFSET: i32 = offset_of!(CpuState, isp) as i32;
pub const MSP_OFFSET: i32 = offset_of!(CpuState, msp) as i32;
pub const VBR_OFFSET: i32 = offset_of!(CpuState, vbr) as i32;
pub const EXCEPTION_OFFSET: i32 = offset_of!(CpuState, exception) as i32;
pub const FAULT_PC_OFFSET: i32 = offset_of!(CpuState, fault_pc) as i32;
pub const FAULT_OPCODE_OFFSET: i32 = offset_of!(CpuState, fault_opcode) as i32;
pub const FAULT_LEN_OFFSET: i32 = offset_of!(CpuState, fault_len) as i32;
pub const HELPER_HI_OFFSET: i32 = offset_of!(CpuState, helper_hi) as i32;
pub const STOPPED_OFFSET: i32 = offset_of!(CpuState, stopped) as i32;
pub const CODE_DIRTY_OFFSET: i32 = offset_of!(CpuState, code_dirty) as i32;
pub const IRQ_ACK_OFFSET: i32 = offset_of!(CpuState, irq_ack) as i32;
pub const IRQ_OFFSET: i32 = offset_of!(CpuState, irq) as i32;
pub const RAM_BASE_OFFSET: i32 = offset_of!(CpuState, ram_base) as i32;
pub const RAM_SIZE_OFFSET: i32 = offset_of!(CpuState, ram_size) as i32;
pub const CODE_PAGES_OFFSET: i32 = offset_of!(CpuState, code_pages) as i32;
pub const FPU_OFFSET: i32 = offset_of!(CpuState, fpu) as i32;

/// Offset of the shutdown word behind the level word of the
/// interrupt line.
pub const IRQ_SHUTDOWN_OFFSET: i32 = 4;

/// Offset of guest register `g` (0..=15).
#[inline]
pub const fn guest_reg_offset(g: u8) -> i32 {
    D_OFFSET + 4 * g as i32
}

/// Guest code-page granularity used by the store fast path.
pub const CODE_PAGE_SHIFT: u32 = 12;
pub const CODE_PAGE_SIZE: u32 = 1 << CODE_PAGE_SHIFT;

impl CpuState {
    pub fn new(model: CpuModel) -> Self {
        Self {
            d: [0; 8],
            a: [0; 8],
            pc: 0,
            sr: 0x2700,
            usp: 0,
            isp: 0,
            msp: 0,
            vbr: 0,
            sfc: 0,
            dfc: 0,
            cacr: 0,
            exception: 0,
            fault_pc: 0,
            fault_opcode: 0,
            fault_len: 0,
            helper_hi: 0,
            stopped: 0,
            code_dirty: 0,
            irq_ack: 0,
            _pad: 0,
            irq: std::ptr::null(),
            ram_base: std::ptr::null_mut(),
            ram_size: 0,
            code_pages: std::ptr::null(),
            runtime: std::ptr::null_mut(),
            fpu: FpuState::default(),
            model,
        }
    }

    /// Guest register by allocator number.
    #[inline]
    pub fn reg(&self, g: u8) -> u32 {
        if g < 8 {
            self.d[g as usize]
        } else {
            self.a[(g - 8) as usize & 7]
        }
    }

    #[inline]
    pub fn set_reg(&mut self, g: u8, value: u32) {
        if g < 8 {
            self.d[g as usize] = value;
        } else {
            self.a[(g - 8) as usize & 7] = value;
        }
    }

    #[inline]
    pub fn sr(&self) -> u32 {
        self.sr
    }

    #[inline]
    pub fn ccr(&self) -> u32 {
        self.sr & SR_CCR_MASK
    }

    #[inline]
    pub fn set_ccr(&mut self, ccr: u32) {
        self.sr = (self.sr & !SR_CCR_MASK) | (ccr & SR_CCR_MASK);
    }

    #[inline]
    pub fn supervisor(&self) -> bool {
        self.sr & SR_S != 0
    }

    #[inline]
    pub fn interrupt_mask(&self) -> u32 {
        (self.sr & SR_IPL_MASK) >> SR_IPL_SHIFT
    }

    /// Write the status register, swapping the active stack pointer
    /// when S (or M on the 68020) changes.
    pub fn set_sr(&mut self, value: u32) {
        let value = value & self.model.sr_mask();
        let active = self.a[7];
        *self.sp_slot(self.sr) = active;
        self.sr = value;
        let next = *self.sp_slot(value);
        self.a[7] = next;
    }

    /// Stack pointer slot that is active under `sr`.
    fn sp_slot(&mut self, sr: u32) -> &mut u32 {
        if sr & SR_S == 0 {
            &mut self.usp
        } else if sr & SR_M != 0 && self.model.at_least_020() {
            &mut self.msp
        } else {
            &mut self.isp
        }
    }

    /// Current value of the user stack pointer.
    pub fn user_sp(&self) -> u32 {
        if self.supervisor() {
            self.usp
        } else {
            self.a[7]
        }
    }

    pub fn set_user_sp(&mut self, value: u32) {
        if self.supervisor() {
            self.usp = value;
        } else {
            self.a[7] = value;
        }
    }

    /// Current value of the interrupt stack pointer.
    pub fn interrupt_sp(&self) -> u32 {
        if self.supervisor() && (self.sr & SR_M == 0 || !self.model.at_least_020()) {
            self.a[7]
        } else {
            self.isp
        }
    }

    pub fn set_interrupt_sp(&mut self, value: u32) {
        if self.supervisor() && (self.sr & SR_M == 0 || !self.model.at_least_020()) {
            self.a[7] = value;
        } else {
            self.isp = value;
        }
    }

    /// Current value of the master stack pointer (68020).
    pub fn master_sp(&self) -> u32 {
        if self.supervisor() && self.sr & SR_M != 0 && self.model.at_least_020() {
            self.a[7]
        } else {
            self.msp
        }
    }

    pub fn set_master_sp(&mut self, value: u32) {
        if self.supervisor() && self.sr & SR_M != 0 && self.model.at_least_020() {
            self.a[7] = value;
        } else {
            self.msp = value;
        }
    }

    /// Clear runtime fault bookkeeping after it has been consumed.
    pub fn take_exception(&mut self) -> Option<u8> {
        let v = std::mem::take(&mut self.exception);
        if v == 0 {
            None
        } else {
            Some(v as u8)
        }
    }
}
