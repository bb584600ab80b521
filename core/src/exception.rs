//! Exception vectors and the default exception entry sequence.

use crate::bus::GuestMemory;
use crate::cpu::{CpuState, SR_IPL_MASK, SR_IPL_SHIFT, SR_M, SR_S, SR_T0, SR_T1};
use crate::types::{FunctionCode, Size};

pub mod vector {
    pub const RESET_SSP: u8 = 0;
    pub const RESET_PC: u8 = 1;
    pub const BUS_ERROR: u8 = 2;
    pub const ADDRESS_ERROR: u8 = 3;
    pub const ILLEGAL: u8 = 4;
    pub const ZERO_DIVIDE: u8 = 5;
    pub const CHK: u8 = 6;
    pub const TRAPV: u8 = 7;
    pub const PRIVILEGE: u8 = 8;
    pub const TRACE: u8 = 9;
    pub const LINE_A: u8 = 10;
    pub const LINE_F: u8 = 11;
    pub const FORMAT_ERROR: u8 = 14;
    pub const SPURIOUS: u8 = 24;
    pub const AUTOVECTOR_BASE: u8 = 24;
    pub const TRAP_BASE: u8 = 32;
}

/// Details about the instruction that raised an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultInfo {
    /// Address of the faulting instruction.
    pub pc: u32,
    pub opcode: u16,
    /// Instruction length in bytes, when known.
    pub length: u32,
}

/// Exception processing hook.
///
/// Called with all guest state flushed into `cpu` and `cpu.pc` set to
/// the PC to be stacked. On return `cpu.pc` must hold the next PC.
pub trait ExceptionEntry {
    fn raise_exception(
        &mut self,
        cpu: &mut CpuState,
        mem: &mut dyn GuestMemory,
        vector: u8,
        fault: &FaultInfo,
    );

    /// Interrupt acknowledge for `level` (1..=7).
    fn raise_interrupt(&mut self, cpu: &mut CpuState, mem: &mut dyn GuestMemory, level: u8) {
        let stacked_pc = cpu.pc;
        enter(
            cpu,
            mem,
            vector::AUTOVECTOR_BASE + level,
            stacked_pc,
            None,
            Some(level),
        );
    }
}

/// Builds the stack frame of the configured CPU model and vectors
/// through VBR.
#[derive(Debug, Default, Clone, Copy)]
pub struct StackFrameEntry;

impl ExceptionEntry for StackFrameEntry {
    fn raise_exception(
        &mut self,
        cpu: &mut CpuState,
        mem: &mut dyn GuestMemory,
        vector: u8,
        fault: &FaultInfo,
    ) {
        let stacked_pc = cpu.pc;
        // The 68020 stacks the instruction address for these.
        let instruction = match vector {
            vector::ZERO_DIVIDE | vector::CHK | vector::TRAPV if cpu.model.at_least_020() => {
                Some(fault.pc)
            }
            _ => None,
        };
        enter(cpu, mem, vector, stacked_pc, instruction, None);
    }
}

fn push(cpu: &mut CpuState, mem: &mut dyn GuestMemory, size: Size, value: u32) {
    cpu.a[7] = cpu.a[7].wrapping_sub(size.bytes());
    mem.write(cpu.a[7], size, FunctionCode::SupervisorData, value);
}

/// Standard exception sequence: enter supervisor mode, push the
/// frame, load the handler address from the vector table.
pub fn enter(
    cpu: &mut CpuState,
    mem: &mut dyn GuestMemory,
    vector: u8,
    stacked_pc: u32,
    instruction: Option<u32>,
    interrupt_level: Option<u8>,
) {
    let old_sr = cpu.sr;
    let mut sr = (old_sr | SR_S) & !(SR_T1 | SR_T0);
    if let Some(level) = interrupt_level {
        sr = (sr & !SR_IPL_MASK) | ((level as u32) << SR_IPL_SHIFT);
        if cpu.model.at_least_020() {
            // Interrupts run on the interrupt stack.
            sr &= !SR_M;
        }
    }
    cpu.set_sr(sr);

    let offset = (vector as u32) * 4;
    if cpu.model.at_least_010() {
        match instruction {
            Some(addr) => {
                push(cpu, mem, Size::Long, addr);
                push(cpu, mem, Size::Word, 0x2000 | offset);
            }
            None => push(cpu, mem, Size::Word, offset),
        }
    }
    push(cpu, mem, Size::Long, stacked_pc);
    push(cpu, mem, Size::Word, old_sr & 0xFFFF);

    let base = if cpu.model.at_least_010() { cpu.vbr } else { 0 };
    cpu.pc = mem.read(
        base.wrapping_add(offset),
        Size::Long,
        FunctionCode::SupervisorData,
    );
    cpu.stopped = 0;
    tracing::trace!(vector, handler = cpu.pc, "exception entry");
}
