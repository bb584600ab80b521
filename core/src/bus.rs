use crate::types::{FunctionCode, Size};

/// External bus transport.
///
/// Only reached from slow paths: accesses outside guest RAM,
/// stores into pages holding translated code, instruction fetch
/// outside RAM and exception processing.
pub trait Bus {
    fn load(&mut self, addr: u32, size: Size, fc: FunctionCode) -> u32;

    fn store(&mut self, addr: u32, size: Size, fc: FunctionCode, value: u32);

    /// Current interrupt priority level on the IPL lines, 0..=7.
    fn interrupt_level(&mut self) -> u8;

    /// Pulse the RESET line (RESET instruction).
    fn reset(&mut self) {}
}

/// Bus with nothing attached: reads float high, writes are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenBus;

impl Bus for OpenBus {
    fn load(&mut self, _addr: u32, size: Size, _fc: FunctionCode) -> u32 {
        size.mask()
    }

    fn store(&mut self, _addr: u32, _size: Size, _fc: FunctionCode, _value: u32) {}

    fn interrupt_level(&mut self) -> u8 {
        0
    }
}

/// Guest memory as seen by exception processing and runtime helpers.
///
/// Implementations must invalidate translated code overlapping a
/// write before returning.
pub trait GuestMemory {
    fn read(&mut self, addr: u32, size: Size, fc: FunctionCode) -> u32;

    fn write(&mut self, addr: u32, size: Size, fc: FunctionCode, value: u32);
}

/// Instruction-stream access for the decoder.
pub trait CodeFetch {
    /// Big-endian 16-bit word at `addr`.
    fn fetch_word(&mut self, addr: u32) -> u16;
}

impl CodeFetch for &[u8] {
    fn fetch_word(&mut self, addr: u32) -> u16 {
        let i = addr as usize;
        match self.get(i..i + 2) {
            Some(b) => u16::from_be_bytes([b[0], b[1]]),
            None => 0xFFFF,
        }
    }
}
