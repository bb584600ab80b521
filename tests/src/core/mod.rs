mod cpu;
mod exception;
mod types;

use jit68_core::{FunctionCode, GuestMemory, Size};

/// Flat big-endian memory for exception frame tests.
pub struct VecMem(pub Vec<u8>);

impl VecMem {
    pub fn new(size: usize) -> Self {
        Self(vec![0; size])
    }

    pub fn put_long(&mut self, addr: u32, value: u32) {
        let a = addr as usize;
        self.0[a..a + 4].copy_from_slice(&value.to_be_bytes());
    }
}

impl GuestMemory for VecMem {
    fn read(&mut self, addr: u32, size: Size, _fc: FunctionCode) -> u32 {
        let a = addr as usize;
        self.0[a..a + size.bytes() as usize]
            .iter()
            .fold(0, |acc, &b| (acc << 8) | b as u32)
    }

    fn write(&mut self, addr: u32, size: Size, _fc: FunctionCode, value: u32) {
        let a = addr as usize;
        let n = size.bytes() as usize;
        self.0[a..a + n].copy_from_slice(&value.to_be_bytes()[4 - n..]);
    }
}
