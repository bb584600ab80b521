//! Guest memory as reached by runtime helpers and exception
//! processing: a RAM window at guest address 0, the external bus
//! behind it, and the translation cache kept coherent with stores.

use jit68_core::cpu::CODE_PAGE_SIZE;
use jit68_core::{Bus, CodeFetch, FunctionCode, GuestMemory, JitConfig, JitError, Result, Size};

use crate::cache::TranslationCache;

/// Guest RAM, mapped at guest address 0 and stored big-endian.
pub struct GuestRam {
    bytes: Box<[u8]>,
}

impl GuestRam {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 || size % CODE_PAGE_SIZE as usize != 0 || size > u32::MAX as usize {
            return Err(JitError::RamSize(size));
        }
        Ok(Self {
            bytes: vec![0; size].into_boxed_slice(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.bytes.as_mut_ptr()
    }

    fn range(&self, addr: u32, len: u32) -> Option<std::ops::Range<usize>> {
        let start = addr as usize;
        let end = start.checked_add(len as usize)?;
        (end <= self.bytes.len()).then_some(start..end)
    }

    /// `size` bytes at `addr`, or `None` outside the window.
    pub fn read(&self, addr: u32, size: Size) -> Option<u32> {
        let r = self.range(addr, size.bytes())?;
        Some(
            self.bytes[r]
                .iter()
                .fold(0u32, |acc, &b| (acc << 8) | b as u32),
        )
    }

    /// Store the low `size` bytes of `value`; false outside the window.
    pub fn write(&mut self, addr: u32, size: Size, value: u32) -> bool {
        let Some(r) = self.range(addr, size.bytes()) else {
            return false;
        };
        let be = value.to_be_bytes();
        self.bytes[r].copy_from_slice(&be[4 - size.bytes() as usize..]);
        true
    }
}

/// State behind `CpuState::runtime`.
pub struct Runtime {
    pub ram: GuestRam,
    pub bus: Box<dyn Bus>,
    pub cache: TranslationCache,
}

impl Runtime {
    pub fn new(config: &JitConfig, ram_size: usize, bus: Box<dyn Bus>) -> Result<Self> {
        let ram = GuestRam::new(ram_size)?;
        Ok(Self {
            cache: TranslationCache::new(config, ram.len()),
            ram,
            bus,
        })
    }

    /// Store to guest memory. Translated code overlapping the store is
    /// invalidated first; returns whether any was.
    pub fn store(&mut self, addr: u32, size: Size, fc: FunctionCode, value: u32) -> bool {
        let len = size.bytes();
        let dirty = self.cache.code_pages().is_code(addr, len)
            && self.cache.invalidate_range(addr, addr.saturating_add(len)) > 0;
        if self.ram.write(addr, size, value) {
            return dirty;
        }
        if !self.straddles(addr, size) {
            self.bus.store(addr, size, fc, value);
            return dirty;
        }
        for i in 0..len {
            let a = addr.wrapping_add(i);
            let b = (value >> (8 * (len - 1 - i))) & 0xFF;
            if !self.ram.write(a, Size::Byte, b) {
                self.bus.store(a, Size::Byte, fc, b);
            }
        }
        dirty
    }

    pub fn load(&mut self, addr: u32, size: Size, fc: FunctionCode) -> u32 {
        if let Some(v) = self.ram.read(addr, size) {
            return v;
        }
        if !self.straddles(addr, size) {
            return self.bus.load(addr, size, fc);
        }
        let mut value = 0;
        for i in 0..size.bytes() {
            let a = addr.wrapping_add(i);
            let b = match self.ram.read(a, Size::Byte) {
                Some(b) => b,
                None => self.bus.load(a, Size::Byte, fc) & 0xFF,
            };
            value = (value << 8) | b;
        }
        value
    }

    /// The access starts in RAM and runs past its end; it is split
    /// into byte accesses.
    fn straddles(&self, addr: u32, size: Size) -> bool {
        let start = addr as usize;
        start < self.ram.len() && start + size.bytes() as usize > self.ram.len()
    }

    /// Instruction fetch with function code `fc`.
    pub fn fetcher(&mut self, fc: FunctionCode) -> Fetch<'_> {
        Fetch {
            ram: &self.ram,
            bus: &mut *self.bus,
            fc,
        }
    }
}

impl GuestMemory for Runtime {
    fn read(&mut self, addr: u32, size: Size, fc: FunctionCode) -> u32 {
        self.load(addr, size, fc)
    }

    fn write(&mut self, addr: u32, size: Size, fc: FunctionCode, value: u32) {
        self.store(addr, size, fc, value);
    }
}

/// Code fetch for the decoder.
pub struct Fetch<'a> {
    ram: &'a GuestRam,
    bus: &'a mut dyn Bus,
    fc: FunctionCode,
}

impl CodeFetch for Fetch<'_> {
    fn fetch_word(&mut self, addr: u32) -> u16 {
        match self.ram.read(addr, Size::Word) {
            Some(w) => w as u16,
            None => self.bus.load(addr, Size::Word, self.fc) as u16,
        }
    }
}
