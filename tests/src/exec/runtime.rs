use std::sync::Arc;

use parking_lot::Mutex;

use jit68_core::{Bus, CodeFetch, FunctionCode, GuestMemory, JitError, Size};
use jit68_exec::{GuestRam, Runtime};

use super::{small_config, unit};

#[derive(Default, Clone)]
struct RecordingBus {
    stores: Arc<Mutex<Vec<(u32, Size, FunctionCode, u32)>>>,
    loads: Arc<Mutex<Vec<u32>>>,
}

impl Bus for RecordingBus {
    fn load(&mut self, addr: u32, size: Size, _fc: FunctionCode) -> u32 {
        self.loads.lock().push(addr);
        0xA5A5_A5A5 & size.mask()
    }

    fn store(&mut self, addr: u32, size: Size, fc: FunctionCode, value: u32) {
        self.stores.lock().push((addr, size, fc, value));
    }

    fn interrupt_level(&mut self) -> u8 {
        0
    }
}

#[test]
fn ram_size_is_checked() {
    assert!(matches!(GuestRam::new(0), Err(JitError::RamSize(0))));
    assert!(matches!(GuestRam::new(1000), Err(JitError::RamSize(1000))));
    let ram = GuestRam::new(8192).unwrap();
    assert_eq!(ram.len(), 8192);
    assert!(!ram.is_empty());
}

#[test]
fn ram_is_big_endian() {
    let mut ram = GuestRam::new(4096).unwrap();
    assert!(ram.write(0x10, Size::Long, 0x1234_5678));
    assert_eq!(&ram.as_slice()[0x10..0x14], &[0x12, 0x34, 0x56, 0x78]);
    assert_eq!(ram.read(0x12, Size::Word), Some(0x5678));
    assert_eq!(ram.read(0x13, Size::Byte), Some(0x78));

    assert!(ram.write(0x20, Size::Word, 0xFFFF_ABCD));
    assert_eq!(ram.read(0x20, Size::Word), Some(0xABCD));

    assert!(!ram.write(4094, Size::Long, 0));
    assert_eq!(ram.read(4094, Size::Long), None);
    assert_eq!(ram.read(4094, Size::Word), Some(0));
    assert_eq!(ram.read(u32::MAX, Size::Long), None);
}

#[test]
fn accesses_outside_ram_reach_the_bus() {
    let bus = RecordingBus::default();
    let mut rt = Runtime::new(&small_config(), 8192, Box::new(bus.clone())).unwrap();

    assert!(!rt.store(0x10, Size::Long, FunctionCode::UserData, 7));
    assert_eq!(rt.load(0x10, Size::Long, FunctionCode::UserData), 7);
    assert!(bus.stores.lock().is_empty());

    rt.store(0x20_0000, Size::Word, FunctionCode::SupervisorData, 0xBEEF);
    assert_eq!(
        bus.stores.lock().as_slice(),
        &[(0x20_0000, Size::Word, FunctionCode::SupervisorData, 0xBEEF)]
    );
    assert_eq!(rt.load(0x20_0000, Size::Byte, FunctionCode::UserData), 0xA5);
    assert_eq!(bus.loads.lock().as_slice(), &[0x20_0000]);

    // Through the trait object view used by exception processing.
    let mem: &mut dyn GuestMemory = &mut rt;
    mem.write(0x40, Size::Word, FunctionCode::SupervisorData, 0x4E71);
    assert_eq!(mem.read(0x40, Size::Word, FunctionCode::SupervisorData), 0x4E71);
}

#[test]
fn stores_into_code_invalidate() {
    let mut rt = Runtime::new(&small_config(), 8192, Box::new(RecordingBus::default())).unwrap();
    rt.cache.insert(unit(0x100, 0x110, 0));

    // Another page: no effect.
    assert!(!rt.store(0x1800, Size::Long, FunctionCode::UserData, 1));
    assert_eq!(rt.cache.len(), 1);
    // Same page, outside the unit: the unit stays.
    assert!(!rt.store(0x200, Size::Long, FunctionCode::UserData, 1));
    assert_eq!(rt.cache.len(), 1);

    assert!(rt.store(0x104, Size::Word, FunctionCode::UserData, 0x4E71));
    assert!(rt.cache.is_empty());
    assert_eq!(rt.load(0x104, Size::Word, FunctionCode::UserData), 0x4E71);
    assert!(!rt.store(0x104, Size::Word, FunctionCode::UserData, 0x4E71));
}

#[test]
fn fetcher_reads_ram_then_bus() {
    let bus = RecordingBus::default();
    let mut rt = Runtime::new(&small_config(), 4096, Box::new(bus.clone())).unwrap();
    rt.store(0x100, Size::Word, FunctionCode::SupervisorData, 0x7005);

    let mut fetch = rt.fetcher(FunctionCode::SupervisorProgram);
    assert_eq!(fetch.fetch_word(0x100), 0x7005);
    assert_eq!(fetch.fetch_word(0x2000), 0xA5A5);
    assert_eq!(bus.loads.lock().as_slice(), &[0x2000]);
}

#[test]
fn accesses_across_the_end_of_ram_are_split() {
    let bus = RecordingBus::default();
    let mut rt = Runtime::new(&small_config(), 4096, Box::new(bus.clone())).unwrap();
    rt.store(4094, Size::Word, FunctionCode::UserData, 0xABCD);
    assert!(bus.stores.lock().is_empty());

    // RAM bytes first, the rest from the bus a byte at a time.
    assert_eq!(rt.load(4094, Size::Long, FunctionCode::UserData), 0xABCD_A5A5);
    assert_eq!(bus.loads.lock().as_slice(), &[4096, 4097]);

    rt.store(4095, Size::Long, FunctionCode::UserData, 0x1122_3344);
    assert_eq!(rt.ram.as_slice()[4094..], [0xAB, 0x11]);
    assert_eq!(
        bus.stores.lock().as_slice(),
        &[
            (4096, Size::Byte, FunctionCode::UserData, 0x22),
            (4097, Size::Byte, FunctionCode::UserData, 0x33),
            (4098, Size::Byte, FunctionCode::UserData, 0x44),
        ]
    );
}
