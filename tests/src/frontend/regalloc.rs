use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use jit68_backend::{CodeBuffer, HostCodeGen, X86_64CodeGen};
use jit68_frontend::regalloc::RegisterAllocator;

fn setup() -> (X86_64CodeGen, CodeBuffer) {
    (X86_64CodeGen::new(), CodeBuffer::new(1 << 20).unwrap())
}

#[test]
fn bind_loads_once() {
    let (cg, mut buf) = setup();
    let mut ra = RegisterAllocator::new(&cg);
    ra.begin_insn();
    let h = ra.bind(&cg, &mut buf, 3);
    let after_load = buf.offset();
    assert!(after_load > 0);
    assert_eq!(ra.bind(&cg, &mut buf, 3), h);
    assert_eq!(buf.offset(), after_load);
    assert_eq!(ra.host_of(3), Some(h));
    assert!(!ra.is_dirty(3));
    assert!(cg.allocatable_regs().contains(&h));
}

#[test]
fn bind_for_write_skips_load() {
    let (cg, mut buf) = setup();
    let mut ra = RegisterAllocator::new(&cg);
    ra.begin_insn();
    ra.bind_for_write(&cg, &mut buf, 9);
    assert_eq!(buf.offset(), 0);
    assert!(ra.is_dirty(9));
}

#[test]
fn flush_writes_back_dirty_only() {
    let (cg, mut buf) = setup();
    let mut ra = RegisterAllocator::new(&cg);
    ra.begin_insn();
    ra.bind(&cg, &mut buf, 0);
    let clean_flush = {
        let mut fresh = RegisterAllocator::new(&cg);
        let mut b = CodeBuffer::new(4096).unwrap();
        fresh.begin_insn();
        fresh.bind(&cg, &mut b, 0);
        let before = b.offset();
        fresh.flush_all(&cg, &mut b);
        b.offset() - before
    };
    assert_eq!(clean_flush, 0);

    ra.mark_dirty(0);
    let before = buf.offset();
    ra.flush_all(&cg, &mut buf);
    assert!(buf.offset() > before);
    assert_eq!(ra.bound_count(), 0);
    assert!(ra.live_regs().is_empty());
}

#[test]
fn evicts_least_recently_used() {
    let (cg, mut buf) = setup();
    let mut ra = RegisterAllocator::new(&cg);
    let n = ra.pool_size() as u8;
    assert!(n < 16);
    for g in 0..n {
        ra.begin_insn();
        ra.bind(&cg, &mut buf, g);
    }
    let first = ra.host_of(0).unwrap();
    ra.begin_insn();
    // Touch guest 0 so guest 1 becomes the oldest.
    ra.bind(&cg, &mut buf, 0);
    ra.begin_insn();
    let h = ra.bind(&cg, &mut buf, n);
    assert_eq!(ra.evictions(), 1);
    assert_eq!(ra.host_of(1), None);
    assert_eq!(ra.host_of(0), Some(first));
    assert_ne!(h, first);
    assert_eq!(ra.bound_count(), n as usize);
}

#[test]
fn temps_and_swaps() {
    let (cg, mut buf) = setup();
    let mut ra = RegisterAllocator::new(&cg);
    ra.begin_insn();
    let a = ra.bind(&cg, &mut buf, 1);
    let b = ra.bind(&cg, &mut buf, 2);
    let t = ra.alloc_temp(&cg, &mut buf);
    assert!(ra.live_regs().contains(t));
    assert_ne!(t, a);
    assert_ne!(t, b);
    ra.release(t);
    assert!(!ra.live_regs().contains(t));

    ra.swap_bindings(1, 2);
    assert_eq!(ra.host_of(1), Some(b));
    assert_eq!(ra.host_of(2), Some(a));
    assert!(ra.is_dirty(1) && ra.is_dirty(2));

    // Releasing a bound register is a no-op.
    ra.release(a);
    assert_eq!(ra.host_of(2), Some(a));

    let snap = ra.snapshot();
    assert_eq!(snap[1], Some(b));
    assert_eq!(snap[0], None);
}

#[test]
fn random_sequences_keep_bindings_disjoint() {
    let (cg, _) = setup();
    let mut rng = StdRng::seed_from_u64(0x68020);
    for _ in 0..50 {
        let mut buf = CodeBuffer::new(1 << 20).unwrap();
        let mut ra = RegisterAllocator::new(&cg);
        for _ in 0..200 {
            ra.begin_insn();
            for _ in 0..rng.gen_range(1..=3) {
                let g = rng.gen_range(0..16u8);
                if rng.gen_bool(0.5) {
                    ra.bind(&cg, &mut buf, g);
                } else {
                    ra.bind_for_write(&cg, &mut buf, g);
                }
            }
            let temp = rng
                .gen_bool(0.3)
                .then(|| ra.alloc_temp(&cg, &mut buf));

            let hosts: Vec<u8> = (0..16).filter_map(|g| ra.host_of(g)).collect();
            let mut dedup = hosts.clone();
            dedup.sort_unstable();
            dedup.dedup();
            assert_eq!(dedup.len(), hosts.len(), "two guests share a host register");
            assert!(hosts.len() <= ra.pool_size());
            if let Some(t) = temp {
                assert!(!hosts.contains(&t));
                assert_eq!(ra.live_regs().count() as usize, hosts.len() + 1);
                ra.release(t);
            }
            assert_eq!(ra.live_regs().count() as usize, hosts.len());

            if rng.gen_bool(0.05) {
                ra.flush_all(&cg, &mut buf);
                assert_eq!(ra.bound_count(), 0);
            }
        }
    }
}

#[test]
#[cfg_attr(
    debug_assertions,
    should_panic(expected = "register pool exhausted within one instruction")
)]
fn pool_exhausted_by_one_instruction_evicts_its_oldest_binding() {
    let (cg, mut buf) = setup();
    let mut ra = RegisterAllocator::new(&cg);
    let n = ra.pool_size() as u8;
    ra.begin_insn();
    for g in 0..n {
        ra.bind(&cg, &mut buf, g);
    }
    let oldest = ra.host_of(0).unwrap();
    assert_eq!(ra.bind(&cg, &mut buf, n), oldest);
    assert_eq!(ra.host_of(0), None);
    assert_eq!(ra.bound_count(), n as usize);
    assert_eq!(ra.evictions(), 1);
}
