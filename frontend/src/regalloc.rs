//! Per-block guest register allocator.
//!
//! Binds the 16 guest integer registers to the backend's allocation
//! pool. Bindings live for one block at most; every exit path writes
//! dirty bindings back to `CpuState` first. Evictions and write-backs
//! are plain stores, so host flags survive them.

use jit68_backend::{CodeBuffer, HostCodeGen, HostReg, Mem, Width};
use jit68_core::cpu::{guest_reg_offset, NUM_GUEST_REGS};
use jit68_core::RegSet;

#[derive(Debug, Clone, Copy)]
struct Binding {
    host: HostReg,
    dirty: bool,
    stamp: u64,
}

/// What occupies a host register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Guest(u8),
    Temp,
}

pub struct RegisterAllocator {
    env: HostReg,
    pool: &'static [HostReg],
    bindings: [Option<Binding>; NUM_GUEST_REGS],
    reg_to_slot: [Option<Slot>; 16],
    free_regs: RegSet,
    /// LRU clock.
    clock: u64,
    /// Bindings stamped at or after this belong to the current
    /// instruction and are never evicted by it.
    epoch: u64,
    evictions: u32,
}

impl RegisterAllocator {
    pub fn new(cg: &impl HostCodeGen) -> Self {
        let pool = cg.allocatable_regs();
        let free_regs = pool.iter().fold(RegSet::EMPTY, |s, &r| s.set(r));
        Self {
            env: cg.env_reg(),
            pool,
            bindings: [None; NUM_GUEST_REGS],
            reg_to_slot: [None; 16],
            free_regs,
            clock: 0,
            epoch: 0,
            evictions: 0,
        }
    }

    #[inline]
    fn guest_mem(&self, guest: u8) -> Mem {
        Mem::base(self.env, guest_reg_offset(guest))
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn evictions(&self) -> u32 {
        self.evictions
    }

    /// Host register bound to `guest`, if any.
    pub fn host_of(&self, guest: u8) -> Option<HostReg> {
        self.bindings[guest as usize].map(|b| b.host)
    }

    pub fn is_dirty(&self, guest: u8) -> bool {
        self.bindings[guest as usize].is_some_and(|b| b.dirty)
    }

    pub fn bound_count(&self) -> usize {
        self.bindings.iter().flatten().count()
    }

    /// Start a new pinning epoch.
    pub fn begin_insn(&mut self) {
        debug_assert!(
            !self.reg_to_slot.contains(&Some(Slot::Temp)),
            "temp leaked across instructions"
        );
        self.epoch = self.clock + 1;
    }

    /// Bind `guest`, loading its current value.
    pub fn bind(&mut self, cg: &impl HostCodeGen, buf: &mut CodeBuffer, guest: u8) -> HostReg {
        let stamp = self.tick();
        if let Some(b) = &mut self.bindings[guest as usize] {
            b.stamp = stamp;
            return b.host;
        }
        let host = self.take_reg(cg, buf);
        cg.load(buf, Width::W32, host, self.guest_mem(guest));
        self.assign(guest, host, false, stamp);
        host
    }

    /// Bind `guest` for an unconditional overwrite; no load.
    pub fn bind_for_write(
        &mut self,
        cg: &impl HostCodeGen,
        buf: &mut CodeBuffer,
        guest: u8,
    ) -> HostReg {
        let stamp = self.tick();
        if let Some(b) = &mut self.bindings[guest as usize] {
            b.stamp = stamp;
            b.dirty = true;
            return b.host;
        }
        let host = self.take_reg(cg, buf);
        self.assign(guest, host, true, stamp);
        host
    }

    pub fn mark_dirty(&mut self, guest: u8) {
        if let Some(b) = &mut self.bindings[guest as usize] {
            b.dirty = true;
        }
    }

    /// Scratch register from the pool; may evict.
    pub fn alloc_temp(&mut self, cg: &impl HostCodeGen, buf: &mut CodeBuffer) -> HostReg {
        let host = self.take_reg(cg, buf);
        self.reg_to_slot[host as usize] = Some(Slot::Temp);
        host
    }

    /// Return a scratch register. Registers bound to a guest
    /// register are left alone.
    pub fn release(&mut self, host: HostReg) {
        if self.reg_to_slot[host as usize] == Some(Slot::Temp) {
            self.reg_to_slot[host as usize] = None;
            self.free_regs = self.free_regs.set(host);
        }
    }

    /// Write back dirty bindings and forget all of them.
    pub fn flush_all(&mut self, cg: &impl HostCodeGen, buf: &mut CodeBuffer) {
        self.emit_writeback(cg, buf);
        for g in 0..NUM_GUEST_REGS {
            if let Some(b) = self.bindings[g].take() {
                self.reg_to_slot[b.host as usize] = None;
                self.free_regs = self.free_regs.set(b.host);
            }
        }
    }

    /// Store dirty bindings without touching the table, for paths
    /// that leave the block while the fall-through keeps going.
    pub fn emit_writeback(&self, cg: &impl HostCodeGen, buf: &mut CodeBuffer) {
        for (g, b) in self.bindings.iter().enumerate() {
            if let Some(b) = b.filter(|b| b.dirty) {
                cg.store(buf, Width::W32, b.host, self.guest_mem(g as u8));
            }
        }
    }

    /// Exchange the bindings of two bound guest registers.
    pub fn swap_bindings(&mut self, a: u8, b: u8) {
        let (Some(mut ba), Some(mut bb)) = (self.bindings[a as usize], self.bindings[b as usize])
        else {
            debug_assert!(false, "swap of unbound registers");
            return;
        };
        // Both memory copies are stale now.
        ba.dirty = true;
        bb.dirty = true;
        self.bindings[a as usize] = Some(bb);
        self.bindings[b as usize] = Some(ba);
        self.reg_to_slot[bb.host as usize] = Some(Slot::Guest(a));
        self.reg_to_slot[ba.host as usize] = Some(Slot::Guest(b));
    }

    /// Host registers holding a binding or a temp.
    pub fn live_regs(&self) -> RegSet {
        (0..16u8)
            .filter(|&r| self.reg_to_slot[r as usize].is_some())
            .fold(RegSet::EMPTY, |s, r| s.set(r))
    }

    /// Guest to host map for boundary records.
    pub fn snapshot(&self) -> [Option<u8>; NUM_GUEST_REGS] {
        self.bindings.map(|b| b.map(|b| b.host))
    }

    fn assign(&mut self, guest: u8, host: HostReg, dirty: bool, stamp: u64) {
        self.bindings[guest as usize] = Some(Binding { host, dirty, stamp });
        self.reg_to_slot[host as usize] = Some(Slot::Guest(guest));
    }

    /// Least recently used binding stamped before `before`.
    fn lru_binding(&self, before: u64) -> Option<(usize, Binding)> {
        (0..NUM_GUEST_REGS)
            .filter_map(|g| self.bindings[g].map(|b| (g, b)))
            .filter(|(_, b)| b.stamp < before)
            .min_by_key(|(_, b)| b.stamp)
    }

    /// First free pool register, evicting the least recently used
    /// binding of an earlier instruction when the pool is exhausted.
    fn take_reg(&mut self, cg: &impl HostCodeGen, buf: &mut CodeBuffer) -> HostReg {
        if let Some(&r) = self.pool.iter().find(|&&r| self.free_regs.contains(r)) {
            self.free_regs = self.free_regs.clear(r);
            return r;
        }

        // One instruction binds at most four guest registers (base and
        // index of two operands), leaving six of the ten pool
        // registers for its temps.
        let victim = self.lru_binding(self.epoch).or_else(|| {
            debug_assert!(false, "register pool exhausted within one instruction");
            tracing::error!(epoch = self.epoch, "evicting a binding of the current instruction");
            self.lru_binding(u64::MAX)
        });
        let Some((g, b)) = victim else {
            unreachable!("every pool register holds a temp");
        };
        if b.dirty {
            cg.store(buf, Width::W32, b.host, self.guest_mem(g as u8));
        }
        self.bindings[g] = None;
        self.reg_to_slot[b.host as usize] = None;
        self.evictions += 1;
        b.host
    }
}
