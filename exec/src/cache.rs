use std::collections::BTreeMap;
use std::fmt;

use jit68_core::cpu::CODE_PAGE_SHIFT;
use jit68_core::{JitConfig, TranslationUnit};

/// Slot index of a live unit.
pub type UnitId = usize;

/// Bytes before a unit's first instruction that still count as code
/// for the store fast path, so a long store straddling into the unit
/// is caught by the page of its first byte.
pub const CODE_PAGE_PAD: u32 = 3;

struct Entry {
    unit: TranslationUnit,
    /// Next unit in the same hash bucket.
    hash_next: Option<UnitId>,
    /// Global LRU stamp.
    last_use: u64,
}

/// Hit/miss counters of the translation cache.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hot_hits: u64,
    pub bucket_hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub flushes: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hot_hits + self.bucket_hits
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lookups = self.hits() + self.misses;
        let rate = if lookups == 0 {
            0.0
        } else {
            self.hits() as f64 * 100.0 / lookups as f64
        };
        writeln!(f, "lookups        {lookups} ({rate:.1}% hit)")?;
        writeln!(f, "  hot set      {}", self.hot_hits)?;
        writeln!(f, "  buckets      {}", self.bucket_hits)?;
        writeln!(f, "  misses       {}", self.misses)?;
        writeln!(f, "inserts        {}", self.inserts)?;
        writeln!(f, "evictions      {}", self.evictions)?;
        writeln!(f, "invalidations  {}", self.invalidations)?;
        write!(f, "flushes        {}", self.flushes)
    }
}

/// One byte per guest RAM page, non-zero while translated code lives
/// on it. Generated stores read the byte map directly.
pub struct CodePages {
    map: Box<[u8]>,
    counts: Box<[u32]>,
}

impl CodePages {
    pub fn new(ram_size: usize) -> Self {
        let pages = ram_size >> CODE_PAGE_SHIFT;
        Self {
            map: vec![0; pages].into_boxed_slice(),
            counts: vec![0; pages].into_boxed_slice(),
        }
    }

    fn pages(&self, lo: u32, hi: u32) -> std::ops::Range<usize> {
        let first = (lo >> CODE_PAGE_SHIFT) as usize;
        let last = (hi.saturating_sub(1).max(lo) >> CODE_PAGE_SHIFT) as usize + 1;
        first.min(self.map.len())..last.min(self.map.len())
    }

    fn add(&mut self, lo: u32, hi: u32) {
        for p in self.pages(lo, hi) {
            self.counts[p] += 1;
            self.map[p] = 1;
        }
    }

    fn remove(&mut self, lo: u32, hi: u32) {
        for p in self.pages(lo, hi) {
            self.counts[p] = self.counts[p].saturating_sub(1);
            if self.counts[p] == 0 {
                self.map[p] = 0;
            }
        }
    }

    fn clear(&mut self) {
        self.map.fill(0);
        self.counts.fill(0);
    }

    /// Whether any byte of `[addr, addr + len)` is on a code page.
    pub fn is_code(&self, addr: u32, len: u32) -> bool {
        let hi = addr.saturating_add(len);
        self.pages(addr, hi).any(|p| self.map[p] != 0)
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.map.as_ptr()
    }
}

/// Translated blocks keyed by guest start address.
///
/// Lookup probes a small hot set, then a hash bucket chain. Units also
/// sit in a start-address index for range invalidation and a host
/// offset index for invalidation by code pointer. When storage is full
/// the least recently used unit goes.
pub struct TranslationCache {
    slots: Vec<Option<Entry>>,
    free: Vec<UnitId>,
    live: usize,
    capacity: usize,
    buckets: Box<[Option<UnitId>]>,
    hot: Box<[Option<UnitId>]>,
    hot_victim: usize,
    by_start: BTreeMap<u32, UnitId>,
    by_host: BTreeMap<usize, UnitId>,
    /// Longest guest range of any unit inserted since the last flush.
    max_span: u32,
    pages: CodePages,
    clock: u64,
    stats: CacheStats,
}

impl TranslationCache {
    pub fn new(config: &JitConfig, ram_size: usize) -> Self {
        Self {
            slots: Vec::with_capacity(config.max_units),
            free: Vec::new(),
            live: 0,
            capacity: config.max_units,
            buckets: vec![None; config.hash_buckets].into_boxed_slice(),
            hot: vec![None; config.hot_set_size].into_boxed_slice(),
            hot_victim: 0,
            by_start: BTreeMap::new(),
            by_host: BTreeMap::new(),
            max_span: 0,
            pages: CodePages::new(ram_size),
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    fn bucket(&self, addr: u32) -> usize {
        let h = (addr as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15) >> 32;
        (h as usize) & (self.buckets.len() - 1)
    }

    fn entry(&self, id: UnitId) -> Option<&Entry> {
        self.slots.get(id)?.as_ref()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn code_pages(&self) -> &CodePages {
        &self.pages
    }

    pub fn get(&self, id: UnitId) -> Option<&TranslationUnit> {
        self.entry(id).map(|e| &e.unit)
    }

    /// Live units in no particular order.
    pub fn units(&self) -> impl Iterator<Item = &TranslationUnit> {
        self.slots.iter().flatten().map(|e| &e.unit)
    }

    /// Unit starting at `addr`.
    pub fn lookup(&mut self, addr: u32) -> Option<UnitId> {
        for &id in self.hot.iter().flatten() {
            if self.entry(id).is_some_and(|e| e.unit.low == addr) {
                self.stats.hot_hits += 1;
                return Some(id);
            }
        }

        let mut cur = self.buckets[self.bucket(addr)];
        while let Some(id) = cur {
            let Some(e) = self.entry(id) else { break };
            if e.unit.low == addr {
                self.stats.bucket_hits += 1;
                self.hot[self.hot_victim] = Some(id);
                self.hot_victim = (self.hot_victim + 1) % self.hot.len();
                return Some(id);
            }
            cur = e.hash_next;
        }
        self.stats.misses += 1;
        None
    }

    /// Record a use of `id` for the LRU order.
    pub fn touch(&mut self, id: UnitId) -> Option<&TranslationUnit> {
        self.clock += 1;
        let e = self.slots.get_mut(id)?.as_mut()?;
        e.unit.use_count += 1;
        e.last_use = self.clock;
        Some(&e.unit)
    }

    /// Add `unit`, replacing a unit with the same start address and
    /// evicting the least recently used one when storage is full.
    pub fn insert(&mut self, unit: TranslationUnit) -> UnitId {
        if let Some(&old) = self.by_start.get(&unit.low) {
            self.remove(old);
        }
        if self.live >= self.capacity {
            self.evict_lru();
        }

        let low = unit.low;
        let high = unit.high;
        let host = unit.host_offset;
        self.clock += 1;
        let b = self.bucket(low);
        let entry = Entry {
            unit,
            hash_next: self.buckets[b],
            last_use: self.clock,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(entry);
                id
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        self.buckets[b] = Some(id);
        self.by_start.insert(low, id);
        self.by_host.insert(host, id);
        self.max_span = self.max_span.max(high.wrapping_sub(low));
        self.pages.add(low.saturating_sub(CODE_PAGE_PAD), high);
        self.live += 1;
        self.stats.inserts += 1;
        id
    }

    fn evict_lru(&mut self) {
        let victim = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(id, e)| e.as_ref().map(|e| (e.last_use, id)))
            .min();
        if let Some((_, id)) = victim {
            if let Some(e) = self.entry(id) {
                tracing::debug!(pc = format_args!("{:#x}", e.unit.low), "evicting unit");
            }
            self.remove(id);
            self.stats.evictions += 1;
        }
    }

    /// Unlink `id` from every index.
    fn remove(&mut self, id: UnitId) -> Option<TranslationUnit> {
        let entry = self.slots.get_mut(id)?.take()?;
        let low = entry.unit.low;

        let b = self.bucket(low);
        if self.buckets[b] == Some(id) {
            self.buckets[b] = entry.hash_next;
        } else {
            let mut cur = self.buckets[b];
            while let Some(prev) = cur {
                let Some(Some(p)) = self.slots.get_mut(prev) else { break };
                if p.hash_next == Some(id) {
                    p.hash_next = entry.hash_next;
                    break;
                }
                cur = p.hash_next;
            }
        }
        for h in self.hot.iter_mut() {
            if *h == Some(id) {
                *h = None;
            }
        }
        self.by_start.remove(&low);
        self.by_host.remove(&entry.unit.host_offset);
        self.pages
            .remove(low.saturating_sub(CODE_PAGE_PAD), entry.unit.high);
        self.free.push(id);
        self.live -= 1;
        Some(entry.unit)
    }

    /// Drop every unit whose guest range intersects `[lo, hi)`.
    /// Returns how many went.
    pub fn invalidate_range(&mut self, lo: u32, hi: u32) -> usize {
        if lo >= hi {
            return 0;
        }
        let from = lo.saturating_sub(self.max_span);
        let hits: Vec<UnitId> = self
            .by_start
            .range(from..hi)
            .map(|(_, &id)| id)
            .filter(|&id| self.entry(id).is_some_and(|e| e.unit.overlaps(lo, hi)))
            .collect();
        for &id in &hits {
            self.remove(id);
        }
        if !hits.is_empty() {
            self.stats.invalidations += hits.len() as u64;
            tracing::debug!(
                lo = format_args!("{lo:#x}"),
                hi = format_args!("{hi:#x}"),
                units = hits.len(),
                "invalidated range"
            );
        }
        hits.len()
    }

    /// Drop the unit whose host code contains code buffer offset
    /// `offset`.
    pub fn invalidate_host(&mut self, offset: usize) -> Option<TranslationUnit> {
        let (_, &id) = self.by_host.range(..=offset).next_back()?;
        if !self.entry(id)?.unit.contains_host(offset) {
            return None;
        }
        let unit = self.remove(id)?;
        self.stats.invalidations += 1;
        tracing::debug!(pc = format_args!("{:#x}", unit.low), "invalidated by host pointer");
        Some(unit)
    }

    pub fn invalidate_all(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.live = 0;
        self.buckets.fill(None);
        self.hot.fill(None);
        self.hot_victim = 0;
        self.by_start.clear();
        self.by_host.clear();
        self.max_span = 0;
        self.pages.clear();
        self.stats.flushes += 1;
    }
}
