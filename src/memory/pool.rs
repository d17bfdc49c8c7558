//! Fixed-size slot allocator over a shared-memory-backed segment — §4.1
//! "MemoryPool".
//!
//! The free-list is lock-free (a [`crossbeam_queue::ArrayQueue`]); the
//! "next uninitialized slot" index is a plain atomic counter. Neither path
//! ever blocks: `alloc_slot` either returns a slot immediately or reports
//! the pool full.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use memmap2::MmapMut;
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// One page, the minimum slot size §4.1 requires.
pub const PAGE_SIZE: usize = 4096;

/// Default slot count (§3 MemoryPool: "slot count (≈128)").
pub const DEFAULT_SLOTS: u32 = 128;

/// Default slot size: large enough to hold one resampler work buffer at
/// 192 kHz / 32 channels / f32 for ~20ms, rounded up to a page multiple.
pub const DEFAULT_SLOT_SIZE: usize = 64 * 1024;

#[derive(Debug, Default, Clone)]
pub struct PoolStats {
    pub allocated_blocks: u64,
    pub allocated_bytes: u64,
    pub accumulated_blocks: u64,
    pub accumulated_bytes: u64,
    pub n_pool: u64,
    pub n_pool_external: u64,
    pub n_appended: u64,
    pub n_fixed: u64,
    pub n_user: u64,
    pub n_imported: u64,
    pub n_exported: u64,
    pub n_too_large: u64,
    pub n_pool_full: u64,
}

struct PoolStatsInner {
    allocated_blocks: AtomicU64,
    allocated_bytes: AtomicU64,
    accumulated_blocks: AtomicU64,
    accumulated_bytes: AtomicU64,
    n_pool: AtomicU64,
    n_pool_external: AtomicU64,
    n_appended: AtomicU64,
    n_fixed: AtomicU64,
    n_user: AtomicU64,
    n_imported: AtomicU64,
    n_exported: AtomicU64,
    n_too_large: AtomicU64,
    n_pool_full: AtomicU64,
}

impl PoolStatsInner {
    fn new() -> Self {
        Self {
            allocated_blocks: AtomicU64::new(0),
            allocated_bytes: AtomicU64::new(0),
            accumulated_blocks: AtomicU64::new(0),
            accumulated_bytes: AtomicU64::new(0),
            n_pool: AtomicU64::new(0),
            n_pool_external: AtomicU64::new(0),
            n_appended: AtomicU64::new(0),
            n_fixed: AtomicU64::new(0),
            n_user: AtomicU64::new(0),
            n_imported: AtomicU64::new(0),
            n_exported: AtomicU64::new(0),
            n_too_large: AtomicU64::new(0),
            n_pool_full: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> PoolStats {
        PoolStats {
            allocated_blocks: self.allocated_blocks.load(Ordering::Relaxed),
            allocated_bytes: self.allocated_bytes.load(Ordering::Relaxed),
            accumulated_blocks: self.accumulated_blocks.load(Ordering::Relaxed),
            accumulated_bytes: self.accumulated_bytes.load(Ordering::Relaxed),
            n_pool: self.n_pool.load(Ordering::Relaxed),
            n_pool_external: self.n_pool_external.load(Ordering::Relaxed),
            n_appended: self.n_appended.load(Ordering::Relaxed),
            n_fixed: self.n_fixed.load(Ordering::Relaxed),
            n_user: self.n_user.load(Ordering::Relaxed),
            n_imported: self.n_imported.load(Ordering::Relaxed),
            n_exported: self.n_exported.load(Ordering::Relaxed),
            n_too_large: self.n_too_large.load(Ordering::Relaxed),
            n_pool_full: self.n_pool_full.load(Ordering::Relaxed),
        }
    }
}

/// Backing storage for the pool's slots. Wraps an anonymous mmap the way a
/// real shared-memory segment would be mapped, but any process that wants
/// cross-process import/export must use the same file-backed segment; for
/// in-process pools an anonymous mapping is sufficient and avoids a
/// filesystem round-trip.
struct Storage {
    map: Mutex<MmapMut>,
    slot_size: usize,
}

impl Storage {
    fn new(slot_size: usize, n_slots: u32) -> Result<Self> {
        let len = slot_size * n_slots as usize;
        let map = MmapMut::map_anon(len).map_err(|e| Error::DeviceIo(format!("mmap pool segment: {e}")))?;
        Ok(Self { map: Mutex::new(map), slot_size })
    }

    /// Copies `data` into slot `idx`. The caller guarantees the slot is not
    /// concurrently written by anyone else (ownership is established by
    /// the free-list protocol before this is called).
    fn write_slot(&self, idx: u32, data: &[u8]) {
        debug_assert!(data.len() <= self.slot_size);
        let offset = idx as usize * self.slot_size;
        let mut map = self.map.lock();
        map[offset..offset + data.len()].copy_from_slice(data);
    }

    fn read_slot(&self, idx: u32, len: usize) -> Vec<u8> {
        let offset = idx as usize * self.slot_size;
        let map = self.map.lock();
        map[offset..offset + len].to_vec()
    }
}

/// A process-unique identifier naming a pool's backing segment, used by
/// [`crate::memory::export::MemExport`]/[`crate::memory::import::MemImport`]
/// to name a cross-process handoff (§6 "Shared-memory segment").
pub type SegmentId = u32;

static NEXT_SEGMENT_ID: AtomicU32 = AtomicU32::new(1);

pub struct MemoryPool {
    pub(crate) segment_id: SegmentId,
    storage: Storage,
    slot_size: usize,
    n_slots: u32,
    n_init: AtomicU32,
    free_list: ArrayQueue<u32>,
    stats: PoolStatsInner,
}

impl MemoryPool {
    pub fn new(slot_size: usize, n_slots: u32) -> Result<Arc<Self>> {
        let slot_size = slot_size.next_multiple_of(PAGE_SIZE).max(PAGE_SIZE);
        let storage = Storage::new(slot_size, n_slots)?;
        Ok(Arc::new(Self {
            segment_id: NEXT_SEGMENT_ID.fetch_add(1, Ordering::Relaxed),
            storage,
            slot_size,
            n_slots,
            n_init: AtomicU32::new(0),
            free_list: ArrayQueue::new(n_slots as usize),
            stats: PoolStatsInner::new(),
        }))
    }

    pub fn with_defaults() -> Result<Arc<Self>> {
        Self::new(DEFAULT_SLOT_SIZE, DEFAULT_SLOTS)
    }

    pub fn segment_id(&self) -> SegmentId {
        self.segment_id
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    pub fn n_slots(&self) -> u32 {
        self.n_slots
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }

    pub fn free_slots(&self) -> usize {
        self.free_list.len() + (self.n_slots - self.n_init.load(Ordering::Acquire)) as usize
    }

    /// Slot allocation algorithm (§4.1): prefer the free-list (pop
    /// lock-free); on empty free-list, atomically advance the
    /// uninitialized-slot counter; if it would exceed `n_slots`, roll back
    /// and report the pool full. Never blocks.
    fn alloc_slot(&self) -> Option<u32> {
        if let Some(idx) = self.free_list.pop() {
            return Some(idx);
        }
        loop {
            let current = self.n_init.load(Ordering::Acquire);
            if current >= self.n_slots {
                self.stats.n_pool_full.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            if self
                .n_init
                .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(current);
            }
        }
    }

    fn free_slot(&self, idx: u32) {
        // ArrayQueue is sized exactly to n_slots, so push can only fail on
        // a double-free bug; silently dropping the index would leak the
        // slot forever, so this is worth a debug assertion.
        debug_assert!(self.free_list.push(idx).is_ok(), "pool free-list overflow: slot double free?");
    }

    pub(crate) fn write_slot(&self, idx: u32, data: &[u8]) {
        self.storage.write_slot(idx, data)
    }

    pub(crate) fn read_slot(&self, idx: u32, len: usize) -> Vec<u8> {
        self.storage.read_slot(idx, len)
    }

    pub(crate) fn record_alloc(&self, kind_bump: impl FnOnce(&PoolStatsInner), bytes: usize) {
        self.stats.allocated_blocks.fetch_add(1, Ordering::Relaxed);
        self.stats.allocated_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        self.stats.accumulated_blocks.fetch_add(1, Ordering::Relaxed);
        self.stats.accumulated_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        kind_bump(&self.stats);
    }

    pub(crate) fn record_free(&self, bytes: usize) {
        self.stats.allocated_blocks.fetch_sub(1, Ordering::Relaxed);
        self.stats.allocated_bytes.fetch_sub(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_too_large(&self) {
        self.stats.n_too_large.fetch_add(1, Ordering::Relaxed);
    }

    /// Try to obtain a slot for `len` bytes. Returns `None` (pool full) or
    /// `Some(idx)` and bumps the POOL counter.
    pub(crate) fn allocate_pool_slot(&self, len: usize) -> Option<u32> {
        if len > self.slot_size {
            return None;
        }
        let idx = self.alloc_slot()?;
        self.record_alloc(|s| { s.n_pool.fetch_add(1, Ordering::Relaxed); }, len);
        Some(idx)
    }

    pub(crate) fn release_pool_slot(&self, idx: u32, len: usize) {
        self.free_slot(idx);
        self.record_free(len);
    }
}
