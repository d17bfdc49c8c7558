//! Reference-counted memory block — §4.1 "MemBlock".
//!
//! Ordinary lifetime is handled by `Arc<MemBlock>`: when the last `Arc`
//! drops, [`MemBlock`]'s `Drop` impl returns pool slots to their pool.
//! Imported blocks need a second, independent counter — the "acquire"
//! count — because a remote exporter must be able to ask "is anyone still
//! reading this payload right now" without waiting for every local `Arc`
//! to disappear. That's the please-signal protocol: `acquire` bumps the
//! counter, `release` drops it and, if it hits zero while a revoke is
//! pending, wakes whoever is waiting.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use super::pool::MemoryPool;
use crate::error::{Error, Result};

/// Maximum payload size any single block may claim (§4.1: blocks larger
/// than this must use `Appended`/`User`, never pool-backed slots).
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemBlockKind {
    /// Backed by a slot in a local [`MemoryPool`].
    Pool,
    /// Backed by a slot in a local pool but owned by someone else's
    /// external allocation that was copied in (still returns the slot on
    /// drop, so behaves like `Pool` for refcounting purposes).
    PoolExternal,
    /// Small allocation tacked onto the end of the `MemBlock` header
    /// itself, for payloads that never warrant a pool round-trip.
    Appended,
    /// A block whose payload is *not* pool-backed and is guaranteed not to
    /// move or be freed for the block's lifetime (e.g. a `&'static [u8]`).
    /// May later be promoted to `Pool` by [`MemBlock::unref_fixed`].
    Fixed,
    /// Caller-owned memory with an explicit free callback.
    User,
    /// A block imported from another process via [`super::import::MemImport`].
    Imported,
}

enum Payload {
    Pool { pool: Arc<MemoryPool>, slot: u32, len: usize },
    Appended(Vec<u8>),
    Fixed(Arc<Vec<u8>>),
    User { data: Vec<u8> },
    Imported { data: Mutex<Option<Vec<u8>>>, segment_id: u32, block_id: u32 },
}

/// The please-signal protocol's shared state between an imported block and
/// whoever is waiting to revoke it.
struct AcquireState {
    count: AtomicU32,
    please_signal: AtomicBool,
    cond: Condvar,
    lock: Mutex<()>,
}

impl AcquireState {
    fn new() -> Self {
        Self { count: AtomicU32::new(0), please_signal: AtomicBool::new(false), cond: Condvar::new(), lock: Mutex::new(()) }
    }
}

pub struct MemBlock {
    kind: MemBlockKind,
    payload: Payload,
    len: usize,
    acquire: AcquireState,
    revoked: AtomicBool,
}

impl MemBlock {
    fn from_payload(kind: MemBlockKind, payload: Payload, len: usize) -> Arc<Self> {
        Arc::new(Self {
            kind,
            payload,
            len,
            acquire: AcquireState::new(),
            revoked: AtomicBool::new(false),
        })
    }

    /// Allocate a pool-backed block holding a copy of `data`.
    pub fn new_pool(pool: &Arc<MemoryPool>, data: &[u8]) -> Result<Arc<Self>> {
        if data.len() > MAX_BLOCK_SIZE {
            pool.record_too_large();
            return Err(Error::TooLarge(data.len()));
        }
        let slot = pool.allocate_pool_slot(data.len()).ok_or(Error::PoolFull)?;
        pool.write_slot(slot, data);
        Ok(Self::from_payload(
            MemBlockKind::Pool,
            Payload::Pool { pool: Arc::clone(pool), slot, len: data.len() },
            data.len(),
        ))
    }

    pub fn new_appended(data: Vec<u8>) -> Arc<Self> {
        let len = data.len();
        Self::from_payload(MemBlockKind::Appended, Payload::Appended(data), len)
    }

    /// A block over memory guaranteed to outlive it — e.g. a static
    /// lookup table used to prime the silence cache.
    pub fn new_fixed(data: Arc<Vec<u8>>) -> Arc<Self> {
        let len = data.len();
        Self::from_payload(MemBlockKind::Fixed, Payload::Fixed(data), len)
    }

    pub fn new_user(data: Vec<u8>) -> Arc<Self> {
        let len = data.len();
        Self::from_payload(MemBlockKind::User, Payload::User { data }, len)
    }

    pub(crate) fn new_imported(data: Vec<u8>, segment_id: u32, block_id: u32) -> Arc<Self> {
        let len = data.len();
        Self::from_payload(
            MemBlockKind::Imported,
            Payload::Imported { data: Mutex::new(Some(data)), segment_id, block_id },
            len,
        )
    }

    pub fn kind(&self) -> MemBlockKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }

    pub fn read(&self, index: usize, length: usize) -> Vec<u8> {
        debug_assert!(index + length <= self.len);
        match &self.payload {
            Payload::Pool { pool, slot, .. } => pool.read_slot(*slot, index + length)[index..index + length].to_vec(),
            Payload::Appended(data) => data[index..index + length].to_vec(),
            Payload::Fixed(data) => data[index..index + length].to_vec(),
            Payload::User { data } => data[index..index + length].to_vec(),
            Payload::Imported { data, .. } => {
                let guard = data.lock().unwrap();
                match guard.as_ref() {
                    Some(d) => d[index..index + length].to_vec(),
                    None => vec![0u8; length],
                }
            }
        }
    }

    /// Acquire a reference for the please-signal protocol: call before
    /// reading an `Imported` block's payload from another thread so that
    /// `revoke` knows to wait. No-op (but still tracked) for non-imported
    /// kinds.
    pub fn acquire(self: &Arc<Self>) -> Result<()> {
        if self.revoked.load(Ordering::Acquire) {
            return Err(Error::Revoked);
        }
        self.acquire.count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn release(self: &Arc<Self>) {
        let prev = self.acquire.count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "release without matching acquire");
        if prev == 1 && self.acquire.please_signal.load(Ordering::Acquire) {
            let _guard = self.acquire.lock.lock().unwrap();
            self.acquire.cond.notify_all();
        }
    }

    /// Blocks the calling thread until the acquire count drops to zero,
    /// then marks the block revoked. Used by [`super::export::MemExport`]
    /// when the remote side asks to free an imported slot.
    pub(crate) fn revoke(&self) {
        self.acquire.please_signal.store(true, Ordering::Release);
        let mut guard = self.acquire.lock.lock().unwrap();
        while self.acquire.count.load(Ordering::Acquire) > 0 {
            guard = self.acquire.cond.wait(guard).unwrap();
        }
        drop(guard);
        if let Payload::Imported { data, .. } = &self.payload {
            *data.lock().unwrap() = None;
        }
        self.revoked.store(true, Ordering::Release);
    }

    /// Promote a `Fixed` block to a pool-backed one: copies its payload
    /// into a slot of `pool` and returns the new block. Unlike a plain
    /// `unref`, the caller is expected to replace its handle with the
    /// returned block — a `Fixed` block's memory is only guaranteed to
    /// live as long as the scope that created it, so anything that must
    /// outlive that scope (e.g. queued for later playback) needs a copy
    /// backed by the pool instead.
    pub fn unref_fixed(self: &Arc<Self>, pool: &Arc<MemoryPool>) -> Result<Arc<Self>> {
        if self.kind() != MemBlockKind::Fixed {
            return Ok(Arc::clone(self));
        }
        let data = self.read(0, self.len);
        Self::new_pool(pool, &data)
    }
}

impl Drop for MemBlock {
    fn drop(&mut self) {
        if let Payload::Pool { pool, slot, len } = &self.payload {
            pool.release_pool_slot(*slot, *len);
        }
    }
}

impl std::fmt::Debug for MemBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemBlock").field("kind", &self.kind()).field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_block_round_trips_payload() {
        let pool = MemoryPool::with_defaults().unwrap();
        let data = vec![1u8, 2, 3, 4];
        let block = MemBlock::new_pool(&pool, &data).unwrap();
        assert_eq!(block.read(0, 4), data);
        assert_eq!(block.kind(), MemBlockKind::Pool);
    }

    #[test]
    fn drop_returns_slot_to_pool() {
        let pool = MemoryPool::with_defaults().unwrap();
        let before = pool.free_slots();
        {
            let _b = MemBlock::new_pool(&pool, &[0u8; 16]).unwrap();
            assert_eq!(pool.free_slots(), before - 1);
        }
        assert_eq!(pool.free_slots(), before);
    }

    #[test]
    fn acquire_blocks_revoke_until_released() {
        let block = MemBlock::new_imported(vec![9u8; 8], 1, 1);
        block.acquire().unwrap();
        assert!(!block.is_revoked());
        block.release();
        block.revoke();
        assert!(block.is_revoked());
        assert!(block.acquire().is_err());
    }

    #[test]
    fn unref_fixed_promotes_to_pool() {
        let pool = MemoryPool::with_defaults().unwrap();
        let fixed = MemBlock::new_fixed(Arc::new(vec![7u8; 4]));
        assert_eq!(fixed.kind(), MemBlockKind::Fixed);
        let promoted = fixed.unref_fixed(&pool).unwrap();
        assert_eq!(promoted.kind(), MemBlockKind::Pool);
        assert_eq!(promoted.read(0, 4), vec![7u8; 4]);
    }

    #[test]
    fn too_large_payload_rejected() {
        let pool = MemoryPool::with_defaults().unwrap();
        let data = vec![0u8; MAX_BLOCK_SIZE + 1];
        assert!(matches!(MemBlock::new_pool(&pool, &data), Err(Error::TooLarge(_))));
    }
}
