//! Sink/source object model and mix loop — §4.4 "Sink / Source I/O loop".
//!
//! [`sink::Sink`] and [`source::Source`] are the device-facing objects; each
//! owns a dedicated I/O thread (§5) that drains a command queue, then either
//! mixes its attached [`sink::SinkInput`]s into one chunk for the device
//! (sink) or distributes one captured chunk out to its attached
//! [`source::SourceOutput`]s (source). [`RoutingCore`] is the optional
//! top-level container an embedder can use to wire the pool, registry,
//! sample cache, and subscription bus together the way §2's data-flow
//! diagram describes, but every piece also works standalone.

pub mod sink;
pub mod source;

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::cache::SampleCache;
use crate::config::Tunables;
use crate::error::Result;
use crate::memory::{MemBlock, MemoryPool};
use crate::registry::NameRegistry;
use crate::sample::SampleFormat;
use crate::subscription::SubscriptionBus;

pub use sink::{Sink, SinkInput, SinkMessage};
pub use source::{Source, SourceMessage, SourceOutput};

/// Lifecycle of a sink or source object — §3 "Sink / Source ... lifecycle
/// state ∈ {init, idle, running, suspended, unlinked}".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Init,
    Idle,
    Running,
    Suspended,
    Unlinked,
}

/// Lifecycle of a sink-input or source-output — §3's "created-unattached →
/// attached (put) → running → moved ... → unlinked → freed", collapsed to
/// the states that matter once an object has left the constructor: by the
/// time a [`SinkInput`]/[`SourceOutput`] exists as a value a caller can
/// hold, it is already past "created-unattached".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Attached,
    Running,
    Unlinked,
}

/// One lazily-built, zero-filled `MemBlock` per work format, reused by
/// every sink/source's underrun path instead of allocating silence per
/// tick — SPEC_FULL §3 "Silence cache", concretizing §4.2's "silence
/// block" attribute.
pub struct SilenceCache {
    pool: Arc<MemoryPool>,
    blocks: DashMap<SampleFormat, Arc<MemBlock>>,
}

impl SilenceCache {
    pub fn new(pool: Arc<MemoryPool>) -> Self {
        Self { pool, blocks: DashMap::new() }
    }

    /// A silence block at least one pool slot long in `format` — enough to
    /// satisfy any single queue `peek` this crate issues, since every peek
    /// is bounded by one mix tick's worth of frames.
    pub fn block(&self, format: SampleFormat) -> Result<Arc<MemBlock>> {
        if let Some(existing) = self.blocks.get(&format) {
            return Ok(Arc::clone(&existing));
        }
        let zeros = vec![0u8; self.pool.slot_size()];
        let block = MemBlock::new_pool(&self.pool, &zeros)?;
        self.blocks.insert(format, Arc::clone(&block));
        Ok(block)
    }
}

/// Optional top-level container tying the pool, sink/source registries,
/// sample cache, and subscription bus together the way an embedder's
/// "core" object does in §2's overview. Nothing elsewhere in this crate
/// requires going through `RoutingCore` — it exists so the pieces can be
/// exercised together instead of only in isolation.
pub struct RoutingCore {
    pub pool: Arc<MemoryPool>,
    pub bus: Arc<SubscriptionBus>,
    pub silence: Arc<SilenceCache>,
    pub sinks: NameRegistry<Arc<Sink>>,
    pub sources: NameRegistry<Arc<Source>>,
    pub cache: Arc<SampleCache>,
    pub tunables: Tunables,
    eviction_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RoutingCore {
    pub fn new(tunables: Tunables) -> Result<Arc<Self>> {
        let pool = MemoryPool::new(tunables.pool.slot_size, tunables.pool.n_slots)?;
        let bus = Arc::new(SubscriptionBus::new());
        let silence = Arc::new(SilenceCache::new(Arc::clone(&pool)));
        let cache = Arc::new(SampleCache::new(None, std::time::Duration::from_secs(tunables.cache.idle_timeout_secs)));
        Ok(Arc::new(Self {
            pool,
            bus,
            silence,
            sinks: NameRegistry::new(None),
            sources: NameRegistry::new(None),
            cache,
            tunables,
            eviction_task: Mutex::new(None),
        }))
    }

    /// Start the sample-cache's periodic idle-eviction sweep (§4.5). Must
    /// be called from inside a running tokio runtime; a second call
    /// replaces (and aborts) any sweep already running.
    pub fn spawn_cache_eviction(self: &Arc<Self>) {
        let period = std::time::Duration::from_secs(self.tunables.cache.sweep_interval_secs.max(1));
        let handle = self.cache.spawn_eviction_task(period);
        if let Some(old) = self.eviction_task.lock().replace(handle) {
            old.abort();
        }
    }
}

impl Drop for RoutingCore {
    fn drop(&mut self) {
        if let Some(handle) = self.eviction_task.lock().take() {
            handle.abort();
        }
    }
}
