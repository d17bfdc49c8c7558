//! Named PCM clip store — §4.5 "SampleCache".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::channel::ChannelMap;
use crate::error::{Error, Result};
use crate::memory::MemChunk;
use crate::sample::SampleSpec;
use crate::volume::ChannelVolume;

/// A source for a cache entry that hasn't been loaded into memory yet.
/// An embedder supplies the actual decode; the cache only tracks when to
/// invoke it and when to drop the result again.
pub trait LazyLoader: Send + Sync {
    fn load(&self, path: &str) -> Result<MemChunk>;
}

struct Entry {
    spec: SampleSpec,
    map: ChannelMap,
    volume: ChannelVolume,
    /// `Some` once loaded (eagerly via `add_item`, or lazily on first play).
    chunk: Option<MemChunk>,
    /// `Some` for entries that can be reloaded after idle eviction drops
    /// `chunk`; `None` for entries registered directly with data in hand.
    path: Option<String>,
    last_used: Instant,
}

/// Registered clips, keyed by name, with lazy loading and idle eviction.
pub struct SampleCache {
    entries: RwLock<HashMap<String, Entry>>,
    loader: Option<Arc<dyn LazyLoader>>,
    idle_timeout: Duration,
}

impl SampleCache {
    pub fn new(loader: Option<Arc<dyn LazyLoader>>, idle_timeout: Duration) -> Self {
        Self { entries: RwLock::new(HashMap::new()), loader, idle_timeout }
    }

    pub fn add_item(&self, name: &str, spec: SampleSpec, map: ChannelMap, chunk: MemChunk, volume: ChannelVolume) {
        self.entries.write().insert(
            name.to_string(),
            Entry { spec, map, volume, chunk: Some(chunk), path: None, last_used: Instant::now() },
        );
    }

    pub fn add_file_lazy(&self, name: &str, path: &str, spec: SampleSpec, map: ChannelMap, volume: ChannelVolume) {
        self.entries.write().insert(
            name.to_string(),
            Entry { spec, map, volume, chunk: None, path: Some(path.to_string()), last_used: Instant::now() },
        );
    }

    pub fn remove_item(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Resolve `name` to a playable chunk, loading it if it's lazy and
    /// not yet resident, and return it combined with `(spec, map, effective
    /// volume)` — the entry's own volume combined multiplicatively with
    /// `caller_volume`, for the caller to hand a freshly constructed
    /// sink-input.
    pub fn play_item(&self, name: &str, caller_volume: &ChannelVolume) -> Result<(MemChunk, SampleSpec, ChannelMap, ChannelVolume)> {
        {
            let mut entries = self.entries.write();
            let entry = entries.get_mut(name).ok_or_else(|| Error::NotFound(name.to_string()))?;
            entry.last_used = Instant::now();
            if let Some(chunk) = &entry.chunk {
                let effective = entry.volume.scale(caller_volume);
                return Ok((chunk.clone(), entry.spec, entry.map.clone(), effective));
            }
        }

        // Not yet resident: load outside the lock (the loader may block
        // on file I/O), then splice the result back in.
        let path = {
            let entries = self.entries.read();
            entries
                .get(name)
                .ok_or_else(|| Error::NotFound(name.to_string()))?
                .path
                .clone()
                .ok_or_else(|| Error::Invariant("cache entry has neither chunk nor path"))?
        };
        let loader = self.loader.as_ref().ok_or_else(|| Error::NotFound(format!("no loader configured for {name}")))?;
        let chunk = loader.load(&path)?;

        let mut entries = self.entries.write();
        let entry = entries.get_mut(name).ok_or_else(|| Error::NotFound(name.to_string()))?;
        entry.chunk = Some(chunk.clone());
        entry.last_used = Instant::now();
        let effective = entry.volume.scale(caller_volume);
        Ok((chunk, entry.spec, entry.map.clone(), effective))
    }

    /// Drop the payload of every lazily-backed entry whose idle time has
    /// exceeded the configured timeout. The entry itself remains
    /// lookup-visible and will be reloaded on next `play_item`. Entries
    /// with no `path` (added directly via `add_item`) have nowhere to
    /// reload from and are never evicted.
    pub fn evict_idle(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write();
        for entry in entries.values_mut() {
            if entry.path.is_some() && entry.chunk.is_some() && now.duration_since(entry.last_used) >= self.idle_timeout {
                entry.chunk = None;
            }
        }
    }

    /// Run [`Self::evict_idle`] every `period` until the returned handle
    /// (or the cache itself) is dropped — the periodic sweep timer from
    /// §4.5 ("2 s default"). A `tokio::task::JoinHandle` keeps running
    /// detached if dropped, so the caller only needs to hold onto this to
    /// be able to cancel the sweep; `RoutingCore` keeps it alive for its
    /// own lifetime.
    pub fn spawn_eviction_task(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                cache.evict_idle();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemBlock, MemoryPool};
    use crate::sample::SampleFormat;

    #[test]
    fn resident_item_plays_with_combined_volume() {
        let pool = MemoryPool::with_defaults().unwrap();
        let cache = SampleCache::new(None, Duration::from_secs(2));
        let chunk = MemChunk::new(MemBlock::new_pool(&pool, &[0u8; 16]).unwrap(), 0, 16);
        let spec = SampleSpec::new(SampleFormat::S16LE, 44_100, 1).unwrap();
        cache.add_item("boop", spec, ChannelMap::mono(), chunk, ChannelVolume::uniform(1, 0x8000));

        let (_, _, _, effective) = cache.play_item("boop", &ChannelVolume::norm(1)).unwrap();
        assert_eq!(effective.as_slice(), &[0x8000]);
    }

    #[test]
    fn missing_item_is_not_found() {
        let cache = SampleCache::new(None, Duration::from_secs(2));
        assert!(matches!(cache.play_item("nope", &ChannelVolume::norm(1)), Err(Error::NotFound(_))));
    }

    struct StubLoader;
    impl LazyLoader for StubLoader {
        fn load(&self, _path: &str) -> Result<MemChunk> {
            let pool = MemoryPool::with_defaults().unwrap();
            Ok(MemChunk::new(MemBlock::new_pool(&pool, &[1u8; 8]).unwrap(), 0, 8))
        }
    }

    #[test]
    fn idle_eviction_drops_lazy_payload_but_keeps_entry_visible() {
        let cache = SampleCache::new(Some(Arc::new(StubLoader)), Duration::from_secs(0));
        let spec = SampleSpec::new(SampleFormat::S16LE, 44_100, 1).unwrap();
        cache.add_file_lazy("click", "click.wav", spec, ChannelMap::mono(), ChannelVolume::norm(1));
        cache.play_item("click", &ChannelVolume::norm(1)).unwrap();
        assert!(cache.entries.read().get("click").unwrap().chunk.is_some());

        cache.evict_idle();
        assert!(cache.contains("click"));
        assert!(cache.entries.read().get("click").unwrap().chunk.is_none());

        // Reloads transparently on next play.
        cache.play_item("click", &ChannelVolume::norm(1)).unwrap();
    }

    #[test]
    fn remove_item_makes_it_unresolvable() {
        let pool = MemoryPool::with_defaults().unwrap();
        let cache = SampleCache::new(None, Duration::from_secs(2));
        let chunk = MemChunk::new(MemBlock::new_pool(&pool, &[0u8; 4]).unwrap(), 0, 4);
        let spec = SampleSpec::new(SampleFormat::S16LE, 44_100, 1).unwrap();
        cache.add_item("x", spec, ChannelMap::mono(), chunk, ChannelVolume::norm(1));
        assert!(cache.remove_item("x"));
        assert!(!cache.contains("x"));
    }
}
