//! Cross-process import — §4.1 "Cross-process import".
//!
//! Importing a block never touches the exporter's pool directly (it may
//! live in another process); instead it goes through a [`SegmentTransport`]
//! that knows how to turn a `(segment_id, block_id, offset, length)`
//! request into bytes — over a control socket and shared segment in a
//! real deployment, or directly against an in-process [`super::export::MemExport`]
//! in tests and single-process configurations.

use std::sync::Arc;

use dashmap::DashMap;

use super::block::MemBlock;
use super::export::Handle;
use crate::error::Result;

/// Abstracts the mechanism used to resolve a remote handle into bytes.
/// A real cross-process transport negotiates the shared segment once
/// (mapping its fd) and thereafter reads directly out of it; this trait
/// only models the read, since the segment-mapping handshake is a
/// deployment concern outside this crate's scope (see collaborators).
pub trait SegmentTransport: Send + Sync {
    fn fetch(&self, handle: Handle) -> Result<Vec<u8>>;
}

/// A transport that resolves handles against a local `MemExport`, used
/// when both sides of an import/export pair live in the same process
/// (e.g. two sinks sharing one pool) and in tests.
pub struct LocalTransport {
    export: Arc<super::export::MemExport>,
}

impl LocalTransport {
    pub fn new(export: Arc<super::export::MemExport>) -> Self {
        Self { export }
    }
}

impl SegmentTransport for LocalTransport {
    fn fetch(&self, handle: Handle) -> Result<Vec<u8>> {
        self.export.fetch(handle.block_id, handle.offset, handle.length)
    }
}

/// Caches blocks imported from a single remote segment so that importing
/// the same handle twice doesn't re-fetch across the wire.
pub struct MemImport {
    transport: Arc<dyn SegmentTransport>,
    cache: DashMap<u32, Arc<MemBlock>>,
}

impl MemImport {
    pub fn new(transport: Arc<dyn SegmentTransport>) -> Self {
        Self { transport, cache: DashMap::new() }
    }

    /// Resolve `handle` to a local `MemBlock`, fetching over the
    /// transport on first use and serving subsequent requests for the
    /// same `block_id` from cache.
    pub fn import(&self, handle: Handle) -> Result<Arc<MemBlock>> {
        if let Some(existing) = self.cache.get(&handle.block_id) {
            if !existing.is_revoked() {
                return Ok(Arc::clone(&existing));
            }
        }
        let bytes = self.transport.fetch(handle)?;
        let block = MemBlock::new_imported(bytes, handle.segment_id, handle.block_id);
        self.cache.insert(handle.block_id, Arc::clone(&block));
        Ok(block)
    }

    /// Drop a cached import and revoke it locally — called when the
    /// remote side reports the block has gone away.
    pub fn revoke(&self, block_id: u32) {
        if let Some((_, block)) = self.cache.remove(&block_id) {
            block.revoke();
        }
    }

    pub fn n_imported(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::pool::MemoryPool;

    #[test]
    fn import_caches_across_repeated_requests() {
        let pool = MemoryPool::with_defaults().unwrap();
        let export = Arc::new(super::super::export::MemExport::new(Arc::clone(&pool)));
        let block = MemBlock::new_pool(&pool, &[5, 6, 7]).unwrap();
        let handle = export.export(block, 0, 3);

        let import = MemImport::new(Arc::new(LocalTransport::new(Arc::clone(&export))));
        let first = import.import(handle).unwrap();
        let second = import.import(handle).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(import.n_imported(), 1);
    }

    #[test]
    fn revoked_export_surfaces_on_next_import() {
        let pool = MemoryPool::with_defaults().unwrap();
        let export = Arc::new(super::super::export::MemExport::new(Arc::clone(&pool)));
        let block = MemBlock::new_pool(&pool, &[1, 2]).unwrap();
        let handle = export.export(block, 0, 2);
        let import = MemImport::new(Arc::new(LocalTransport::new(Arc::clone(&export))));
        import.import(handle).unwrap();
        export.revoke(handle.block_id);
        import.revoke(handle.block_id);
        assert!(import.import(handle).is_err());
    }
}
