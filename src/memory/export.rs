//! Cross-process export — §4.1 "Cross-process export".
//!
//! An exporter hands out opaque [`Handle`]s that identify a block by
//! `(segment_id, block_id)`. The remote side turns a handle back into
//! bytes through [`super::import::MemImport`]; this side keeps the
//! exported block alive (via a strong `Arc`) until either the remote side
//! releases it or the exporter itself is dropped, at which point every
//! outstanding handle is revoked.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use dashmap::DashMap;

use super::block::MemBlock;
use super::pool::{MemoryPool, SegmentId};
use crate::error::{Error, Result};

/// Identifies one exported block. Sent to the remote process out of band
/// (e.g. over a control socket); meaningless without also knowing which
/// segment it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub segment_id: SegmentId,
    pub offset: usize,
    pub length: usize,
    pub block_id: u32,
}

static NEXT_BLOCK_ID: AtomicU32 = AtomicU32::new(1);

pub struct MemExport {
    pool: Arc<MemoryPool>,
    exported: DashMap<u32, Arc<MemBlock>>,
}

impl MemExport {
    pub fn new(pool: Arc<MemoryPool>) -> Self {
        Self { pool, exported: DashMap::new() }
    }

    /// Publish `block` for remote import, returning the handle the remote
    /// side will present to [`super::import::MemImport::import`].
    pub fn export(&self, block: Arc<MemBlock>, offset: usize, length: usize) -> Handle {
        let block_id = NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed);
        let handle = Handle { segment_id: self.pool.segment_id(), offset, length, block_id };
        self.exported.insert(block_id, block);
        handle
    }

    /// Serve a remote read request for `block_id`. Returns the raw bytes
    /// the importer will wrap in a `MemBlock::new_imported`.
    pub fn fetch(&self, block_id: u32, offset: usize, length: usize) -> Result<Vec<u8>> {
        let entry = self.exported.get(&block_id).ok_or_else(|| Error::NotFound(format!("block {block_id}")))?;
        if entry.is_revoked() {
            return Err(Error::Revoked);
        }
        Ok(entry.read(offset, length))
    }

    /// Revoke a single exported block ahead of the exporter itself going
    /// away — e.g. the owning stream was dropped locally while a remote
    /// peer still held a handle to it.
    pub fn revoke(&self, block_id: u32) {
        if let Some((_, block)) = self.exported.remove(&block_id) {
            block.revoke();
        }
    }

    pub fn n_exported(&self) -> usize {
        self.exported.len()
    }
}

impl Drop for MemExport {
    fn drop(&mut self) {
        for entry in self.exported.iter() {
            entry.value().revoke();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_returns_exported_bytes() {
        let pool = MemoryPool::with_defaults().unwrap();
        let export = MemExport::new(Arc::clone(&pool));
        let block = MemBlock::new_pool(&pool, &[1, 2, 3, 4]).unwrap();
        let handle = export.export(block, 0, 4);
        assert_eq!(export.fetch(handle.block_id, 0, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn revoke_blocks_further_fetch() {
        let pool = MemoryPool::with_defaults().unwrap();
        let export = MemExport::new(Arc::clone(&pool));
        let block = MemBlock::new_pool(&pool, &[1, 2, 3, 4]).unwrap();
        let handle = export.export(block, 0, 4);
        export.revoke(handle.block_id);
        assert!(matches!(export.fetch(handle.block_id, 0, 4), Err(Error::NotFound(_))));
    }
}
