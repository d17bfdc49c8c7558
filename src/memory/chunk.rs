//! The `{memblock, index, length}` triple used throughout the queue and
//! mixer (§4.2).

use super::block::MemBlock;
use std::sync::Arc;

/// A view into a [`MemBlock`]'s payload: `index` bytes into the block,
/// `length` bytes long. Multiple chunks may reference the same block with
/// overlapping or disjoint ranges — the block's refcount, not the chunk,
/// owns the underlying memory.
#[derive(Clone)]
pub struct MemChunk {
    pub block: Arc<MemBlock>,
    pub index: usize,
    pub length: usize,
}

impl MemChunk {
    pub fn new(block: Arc<MemBlock>, index: usize, length: usize) -> Self {
        debug_assert!(index + length <= block.len(), "chunk range exceeds block length");
        Self { block, index, length }
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns a sub-chunk `[offset, offset+len)` relative to this chunk's
    /// own window, as the queue's drop/peek logic needs when a requested
    /// read is shorter than the chunk it lands in.
    pub fn slice(&self, offset: usize, len: usize) -> MemChunk {
        debug_assert!(offset + len <= self.length);
        MemChunk { block: Arc::clone(&self.block), index: self.index + offset, length: len }
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        self.block.read(self.index, self.length)
    }
}

impl std::fmt::Debug for MemChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemChunk").field("index", &self.index).field("length", &self.length).finish()
    }
}
