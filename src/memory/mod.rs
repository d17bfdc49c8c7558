//! Shared-memory pool, block, and cross-process import/export — §4.1.

pub mod block;
pub mod chunk;
pub mod export;
pub mod import;
pub mod pool;

pub use block::{MemBlock, MemBlockKind};
pub use chunk::MemChunk;
pub use export::{Handle, MemExport};
pub use import::{LocalTransport, MemImport, SegmentTransport};
pub use pool::{MemoryPool, PoolStats, SegmentId};
