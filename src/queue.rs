//! Bounded per-stream queue of memory chunks — §4.2 "MemBlockQueue".
//!
//! A `MemBlockQueue` sits between a writer (something producing audio,
//! possibly faster or slower than real time) and a reader (a sink or
//! source's I/O thread, which drains it at a fixed rate). It tracks two
//! cursors into an infinite byte stream — `read_index` and `write_index` —
//! and a deque of chunks covering `[read_index, write_index)`.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::memory::{MemBlock, MemChunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// `offset` is relative to the current write index.
    RelativeToWrite,
    /// `offset` is relative to the current read index.
    RelativeToRead,
    /// `offset` is an absolute stream position.
    Absolute,
}

/// Parameters bounding a queue's behaviour — §4.2's "maxlength/tlength/
/// prebuf/minreq" tunables, carried in from [`crate::config::QueueTunables`].
#[derive(Debug, Clone, Copy)]
pub struct QueueAttr {
    pub maxlength: usize,
    pub tlength: usize,
    pub prebuf: usize,
    pub minreq: usize,
}

impl From<&crate::config::QueueTunables> for QueueAttr {
    fn from(t: &crate::config::QueueTunables) -> Self {
        Self { maxlength: t.maxlength, tlength: t.tlength, prebuf: t.prebuf, minreq: t.minreq }
    }
}

pub struct MemBlockQueue {
    chunks: VecDeque<MemChunk>,
    /// Already-dropped chunks retained so `rewind` can restore them, oldest
    /// at the front, most-recently-dropped at the back. Bounded by
    /// `attr.maxlength` bytes, the same budget that bounds the live queue.
    history: VecDeque<MemChunk>,
    history_bytes: usize,
    /// Absolute byte offset of the oldest byte still queued.
    read_index: i64,
    /// Absolute byte offset one past the newest byte queued.
    write_index: i64,
    length: usize,
    attr: QueueAttr,
    /// True until `length >= prebuf` has been observed once; while true,
    /// `peek` returns silence instead of draining real data.
    prebuffering: bool,
    silence_block: Option<Arc<MemBlock>>,
}

impl MemBlockQueue {
    pub fn new(attr: QueueAttr) -> Self {
        Self {
            chunks: VecDeque::new(),
            history: VecDeque::new(),
            history_bytes: 0,
            read_index: 0,
            write_index: 0,
            length: 0,
            attr,
            prebuffering: attr.prebuf > 0,
            silence_block: None,
        }
    }

    pub fn set_silence_block(&mut self, block: Arc<MemBlock>) {
        self.silence_block = Some(block);
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn read_index(&self) -> i64 {
        self.read_index
    }

    pub fn write_index(&self) -> i64 {
        self.write_index
    }

    pub fn is_readable(&self) -> bool {
        !self.prebuffering && self.length > 0
    }

    /// Push `chunk` onto the tail of the queue. On overflow (queue would
    /// exceed `maxlength`), the queue is flushed first and the new chunk
    /// becomes the sole occupant — §4.2's "overflow = flush-then-push".
    pub fn push(&mut self, chunk: MemChunk) -> Result<()> {
        if chunk.length > self.attr.maxlength {
            return Err(Error::TooLarge(chunk.length));
        }
        if self.length + chunk.length > self.attr.maxlength {
            self.flush();
        }
        self.write_index += chunk.length as i64;
        self.length += chunk.length;
        self.chunks.push_back(chunk);
        if self.prebuffering && self.length >= self.attr.prebuf {
            self.prebuffering = false;
        }
        Ok(())
    }

    /// Look at, without consuming, up to `len` bytes at the head of the
    /// queue. Short reads are padded with silence when the queue is
    /// prebuffering or underrun, matching a sink's expectation that
    /// `peek` always returns exactly `len` bytes.
    ///
    /// When `len` fits inside the first queued chunk this is a zero-copy
    /// slice. When it spans more than one chunk (a push landed mid-tick,
    /// so the mix loop's fixed-size read straddles a chunk boundary) the
    /// spanned chunks are gathered into one `Appended` block, with any
    /// remaining shortfall padded from the silence block — §4.2's "length
    /// of the returned silence equals the gap ... whichever is shorter".
    pub fn peek(&self, len: usize) -> Result<MemChunk> {
        if self.prebuffering || self.chunks.is_empty() {
            return self.silence_chunk(len);
        }
        let front = &self.chunks[0];
        if front.length >= len {
            return Ok(front.slice(0, len));
        }

        let mut gathered = Vec::with_capacity(len);
        for chunk in &self.chunks {
            if gathered.len() >= len {
                break;
            }
            let take = (len - gathered.len()).min(chunk.length);
            gathered.extend(chunk.block.read(chunk.index, take));
        }
        if gathered.len() < len {
            if let Some(block) = &self.silence_block {
                let remaining = len - gathered.len();
                let take = remaining.min(block.len());
                gathered.extend(block.read(0, take));
            }
        }
        let block = MemBlock::new_appended(gathered);
        let n = block.len();
        Ok(MemChunk::new(block, 0, n))
    }

    fn silence_chunk(&self, len: usize) -> Result<MemChunk> {
        let block = self.silence_block.clone().ok_or(Error::Invariant("peek on queue with no silence block set"))?;
        let n = len.min(block.len());
        Ok(MemChunk::new(block, 0, n))
    }

    /// Drop `len` bytes from the head of the queue, advancing `read_index`.
    /// The dropped bytes are retained in a bounded history so [`Self::rewind`]
    /// can restore them later.
    pub fn drop_read(&mut self, mut len: usize) {
        self.read_index += len as i64;
        while len > 0 {
            let Some(front) = self.chunks.front_mut() else { break };
            if front.length <= len {
                let consumed = self.chunks.pop_front().unwrap();
                len -= consumed.length;
                self.length -= consumed.length;
                self.push_history(consumed);
            } else {
                let consumed = front.slice(0, len);
                *front = front.slice(len, front.length - len);
                self.length -= len;
                self.push_history(consumed);
                len = 0;
            }
        }
        if self.chunks.is_empty() && self.attr.prebuf > 0 {
            self.prebuffering = true;
        }
    }

    fn push_history(&mut self, chunk: MemChunk) {
        self.history_bytes += chunk.length;
        self.history.push_back(chunk);
        while self.history_bytes > self.attr.maxlength {
            let Some(oldest) = self.history.pop_front() else { break };
            self.history_bytes -= oldest.length;
        }
    }

    /// Retract `read_index` by up to `len` bytes, restoring already-dropped
    /// data from history so it can be re-peeked — §4.2 "already-dropped data
    /// can be re-peeked if still retained". Returns the number of bytes
    /// actually rewound, which is `len` clamped to however much history is
    /// still retained; never errors.
    pub fn rewind(&mut self, len: usize) -> usize {
        let mut remaining = len;
        let mut rewound = 0usize;
        while remaining > 0 {
            let Some(chunk) = self.history.pop_back() else { break };
            if chunk.length <= remaining {
                self.history_bytes -= chunk.length;
                self.read_index -= chunk.length as i64;
                self.length += chunk.length;
                remaining -= chunk.length;
                rewound += chunk.length;
                self.chunks.push_front(chunk);
            } else {
                let take = remaining;
                let restored = chunk.slice(chunk.length - take, take);
                let keep = chunk.slice(0, chunk.length - take);
                self.history_bytes -= take;
                self.read_index -= take as i64;
                self.length += take;
                rewound += take;
                self.chunks.push_front(restored);
                self.history.push_back(keep);
                remaining = 0;
            }
        }
        if self.prebuffering && self.length >= self.attr.prebuf {
            self.prebuffering = false;
        }
        rewound
    }

    /// Discard all queued chunks without moving `read_index`/`write_index`
    /// apart from the consequence of `push` advancing `write_index`.
    pub fn flush(&mut self) {
        self.chunks.clear();
        self.length = 0;
        if self.attr.prebuf > 0 {
            self.prebuffering = true;
        }
    }

    /// Move the write cursor per §4.2's seek semantics. `RelativeToWrite`
    /// and `Absolute` with a negative delta behave like a rewind: chunks
    /// overlapping the rewound region are trimmed or dropped.
    pub fn seek(&mut self, offset: i64, mode: SeekMode) -> Result<()> {
        let target = match mode {
            SeekMode::RelativeToWrite => self.write_index + offset,
            SeekMode::RelativeToRead => self.read_index + offset,
            SeekMode::Absolute => offset,
        };
        if target < self.read_index {
            return Err(Error::InvalidSpec("seek target precedes read index".into()));
        }
        if target <= self.write_index {
            self.rewind_to(target);
        } else {
            // Seeking past the current write index with nothing written
            // in between is a gap; treated as a flush since there is no
            // data to represent the skipped region.
            self.flush();
        }
        self.write_index = target;
        Ok(())
    }

    fn rewind_to(&mut self, target: i64) {
        let drop_bytes = (self.write_index - target) as usize;
        let mut remaining = drop_bytes.min(self.length);
        self.length -= remaining;
        self.write_index -= drop_bytes as i64;
        while remaining > 0 {
            let Some(back) = self.chunks.back_mut() else { break };
            if back.length <= remaining {
                remaining -= back.length;
                self.chunks.pop_back();
            } else {
                *back = back.slice(0, back.length - remaining);
                remaining = 0;
            }
        }
    }
}
