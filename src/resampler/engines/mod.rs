//! Rate-conversion engines — §4.3 "Rate conversion engines".
//!
//! Every engine operates on interleaved `f32` frames at a fixed channel
//! count (the channel count after remix, i.e. the output spec's channel
//! count). Speex-fixed and FFmpeg convert internally to/from their native
//! integer representation; from the pipeline's point of view every engine
//! looks the same.

pub mod copy;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_engine;
pub mod soxr_engine;
pub mod speex;
pub mod trivial;

use crate::error::Result;

/// Bounds how many output frames a single `process` call may produce, so
/// the result always fits in one pool slot (§4.3: "honour a conservative
/// max_block_size").
pub const MAX_BLOCK_FRAMES: usize = 8192;

pub trait RateEngine: Send {
    /// Resample `input` (interleaved, `channels` per frame) and append the
    /// result to `out` (also interleaved). Appends rather than overwrites
    /// so the caller can accumulate across multiple calls without an
    /// extra copy.
    fn process(&mut self, input: &[f32], channels: usize, out: &mut Vec<f32>) -> Result<()>;

    /// Conservative estimate of the input frame count needed to produce
    /// `out_frames` output frames.
    fn request(&self, out_frames: usize) -> usize;

    /// Reconfigure rates. Engines that can't do this losslessly reset
    /// their internal state (losing only sub-frame continuity, never
    /// correctness).
    fn set_rates(&mut self, in_rate: u32, out_rate: u32) -> Result<()>;
}
