//! External interface traits — §4 Non-goals: device I/O, module loading,
//! and any control-protocol surface live outside this crate. An embedder
//! implements these traits and hands them to the mixer/cache/registry
//! constructors; the core never assumes a concrete transport, codec, or
//! process model behind them.

use async_trait::async_trait;

use crate::error::Result;
use crate::memory::MemChunk;

/// The device-facing side of a sink or source: pulls/pushes PCM and
/// reports latency. A real implementation might wrap ALSA, CoreAudio, a
/// network socket, or a test double.
///
/// §6: "Exposes `request_frames(n) → MemChunk` (capture) and `submit(chunk)`
/// (playback)". Both directions share `request_frames` because both are
/// the same wait-for-the-device-to-be-ready step; a sink's I/O thread
/// calls it to block until the device wants `frames` more frames and
/// ignores the `None` it gets back, then builds its mixed chunk and hands
/// it to `submit`. A source's I/O thread calls it and unwraps the `Some`
/// chunk the device captured while it waited.
#[async_trait]
pub trait DeviceCollaborator: Send + Sync {
    /// Block until the device is ready for the next period of `frames`
    /// frames. Returns `Some(chunk)` on the capture path (the frames that
    /// were captured while waiting), `None` on the playback path (the
    /// caller still owes the device a `submit`).
    async fn request_frames(&self, frames: usize) -> Result<Option<MemChunk>>;

    /// Sink path: hand a freshly mixed chunk to the device.
    async fn submit(&self, chunk: MemChunk) -> Result<()>;

    /// Current output (sink) or capture (source) latency, in microseconds.
    async fn get_latency(&self) -> Result<u64>;
}

/// The module/extension loading surface. `load_once` enforces the
/// autoload "retry-once" contract from §4.6: a failed autoload is
/// attempted exactly one more time before it's given up on permanently.
#[async_trait]
pub trait ModuleCollaborator: Send + Sync {
    async fn load(&self, name: &str, args: &str) -> Result<()>;
    async fn unload(&self, name: &str) -> Result<()>;
    async fn load_once(&self, name: &str, args: &str) -> Result<()> {
        match self.load(name, args).await {
            Ok(()) => Ok(()),
            Err(_) => self.load(name, args).await,
        }
    }
}
