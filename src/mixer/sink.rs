//! Sink and sink-input — the playback half of §4.4.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};

use super::{DeviceState, SilenceCache, StreamState};
use crate::channel::ChannelMap;
use crate::collaborators::DeviceCollaborator;
use crate::config::MixerTunables;
use crate::error::{Error, Result};
use crate::memory::{MemChunk, MemoryPool};
use crate::queue::{MemBlockQueue, QueueAttr};
use crate::registry::EntityType;
use crate::resampler::{convert_from_float, convert_to_float, ResampleFlags, ResampleMethod, Resampler};
use crate::sample::SampleSpec;
use crate::subscription::SubscriptionBus;
use crate::volume::{volume_to_linear, ChannelVolume};

/// Pad `samples` with zeros or truncate it to exactly `want_len` elements —
/// rate engines produce output within ±EXTRA frames of the ideal count
/// (§8 P8), so a mix tick's accumulator needs a fixed-length contribution
/// from every input regardless of the engine's exact yield.
fn fit_length(mut samples: Vec<f32>, want_len: usize) -> Vec<f32> {
    samples.resize(want_len, 0.0);
    samples
}

fn apply_volume(samples: &mut [f32], channels: usize, volume: &ChannelVolume) {
    let gains: Vec<f32> = volume.as_slice().iter().map(|&v| volume_to_linear(v) as f32).collect();
    for (i, s) in samples.iter_mut().enumerate() {
        *s *= gains[i % channels];
    }
}

/// A client stream attached to exactly one sink — §3 "Sink-Input".
pub struct SinkInput {
    pub id: u32,
    spec: SampleSpec,
    map: ChannelMap,
    queue: MemBlockQueue,
    resampler: Option<Resampler>,
    volume: ChannelVolume,
    mute: bool,
    state: StreamState,
}

impl SinkInput {
    /// Build a sink-input bound to `sink`'s current spec/map. A resampler
    /// is constructed iff the stream's own spec or map differs from the
    /// sink's — §3: "an optional resampler (present iff stream spec ≠
    /// device spec or channel map differs)".
    pub fn new(
        id: u32,
        spec: SampleSpec,
        map: ChannelMap,
        queue_attr: QueueAttr,
        sink: &Sink,
        method: ResampleMethod,
        speex_quality: u8,
        samplerate_quality: u8,
    ) -> Result<Self> {
        spec.validate()?;
        map.validate(spec.channels)?;
        let mut queue = MemBlockQueue::new(queue_attr);
        queue.set_silence_block(sink.silence.block(spec.format)?);

        let sink_spec = sink.spec();
        let sink_map = sink.channel_map();
        let resampler = if spec != sink_spec || map != sink_map {
            Some(Resampler::new(
                Arc::clone(&sink.pool),
                spec,
                &map,
                sink_spec,
                &sink_map,
                method,
                ResampleFlags::empty(),
                speex_quality,
                samplerate_quality,
            )?)
        } else {
            None
        };

        Ok(Self {
            id,
            spec,
            map,
            queue,
            resampler,
            volume: ChannelVolume::norm(spec.channels),
            mute: false,
            state: StreamState::Attached,
        })
    }

    pub fn spec(&self) -> SampleSpec {
        self.spec
    }

    pub fn channel_map(&self) -> &ChannelMap {
        &self.map
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.queue.length()
    }

    pub(crate) fn has_resampler(&self) -> bool {
        self.resampler.is_some()
    }

    pub fn push(&mut self, chunk: MemChunk) -> Result<()> {
        self.queue.push(chunk)
    }

    pub fn set_volume(&mut self, volume: ChannelVolume) {
        self.volume = volume;
    }

    pub fn volume(&self) -> &ChannelVolume {
        &self.volume
    }

    pub fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
    }

    pub fn is_muted(&self) -> bool {
        self.mute
    }

    /// Drop the resampler's internal state (its tail of not-yet-emitted
    /// output) while leaving the memblockqueue — and so any already
    /// pushed-but-unread data — untouched. Called by [`move_sink_input`]
    /// after reattaching to a new sink: §4.4 "Pending queued data survives
    /// the move; the resampler's internal tail does not."
    pub(crate) fn rebind(
        &mut self,
        new_sink: &Sink,
        method: ResampleMethod,
        speex_quality: u8,
        samplerate_quality: u8,
    ) -> Result<()> {
        let sink_spec = new_sink.spec();
        let sink_map = new_sink.channel_map();
        self.resampler = if self.spec != sink_spec || self.map != sink_map {
            Some(Resampler::new(
                Arc::clone(&new_sink.pool),
                self.spec,
                &self.map,
                sink_spec,
                &sink_map,
                method,
                ResampleFlags::empty(),
                speex_quality,
                samplerate_quality,
            )?)
        } else {
            None
        };
        self.queue.set_silence_block(new_sink.silence.block(self.spec.format)?);
        self.state = StreamState::Attached;
        Ok(())
    }

    /// Produce exactly `n_out_frames` of sink-format, volume-applied,
    /// interleaved `f32` samples — the per-input half of §4.4's mix
    /// contract ("peek ... feed through the resampler ... apply volume").
    fn render(&mut self, sink_spec: SampleSpec, n_out_frames: usize) -> Result<Vec<f32>> {
        self.state = StreamState::Running;
        let want_len = n_out_frames * sink_spec.channels as usize;

        let mut samples = if let Some(resampler) = &mut self.resampler {
            let out_bytes = sink_spec.frames_to_bytes(n_out_frames);
            let need = resampler.request(out_bytes).max(self.spec.frame_size());
            let in_chunk = self.queue.peek(need)?;
            let resampled = resampler.run(&in_chunk)?;
            self.queue.drop_read(in_chunk.length);
            convert_to_float(&resampled.as_bytes(), sink_spec.format)
        } else {
            let want_bytes = sink_spec.frames_to_bytes(n_out_frames);
            let chunk = self.queue.peek(want_bytes)?;
            let samples = convert_to_float(&chunk.as_bytes(), self.spec.format);
            self.queue.drop_read(chunk.length);
            samples
        };

        samples = fit_length(samples, want_len);
        if self.mute {
            samples.iter_mut().for_each(|s| *s = 0.0);
        } else {
            apply_volume(&mut samples, sink_spec.channels as usize, &self.volume);
        }
        Ok(samples)
    }
}

/// Messages crossing the main-thread/I/O-thread boundary for one sink —
/// §5 "Communication between main and I/O threads uses a bounded,
/// lock-free asynchronous message queue".
pub enum SinkMessage {
    Attach(Box<SinkInput>),
    Detach { id: u32, reply: Sender<Option<Box<SinkInput>>> },
    SetVolume(u32, ChannelVolume),
    SetMute(u32, bool),
    Kill(u32),
    Suspend,
    Resume,
    Shutdown,
}

/// The I/O-thread-only state of a sink: the live input list. Never
/// touched from the main thread directly — only through [`SinkMessage`].
#[derive(Default)]
pub struct SinkIoState {
    inputs: Vec<Box<SinkInput>>,
}

impl SinkIoState {
    pub fn input_ids(&self) -> Vec<u32> {
        self.inputs.iter().map(|i| i.id).collect()
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub(crate) fn push_input(&mut self, input: SinkInput) {
        self.inputs.push(Box::new(input));
    }

    pub(crate) fn take_input(&mut self, id: u32) -> Option<Box<SinkInput>> {
        let pos = self.inputs.iter().position(|i| i.id == id)?;
        Some(self.inputs.remove(pos))
    }
}

/// A device-facing output: owns a sample spec/channel map fixed for its
/// lifetime, a volume/mute pair, and the attached sink-inputs — §3 "Sink".
pub struct Sink {
    pub id: u32,
    pub name: String,
    spec: SampleSpec,
    map: ChannelMap,
    volume: RwLock<ChannelVolume>,
    mute: AtomicBool,
    state: RwLock<DeviceState>,
    pool: Arc<MemoryPool>,
    silence: Arc<SilenceCache>,
    device: Arc<dyn DeviceCollaborator>,
    bus: Arc<SubscriptionBus>,
    tunables: MixerTunables,
    cmd_tx: Sender<SinkMessage>,
    cmd_rx: Mutex<Option<Receiver<SinkMessage>>>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Sink {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        name: impl Into<String>,
        spec: SampleSpec,
        map: ChannelMap,
        pool: Arc<MemoryPool>,
        silence: Arc<SilenceCache>,
        device: Arc<dyn DeviceCollaborator>,
        bus: Arc<SubscriptionBus>,
        tunables: MixerTunables,
    ) -> Result<Arc<Self>> {
        spec.validate()?;
        map.validate(spec.channels)?;
        let (cmd_tx, cmd_rx) = bounded(256);
        Ok(Arc::new(Self {
            id,
            name: name.into(),
            spec,
            map,
            volume: RwLock::new(ChannelVolume::norm(spec.channels)),
            mute: AtomicBool::new(false),
            state: RwLock::new(DeviceState::Init),
            pool,
            silence,
            device,
            bus,
            tunables,
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
            thread: Mutex::new(None),
        }))
    }

    pub fn spec(&self) -> SampleSpec {
        self.spec
    }

    pub fn channel_map(&self) -> ChannelMap {
        self.map.clone()
    }

    pub fn pool(&self) -> &Arc<MemoryPool> {
        &self.pool
    }

    pub fn state(&self) -> DeviceState {
        *self.state.read()
    }

    pub fn volume(&self) -> ChannelVolume {
        self.volume.read().clone()
    }

    /// Volumes are clamped to `[0, NORM]` per §3's sink invariant; a volume
    /// above `NORM` is amplification and valid, so only the floor is
    /// enforced here via `u32`'s own lower bound.
    pub fn set_volume(&self, volume: ChannelVolume) {
        *self.volume.write() = volume;
        self.bus.mark_changed(EntityType::Sink, self.id);
    }

    pub fn set_mute(&self, mute: bool) {
        self.mute.store(mute, Ordering::Release);
        self.bus.mark_changed(EntityType::Sink, self.id);
    }

    pub fn is_muted(&self) -> bool {
        self.mute.load(Ordering::Acquire)
    }

    fn sender(&self) -> Sender<SinkMessage> {
        self.cmd_tx.clone()
    }

    /// Fire-and-forget attach — §5 "the sender either fires-and-forgets or
    /// waits on a reply condition".
    pub fn attach_input(&self, input: SinkInput) -> Result<()> {
        let id = input.id;
        self.cmd_tx.send(SinkMessage::Attach(Box::new(input))).map_err(|_| Error::ChannelClosed)?;
        self.bus.publish_new(EntityType::SinkInput, id);
        Ok(())
    }

    /// Detach and return the input, waiting for the I/O thread's reply —
    /// the synchronous half of §5's message contract. Used directly by
    /// callers and as the first step of [`move_sink_input`].
    pub fn detach_input(&self, id: u32) -> Result<Option<Box<SinkInput>>> {
        let (reply_tx, reply_rx) = bounded(1);
        self.cmd_tx.send(SinkMessage::Detach { id, reply: reply_tx }).map_err(|_| Error::ChannelClosed)?;
        reply_rx.recv().map_err(|_| Error::ChannelClosed)
    }

    pub fn set_input_volume(&self, id: u32, volume: ChannelVolume) -> Result<()> {
        self.cmd_tx.send(SinkMessage::SetVolume(id, volume)).map_err(|_| Error::ChannelClosed)
    }

    pub fn set_input_mute(&self, id: u32, mute: bool) -> Result<()> {
        self.cmd_tx.send(SinkMessage::SetMute(id, mute)).map_err(|_| Error::ChannelClosed)
    }

    pub fn kill_input(&self, id: u32) -> Result<()> {
        self.cmd_tx.send(SinkMessage::Kill(id)).map_err(|_| Error::ChannelClosed)
    }

    /// Stop the I/O thread and detach the device, keeping attached inputs
    /// and their queues intact — §4.4 "Suspend".
    pub fn suspend(&self) -> Result<()> {
        *self.state.write() = DeviceState::Suspended;
        self.cmd_tx.send(SinkMessage::Suspend).map_err(|_| Error::ChannelClosed)?;
        self.bus.mark_changed(EntityType::Sink, self.id);
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        *self.state.write() = DeviceState::Running;
        self.cmd_tx.send(SinkMessage::Resume).map_err(|_| Error::ChannelClosed)?;
        self.bus.mark_changed(EntityType::Sink, self.id);
        Ok(())
    }

    pub fn unlink(&self) -> Result<()> {
        *self.state.write() = DeviceState::Unlinked;
        self.cmd_tx.send(SinkMessage::Shutdown).map_err(|_| Error::ChannelClosed)?;
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
        self.bus.publish_remove(EntityType::Sink, self.id);
        Ok(())
    }

    fn apply_message(&self, io: &mut SinkIoState, msg: SinkMessage) -> bool {
        match msg {
            SinkMessage::Attach(input) => {
                io.inputs.push(input);
            }
            SinkMessage::Detach { id, reply } => {
                let pos = io.inputs.iter().position(|i| i.id == id);
                let removed = pos.map(|p| io.inputs.remove(p));
                let _ = reply.send(removed);
            }
            SinkMessage::SetVolume(id, volume) => {
                if let Some(input) = io.inputs.iter_mut().find(|i| i.id == id) {
                    input.set_volume(volume);
                    self.bus.mark_changed(EntityType::SinkInput, id);
                }
            }
            SinkMessage::SetMute(id, mute) => {
                if let Some(input) = io.inputs.iter_mut().find(|i| i.id == id) {
                    input.set_mute(mute);
                    self.bus.mark_changed(EntityType::SinkInput, id);
                }
            }
            SinkMessage::Kill(id) => {
                io.inputs.retain(|i| i.id != id);
                self.bus.publish_remove(EntityType::SinkInput, id);
            }
            SinkMessage::Suspend => {
                *self.state.write() = DeviceState::Suspended;
            }
            SinkMessage::Resume => {
                *self.state.write() = DeviceState::Running;
            }
            SinkMessage::Shutdown => return true,
        }
        false
    }

    /// Drain every currently-queued message without blocking.
    fn drain_messages(&self, io: &mut SinkIoState, rx: &Receiver<SinkMessage>) -> bool {
        while let Ok(msg) = rx.try_recv() {
            if self.apply_message(io, msg) {
                return true;
            }
        }
        false
    }

    /// Assemble one mixed, device-ready chunk from every attached input —
    /// §4.4's mix-tick contract. Dead inputs (whose `peek` reports an
    /// unrecoverable error) are unlinked within this same call.
    pub fn mix_tick(&self, io: &mut SinkIoState, n_frames: usize) -> Result<MemChunk> {
        let spec = self.spec;
        let mut accum = vec![0f32; n_frames * spec.channels as usize];
        let mut dead = Vec::new();

        for input in io.inputs.iter_mut() {
            match input.render(spec, n_frames) {
                Ok(samples) => {
                    for (a, s) in accum.iter_mut().zip(samples.iter()) {
                        *a += *s;
                    }
                }
                Err(e) => {
                    tracing::warn!(sink = %self.name, sink_input = input.id, error = %e, "dropping dead sink-input");
                    dead.push(input.id);
                }
            }
        }

        if !dead.is_empty() {
            io.inputs.retain(|i| !dead.contains(&i.id));
            for id in dead {
                self.bus.publish_remove(EntityType::SinkInput, id);
            }
        }

        let volume = self.volume.read().clone();
        let muted = self.mute.load(Ordering::Acquire);
        if muted {
            accum.iter_mut().for_each(|s| *s = 0.0);
        } else {
            apply_volume(&mut accum, spec.channels as usize, &volume);
        }
        accum.iter_mut().for_each(|s| *s = s.clamp(-1.0, 1.0));

        let out_bytes = convert_from_float(&accum, spec.format);
        let block = crate::memory::MemBlock::new_pool(&self.pool, &out_bytes)?;
        Ok(MemChunk::new(block, 0, out_bytes.len()))
    }

    fn silence_chunk(&self, n_frames: usize) -> Result<MemChunk> {
        let block = self.silence.block(self.spec.format)?;
        let len = (n_frames * self.spec.frame_size()).min(block.len());
        Ok(MemChunk::new(block, 0, len))
    }

    /// Transition to `Suspended` and raise a subscription event — §7
    /// "Device I/O error ... Sink transitions to suspended; subscription
    /// event; I/O thread remains alive."
    fn handle_device_error(&self, err: &Error) {
        tracing::warn!(sink = %self.name, error = %err, "device I/O error, suspending sink");
        *self.state.write() = DeviceState::Suspended;
        self.bus.publish_remove(EntityType::Sink, self.id);
        self.bus.publish_new(EntityType::Sink, self.id);
    }

    /// Spawn this sink's dedicated real-time I/O thread. The thread polls
    /// the device for "please provide N frames" (§4.4), mixes, and submits
    /// — or, while suspended, parks on the command queue instead of
    /// spinning. Device calls run through `futures::executor::block_on`:
    /// the device collaborator is async so it composes with an async
    /// control-protocol layer, but the mix loop itself is synchronous and
    /// never awaits anything but the device.
    pub fn spawn_io_thread(self: &Arc<Self>) -> Result<()> {
        let rx = self.cmd_rx.lock().take().ok_or(Error::Invariant("sink I/O thread already spawned"))?;
        let sink = Arc::clone(self);
        *self.state.write() = DeviceState::Running;
        let handle = std::thread::Builder::new()
            .name(format!("sink-io-{}", sink.id))
            .spawn(move || sink.io_thread_loop(rx))
            .map_err(|e| Error::DeviceIo(format!("spawn sink I/O thread: {e}")))?;
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    fn io_thread_loop(self: Arc<Self>, rx: Receiver<SinkMessage>) {
        let mut io = SinkIoState::default();
        loop {
            if self.drain_messages(&mut io, &rx) {
                return;
            }
            if self.state() == DeviceState::Suspended {
                match rx.recv_timeout(Duration::from_millis(200)) {
                    Ok(msg) => {
                        if self.apply_message(&mut io, msg) {
                            return;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
                continue;
            }

            let n = self.tunables.period_frames;
            if let Err(e) = futures::executor::block_on(self.device.request_frames(n)) {
                self.handle_device_error(&e);
                continue;
            }
            let chunk = match self.mix_tick(&mut io, n) {
                Ok(chunk) => chunk,
                Err(e) => match self.silence_chunk(n) {
                    Ok(chunk) => {
                        tracing::warn!(sink = %self.name, error = %e, "mix tick failed, submitting silence");
                        chunk
                    }
                    Err(_) => continue,
                },
            };
            if let Err(e) = futures::executor::block_on(self.device.submit(chunk)) {
                self.handle_device_error(&e);
            }
            self.bus.flush();
        }
    }
}

/// Move a sink-input from one sink to another — §4.4 "Move semantics".
/// Allowed only when the stream can be adapted to the new sink (same
/// channel count/map, or a resampler can be built for the difference).
/// Queued data survives; the resampler's internal tail does not.
pub fn move_sink_input(
    input_id: u32,
    from: &Sink,
    to: &Sink,
    method: ResampleMethod,
    speex_quality: u8,
    samplerate_quality: u8,
) -> Result<()> {
    let detached = from.detach_input(input_id)?.ok_or_else(|| Error::NotFound(format!("sink-input {input_id}")))?;
    let mut input = detached;
    input.rebind(to, method, speex_quality, samplerate_quality)?;
    to.attach_input(*input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleFormat;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct NullDevice {
        submitted: StdMutex<Vec<Vec<u8>>>,
    }

    impl NullDevice {
        fn new() -> Self {
            Self { submitted: StdMutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl DeviceCollaborator for NullDevice {
        async fn request_frames(&self, _frames: usize) -> Result<Option<MemChunk>> {
            Ok(None)
        }
        async fn submit(&self, chunk: MemChunk) -> Result<()> {
            self.submitted.lock().unwrap().push(chunk.as_bytes());
            Ok(())
        }
        async fn get_latency(&self) -> Result<u64> {
            Ok(0)
        }
    }

    fn test_sink(spec: SampleSpec) -> (Arc<Sink>, Arc<MemoryPool>) {
        let pool = MemoryPool::with_defaults().unwrap();
        let silence = Arc::new(SilenceCache::new(Arc::clone(&pool)));
        let bus = Arc::new(SubscriptionBus::new());
        let device = Arc::new(NullDevice::new());
        let sink = Sink::new(
            0,
            "test_sink",
            spec,
            ChannelMap::stereo(),
            Arc::clone(&pool),
            silence,
            device,
            bus,
            MixerTunables::default(),
        )
        .unwrap();
        (sink, pool)
    }

    fn push_silence_free_chunk(pool: &Arc<MemoryPool>, input: &mut SinkInput, value: f32, frames: usize, channels: usize) {
        let samples = vec![value; frames * channels];
        let bytes = convert_from_float(&samples, SampleFormat::Float32LE);
        let block = crate::memory::MemBlock::new_pool(pool, &bytes).unwrap();
        input.push(MemChunk::new(block, 0, bytes.len())).unwrap();
    }

    #[test]
    fn mix_tick_with_no_inputs_is_silence() {
        let spec = SampleSpec::new(SampleFormat::Float32LE, 44_100, 2).unwrap();
        let (sink, _pool) = test_sink(spec);
        let mut io = SinkIoState::default();
        let chunk = sink.mix_tick(&mut io, 64).unwrap();
        let samples = convert_to_float(&chunk.as_bytes(), SampleFormat::Float32LE);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn single_matching_input_passes_through_with_volume() {
        let spec = SampleSpec::new(SampleFormat::Float32LE, 44_100, 2).unwrap();
        let (sink, pool) = test_sink(spec);
        let attr = QueueAttr { maxlength: 65536, tlength: 4096, prebuf: 0, minreq: 256 };
        let mut input =
            SinkInput::new(1, spec, ChannelMap::stereo(), attr, &sink, ResampleMethod::Copy, 3, 4).unwrap();
        assert!(input.resampler.is_none());
        push_silence_free_chunk(&pool, &mut input, 0.5, 64, 2);
        input.set_volume(ChannelVolume::uniform(2, crate::volume::VOLUME_NORM / 2));

        let mut io = SinkIoState { inputs: vec![Box::new(input)] };
        let chunk = sink.mix_tick(&mut io, 64).unwrap();
        let samples = convert_to_float(&chunk.as_bytes(), SampleFormat::Float32LE);
        assert!((samples[0] - 0.25).abs() < 0.01);
    }

    #[test]
    fn muted_input_contributes_silence() {
        let spec = SampleSpec::new(SampleFormat::Float32LE, 44_100, 1).unwrap();
        let (sink, pool) = test_sink(spec);
        let attr = QueueAttr { maxlength: 65536, tlength: 4096, prebuf: 0, minreq: 256 };
        let mut input = SinkInput::new(1, spec, ChannelMap::mono(), attr, &sink, ResampleMethod::Copy, 3, 4).unwrap();
        push_silence_free_chunk(&pool, &mut input, 1.0, 64, 1);
        input.set_mute(true);

        let mut io = SinkIoState { inputs: vec![Box::new(input)] };
        let chunk = sink.mix_tick(&mut io, 64).unwrap();
        let samples = convert_to_float(&chunk.as_bytes(), SampleFormat::Float32LE);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn two_inputs_sum_and_saturate() {
        let spec = SampleSpec::new(SampleFormat::Float32LE, 44_100, 1).unwrap();
        let (sink, pool) = test_sink(spec);
        let attr = QueueAttr { maxlength: 65536, tlength: 4096, prebuf: 0, minreq: 256 };
        let mut a = SinkInput::new(1, spec, ChannelMap::mono(), attr, &sink, ResampleMethod::Copy, 3, 4).unwrap();
        let mut b = SinkInput::new(2, spec, ChannelMap::mono(), attr, &sink, ResampleMethod::Copy, 3, 4).unwrap();
        push_silence_free_chunk(&pool, &mut a, 0.9, 64, 1);
        push_silence_free_chunk(&pool, &mut b, 0.9, 64, 1);

        let mut io = SinkIoState { inputs: vec![Box::new(a), Box::new(b)] };
        let chunk = sink.mix_tick(&mut io, 64).unwrap();
        let samples = convert_to_float(&chunk.as_bytes(), SampleFormat::Float32LE);
        assert!((samples[0] - 1.0).abs() < 0.01, "expected clamp to 1.0, got {}", samples[0]);
    }

    #[test]
    fn resampler_input_is_built_when_rate_differs() {
        let spec = SampleSpec::new(SampleFormat::Float32LE, 48_000, 2).unwrap();
        let (sink, _pool) = test_sink(spec);
        let in_spec = SampleSpec::new(SampleFormat::Float32LE, 44_100, 2).unwrap();
        let attr = QueueAttr { maxlength: 65536, tlength: 4096, prebuf: 0, minreq: 256 };
        let input =
            SinkInput::new(1, in_spec, ChannelMap::stereo(), attr, &sink, ResampleMethod::Auto, 3, 4).unwrap();
        assert!(input.resampler.is_some());
    }
}
