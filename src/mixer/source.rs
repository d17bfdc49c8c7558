//! Source and source-output — the capture half of §4.4.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};

use super::{DeviceState, StreamState};
use crate::channel::ChannelMap;
use crate::collaborators::DeviceCollaborator;
use crate::config::MixerTunables;
use crate::error::{Error, Result};
use crate::memory::{MemBlock, MemChunk, MemoryPool};
use crate::queue::{MemBlockQueue, QueueAttr};
use crate::registry::EntityType;
use crate::resampler::{convert_from_float, convert_to_float, ResampleFlags, ResampleMethod, Resampler};
use crate::sample::SampleSpec;
use crate::subscription::SubscriptionBus;
use crate::volume::{volume_to_linear, ChannelVolume};

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

/// A client stream fed by exactly one source — §3 "Source-Output", the
/// capture mirror of [`super::sink::SinkInput`].
pub struct SourceOutput {
    pub id: u32,
    spec: SampleSpec,
    map: ChannelMap,
    queue: MemBlockQueue,
    resampler: Option<Resampler>,
    volume: ChannelVolume,
    mute: bool,
    state: StreamState,
}

impl SourceOutput {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        spec: SampleSpec,
        map: ChannelMap,
        queue_attr: QueueAttr,
        source: &Source,
        method: ResampleMethod,
        speex_quality: u8,
        samplerate_quality: u8,
    ) -> Result<Self> {
        spec.validate()?;
        map.validate(spec.channels)?;
        let mut queue = MemBlockQueue::new(queue_attr);
        queue.set_silence_block(source.silence.block(spec.format)?);

        let source_spec = source.spec();
        let source_map = source.channel_map();
        let resampler = if spec != source_spec || map != source_map {
            Some(Resampler::new(
                Arc::clone(&source.pool),
                source_spec,
                &source_map,
                spec,
                &map,
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

    /// Pull this output's own buffered data, consuming exactly `len`
    /// decoded bytes from readers of the public API — §4.4's capture
    /// "peek"/"drop" pair mirrored for a client reading out.
    pub fn peek(&self, len: usize) -> Result<MemChunk> {
        self.queue.peek(len)
    }

    pub fn drop_read(&mut self, len: usize) {
        self.queue.drop_read(len)
    }

    fn rebind(
        &mut self,
        new_source: &Source,
        method: ResampleMethod,
        speex_quality: u8,
        samplerate_quality: u8,
    ) -> Result<()> {
        let source_spec = new_source.spec();
        let source_map = new_source.channel_map();
        self.resampler = if self.spec != source_spec || self.map != source_map {
            Some(Resampler::new(
                Arc::clone(&new_source.pool),
                source_spec,
                &source_map,
                self.spec,
                &self.map,
                method,
                ResampleFlags::empty(),
                speex_quality,
                samplerate_quality,
            )?)
        } else {
            None
        };
        self.queue.set_silence_block(new_source.silence.block(self.spec.format)?);
        self.state = StreamState::Attached;
        Ok(())
    }

    /// Feed one captured, source-format chunk in: apply this output's
    /// volume/mute, resample/remap to its own spec if needed, and push
    /// the result onto its queue — the per-output half of §4.4's capture
    /// distribution tick.
    fn feed(&mut self, pool: &Arc<MemoryPool>, source_spec: SampleSpec, chunk: &MemChunk) -> Result<()> {
        self.state = StreamState::Running;
        let mut samples = convert_to_float(&chunk.as_bytes(), source_spec.format);

        if self.mute {
            samples.iter_mut().for_each(|s| *s = 0.0);
        } else {
            apply_volume(&mut samples, source_spec.channels as usize, &self.volume);
        }

        let native_bytes = convert_from_float(&samples, source_spec.format);
        let native_block = MemBlock::new_pool(pool, &native_bytes)?;
        let native_chunk = MemChunk::new(native_block, 0, native_bytes.len());

        if let Some(resampler) = &mut self.resampler {
            let out_chunk = resampler.run(&native_chunk)?;
            self.queue.push(out_chunk)
        } else {
            self.queue.push(native_chunk)
        }
    }
}

/// Messages crossing the main-thread/I/O-thread boundary for one source.
pub enum SourceMessage {
    Attach(Box<SourceOutput>),
    Detach { id: u32, reply: Sender<Option<Box<SourceOutput>>> },
    SetVolume(u32, ChannelVolume),
    SetMute(u32, bool),
    Kill(u32),
    Suspend,
    Resume,
    Shutdown,
}

/// The I/O-thread-only state of a source: the live output list.
#[derive(Default)]
pub struct SourceIoState {
    outputs: Vec<Box<SourceOutput>>,
}

impl SourceIoState {
    pub fn output_ids(&self) -> Vec<u32> {
        self.outputs.iter().map(|o| o.id).collect()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// A device-facing input: captures audio and fan-outs it to every
/// attached [`SourceOutput`] — §3 "Source".
pub struct Source {
    pub id: u32,
    pub name: String,
    spec: SampleSpec,
    map: ChannelMap,
    volume: RwLock<ChannelVolume>,
    mute: AtomicBool,
    state: RwLock<DeviceState>,
    pool: Arc<MemoryPool>,
    silence: Arc<super::SilenceCache>,
    device: Arc<dyn DeviceCollaborator>,
    bus: Arc<SubscriptionBus>,
    tunables: MixerTunables,
    cmd_tx: Sender<SourceMessage>,
    cmd_rx: Mutex<Option<Receiver<SourceMessage>>>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Source {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        name: impl Into<String>,
        spec: SampleSpec,
        map: ChannelMap,
        pool: Arc<MemoryPool>,
        silence: Arc<super::SilenceCache>,
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

    pub fn set_volume(&self, volume: ChannelVolume) {
        *self.volume.write() = volume;
        self.bus.mark_changed(EntityType::Source, self.id);
    }

    pub fn set_mute(&self, mute: bool) {
        self.mute.store(mute, Ordering::Release);
        self.bus.mark_changed(EntityType::Source, self.id);
    }

    pub fn is_muted(&self) -> bool {
        self.mute.load(Ordering::Acquire)
    }

    pub fn attach_output(&self, output: SourceOutput) -> Result<()> {
        let id = output.id;
        self.cmd_tx.send(SourceMessage::Attach(Box::new(output))).map_err(|_| Error::ChannelClosed)?;
        self.bus.publish_new(EntityType::SourceOutput, id);
        Ok(())
    }

    pub fn detach_output(&self, id: u32) -> Result<Option<Box<SourceOutput>>> {
        let (reply_tx, reply_rx) = bounded(1);
        self.cmd_tx.send(SourceMessage::Detach { id, reply: reply_tx }).map_err(|_| Error::ChannelClosed)?;
        reply_rx.recv().map_err(|_| Error::ChannelClosed)
    }

    pub fn set_output_volume(&self, id: u32, volume: ChannelVolume) -> Result<()> {
        self.cmd_tx.send(SourceMessage::SetVolume(id, volume)).map_err(|_| Error::ChannelClosed)
    }

    pub fn set_output_mute(&self, id: u32, mute: bool) -> Result<()> {
        self.cmd_tx.send(SourceMessage::SetMute(id, mute)).map_err(|_| Error::ChannelClosed)
    }

    pub fn kill_output(&self, id: u32) -> Result<()> {
        self.cmd_tx.send(SourceMessage::Kill(id)).map_err(|_| Error::ChannelClosed)
    }

    pub fn suspend(&self) -> Result<()> {
        *self.state.write() = DeviceState::Suspended;
        self.cmd_tx.send(SourceMessage::Suspend).map_err(|_| Error::ChannelClosed)?;
        self.bus.mark_changed(EntityType::Source, self.id);
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        *self.state.write() = DeviceState::Running;
        self.cmd_tx.send(SourceMessage::Resume).map_err(|_| Error::ChannelClosed)?;
        self.bus.mark_changed(EntityType::Source, self.id);
        Ok(())
    }

    pub fn unlink(&self) -> Result<()> {
        *self.state.write() = DeviceState::Unlinked;
        self.cmd_tx.send(SourceMessage::Shutdown).map_err(|_| Error::ChannelClosed)?;
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
        self.bus.publish_remove(EntityType::Source, self.id);
        Ok(())
    }

    fn apply_message(&self, io: &mut SourceIoState, msg: SourceMessage) -> bool {
        match msg {
            SourceMessage::Attach(output) => {
                io.outputs.push(output);
            }
            SourceMessage::Detach { id, reply } => {
                let pos = io.outputs.iter().position(|o| o.id == id);
                let removed = pos.map(|p| io.outputs.remove(p));
                let _ = reply.send(removed);
            }
            SourceMessage::SetVolume(id, volume) => {
                if let Some(output) = io.outputs.iter_mut().find(|o| o.id == id) {
                    output.set_volume(volume);
                    self.bus.mark_changed(EntityType::SourceOutput, id);
                }
            }
            SourceMessage::SetMute(id, mute) => {
                if let Some(output) = io.outputs.iter_mut().find(|o| o.id == id) {
                    output.set_mute(mute);
                    self.bus.mark_changed(EntityType::SourceOutput, id);
                }
            }
            SourceMessage::Kill(id) => {
                io.outputs.retain(|o| o.id != id);
                self.bus.publish_remove(EntityType::SourceOutput, id);
            }
            SourceMessage::Suspend => {
                *self.state.write() = DeviceState::Suspended;
            }
            SourceMessage::Resume => {
                *self.state.write() = DeviceState::Running;
            }
            SourceMessage::Shutdown => return true,
        }
        false
    }

    fn drain_messages(&self, io: &mut SourceIoState, rx: &Receiver<SourceMessage>) -> bool {
        while let Ok(msg) = rx.try_recv() {
            if self.apply_message(io, msg) {
                return true;
            }
        }
        false
    }

    /// Distribute one captured chunk to every attached output — §4.4's
    /// capture-tick contract. Dead outputs (whose `feed` reports an
    /// unrecoverable error) are unlinked within this same call.
    pub fn capture_tick(&self, io: &mut SourceIoState, chunk: &MemChunk) -> Result<()> {
        let spec = self.spec;
        let mut dead = Vec::new();
        for output in io.outputs.iter_mut() {
            if let Err(e) = output.feed(&self.pool, spec, chunk) {
                tracing::warn!(source = %self.name, source_output = output.id, error = %e, "dropping dead source-output");
                dead.push(output.id);
            }
        }
        if !dead.is_empty() {
            io.outputs.retain(|o| !dead.contains(&o.id));
            for id in dead {
                self.bus.publish_remove(EntityType::SourceOutput, id);
            }
        }
        Ok(())
    }

    fn handle_device_error(&self, err: &Error) {
        tracing::warn!(source = %self.name, error = %err, "device I/O error, suspending source");
        *self.state.write() = DeviceState::Suspended;
        self.bus.publish_remove(EntityType::Source, self.id);
        self.bus.publish_new(EntityType::Source, self.id);
    }

    /// Spawn this source's dedicated real-time I/O thread. Each tick
    /// blocks on `request_frames`, which returns the captured chunk
    /// directly (no separate `submit` on the capture path).
    pub fn spawn_io_thread(self: &Arc<Self>) -> Result<()> {
        let rx = self.cmd_rx.lock().take().ok_or(Error::Invariant("source I/O thread already spawned"))?;
        let source = Arc::clone(self);
        *self.state.write() = DeviceState::Running;
        let handle = std::thread::Builder::new()
            .name(format!("source-io-{}", source.id))
            .spawn(move || source.io_thread_loop(rx))
            .map_err(|e| Error::DeviceIo(format!("spawn source I/O thread: {e}")))?;
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    fn io_thread_loop(self: Arc<Self>, rx: Receiver<SourceMessage>) {
        let mut io = SourceIoState::default();
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
            match futures::executor::block_on(self.device.request_frames(n)) {
                Ok(Some(chunk)) => {
                    if let Err(e) = self.capture_tick(&mut io, &chunk) {
                        tracing::warn!(source = %self.name, error = %e, "capture tick failed");
                    }
                    self.bus.flush();
                }
                Ok(None) => {
                    tracing::warn!(source = %self.name, "device returned no captured data");
                }
                Err(e) => self.handle_device_error(&e),
            }
        }
    }
}

/// Move a source-output from one source to another — the capture mirror
/// of [`super::sink::move_sink_input`].
pub fn move_source_output(
    output_id: u32,
    from: &Source,
    to: &Source,
    method: ResampleMethod,
    speex_quality: u8,
    samplerate_quality: u8,
) -> Result<()> {
    let detached =
        from.detach_output(output_id)?.ok_or_else(|| Error::NotFound(format!("source-output {output_id}")))?;
    let mut output = detached;
    output.rebind(to, method, speex_quality, samplerate_quality)?;
    to.attach_output(*output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleFormat;
    use async_trait::async_trait;

    struct NullDevice;

    #[async_trait]
    impl DeviceCollaborator for NullDevice {
        async fn request_frames(&self, _frames: usize) -> Result<Option<MemChunk>> {
            Ok(None)
        }
        async fn submit(&self, _chunk: MemChunk) -> Result<()> {
            Ok(())
        }
        async fn get_latency(&self) -> Result<u64> {
            Ok(0)
        }
    }

    fn test_source(spec: SampleSpec) -> (Arc<Source>, Arc<MemoryPool>) {
        let pool = MemoryPool::with_defaults().unwrap();
        let silence = Arc::new(super::super::SilenceCache::new(Arc::clone(&pool)));
        let bus = Arc::new(SubscriptionBus::new());
        let device = Arc::new(NullDevice);
        let source = Source::new(
            0,
            "test_source",
            spec,
            ChannelMap::stereo(),
            Arc::clone(&pool),
            silence,
            device,
            bus,
            MixerTunables::default(),
        )
        .unwrap();
        (source, pool)
    }

    #[test]
    fn capture_tick_with_no_outputs_is_a_noop() {
        let spec = SampleSpec::new(SampleFormat::Float32LE, 44_100, 2).unwrap();
        let (source, pool) = test_source(spec);
        let mut io = SourceIoState::default();
        let bytes = convert_from_float(&vec![0.5f32; 128], SampleFormat::Float32LE);
        let block = MemBlock::new_pool(&pool, &bytes).unwrap();
        let chunk = MemChunk::new(block, 0, bytes.len());
        assert!(source.capture_tick(&mut io, &chunk).is_ok());
    }

    #[test]
    fn matching_output_receives_volume_applied_samples() {
        let spec = SampleSpec::new(SampleFormat::Float32LE, 44_100, 1).unwrap();
        let (source, pool) = test_source(spec);
        let attr = QueueAttr { maxlength: 65536, tlength: 4096, prebuf: 0, minreq: 256 };
        let mut output =
            SourceOutput::new(1, spec, ChannelMap::mono(), attr, &source, ResampleMethod::Copy, 3, 4).unwrap();
        output.set_volume(ChannelVolume::uniform(1, crate::volume::VOLUME_NORM / 2));

        let bytes = convert_from_float(&vec![0.8f32; 64], SampleFormat::Float32LE);
        let block = MemBlock::new_pool(&pool, &bytes).unwrap();
        let chunk = MemChunk::new(block, 0, bytes.len());
        output.feed(&pool, spec, &chunk).unwrap();

        let out = output.peek(4).unwrap();
        let samples = convert_to_float(&out.as_bytes(), SampleFormat::Float32LE);
        assert!((samples[0] - 0.4).abs() < 0.01);
    }

    #[test]
    fn muted_output_receives_silence() {
        let spec = SampleSpec::new(SampleFormat::Float32LE, 44_100, 1).unwrap();
        let (source, pool) = test_source(spec);
        let attr = QueueAttr { maxlength: 65536, tlength: 4096, prebuf: 0, minreq: 256 };
        let mut output =
            SourceOutput::new(1, spec, ChannelMap::mono(), attr, &source, ResampleMethod::Copy, 3, 4).unwrap();
        output.set_mute(true);

        let bytes = convert_from_float(&vec![1.0f32; 64], SampleFormat::Float32LE);
        let block = MemBlock::new_pool(&pool, &bytes).unwrap();
        let chunk = MemChunk::new(block, 0, bytes.len());
        output.feed(&pool, spec, &chunk).unwrap();

        let out = output.peek(4).unwrap();
        let samples = convert_to_float(&out.as_bytes(), SampleFormat::Float32LE);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn resampler_output_is_built_when_channels_differ() {
        let spec = SampleSpec::new(SampleFormat::Float32LE, 44_100, 2).unwrap();
        let (source, _pool) = test_source(spec);
        let out_spec = SampleSpec::new(SampleFormat::Float32LE, 44_100, 1).unwrap();
        let attr = QueueAttr { maxlength: 65536, tlength: 4096, prebuf: 0, minreq: 256 };
        let output =
            SourceOutput::new(1, out_spec, ChannelMap::mono(), attr, &source, ResampleMethod::Auto, 3, 4).unwrap();
        assert!(output.resampler.is_some());
    }
}
