//! End-to-end scenarios from spec.md §8.
//!
//! Each test builds the smallest real object graph the scenario needs (a
//! `Sink` with a stub `DeviceCollaborator`, or the memory/queue/resampler
//! pieces directly) rather than mocking the mixer itself, the way the
//! teacher's own integration tests drive a pipeline end to end instead of
//! unit-testing each stage in isolation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use resonance_core::channel::ChannelMap;
use resonance_core::collaborators::DeviceCollaborator;
use resonance_core::config::MixerTunables;
use resonance_core::error::Result;
use resonance_core::memory::{MemBlock, MemChunk, MemoryPool};
use resonance_core::mixer::{Sink, SilenceCache, SinkInput, SinkIoState};
use resonance_core::queue::QueueAttr;
use resonance_core::resampler::{ResampleFlags, ResampleMethod, Resampler};
use resonance_core::sample::{SampleFormat, SampleSpec};
use resonance_core::subscription::SubscriptionBus;
use resonance_core::test_support::{
    attach_sink_input, bytes_to_floats, floats_to_bytes, move_sink_input_direct, sink_input_has_resampler,
    sink_input_queue_len,
};

struct NullDevice {
    submitted: Mutex<Vec<u8>>,
}

impl NullDevice {
    fn new() -> Self {
        Self { submitted: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl DeviceCollaborator for NullDevice {
    async fn request_frames(&self, _frames: usize) -> Result<Option<MemChunk>> {
        Ok(None)
    }

    async fn submit(&self, chunk: MemChunk) -> Result<()> {
        self.submitted.lock().unwrap().extend_from_slice(&chunk.as_bytes());
        Ok(())
    }

    async fn get_latency(&self) -> Result<u64> {
        Ok(0)
    }
}

fn queue_attr() -> QueueAttr {
    QueueAttr { maxlength: 8 * 1024 * 1024, tlength: 65536, prebuf: 0, minreq: 256 }
}

fn test_sink(pool: &Arc<MemoryPool>, spec: SampleSpec, map: ChannelMap) -> Arc<Sink> {
    let silence = Arc::new(SilenceCache::new(Arc::clone(pool)));
    let bus = Arc::new(SubscriptionBus::new());
    let device = Arc::new(NullDevice::new());
    Sink::new(0, "test_sink", spec, map, Arc::clone(pool), silence, device, bus, MixerTunables::default()).unwrap()
}

#[test]
fn scenario_1_sine_into_sink_matches_expected_amplitude() {
    let sink_spec = SampleSpec::new(SampleFormat::S16LE, 44_100, 2).unwrap();
    let in_spec = SampleSpec::new(SampleFormat::Float32LE, 44_100, 1).unwrap();
    // One second of mono float32 is larger than the default 64KB pool
    // slot, so this test gets a pool sized for a single big block instead
    // of the per-tick sizes every other scenario uses.
    let pool = MemoryPool::new(200_000, 8).unwrap();
    let sink = test_sink(&pool, sink_spec, ChannelMap::stereo());

    let mut input =
        SinkInput::new(1, in_spec, ChannelMap::mono(), queue_attr(), &sink, ResampleMethod::Copy, 3, 4).unwrap();

    // 1 second of 440 Hz sine at half amplitude, mono, float32.
    let n_frames = 44_100usize;
    let samples: Vec<f32> =
        (0..n_frames).map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44_100.0).sin() / 2.0).collect();
    let bytes = floats_to_bytes(&samples, SampleFormat::Float32LE);
    let block = MemBlock::new_pool(&pool, &bytes).unwrap();
    input.push(MemChunk::new(block, 0, bytes.len())).unwrap();

    let mut io = SinkIoState::default();
    attach_sink_input(&mut io, input);

    let mut total_bytes = 0usize;
    let mut abs_sum = 0.0f64;
    let mut abs_count = 0u64;
    let period = 1024usize;
    let mut remaining = n_frames;
    while remaining > 0 {
        let n = remaining.min(period);
        let chunk = sink.mix_tick(&mut io, n).unwrap();
        total_bytes += chunk.length;
        for b in chunk.as_bytes().chunks_exact(2) {
            let s = i16::from_le_bytes([b[0], b[1]]);
            abs_sum += s.unsigned_abs() as f64;
            abs_count += 1;
        }
        remaining -= n;
    }

    // spec.md §8.1: exactly 44100*2*2 bytes submitted after 1 second of
    // stereo S16LE output (2 bytes/sample * 2 channels * 44100 frames).
    assert_eq!(total_bytes, 44_100 * 2 * 2);

    let avg_abs = abs_sum / abs_count as f64;
    let expected = 0.318 * 32767.0;
    assert!((avg_abs - expected).abs() / expected < 0.05, "avg_abs={avg_abs} expected~{expected}");
}

#[test]
fn scenario_2_upmix_mono_to_5_1_routes_identically_to_every_channel() {
    let sink_spec = SampleSpec::new(SampleFormat::S16LE, 8_000, 6).unwrap();
    let in_spec = SampleSpec::new(SampleFormat::U8, 8_000, 1).unwrap();
    let pool = MemoryPool::with_defaults().unwrap();
    let sink = test_sink(&pool, sink_spec, ChannelMap::surround_5_1());

    let mut input =
        SinkInput::new(1, in_spec, ChannelMap::mono(), queue_attr(), &sink, ResampleMethod::Copy, 3, 4).unwrap();
    assert!(sink_input_has_resampler(&input), "format differs (U8 vs S16LE) so a resampler must exist");

    let n_frames = 64usize;
    let u8_samples = vec![200u8; n_frames];
    let block = MemBlock::new_pool(&pool, &u8_samples).unwrap();
    input.push(MemChunk::new(block, 0, u8_samples.len())).unwrap();

    let mut io = SinkIoState::default();
    attach_sink_input(&mut io, input);
    let chunk = sink.mix_tick(&mut io, n_frames).unwrap();
    let samples: Vec<i16> =
        chunk.as_bytes().chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])).collect();

    // Mono "matches everything" in the remix's identity pass (§4.3 step
    // 1), so every one of the 6 output positions — including LFE — is
    // fully connected straight to the mono input with weight 1.0; none of
    // steps 2-8 (the partial-connection fallbacks) ever run.
    let frame0 = &samples[0..6];
    assert!(frame0[0] > 0, "channel should carry the upmixed signal, not silence");
    for &s in frame0.iter() {
        assert_eq!(s, frame0[0], "every channel should receive the identical mono-duplicated value");
    }
}

#[test]
fn scenario_3_resample_44100_to_48000_trivial_frame_mapping() {
    let in_spec = SampleSpec::new(SampleFormat::Float32LE, 44_100, 1).unwrap();
    let out_spec = SampleSpec::new(SampleFormat::Float32LE, 48_000, 1).unwrap();
    // One second of mono float32 input is larger than the default 64KB
    // pool slot; this test runs the whole thing through in one call, so
    // it needs a pool sized for that single block up front.
    let pool = MemoryPool::new(200_000, 4).unwrap();

    let mut resampler = Resampler::new(
        Arc::clone(&pool),
        in_spec,
        &ChannelMap::mono(),
        out_spec,
        &ChannelMap::mono(),
        ResampleMethod::Trivial,
        ResampleFlags::empty(),
        3,
        4,
    )
    .unwrap();

    let n_in = 44_100usize;
    // Distinct per-frame values so any output frame can be traced back to
    // the exact input frame it was copied from.
    let samples: Vec<f32> = (0..n_in).map(|i| i as f32).collect();
    let bytes = floats_to_bytes(&samples, SampleFormat::Float32LE);
    let block = MemBlock::new_pool(&pool, &bytes).unwrap();
    let chunk = MemChunk::new(block, 0, bytes.len());

    let out = resampler.run(&chunk).unwrap();
    let out_samples = bytes_to_floats(&out.as_bytes(), SampleFormat::Float32LE);

    assert!((out_samples.len() as i64 - 48_000).abs() <= 1);
    // spec.md §8.3: the 47999th (0-indexed) output frame corresponds to
    // input frame floor(47999 * 44100 / 48000) = 44099.
    if out_samples.len() > 47_999 {
        let expected_in_frame = (47_999u64 * 44_100 / 48_000) as usize;
        assert_eq!(out_samples[47_999] as usize, expected_in_frame);
    }
}

#[test]
fn scenario_4_queue_overflow_flushes_then_keeps_latest() {
    use resonance_core::queue::MemBlockQueue;

    let pool = MemoryPool::with_defaults().unwrap();
    let attr = QueueAttr { maxlength: 1024, tlength: 512, prebuf: 0, minreq: 64 };
    let mut q = MemBlockQueue::new(attr);
    q.set_silence_block(MemBlock::new_pool(&pool, &[0u8; 4096]).unwrap());

    let first = vec![1u8; 1024];
    let block1 = MemBlock::new_pool(&pool, &first).unwrap();
    q.push(MemChunk::new(block1, 0, 1024)).unwrap();

    let second = vec![2u8; 1024];
    let block2 = MemBlock::new_pool(&pool, &second).unwrap();
    q.push(MemChunk::new(block2, 0, 1024)).unwrap();

    assert!(q.length() <= 1024);
    let peeked = q.peek(1024).unwrap();
    assert!(peeked.as_bytes().iter().all(|&b| b == 2), "overflow must drop the earlier push, not the newer one");
}

#[test]
fn scenario_5_cross_process_revocation_reclaims_export_slot() {
    use resonance_core::memory::{import::LocalTransport, MemExport, MemImport};

    let pool = MemoryPool::with_defaults().unwrap();
    let export = Arc::new(MemExport::new(Arc::clone(&pool)));
    let block = MemBlock::new_pool(&pool, &[7u8; 16]).unwrap();
    let handle = export.export(Arc::clone(&block), 0, 16);
    assert_eq!(export.n_exported(), 1);

    let import = MemImport::new(Arc::new(LocalTransport::new(Arc::clone(&export))));
    let imported = import.import(handle).unwrap();
    assert_eq!(imported.read(0, 16), vec![7u8; 16]);

    // Importer process "dies": drop its cached handle and have both sides
    // revoke, the way a control-protocol peer-death notification would.
    drop(imported);
    import.revoke(handle.block_id);
    export.revoke(handle.block_id);
    assert_eq!(export.n_exported(), 0);

    // A subsequent export reuses the pool slot the revoked block held,
    // once the block itself is dropped too.
    drop(block);
    let block2 = MemBlock::new_pool(&pool, &[8u8; 16]).unwrap();
    let _handle2 = export.export(block2, 0, 16);
    assert_eq!(export.n_exported(), 1);
}

#[test]
fn scenario_6_move_input_across_sinks_preserves_queue_not_resampler_tail() {
    let spec_a = SampleSpec::new(SampleFormat::Float32LE, 48_000, 1).unwrap();
    let spec_b = SampleSpec::new(SampleFormat::Float32LE, 44_100, 1).unwrap();

    let pool = MemoryPool::with_defaults().unwrap();
    let sink_a = test_sink(&pool, spec_a, ChannelMap::mono());
    let sink_b = test_sink(&pool, spec_b, ChannelMap::mono());

    // 100ms of 48kHz mono audio queued against sink A.
    let n_frames = 4_800usize;
    let samples: Vec<f32> = vec![0.5; n_frames];
    let bytes = floats_to_bytes(&samples, SampleFormat::Float32LE);
    let queued_len = bytes.len();
    let mut input =
        SinkInput::new(1, spec_a, ChannelMap::mono(), queue_attr(), &sink_a, ResampleMethod::Copy, 3, 4).unwrap();
    let block = MemBlock::new_pool(&pool, &bytes).unwrap();
    input.push(MemChunk::new(block, 0, bytes.len())).unwrap();
    assert_eq!(sink_input_queue_len(&input), queued_len);
    assert!(!sink_input_has_resampler(&input), "48kHz input into a 48kHz mono sink needs no resampler yet");

    let mut io_a = SinkIoState::default();
    attach_sink_input(&mut io_a, input);

    let moved = move_sink_input_direct(&mut io_a, 1, &sink_b, ResampleMethod::Auto, 3, 4).unwrap();

    // Detached from sink A's I/O state entirely — no further mix tick on
    // A can deliver its frames.
    assert!(io_a.input_ids().is_empty());

    // Pending queued data survives the move (§4.4): same byte count still
    // queued, now addressed against sink B's 44.1kHz spec, which needs a
    // freshly built resampler with no inherited tail from sink A.
    assert_eq!(sink_input_queue_len(&moved), queued_len);
    assert!(sink_input_has_resampler(&moved));
}
