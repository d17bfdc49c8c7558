//! Sample-format conversion, channel remap, and rate conversion — §4.3.

mod companding;
pub mod engines;
pub mod remix;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::channel::ChannelMap;
use crate::error::{Error, Result};
use crate::memory::{MemBlock, MemChunk, MemoryPool};
use crate::sample::{SampleFormat, SampleSpec};

pub use engines::RateEngine;
pub use remix::ResampleFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResampleMethod {
    Auto,
    LibSampleRate,
    SpeexFloat,
    SpeexFixed,
    Ffmpeg,
    Trivial,
    Copy,
}

/// The common sample representation every pipeline stage hands to the
/// next — always S16NE or FLOAT32NE, per §4.3's work-format rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkFormat {
    S16,
    Float32,
    /// Work format equals the input format verbatim (trivial/copy with an
    /// identity channel mapping: no conversion crossing needed at all).
    Passthrough(SampleFormat),
}

/// `Passthrough` is only chosen for the genuine no-op case — same format on
/// both sides, identity channel map, and a method (`Copy`) that by
/// construction (see `fixup_method`) never runs with differing rates — so
/// `run` can skip conversion entirely and forward the input bytes
/// unchanged. `Trivial` with an identity map can still change the sample
/// rate, and `Copy`/`Trivial` with a format change still need encode/decode,
/// so neither of those qualifies for the raw-byte fast path.
fn choose_work_format(method: ResampleMethod, in_spec: &SampleSpec, out_spec: &SampleSpec, identity_map: bool) -> WorkFormat {
    match method {
        ResampleMethod::SpeexFixed | ResampleMethod::Ffmpeg => WorkFormat::S16,
        ResampleMethod::Copy if identity_map && in_spec.format == out_spec.format => {
            WorkFormat::Passthrough(in_spec.format)
        }
        _ => {
            if !in_spec.format.is_float() {
                WorkFormat::S16
            } else {
                WorkFormat::Float32
            }
        }
    }
}

/// Method fixups — §4.3 "Method fixups".
fn fixup_method(method: ResampleMethod, in_spec: &SampleSpec, out_spec: &SampleSpec, flags: ResampleFlags) -> ResampleMethod {
    let variable_rate = flags.contains(ResampleFlags::VARIABLE_RATE);
    let same_rate = in_spec.rate == out_spec.rate;

    if same_rate && !variable_rate {
        return ResampleMethod::Copy;
    }
    match method {
        ResampleMethod::Copy if variable_rate || !same_rate => ResampleMethod::Auto,
        ResampleMethod::Ffmpeg if variable_rate => ResampleMethod::Auto,
        ResampleMethod::Auto => ResampleMethod::SpeexFloat,
        other => other,
    }
}

fn build_engine(
    method: ResampleMethod,
    in_rate: u32,
    out_rate: u32,
    channels: usize,
    speex_quality: u8,
    samplerate_quality: u8,
) -> Result<Box<dyn RateEngine>> {
    match method {
        ResampleMethod::Copy => Ok(Box::new(engines::copy::CopyEngine)),
        ResampleMethod::Trivial => Ok(Box::new(engines::trivial::TrivialEngine::new(in_rate, out_rate))),
        ResampleMethod::SpeexFloat => {
            Ok(Box::new(engines::speex::SpeexFloatEngine::new(in_rate, out_rate, speex_quality)?))
        }
        ResampleMethod::SpeexFixed => {
            Ok(Box::new(engines::speex::SpeexFixedEngine::new(in_rate, out_rate, speex_quality)?))
        }
        ResampleMethod::LibSampleRate => {
            Ok(Box::new(engines::soxr_engine::SoxrEngine::new(in_rate, out_rate, channels, samplerate_quality)?))
        }
        #[cfg(feature = "ffmpeg")]
        ResampleMethod::Ffmpeg => Ok(Box::new(engines::ffmpeg_engine::FfmpegEngine::new(in_rate, out_rate, channels)?)),
        #[cfg(not(feature = "ffmpeg"))]
        ResampleMethod::Ffmpeg => Err(Error::ResamplerInit("ffmpeg engine not compiled in".into())),
        ResampleMethod::Auto => unreachable!("fixup_method never leaves Auto unresolved"),
    }
}

/// Converts a PCM buffer between sample formats, always through a float
/// intermediate except for the identity no-op case. `pub(crate)` so the
/// mixer's render path can decode/encode a sink-input or sink's native
/// format without routing every unresampled stream through a resampler.
pub(crate) fn convert_to_float(data: &[u8], format: SampleFormat) -> Vec<f32> {
    let le = format.is_le();
    match format {
        SampleFormat::Float32LE | SampleFormat::Float32BE => data
            .chunks_exact(4)
            .map(|b| {
                let raw = [b[0], b[1], b[2], b[3]];
                if le { f32::from_le_bytes(raw) } else { f32::from_be_bytes(raw) }
            })
            .collect(),
        SampleFormat::S16LE | SampleFormat::S16BE => data
            .chunks_exact(2)
            .map(|b| {
                let raw = [b[0], b[1]];
                let sample = if le { i16::from_le_bytes(raw) } else { i16::from_be_bytes(raw) };
                sample as f32 / 32768.0
            })
            .collect(),
        SampleFormat::S32LE | SampleFormat::S32BE => data
            .chunks_exact(4)
            .map(|b| {
                let raw = [b[0], b[1], b[2], b[3]];
                let sample = if le { i32::from_le_bytes(raw) } else { i32::from_be_bytes(raw) };
                sample as f32 / 2_147_483_648.0
            })
            .collect(),
        SampleFormat::U8 => data.iter().map(|&b| (b as f32 - 128.0) / 128.0).collect(),
        SampleFormat::ALaw => data.iter().map(|&b| companding::alaw_to_linear(b) as f32 / 32768.0).collect(),
        SampleFormat::MuLaw => data.iter().map(|&b| companding::ulaw_to_linear(b) as f32 / 32768.0).collect(),
    }
}

pub(crate) fn convert_from_float(samples: &[f32], format: SampleFormat) -> Vec<u8> {
    let le = format.is_le();
    match format {
        SampleFormat::Float32LE | SampleFormat::Float32BE => samples
            .iter()
            .flat_map(|s| if le { s.to_le_bytes() } else { s.to_be_bytes() })
            .collect(),
        SampleFormat::S16LE | SampleFormat::S16BE => samples
            .iter()
            .flat_map(|s| {
                let sample = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
                if le { sample.to_le_bytes() } else { sample.to_be_bytes() }
            })
            .collect(),
        SampleFormat::S32LE | SampleFormat::S32BE => samples
            .iter()
            .flat_map(|s| {
                let sample = (s.clamp(-1.0, 1.0) * 2_147_483_647.0) as i32;
                if le { sample.to_le_bytes() } else { sample.to_be_bytes() }
            })
            .collect(),
        SampleFormat::U8 => samples.iter().map(|s| ((s.clamp(-1.0, 1.0) * 127.0) + 128.0) as u8).collect(),
        SampleFormat::ALaw => samples
            .iter()
            .map(|s| companding::linear_to_alaw((s.clamp(-1.0, 1.0) * 32767.0) as i16))
            .collect(),
        SampleFormat::MuLaw => samples
            .iter()
            .map(|s| companding::linear_to_ulaw((s.clamp(-1.0, 1.0) * 32767.0) as i16))
            .collect(),
    }
}

fn to_s16(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16).collect()
}

fn from_s16(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// The resampler object — §4.3 "Contract".
pub struct Resampler {
    pool: Arc<MemoryPool>,
    in_spec: SampleSpec,
    out_spec: SampleSpec,
    method: ResampleMethod,
    flags: ResampleFlags,
    work_format: WorkFormat,
    map_table: remix::MapTable,
    engine: Box<dyn RateEngine>,
}

impl Resampler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Arc<MemoryPool>,
        in_spec: SampleSpec,
        in_map: &ChannelMap,
        out_spec: SampleSpec,
        out_map: &ChannelMap,
        method: ResampleMethod,
        flags: ResampleFlags,
        speex_quality: u8,
        samplerate_quality: u8,
    ) -> Result<Self> {
        in_spec.validate()?;
        out_spec.validate()?;
        in_map.validate(in_spec.channels)?;
        out_map.validate(out_spec.channels)?;

        let method = fixup_method(method, &in_spec, &out_spec, flags);
        let map_table = remix::build_map_table(in_map, out_map, flags);
        let identity_map = in_spec.channels == out_spec.channels
            && map_table.iter().enumerate().all(|(o, row)| {
                row.iter().enumerate().all(|(i, &w)| if i == o { (w - 1.0).abs() < 1e-6 } else { w == 0.0 })
            });
        let work_format = choose_work_format(method, &in_spec, &out_spec, identity_map);

        let engine = build_engine(
            method,
            in_spec.rate,
            out_spec.rate,
            out_spec.channels as usize,
            speex_quality,
            samplerate_quality,
        )?;

        Ok(Self { pool, in_spec, out_spec, method, flags, work_format, map_table, engine })
    }

    pub fn method(&self) -> ResampleMethod {
        self.method
    }

    pub fn work_format(&self) -> WorkFormat {
        self.work_format
    }

    /// Conservative estimate of input bytes needed to produce `out_len`
    /// output bytes.
    pub fn request(&self, out_len: usize) -> usize {
        let out_frames = self.out_spec.bytes_to_frames(out_len);
        let in_frames = self.engine.request(out_frames);
        self.in_spec.frames_to_bytes(in_frames)
    }

    pub fn set_input_rate(&mut self, rate: u32) -> Result<()> {
        if !self.flags.contains(ResampleFlags::VARIABLE_RATE) {
            return Err(Error::InvalidSpec("set_input_rate requires VARIABLE_RATE flag".into()));
        }
        self.in_spec.rate = rate;
        self.engine.set_rates(self.in_spec.rate, self.out_spec.rate)
    }

    pub fn set_output_rate(&mut self, rate: u32) -> Result<()> {
        if !self.flags.contains(ResampleFlags::VARIABLE_RATE) {
            return Err(Error::InvalidSpec("set_output_rate requires VARIABLE_RATE flag".into()));
        }
        self.out_spec.rate = rate;
        self.engine.set_rates(self.in_spec.rate, self.out_spec.rate)
    }

    /// Run the full pipeline: `to_work_format -> remap_channels ->
    /// resample_rate -> from_work_format`. When `work_format` is
    /// `Passthrough` the whole pipeline is skipped — input and output spec
    /// and channel map are identical, so the input bytes are forwarded
    /// unchanged, preserving every bit regardless of sample format (§8 P5).
    pub fn run(&mut self, input: &MemChunk) -> Result<MemChunk> {
        let raw = input.as_bytes();

        if let WorkFormat::Passthrough(_) = self.work_format {
            let block = MemBlock::new_pool(&self.pool, &raw)?;
            return Ok(MemChunk::new(block, 0, raw.len()));
        }

        // to_work_format
        let float_in = match self.work_format {
            WorkFormat::Passthrough(_) => unreachable!("handled by the early return above"),
            WorkFormat::S16 => from_s16(&to_s16(&convert_to_float(&raw, self.in_spec.format))),
            WorkFormat::Float32 => convert_to_float(&raw, self.in_spec.format),
        };

        // remap_channels
        let n_in_frames = float_in.len() / self.in_spec.channels as usize;
        let mut remapped = vec![0.0f32; n_in_frames * self.out_spec.channels as usize];
        for f in 0..n_in_frames {
            let in_frame = &float_in[f * self.in_spec.channels as usize..(f + 1) * self.in_spec.channels as usize];
            let out_frame =
                &mut remapped[f * self.out_spec.channels as usize..(f + 1) * self.out_spec.channels as usize];
            remix::apply_frame(&self.map_table, in_frame, out_frame);
        }

        // resample_rate
        let mut resampled = Vec::new();
        self.engine.process(&remapped, self.out_spec.channels as usize, &mut resampled)?;

        // from_work_format
        let out_bytes = match self.work_format {
            WorkFormat::Passthrough(_) => unreachable!("handled by the early return above"),
            WorkFormat::S16 | WorkFormat::Float32 => convert_from_float(&resampled, self.out_spec.format),
        };

        let block = MemBlock::new_pool(&self.pool, &out_bytes)?;
        Ok(MemChunk::new(block, 0, out_bytes.len()))
    }
}
