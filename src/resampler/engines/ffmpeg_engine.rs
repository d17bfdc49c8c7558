//! FFmpeg-backed engine, feature-gated behind `ffmpeg` (on by default).
//!
//! Deinterleaves to per-channel planar buffers, feeds `swresample`, and
//! re-interleaves — matching §4.3's description of this engine exactly.
//! `swr_convert` keeps its own internal delay line, so the "residual tail
//! between calls" the spec calls out is handled inside libswresample
//! itself; this wrapper only has to deinterleave/re-interleave.

#![cfg(feature = "ffmpeg")]

use ffmpeg_next::software::resampling::Context as SwrContext;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::{Sample as FfmpegSample, Type as SampleType};
use ffmpeg_next::util::frame::Audio as AudioFrame;

use super::RateEngine;
use crate::error::{Error, Result};

fn channel_layout(channels: usize) -> ChannelLayout {
    ChannelLayout::default(channels as i32)
}

pub struct FfmpegEngine {
    channels: usize,
    in_rate: u32,
    out_rate: u32,
    ctx: SwrContext,
}

impl FfmpegEngine {
    pub fn new(in_rate: u32, out_rate: u32, channels: usize) -> Result<Self> {
        let layout = channel_layout(channels);
        let ctx = SwrContext::get(
            FfmpegSample::F32(SampleType::Planar),
            layout,
            in_rate,
            FfmpegSample::F32(SampleType::Planar),
            layout,
            out_rate,
        )
        .map_err(|e| Error::ResamplerInit(e.to_string()))?;
        Ok(Self { channels, in_rate, out_rate, ctx })
    }

    fn make_input_frame(&self, input: &[f32], n_frames: usize) -> AudioFrame {
        let mut frame = AudioFrame::new(FfmpegSample::F32(SampleType::Planar), n_frames, channel_layout(self.channels));
        for c in 0..self.channels {
            let plane = frame.plane_mut::<f32>(c);
            for f in 0..n_frames {
                plane[f] = input[f * self.channels + c];
            }
        }
        frame
    }
}

impl RateEngine for FfmpegEngine {
    fn process(&mut self, input: &[f32], channels: usize, out: &mut Vec<f32>) -> Result<()> {
        debug_assert_eq!(channels, self.channels);
        let n_frames = input.len() / channels.max(1);
        let in_frame = self.make_input_frame(input, n_frames);

        let mut out_frame = AudioFrame::empty();
        self.ctx.run(&in_frame, &mut out_frame).map_err(|e| Error::ResamplerInit(e.to_string()))?;

        let produced = out_frame.samples();
        for f in 0..produced {
            for c in 0..self.channels {
                out.push(out_frame.plane::<f32>(c)[f]);
            }
        }
        Ok(())
    }

    fn request(&self, out_frames: usize) -> usize {
        ((out_frames as u64 * self.in_rate as u64) / self.out_rate.max(1) as u64) as usize + 32
    }

    fn set_rates(&mut self, in_rate: u32, out_rate: u32) -> Result<()> {
        *self = Self::new(in_rate, out_rate, self.channels)?;
        Ok(())
    }
}
