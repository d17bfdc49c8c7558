//! The libsamplerate-class engine, backed by the `soxr` crate — the same
//! dependency the original codebase already used for its resampling node.

use soxr::format::{Mono, Stereo};
use soxr::params::{QualityRecipe, QualitySpec, RuntimeSpec};
use soxr::Soxr;

use super::RateEngine;
use crate::error::{Error, Result};

fn quality_recipe(quality: u8) -> QualityRecipe {
    match quality {
        0..=2 => QualityRecipe::Low,
        3..=5 => QualityRecipe::Medium,
        6..=8 => QualityRecipe::high(),
        _ => QualityRecipe::very_high(),
    }
}

enum Inner {
    Mono(Soxr<Mono<f32>>),
    Stereo(Soxr<Stereo<f32>>),
    /// Channel counts other than 1 or 2 run one mono instance per
    /// channel; `soxr`'s typed format API only ships Mono/Stereo shapes.
    Multi(Vec<Soxr<Mono<f32>>>),
}

pub struct SoxrEngine {
    in_rate: f64,
    out_rate: f64,
    quality: u8,
    channels: usize,
    inner: Inner,
}

impl SoxrEngine {
    pub fn new(in_rate: u32, out_rate: u32, channels: usize, quality: u8) -> Result<Self> {
        let inner = Self::build_inner(in_rate, out_rate, channels, quality)?;
        Ok(Self { in_rate: in_rate as f64, out_rate: out_rate as f64, quality, channels, inner })
    }

    fn build_inner(in_rate: u32, out_rate: u32, channels: usize, quality: u8) -> Result<Inner> {
        let recipe = quality_recipe(quality);
        let qspec = QualitySpec::new(recipe);
        let rt = RuntimeSpec::default();
        match channels {
            1 => Soxr::<Mono<f32>>::new_with_params(in_rate as f64, out_rate as f64, qspec, rt)
                .map(Inner::Mono)
                .map_err(|e| Error::ResamplerInit(e.to_string())),
            2 => Soxr::<Stereo<f32>>::new_with_params(in_rate as f64, out_rate as f64, qspec, rt)
                .map(Inner::Stereo)
                .map_err(|e| Error::ResamplerInit(e.to_string())),
            n => {
                let mut engines = Vec::with_capacity(n);
                for _ in 0..n {
                    let qspec = QualitySpec::new(recipe);
                    let rt = RuntimeSpec::default();
                    engines.push(
                        Soxr::<Mono<f32>>::new_with_params(in_rate as f64, out_rate as f64, qspec, rt)
                            .map_err(|e| Error::ResamplerInit(e.to_string()))?,
                    );
                }
                Ok(Inner::Multi(engines))
            }
        }
    }
}

impl RateEngine for SoxrEngine {
    fn process(&mut self, input: &[f32], channels: usize, out: &mut Vec<f32>) -> Result<()> {
        debug_assert_eq!(channels, self.channels);
        let n_frames = input.len() / channels.max(1);
        match &mut self.inner {
            Inner::Mono(soxr) => {
                let frames: Vec<[f32; 1]> = input.iter().map(|&s| [s]).collect();
                let mut output = vec![[0.0f32; 1]; n_frames + 16];
                let written = soxr.process(&frames, &mut output).map_err(|e| Error::ResamplerInit(e.to_string()))?;
                out.extend(output.into_iter().take(written).map(|f| f[0]));
            }
            Inner::Stereo(soxr) => {
                let frames: Vec<[f32; 2]> =
                    (0..n_frames).map(|f| [input[f * 2], input[f * 2 + 1]]).collect();
                let mut output = vec![[0.0f32; 2]; n_frames + 16];
                let written = soxr.process(&frames, &mut output).map_err(|e| Error::ResamplerInit(e.to_string()))?;
                for frame in output.into_iter().take(written) {
                    out.extend_from_slice(&frame);
                }
            }
            Inner::Multi(engines) => {
                let mut per_channel_out: Vec<Vec<f32>> = vec![Vec::new(); channels];
                for (c, soxr) in engines.iter_mut().enumerate() {
                    let frames: Vec<[f32; 1]> = (0..n_frames).map(|f| [input[f * channels + c]]).collect();
                    let mut output = vec![[0.0f32; 1]; n_frames + 16];
                    let written = soxr.process(&frames, &mut output).map_err(|e| Error::ResamplerInit(e.to_string()))?;
                    per_channel_out[c] = output.into_iter().take(written).map(|f| f[0]).collect();
                }
                let out_frames = per_channel_out.iter().map(|v| v.len()).min().unwrap_or(0);
                for f in 0..out_frames {
                    for ch in per_channel_out.iter() {
                        out.push(ch[f]);
                    }
                }
            }
        }
        Ok(())
    }

    fn request(&self, out_frames: usize) -> usize {
        ((out_frames as f64 * self.in_rate / self.out_rate.max(1.0)).ceil() as usize) + 16
    }

    fn set_rates(&mut self, in_rate: u32, out_rate: u32) -> Result<()> {
        self.inner = Self::build_inner(in_rate, out_rate, self.channels, self.quality)?;
        self.in_rate = in_rate as f64;
        self.out_rate = out_rate as f64;
        Ok(())
    }
}
