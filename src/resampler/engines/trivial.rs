//! Nearest-neighbor engine — §4.3: "for each output frame index `o`,
//! select input frame `floor(o * in_rate / out_rate)` and memcpy one
//! frame. Counters are reduced modulo the rates to avoid overflow."

use super::RateEngine;
use crate::error::Result;

pub struct TrivialEngine {
    in_rate: u64,
    out_rate: u64,
    /// `o * in_rate` reduced modulo `out_rate`, carried across calls so
    /// the frame selection is continuous at buffer boundaries.
    phase: u64,
}

impl TrivialEngine {
    pub fn new(in_rate: u32, out_rate: u32) -> Self {
        Self { in_rate: in_rate as u64, out_rate: out_rate as u64, phase: 0 }
    }
}

impl RateEngine for TrivialEngine {
    fn process(&mut self, input: &[f32], channels: usize, out: &mut Vec<f32>) -> Result<()> {
        if channels == 0 || self.out_rate == 0 {
            return Ok(());
        }
        let n_in_frames = input.len() / channels;
        if n_in_frames == 0 {
            return Ok(());
        }

        loop {
            let in_frame = self.phase / self.out_rate;
            if in_frame >= n_in_frames as u64 {
                self.phase -= n_in_frames as u64 * self.out_rate;
                break;
            }
            let base = in_frame as usize * channels;
            out.extend_from_slice(&input[base..base + channels]);
            self.phase += self.in_rate;
        }
        Ok(())
    }

    fn request(&self, out_frames: usize) -> usize {
        ((out_frames as u64 * self.in_rate) / self.out_rate.max(1)) as usize + 1
    }

    fn set_rates(&mut self, in_rate: u32, out_rate: u32) -> Result<()> {
        self.in_rate = in_rate as u64;
        self.out_rate = out_rate as u64;
        self.phase = 0;
        Ok(())
    }
}
