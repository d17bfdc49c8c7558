//! Identity engine used when input and output rates are equal and no
//! variable-rate flag was requested (§4.3 "Method fixups").

use super::RateEngine;
use crate::error::Result;

#[derive(Debug, Default)]
pub struct CopyEngine;

impl RateEngine for CopyEngine {
    fn process(&mut self, input: &[f32], _channels: usize, out: &mut Vec<f32>) -> Result<()> {
        out.extend_from_slice(input);
        Ok(())
    }

    fn request(&self, out_frames: usize) -> usize {
        out_frames
    }

    fn set_rates(&mut self, in_rate: u32, out_rate: u32) -> Result<()> {
        debug_assert_eq!(in_rate, out_rate, "CopyEngine requires identical rates");
        Ok(())
    }
}
