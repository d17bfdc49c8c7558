//! Sample format and sample spec — §6 "Sample spec".

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Sample encoding. Mirrors the PCM formats a device collaborator is
/// expected to negotiate; the core never interprets ALAW/ULAW samples
/// itself beyond their declared size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    U8,
    ALaw,
    MuLaw,
    S16LE,
    S16BE,
    Float32LE,
    Float32BE,
    S32LE,
    S32BE,
}

impl SampleFormat {
    /// Size in bytes of one sample in this format.
    pub const fn sample_size(self) -> usize {
        match self {
            SampleFormat::U8 | SampleFormat::ALaw | SampleFormat::MuLaw => 1,
            SampleFormat::S16LE | SampleFormat::S16BE => 2,
            SampleFormat::Float32LE | SampleFormat::Float32BE | SampleFormat::S32LE | SampleFormat::S32BE => 4,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, SampleFormat::Float32LE | SampleFormat::Float32BE)
    }

    pub const fn is_le(self) -> bool {
        !matches!(self, SampleFormat::S16BE | SampleFormat::Float32BE | SampleFormat::S32BE)
    }
}

/// The maximum channel count a `SampleSpec` may declare (§6: channels in [1,32]).
pub const CHANNELS_MAX: u8 = 32;

/// The maximum sample rate a `SampleSpec` may declare (§6: rate in (0, 192000]).
pub const RATE_MAX: u32 = 192_000;

/// `{format, rate, channels}` triple. Equality is per-field (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSpec {
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: u8,
}

impl SampleSpec {
    pub fn new(format: SampleFormat, rate: u32, channels: u8) -> Result<Self> {
        let spec = Self { format, rate, channels };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate == 0 || self.rate > RATE_MAX {
            return Err(Error::InvalidSpec(format!(
                "sample rate {} out of range (0, {}]",
                self.rate, RATE_MAX
            )));
        }
        if self.channels == 0 || self.channels > CHANNELS_MAX {
            return Err(Error::InvalidSpec(format!(
                "channel count {} out of range [1, {}]",
                self.channels, CHANNELS_MAX
            )));
        }
        Ok(())
    }

    /// Frame size = sample_size(format) × channels.
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.format.sample_size() * self.channels as usize
    }

    /// Bytes per second = rate × frame_size.
    #[inline]
    pub fn bytes_per_second(&self) -> usize {
        self.rate as usize * self.frame_size()
    }

    /// Number of frames represented by `bytes`, rounding down.
    #[inline]
    pub fn bytes_to_frames(&self, bytes: usize) -> usize {
        bytes / self.frame_size()
    }

    #[inline]
    pub fn frames_to_bytes(&self, frames: usize) -> usize {
        frames * self.frame_size()
    }

    /// Duration, in bytes, corresponding to `usecs` microseconds at this spec.
    pub fn usec_to_bytes(&self, usecs: u64) -> usize {
        let bytes_per_usec = self.bytes_per_second() as f64 / 1_000_000.0;
        (usecs as f64 * bytes_per_usec).round() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_stereo_s16() {
        let spec = SampleSpec::new(SampleFormat::S16LE, 44_100, 2).unwrap();
        assert_eq!(spec.frame_size(), 4);
        assert_eq!(spec.bytes_per_second(), 176_400);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(SampleSpec::new(SampleFormat::S16LE, 0, 2).is_err());
        assert!(SampleSpec::new(SampleFormat::S16LE, 44_100, 0).is_err());
        assert!(SampleSpec::new(SampleFormat::S16LE, 44_100, 33).is_err());
        assert!(SampleSpec::new(SampleFormat::S16LE, 200_000, 2).is_err());
    }
}
