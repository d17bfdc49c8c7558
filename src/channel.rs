//! Channel positions and channel maps, used by the resampler's remix stage
//! (§4.3 "Channel remix algorithm").

use crate::sample::CHANNELS_MAX;
use serde::{Deserialize, Serialize};

/// A named speaker position. `Mono` is special: it "matches everything" in
/// the identity pass of the remix algorithm (§4.3 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelPosition {
    Mono,
    FrontLeft,
    FrontRight,
    FrontCenter,
    LowFrequency,
    RearLeft,
    RearRight,
    RearCenter,
    SideLeft,
    SideRight,
    Aux(u8),
}

impl ChannelPosition {
    pub fn is_left(self) -> bool {
        matches!(self, ChannelPosition::FrontLeft | ChannelPosition::RearLeft | ChannelPosition::SideLeft)
    }

    pub fn is_right(self) -> bool {
        matches!(self, ChannelPosition::FrontRight | ChannelPosition::RearRight | ChannelPosition::SideRight)
    }

    pub fn is_center(self) -> bool {
        matches!(self, ChannelPosition::FrontCenter | ChannelPosition::RearCenter)
    }

    pub fn is_lfe(self) -> bool {
        matches!(self, ChannelPosition::LowFrequency)
    }
}

/// An ordered list of channel positions, one per channel of a `SampleSpec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMap {
    positions: Vec<ChannelPosition>,
}

impl ChannelMap {
    pub fn new(positions: Vec<ChannelPosition>) -> Self {
        Self { positions }
    }

    pub fn mono() -> Self {
        Self { positions: vec![ChannelPosition::Mono] }
    }

    pub fn stereo() -> Self {
        Self { positions: vec![ChannelPosition::FrontLeft, ChannelPosition::FrontRight] }
    }

    /// Standard ITU 5.1: FL, FR, FC, LFE, RL, RR.
    pub fn surround_5_1() -> Self {
        Self {
            positions: vec![
                ChannelPosition::FrontLeft,
                ChannelPosition::FrontRight,
                ChannelPosition::FrontCenter,
                ChannelPosition::LowFrequency,
                ChannelPosition::RearLeft,
                ChannelPosition::RearRight,
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn as_slice(&self) -> &[ChannelPosition] {
        &self.positions
    }

    pub fn validate(&self, channels: u8) -> crate::error::Result<()> {
        if self.positions.len() != channels as usize {
            return Err(crate::error::Error::InvalidSpec(format!(
                "channel map has {} positions, spec declares {} channels",
                self.positions.len(),
                channels
            )));
        }
        if self.positions.len() > CHANNELS_MAX as usize {
            return Err(crate::error::Error::InvalidSpec("channel map exceeds CHANNELS_MAX".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_has_two_positions() {
        let map = ChannelMap::stereo();
        assert_eq!(map.len(), 2);
        assert!(map.as_slice()[0].is_left());
        assert!(map.as_slice()[1].is_right());
    }

    #[test]
    fn validate_checks_length() {
        let map = ChannelMap::stereo();
        assert!(map.validate(2).is_ok());
        assert!(map.validate(1).is_err());
    }
}
