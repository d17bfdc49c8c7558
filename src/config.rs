//! Runtime tunables.
//!
//! `Tunables` is plain data: this crate never reads a config file itself,
//! an embedder parses one (YAML, JSON, whatever) with `serde` and hands
//! the result to [`crate::mixer`]/[`crate::memory`] constructors.

use serde::{Deserialize, Serialize};

use crate::memory::pool::{DEFAULT_SLOTS, DEFAULT_SLOT_SIZE};
use crate::resampler::ResampleMethod;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolTunables {
    pub slot_size: usize,
    pub n_slots: u32,
}

impl Default for PoolTunables {
    fn default() -> Self {
        Self { slot_size: DEFAULT_SLOT_SIZE, n_slots: DEFAULT_SLOTS }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueTunables {
    /// Maximum queue length in bytes before overflow handling kicks in.
    pub maxlength: usize,
    /// Target fill level a writer aims to maintain.
    pub tlength: usize,
    /// Bytes that must accumulate before playback starts.
    pub prebuf: usize,
    /// Minimum request size reported to a writer.
    pub minreq: usize,
}

impl Default for QueueTunables {
    fn default() -> Self {
        Self { maxlength: 4 * 1024 * 1024, tlength: 512 * 1024, prebuf: 256 * 1024, minreq: 4096 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResamplerTunables {
    pub default_method: ResampleMethod,
    /// libsamplerate-class engine quality, 0 (fastest) to 10 (best).
    pub samplerate_quality: u8,
    /// Speex engine quality, 0 to 10.
    pub speex_quality: u8,
}

impl Default for ResamplerTunables {
    fn default() -> Self {
        Self { default_method: ResampleMethod::Auto, samplerate_quality: 4, speex_quality: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTunables {
    /// How long an unused sample-cache entry is kept before idle eviction.
    pub idle_timeout_secs: u64,
    /// How often the idle-eviction sweep runs — §4.5 "a periodic timer
    /// (2 s default) walks lazy entries".
    pub sweep_interval_secs: u64,
}

impl Default for CacheTunables {
    fn default() -> Self {
        Self { idle_timeout_secs: 300, sweep_interval_secs: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerTunables {
    /// Frames assembled per sink/source I/O thread tick.
    pub period_frames: usize,
    /// How long a device call may run before the sink is forced into
    /// `Suspended` and a subscription event is raised — §5 "Cancellation/
    /// timeouts".
    pub device_deadline_ms: u64,
}

impl Default for MixerTunables {
    fn default() -> Self {
        Self { period_frames: 1024, device_deadline_ms: 2000 }
    }
}

/// Top-level tunables an embedder loads once at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub pool: PoolTunables,
    pub queue: QueueTunables,
    pub resampler: ResamplerTunables,
    pub cache: CacheTunables,
    pub mixer: MixerTunables,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_yaml() {
        let tunables = Tunables::default();
        let yaml = serde_yaml::to_string(&tunables).unwrap();
        let back: Tunables = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.pool.n_slots, tunables.pool.n_slots);
        assert_eq!(back.resampler.default_method, tunables.resampler.default_method);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let partial = "pool:\n  n_slots: 256\n";
        let tunables: Tunables = serde_yaml::from_str(partial).unwrap();
        assert_eq!(tunables.pool.n_slots, 256);
        assert_eq!(tunables.pool.slot_size, DEFAULT_SLOT_SIZE);
        assert_eq!(tunables.queue.maxlength, QueueTunables::default().maxlength);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let partial = r#"{"mixer": {"period_frames": 2048}}"#;
        let tunables: Tunables = serde_json::from_str(partial).unwrap();
        assert_eq!(tunables.mixer.period_frames, 2048);
        assert_eq!(tunables.cache.idle_timeout_secs, CacheTunables::default().idle_timeout_secs);
    }
}
