use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where and how aggregated results leave the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Collector endpoint receiving the JSON payload.
    pub endpoint: String,
    /// Reporting policy.
    pub mode: ReportMode,
    /// Wall-clock period between continuous-mode posts, in milliseconds.
    pub publish_period_ms: u64,
}

/// Reporting policy for the background publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportMode {
    /// Post the latest per-frame snapshot on a fixed period, last-value-wins.
    Continuous,
    /// Post exactly one message per completed segment.
    PerSegment,
}

impl PublisherConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.publish_period_ms.max(1))
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9091/api/audio".to_string(),
            mode: ReportMode::PerSegment,
            publish_period_ms: 100,
        }
    }
}

/// Analysis and segmentation parameters.
///
/// Defaults mirror the tracker's tuned values: a 4096-sample window, a
/// −50 dB silence threshold, half a second of tolerated silence at
/// 44.1 kHz, and a 60–600 Hz plausible pitch band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Analysis window length in samples; must be a power of two.
    pub window_size: usize,
    /// Frames at or above this loudness count as sound, below as silence.
    pub loudness_threshold_db: f32,
    /// Run of consecutive silent samples that ends a segment.
    pub silence_budget_samples: u64,
    /// Lower edge of the plausible pitch band.
    pub pitch_min_hz: f32,
    /// Upper edge of the plausible pitch band.
    pub pitch_max_hz: f32,
    /// Minimum in-band spectral magnitude for a pitch to be reported.
    pub pitch_noise_floor: f32,
    /// Reporting configuration.
    pub publisher: PublisherConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_size: 4096,
            loudness_threshold_db: -50.0,
            silence_budget_samples: 22_050,
            pitch_min_hz: 60.0,
            pitch_max_hz: 600.0,
            pitch_noise_floor: 1e-3,
            publisher: PublisherConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let config = EngineConfig::default();
        let text = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn publish_period_is_never_zero() {
        let config = PublisherConfig {
            publish_period_ms: 0,
            ..PublisherConfig::default()
        };
        assert!(config.period() >= Duration::from_millis(1));
    }
}
