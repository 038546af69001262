use serde::{Deserialize, Serialize};

/// Scalar descriptors extracted from one completed analysis frame.
///
/// Immutable once produced; the analyzer hands a fresh value to the caller
/// per frame and retains nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameFeatures {
    /// RMS loudness over the frame, in decibels full scale.
    pub loudness_db: f32,
    /// Dominant in-band pitch estimate in Hz; 0 means no pitch detected.
    pub fundamental_hz: f32,
    /// Magnitude-weighted mean frequency across the spectrum, in Hz.
    pub centroid_hz: f32,
    /// Sign changes per second over the frame.
    pub zero_crossing_rate: f32,
    /// Geometric over arithmetic mean of the magnitude spectrum, 0 tonal .. 1 noisy.
    pub flatness: f32,
    /// Frequency below which 85% of spectral magnitude lies, in Hz.
    pub rolloff_hz: f32,
}

impl FrameFeatures {
    /// Features for a frame below the loudness gate: the measured loudness
    /// with every spectral descriptor zeroed.
    pub fn silent(loudness_db: f32) -> Self {
        Self {
            loudness_db,
            fundamental_hz: 0.0,
            centroid_hz: 0.0,
            zero_crossing_rate: 0.0,
            flatness: 0.0,
            rolloff_hz: 0.0,
        }
    }
}

/// Sign changes per second, counting a touch of exact zero as part of the
/// preceding run rather than a crossing of its own.
pub(crate) fn zero_crossing_rate(samples: &[f32], sample_rate: f32) -> f32 {
    if samples.len() < 2 || sample_rate <= 0.0 {
        return 0.0;
    }
    let mut crossings = 0u32;
    let mut prev = sanitize_sample(samples[0]);
    for &sample in &samples[1..] {
        let current = sanitize_sample(sample);
        let crossed = (prev >= 0.0 && current < 0.0) || (prev < 0.0 && current >= 0.0);
        if crossed && (prev != 0.0 || current != 0.0) {
            crossings += 1;
        }
        prev = current;
    }
    let duration = samples.len() as f32 / sample_rate;
    crossings as f32 / duration
}

pub(crate) fn sanitize_sample(sample: f32) -> f32 {
    if sample.is_finite() {
        sample.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
