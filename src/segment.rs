//! Silence-gated segment accumulation.
//!
//! A segment is a contiguous span of sound bounded by silence on both
//! sides. The accumulator consumes one [`FrameFeatures`] per completed
//! analysis frame and keeps running sums while a segment is open; once the
//! tolerated run of silence is exhausted it emits the per-segment means and
//! returns to idle.

use serde::Serialize;

use crate::analysis::FrameFeatures;

/// Aggregated result of one completed segment.
///
/// Produced exactly once per segment. The accumulator resets its own state
/// immediately after emission, so the value is fully owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentResult {
    /// Arithmetic mean of each per-frame feature over the segment. The
    /// pitch mean covers only frames that carried an in-band pitch and is 0
    /// when no frame did; loudness covers every frame including the silent
    /// tail; the remaining descriptors cover the loud frames.
    pub means: FrameFeatures,
    /// Host transport position when the segment started, in seconds.
    pub started_at: f64,
    /// Host transport position when the segment ended, in seconds.
    pub ended_at: f64,
    /// Total frames folded into the segment, silent tail included.
    pub frames_accumulated: u32,
}

/// Explicit segment state: either waiting for sound or accumulating it.
enum State {
    Idle,
    Active(ActiveSegment),
}

struct ActiveSegment {
    started_at: f64,
    frames: u32,
    silence_run: u64,
    loudness_sum: f64,
    pitch_sum: f64,
    pitch_frames: u32,
    centroid_sum: f64,
    zcr_sum: f64,
    flatness_sum: f64,
    rolloff_sum: f64,
}

impl ActiveSegment {
    fn start(features: &FrameFeatures, pitch_band: (f32, f32), started_at: f64) -> Self {
        let mut segment = Self {
            started_at,
            frames: 0,
            silence_run: 0,
            loudness_sum: 0.0,
            pitch_sum: 0.0,
            pitch_frames: 0,
            centroid_sum: 0.0,
            zcr_sum: 0.0,
            flatness_sum: 0.0,
            rolloff_sum: 0.0,
        };
        segment.fold_loud(features, pitch_band);
        segment
    }

    fn fold_loud(&mut self, features: &FrameFeatures, pitch_band: (f32, f32)) {
        self.silence_run = 0;
        self.frames += 1;
        self.loudness_sum += features.loudness_db as f64;
        self.centroid_sum += features.centroid_hz as f64;
        self.zcr_sum += features.zero_crossing_rate as f64;
        self.flatness_sum += features.flatness as f64;
        self.rolloff_sum += features.rolloff_hz as f64;
        // Unvoiced frames must not drag the pitch average toward zero.
        let (min_hz, max_hz) = pitch_band;
        if features.fundamental_hz >= min_hz && features.fundamental_hz <= max_hz {
            self.pitch_sum += features.fundamental_hz as f64;
            self.pitch_frames += 1;
        }
    }

    fn fold_silent(&mut self, loudness_db: f32, frame_len_samples: u64) {
        self.silence_run += frame_len_samples;
        self.frames += 1;
        // The reported loudness reflects the true average including the
        // decaying tail; the other sums stay untouched.
        self.loudness_sum += loudness_db as f64;
    }

    fn finalize(&self, ended_at: f64) -> SegmentResult {
        let frames = self.frames.max(1) as f64;
        let fundamental_hz = if self.pitch_frames > 0 {
            (self.pitch_sum / self.pitch_frames as f64) as f32
        } else {
            0.0
        };
        SegmentResult {
            means: FrameFeatures {
                loudness_db: (self.loudness_sum / frames) as f32,
                fundamental_hz,
                centroid_hz: (self.centroid_sum / frames) as f32,
                zero_crossing_rate: (self.zcr_sum / frames) as f32,
                flatness: (self.flatness_sum / frames) as f32,
                rolloff_hz: (self.rolloff_sum / frames) as f32,
            },
            started_at: self.started_at,
            ended_at,
            frames_accumulated: self.frames,
        }
    }
}

/// Silence-gated state machine with running per-feature sums.
pub struct SegmentAccumulator {
    threshold_db: f32,
    silence_budget_samples: u64,
    pitch_band: (f32, f32),
    state: State,
}

impl SegmentAccumulator {
    pub fn new(
        threshold_db: f32,
        silence_budget_samples: u64,
        pitch_min_hz: f32,
        pitch_max_hz: f32,
    ) -> Self {
        Self {
            threshold_db,
            silence_budget_samples,
            pitch_band: (pitch_min_hz, pitch_max_hz),
            state: State::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active(_))
    }

    /// Consume one completed frame.
    ///
    /// `frame_len_samples` is the frame's length in samples (the silence
    /// budget is counted in samples, not frames) and `transport_secs` the
    /// host transport position for this block. Returns a result exactly
    /// when this frame ends a segment.
    pub fn update(
        &mut self,
        features: &FrameFeatures,
        frame_len_samples: usize,
        transport_secs: f64,
    ) -> Option<SegmentResult> {
        let loud = features.loudness_db >= self.threshold_db;
        match &mut self.state {
            State::Idle => {
                if loud {
                    self.state = State::Active(ActiveSegment::start(
                        features,
                        self.pitch_band,
                        transport_secs,
                    ));
                }
                None
            }
            State::Active(segment) => {
                if loud {
                    segment.fold_loud(features, self.pitch_band);
                    return None;
                }
                segment.fold_silent(features.loudness_db, frame_len_samples as u64);
                if segment.silence_run < self.silence_budget_samples {
                    return None;
                }
                let result = segment.finalize(transport_secs);
                self.state = State::Idle;
                Some(result)
            }
        }
    }

    /// Return to idle, abandoning any open segment without emission.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }
}
