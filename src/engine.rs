use crate::analysis::{FrameFeatures, SpectralAnalyzer};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::publish::{MetricsPublisher, Snapshot};
use crate::segment::SegmentAccumulator;

/// Facade the host drives once per audio block.
///
/// Owns the whole pipeline: mono mixdown, frame buffering, feature
/// extraction, segmentation, and handoff to the background publisher.
/// `process` performs no allocation and no I/O; everything unbounded lives
/// on the publisher thread.
pub struct Engine {
    config: EngineConfig,
    analyzer: SpectralAnalyzer,
    accumulator: SegmentAccumulator,
    publisher: Option<MetricsPublisher>,
    mono: Vec<f32>,
    playhead_secs: f64,
    activated: bool,
}

impl Engine {
    /// Build the pipeline. Fails only on unusable configuration; the
    /// engine is inert until [`Engine::activate`].
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let analyzer = SpectralAnalyzer::new(
            config.window_size,
            config.pitch_min_hz,
            config.pitch_max_hz,
            config.pitch_noise_floor,
        )?;
        let accumulator = SegmentAccumulator::new(
            config.loudness_threshold_db,
            config.silence_budget_samples,
            config.pitch_min_hz,
            config.pitch_max_hz,
        );
        Ok(Self {
            config,
            analyzer,
            accumulator,
            publisher: None,
            mono: Vec::new(),
            playhead_secs: 0.0,
            activated: false,
        })
    }

    /// Prepare for a stream: set the frequency basis, pre-size the mono
    /// scratch buffer, and start the publisher thread.
    pub fn activate(&mut self, sample_rate: f64, max_block_size: usize) -> Result<(), EngineError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(EngineError::InvalidSampleRate { value: sample_rate });
        }
        if max_block_size == 0 {
            return Err(EngineError::InvalidBlockSize);
        }
        self.analyzer.configure(sample_rate as f32);
        self.mono.resize(max_block_size, 0.0);
        if self.publisher.is_none() {
            self.publisher = Some(MetricsPublisher::spawn(self.config.publisher.clone()));
        }
        self.activated = true;
        Ok(())
    }

    /// Stop processing and shut the publisher down (stopped and joined).
    pub fn deactivate(&mut self) {
        self.activated = false;
        self.publisher = None;
    }

    /// Analyze one block of planar audio and pass it through unmodified.
    ///
    /// `inputs` holds 1 or 2 channel slices of at least `frame_count`
    /// samples; anything else is a no-op for this call. Output channels
    /// receive a copy of the matching input channel, or silence where no
    /// input exists. `transport_secs` stamps every frame completed during
    /// this block; `None` keeps the previous position.
    pub fn process(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frame_count: usize,
        transport_secs: Option<f64>,
    ) {
        if !self.activated || frame_count == 0 || frame_count > self.mono.len() {
            return;
        }
        if inputs.is_empty() || inputs.len() > 2 {
            return;
        }
        if inputs.iter().any(|channel| channel.len() < frame_count)
            || outputs.iter().any(|channel| channel.len() < frame_count)
        {
            return;
        }
        if let Some(secs) = transport_secs {
            self.playhead_secs = secs;
        }

        // This subsystem observes the signal, never alters it.
        for (index, output) in outputs.iter_mut().enumerate() {
            match inputs.get(index) {
                Some(input) => output[..frame_count].copy_from_slice(&input[..frame_count]),
                None => output[..frame_count].fill(0.0),
            }
        }

        if inputs.len() == 1 {
            self.mono[..frame_count].copy_from_slice(&inputs[0][..frame_count]);
        } else {
            let (left, right) = (inputs[0], inputs[1]);
            for (mixed, (&l, &r)) in self.mono[..frame_count]
                .iter_mut()
                .zip(left.iter().zip(right.iter()))
            {
                *mixed = (l + r) * 0.5;
            }
        }

        let mut offset = 0;
        while offset < frame_count {
            let consumed = self.analyzer.feed(&self.mono[offset..frame_count]);
            offset += consumed;
            if self.analyzer.frame_ready() {
                self.handle_frame();
            }
        }
    }

    /// Drop any partial frame and abandon an open segment. Used on stream
    /// discontinuities (transport stop/start); nothing is emitted.
    pub fn reset(&mut self) {
        self.analyzer.reset_frame();
        self.accumulator.reset();
    }

    /// Tail capability reported to the host: unbounded. Segmentation and
    /// reporting must keep running across silence, so the host must never
    /// stop calling [`Engine::process`].
    pub fn tail(&self) -> u32 {
        u32::MAX
    }

    /// Latest completed-frame snapshot, for status displays. `None` until a
    /// frame completes after activation.
    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        self.publisher.as_ref().and_then(MetricsPublisher::latest_snapshot)
    }

    fn handle_frame(&mut self) {
        let loudness_db = self.analyzer.loudness_db();
        // The transform only runs on frames that pass the loudness gate; a
        // silent frame carries its measured loudness and zeroed spectra.
        let features = if loudness_db >= self.config.loudness_threshold_db {
            self.analyzer.compute_features()
        } else {
            FrameFeatures::silent(loudness_db)
        };
        self.analyzer.reset_frame();

        if let Some(publisher) = &self.publisher {
            publisher.update_snapshot(features, self.playhead_secs);
        }
        let ended = self
            .accumulator
            .update(&features, self.config.window_size, self.playhead_secs);
        if let (Some(result), Some(publisher)) = (ended, &self.publisher) {
            publisher.submit_segment(result);
        }
    }

    #[cfg(test)]
    fn segment_active(&self) -> bool {
        self.accumulator.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PublisherConfig, ReportMode};

    const SAMPLE_RATE: f64 = 44_100.0;
    const WINDOW: usize = 256;

    /// Small window, publisher pointed at a dead endpoint with a long
    /// period so no network traffic happens inside unit tests.
    fn engine() -> Engine {
        let config = EngineConfig {
            window_size: WINDOW,
            publisher: PublisherConfig {
                endpoint: "http://127.0.0.1:1".to_string(),
                mode: ReportMode::PerSegment,
                publish_period_ms: 60_000,
            },
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config).unwrap();
        engine.activate(SAMPLE_RATE, 1_024).unwrap();
        engine
    }

    fn sine(frequency: f32, amplitude: f32, count: usize) -> Vec<f32> {
        use std::f32::consts::TAU;
        (0..count)
            .map(|i| amplitude * (TAU * frequency * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    fn run_block(engine: &mut Engine, samples: &[f32], transport: Option<f64>) {
        let mut out = vec![0.0_f32; samples.len()];
        engine.process(&[samples], &mut [&mut out], samples.len(), transport);
    }

    #[test]
    fn activate_rejects_bad_parameters() {
        let mut engine = Engine::new(EngineConfig::default()).unwrap();
        assert!(matches!(
            engine.activate(0.0, 512),
            Err(EngineError::InvalidSampleRate { .. })
        ));
        assert!(matches!(
            engine.activate(SAMPLE_RATE, 0),
            Err(EngineError::InvalidBlockSize)
        ));
        assert!(engine.activate(SAMPLE_RATE, 512).is_ok());
    }

    #[test]
    fn process_before_activate_is_a_no_op() {
        let mut engine = Engine::new(EngineConfig {
            window_size: WINDOW,
            ..EngineConfig::default()
        })
        .unwrap();
        let samples = sine(220.0, 0.5, WINDOW * 2);
        let mut out = vec![0.0_f32; samples.len()];
        engine.process(&[&samples], &mut [&mut out], samples.len(), None);
        assert!(engine.latest_snapshot().is_none());
    }

    #[test]
    fn malformed_blocks_are_ignored() {
        let mut engine = engine();
        let samples = sine(220.0, 0.5, WINDOW);
        let mut out = vec![0.0_f32; WINDOW];

        engine.process(&[], &mut [&mut out], WINDOW, None);
        engine.process(&[&samples], &mut [&mut out], 0, None);
        // Three input channels is not a supported topology.
        engine.process(&[&samples, &samples, &samples], &mut [&mut out], WINDOW, None);
        // Channel slice shorter than the claimed frame count.
        engine.process(&[&samples[..WINDOW / 2]], &mut [&mut out], WINDOW, None);
        // Block larger than the activated maximum.
        let big = sine(220.0, 0.5, 4_096);
        let mut big_out = vec![0.0_f32; 4_096];
        engine.process(&[&big], &mut [&mut big_out], 4_096, None);

        assert!(engine.latest_snapshot().is_none());
        assert!(!engine.segment_active());
    }

    #[test]
    fn audio_passes_through_unmodified() {
        let mut engine = engine();
        let left = sine(220.0, 0.5, WINDOW);
        let right = sine(330.0, 0.5, WINDOW);
        let mut out_left = vec![0.0_f32; WINDOW];
        let mut out_right = vec![0.0_f32; WINDOW];
        engine.process(
            &[&left, &right],
            &mut [&mut out_left, &mut out_right],
            WINDOW,
            None,
        );
        assert_eq!(out_left, left);
        assert_eq!(out_right, right);
    }

    #[test]
    fn missing_input_channels_produce_silent_outputs() {
        let mut engine = engine();
        let mono = sine(220.0, 0.5, WINDOW);
        let mut out_left = vec![1.0_f32; WINDOW];
        let mut out_right = vec![1.0_f32; WINDOW];
        engine.process(&[&mono], &mut [&mut out_left, &mut out_right], WINDOW, None);
        assert_eq!(out_left, mono);
        assert!(out_right.iter().all(|&sample| sample == 0.0));
    }

    #[test]
    fn stereo_blocks_are_averaged_before_analysis() {
        let mut engine = engine();
        // Antiphase channels cancel to digital silence in the mixdown.
        let left = vec![0.5_f32; WINDOW];
        let right = vec![-0.5_f32; WINDOW];
        let mut out_left = vec![0.0_f32; WINDOW];
        let mut out_right = vec![0.0_f32; WINDOW];
        engine.process(
            &[&left, &right],
            &mut [&mut out_left, &mut out_right],
            WINDOW,
            None,
        );
        let snapshot = engine.latest_snapshot().unwrap();
        assert!(snapshot.features.loudness_db <= -180.0);
        assert!(!engine.segment_active());
    }

    #[test]
    fn partial_frames_carry_across_blocks() {
        let mut engine = engine();
        let samples = sine(220.0, 0.5, WINDOW);
        run_block(&mut engine, &samples[..100], None);
        assert!(engine.latest_snapshot().is_none());
        run_block(&mut engine, &samples[100..], None);
        assert!(engine.latest_snapshot().is_some());
    }

    #[test]
    fn one_block_may_complete_several_frames() {
        let mut engine = engine();
        let samples = sine(220.0, 0.5, WINDOW * 3);
        run_block(&mut engine, &samples, Some(0.5));
        let snapshot = engine.latest_snapshot().unwrap();
        assert_eq!(snapshot.playhead_secs, 0.5);
        assert!(engine.segment_active());
    }

    #[test]
    fn zero_blocks_cause_no_transition_and_no_spectral_features() {
        let mut engine = engine();
        run_block(&mut engine, &vec![0.0_f32; WINDOW * 4], None);
        let snapshot = engine.latest_snapshot().unwrap();
        assert_eq!(snapshot.features.fundamental_hz, 0.0);
        assert!(snapshot.features.loudness_db <= -180.0);
        assert!(!engine.segment_active());
    }

    #[test]
    fn reset_discards_partial_frames_and_open_segments() {
        let mut engine = engine();
        let samples = sine(220.0, 0.5, WINDOW + 100);
        run_block(&mut engine, &samples, None);
        assert!(engine.segment_active());

        engine.reset();
        assert!(!engine.segment_active());
        // The 100 leftover samples were discarded, so a fresh partial block
        // does not complete a frame on its own.
        let before = engine.latest_snapshot();
        run_block(&mut engine, &samples[..WINDOW - 50], None);
        assert_eq!(engine.latest_snapshot(), before);
    }

    #[test]
    fn deactivate_stops_reporting() {
        let mut engine = engine();
        run_block(&mut engine, &sine(220.0, 0.5, WINDOW), None);
        assert!(engine.latest_snapshot().is_some());
        engine.deactivate();
        assert!(engine.latest_snapshot().is_none());
        run_block(&mut engine, &sine(220.0, 0.5, WINDOW), None);
        assert!(engine.latest_snapshot().is_none());
    }

    #[test]
    fn tail_is_unbounded() {
        let engine = engine();
        assert_eq!(engine.tail(), u32::MAX);
    }
}
