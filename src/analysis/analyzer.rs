use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::analysis::features::{self, FrameFeatures};
use crate::error::EngineError;

/// Fraction of total spectral magnitude below the reported rolloff frequency.
const ROLLOFF_FRACTION: f32 = 0.85;
/// Floor applied to the RMS before the log so silence maps to a finite level.
const RMS_FLOOR: f64 = 1e-10;

/// Fixed-size spectral analyzer.
///
/// Buffers mono samples until a full analysis window is available, then
/// derives per-frame scalar features from a Hann-windowed forward FFT. The
/// transform plan and every buffer are allocated up front; feeding and
/// computing never allocate, so both are safe on the audio callback.
///
/// Feeding and computing are split so the caller decides when the transform
/// runs: once per full window, not once per host block.
pub struct SpectralAnalyzer {
    sample_rate: f32,
    window_size: usize,
    pitch_min_hz: f32,
    pitch_max_hz: f32,
    pitch_noise_floor: f32,

    fft: Arc<dyn Fft<f32>>,
    hann: Vec<f32>,
    frame: Vec<f32>,
    fill: usize,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl SpectralAnalyzer {
    pub fn new(
        window_size: usize,
        pitch_min_hz: f32,
        pitch_max_hz: f32,
        pitch_noise_floor: f32,
    ) -> Result<Self, EngineError> {
        if window_size == 0 || !window_size.is_power_of_two() {
            return Err(EngineError::InvalidWindowSize { value: window_size });
        }
        if !(pitch_min_hz > 0.0 && pitch_max_hz > pitch_min_hz) {
            return Err(EngineError::InvalidPitchBand {
                min_hz: pitch_min_hz,
                max_hz: pitch_max_hz,
            });
        }
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
        Ok(Self {
            sample_rate: 44_100.0,
            window_size,
            pitch_min_hz,
            pitch_max_hz,
            pitch_noise_floor,
            fft,
            hann: hann_window(window_size),
            frame: vec![0.0; window_size],
            fill: 0,
            spectrum: vec![Complex::default(); window_size],
            scratch,
            magnitudes: vec![0.0; window_size / 2],
        })
    }

    /// Set the frequency basis used by every derived feature. Must be called
    /// before frames are analyzed.
    pub fn configure(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    /// Append samples to the current frame, copying at most the space that
    /// remains. Returns how many samples were consumed; callers re-invoke
    /// with the remainder once the full frame has been handled.
    pub fn feed(&mut self, samples: &[f32]) -> usize {
        let space = self.window_size - self.fill;
        let take = samples.len().min(space);
        self.frame[self.fill..self.fill + take].copy_from_slice(&samples[..take]);
        self.fill += take;
        take
    }

    pub fn frame_ready(&self) -> bool {
        self.fill >= self.window_size
    }

    pub fn samples_needed(&self) -> usize {
        self.window_size - self.fill
    }

    /// Discard any partially filled frame (stream discontinuities).
    pub fn reset_frame(&mut self) {
        self.fill = 0;
    }

    /// RMS loudness of the buffered frame in decibels, floor-clamped so an
    /// all-zero frame reports a finite level instead of −inf.
    pub fn loudness_db(&self) -> f32 {
        let mut sum = 0.0_f64;
        for &sample in &self.frame {
            let sample = features::sanitize_sample(sample) as f64;
            sum += sample * sample;
        }
        let rms = (sum / self.window_size as f64).sqrt();
        (20.0 * rms.max(RMS_FLOOR).log10()) as f32
    }

    /// Derive the full feature set from the buffered frame.
    ///
    /// Requires a full frame. Pure with respect to everything outside the
    /// analyzer's own scratch buffers; calling it twice on the same frame
    /// yields identical output.
    pub fn compute_features(&mut self) -> FrameFeatures {
        debug_assert!(self.frame_ready(), "compute_features needs a full frame");
        for (cell, (&sample, &win)) in self
            .spectrum
            .iter_mut()
            .zip(self.frame.iter().zip(self.hann.iter()))
        {
            *cell = Complex::new(features::sanitize_sample(sample) * win, 0.0);
        }
        self.fft.process_with_scratch(&mut self.spectrum, &mut self.scratch);
        let scale = 1.0 / self.window_size as f32;
        for (magnitude, bin) in self.magnitudes.iter_mut().zip(self.spectrum.iter()) {
            *magnitude = bin.norm() * scale;
        }

        FrameFeatures {
            loudness_db: self.loudness_db(),
            fundamental_hz: self.detect_fundamental(),
            centroid_hz: self.spectral_centroid(),
            zero_crossing_rate: features::zero_crossing_rate(&self.frame, self.sample_rate),
            flatness: spectral_flatness(&self.magnitudes),
            rolloff_hz: self.spectral_rolloff(),
        }
    }

    fn bin_width(&self) -> f32 {
        self.sample_rate / self.window_size as f32
    }

    /// Strongest magnitude bin restricted to the plausible pitch band. The
    /// band edges round inward so a reported pitch never falls outside the
    /// configured range.
    fn detect_fundamental(&self) -> f32 {
        let bin_width = self.bin_width();
        let min_bin = (self.pitch_min_hz / bin_width).ceil() as usize;
        let max_bin = ((self.pitch_max_hz / bin_width).floor() as usize)
            .min(self.magnitudes.len().saturating_sub(1));
        if min_bin > max_bin {
            return 0.0;
        }

        let mut peak_magnitude = 0.0_f32;
        let mut peak_bin = min_bin;
        for (bin, &magnitude) in self.magnitudes[min_bin..=max_bin].iter().enumerate() {
            if magnitude > peak_magnitude {
                peak_magnitude = magnitude;
                peak_bin = min_bin + bin;
            }
        }
        if peak_magnitude < self.pitch_noise_floor {
            return 0.0;
        }
        peak_bin as f32 * bin_width
    }

    /// Magnitude-weighted mean frequency over all bins above DC.
    fn spectral_centroid(&self) -> f32 {
        let bin_width = self.bin_width() as f64;
        let mut weighted = 0.0_f64;
        let mut total = 0.0_f64;
        for (bin, &magnitude) in self.magnitudes.iter().enumerate().skip(1) {
            let magnitude = magnitude.max(0.0) as f64;
            weighted += bin as f64 * bin_width * magnitude;
            total += magnitude;
        }
        if total <= 0.0 {
            return 0.0;
        }
        (weighted / total) as f32
    }

    fn spectral_rolloff(&self) -> f32 {
        let total: f64 = self.magnitudes.iter().map(|&m| m.max(0.0) as f64).sum();
        if total <= 0.0 {
            return 0.0;
        }
        let target = total * ROLLOFF_FRACTION as f64;
        let mut cumulative = 0.0_f64;
        for (bin, &magnitude) in self.magnitudes.iter().enumerate() {
            cumulative += magnitude.max(0.0) as f64;
            if cumulative >= target {
                return bin as f32 * self.bin_width();
            }
        }
        self.sample_rate * 0.5
    }
}

/// Geometric over arithmetic mean of the magnitude spectrum; 0 when the
/// spectrum carries no energy.
fn spectral_flatness(magnitudes: &[f32]) -> f32 {
    let total: f64 = magnitudes.iter().map(|&m| m.max(0.0) as f64).sum();
    if magnitudes.is_empty() || total <= 0.0 {
        return 0.0;
    }
    let eps = 1e-12_f64;
    let mut log_sum = 0.0_f64;
    for &magnitude in magnitudes {
        log_sum += ((magnitude.max(0.0) as f64) + eps).ln();
    }
    let n = magnitudes.len() as f64;
    let geometric = (log_sum / n).exp();
    let arithmetic = total / n;
    (geometric / arithmetic) as f32
}

fn hann_window(length: usize) -> Vec<f32> {
    use std::f32::consts::PI;
    if length <= 1 {
        return vec![1.0_f32; length.max(1)];
    }
    let denom = (length - 1) as f32;
    (0..length)
        .map(|n| 0.5_f32 * (1.0 - (2.0 * PI * n as f32 / denom).cos()))
        .collect()
}
