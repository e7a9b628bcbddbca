//! Microphone loudness analysis
//!
//! Reduces the most recent capture window to one normalized loudness
//! value: a fixed-size Hann-windowed FFT, the arithmetic mean of the
//! frequency-bin magnitudes, scaled into [0, 1]. The panel runs this once
//! per animation frame while listening.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Number of input samples per analysis window
pub const FFT_SIZE: usize = 256;

/// Gain applied to the mean bin magnitude before clamping; tuned so
/// ordinary speech lands mid-range rather than hugging the bottom
const LEVEL_GAIN: f32 = 4.0;

// Smoothing weights for the published level (must sum to 1.0)
const SMOOTH_OLD: f32 = 0.7;
const SMOOTH_NEW: f32 = 0.3;

pub struct LevelAnalyser {
    fft: Arc<dyn Fft<f32>>,
    input: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    window: Vec<f32>,
    level: f32,
}

impl LevelAnalyser {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];

        // Hann window for better frequency resolution
        let window = (0..FFT_SIZE)
            .map(|i| {
                let x = i as f32 / (FFT_SIZE - 1) as f32;
                0.5 - 0.5 * (2.0 * std::f32::consts::PI * x).cos()
            })
            .collect();

        Self {
            fft,
            input: vec![Complex::default(); FFT_SIZE],
            scratch,
            window,
            level: 0.0,
        }
    }

    /// The current smoothed level in [0, 1]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Analyse the latest capture window and publish a new level.
    ///
    /// `samples` holds the most recent microphone samples; when fewer than
    /// `FFT_SIZE` are available the window is zero-padded at the front.
    pub fn analyse(&mut self, samples: &[f32]) -> f32 {
        let take = samples.len().min(FFT_SIZE);
        let pad = FFT_SIZE - take;

        for slot in self.input[..pad].iter_mut() {
            *slot = Complex::default();
        }
        for (i, &sample) in samples[samples.len() - take..].iter().enumerate() {
            self.input[pad + i] = Complex {
                re: sample * self.window[pad + i],
                im: 0.0,
            };
        }

        self.fft.process_with_scratch(&mut self.input, &mut self.scratch);

        // Mean magnitude over the first half of the spectrum; the upper
        // half mirrors it for real input
        let bins = FFT_SIZE / 2;
        let mean = self.input[..bins].iter().map(|c| c.norm()).sum::<f32>() / bins as f32;

        let target = (mean * LEVEL_GAIN).clamp(0.0, 1.0);
        self.level = (self.level * SMOOTH_OLD + target * SMOOTH_NEW).clamp(0.0, 1.0);
        self.level
    }

    /// Drop back to silence, e.g. after capture teardown
    pub fn reset(&mut self) {
        self.level = 0.0;
    }
}

impl Default for LevelAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, cycles: f32, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * cycles * i as f32 / len as f32;
                amplitude * phase.sin()
            })
            .collect()
    }

    #[test]
    fn test_silence_stays_at_zero() {
        let mut analyser = LevelAnalyser::new();
        let level = analyser.analyse(&vec![0.0; FFT_SIZE]);
        assert_eq!(level, 0.0);
        assert_eq!(analyser.level(), 0.0);
    }

    #[test]
    fn test_tone_raises_level_within_range() {
        let mut analyser = LevelAnalyser::new();
        let tone = sine(FFT_SIZE, 8.0, 0.5);

        let mut level = 0.0;
        for _ in 0..10 {
            level = analyser.analyse(&tone);
        }

        assert!(level > 0.0, "tone should register, got {}", level);
        assert!(level <= 1.0);
    }

    #[test]
    fn test_level_is_always_in_unit_range() {
        let mut analyser = LevelAnalyser::new();
        // Clipped full-scale square wave, the loudest input capture can hand us
        let loud: Vec<f32> = (0..FFT_SIZE)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();

        for _ in 0..20 {
            let level = analyser.analyse(&loud);
            assert!((0.0..=1.0).contains(&level), "level out of range: {}", level);
        }
    }

    #[test]
    fn test_short_window_is_padded() {
        let mut analyser = LevelAnalyser::new();
        let level = analyser.analyse(&sine(FFT_SIZE / 4, 4.0, 0.8));
        assert!((0.0..=1.0).contains(&level));

        // Empty input is silence, smoothed toward zero
        let empty = analyser.analyse(&[]);
        assert!(empty <= level);
    }

    #[test]
    fn test_reset_returns_to_zero() {
        let mut analyser = LevelAnalyser::new();
        analyser.analyse(&sine(FFT_SIZE, 8.0, 0.9));
        assert!(analyser.level() > 0.0);

        analyser.reset();
        assert_eq!(analyser.level(), 0.0);
    }
}
