// Spectral bass separation
// Harmonic part via median filtering (Fitzgerald 2010), restricted to the bass band

use crate::audio::spectrum::bin_frequency;
use crate::audio::{istft, stft};
use crate::separation::backend::{SeparationConfig, SeparationError, SourceSeparator};

/// Keeps the sustained low-frequency content of a mix
#[derive(Debug, Clone)]
pub struct SpectralBassSeparator {
    config: SeparationConfig,
}

impl SpectralBassSeparator {
    pub fn new(config: SeparationConfig) -> Result<Self, SeparationError> {
        if config.cutoff_hz.is_nan() || config.cutoff_hz <= 0.0 || config.rolloff_hz < 0.0 {
            return Err(SeparationError::InvalidConfig(format!(
                "cutoff {} Hz, rolloff {} Hz",
                config.cutoff_hz, config.rolloff_hz
            )));
        }
        if config.harmonic_kernel == 0 || config.percussive_kernel == 0 {
            return Err(SeparationError::InvalidConfig(
                "median kernels must be non-empty".to_string(),
            ));
        }
        Ok(SpectralBassSeparator { config })
    }

    /// Gain of the low-pass mask at a frequency
    fn lowpass_gain(&self, freq: f32) -> f32 {
        let cutoff = self.config.cutoff_hz;
        let rolloff = self.config.rolloff_hz;

        if freq <= cutoff {
            1.0
        } else if rolloff > 0.0 && freq < cutoff + rolloff {
            let x = (freq - cutoff) / rolloff;
            0.5 * (1.0 + (std::f32::consts::PI * x).cos())
        } else {
            0.0
        }
    }
}

impl SourceSeparator for SpectralBassSeparator {
    fn separate_bass_line(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>, SeparationError> {
        if samples.is_empty() {
            return Err(SeparationError::EmptyInput);
        }

        let mut spectrogram = stft(samples, &self.config.stft)?;
        let n_fft = self.config.stft.n_fft;

        let gains: Vec<f32> = (0..spectrogram.num_bins())
            .map(|bin| self.lowpass_gain(bin_frequency(bin, sample_rate, n_fft)))
            .collect();
        // Bins above this index are silenced outright
        let active_bins = gains.iter().rposition(|&g| g > 0.0).map_or(0, |i| i + 1);

        let magnitudes = spectrogram.magnitudes();
        let harmonic = median_across_time(&magnitudes, active_bins, self.config.harmonic_kernel);
        let percussive = median_across_frequency(&magnitudes, active_bins, self.config.percussive_kernel);

        let power = self.config.mask_power;
        for (frame_idx, frame) in spectrogram.frames.iter_mut().enumerate() {
            for (bin, value) in frame.iter_mut().enumerate() {
                if bin >= active_bins {
                    *value = Default::default();
                    continue;
                }
                let h = harmonic[frame_idx][bin].powf(power);
                let p = percussive[frame_idx][bin].powf(power);
                let mask = if h + p > 1e-12 { h / (h + p) } else { 0.0 };
                *value *= mask * gains[bin];
            }
        }

        Ok(istft(&spectrogram)?)
    }
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Per-bin median over neighbouring frames (edges use a truncated window)
fn median_across_time(magnitudes: &[Vec<f32>], bins: usize, kernel: usize) -> Vec<Vec<f32>> {
    let half = kernel / 2;
    let frames = magnitudes.len();
    let mut scratch = Vec::with_capacity(kernel);

    (0..frames)
        .map(|t| {
            let start = t.saturating_sub(half);
            let end = (t + half + 1).min(frames);
            (0..bins)
                .map(|bin| {
                    scratch.clear();
                    scratch.extend(magnitudes[start..end].iter().map(|frame| frame[bin]));
                    median(&mut scratch)
                })
                .collect()
        })
        .collect()
}

/// Per-frame median over neighbouring bins (edges use a truncated window)
fn median_across_frequency(magnitudes: &[Vec<f32>], bins: usize, kernel: usize) -> Vec<Vec<f32>> {
    let half = kernel / 2;
    let mut scratch = Vec::with_capacity(kernel);

    magnitudes
        .iter()
        .map(|frame| {
            (0..bins)
                .map(|bin| {
                    let start = bin.saturating_sub(half);
                    let end = (bin + half + 1).min(frame.len());
                    scratch.clear();
                    scratch.extend_from_slice(&frame[start..end]);
                    median(&mut scratch)
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 22050;

    fn sine(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    fn energy(samples: &[f32]) -> f32 {
        samples.iter().map(|s| s * s).sum()
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(&mut []), 0.0);
    }

    #[test]
    fn test_lowpass_gain_shape() {
        let separator = SpectralBassSeparator::new(SeparationConfig::default()).unwrap();
        assert_eq!(separator.lowpass_gain(100.0), 1.0);
        assert!((separator.lowpass_gain(280.0) - 0.5).abs() < 1e-5);
        assert_eq!(separator.lowpass_gain(1000.0), 0.0);
    }

    #[test]
    fn test_keeps_bass_removes_treble() {
        let len = SR as usize * 2;
        let bass = sine(80.0, 0.5, len);
        let treble = sine(2000.0, 0.5, len);
        let mix: Vec<f32> = bass.iter().zip(treble.iter()).map(|(a, b)| a + b).collect();

        let separator = SpectralBassSeparator::new(SeparationConfig::default()).unwrap();
        let out = separator.separate_bass_line(&mix, SR).unwrap();

        assert_eq!(out.len(), mix.len());

        // Compare away from the edges
        let range = SR as usize / 2..SR as usize * 3 / 2;
        let residual: Vec<f32> = out[range.clone()]
            .iter()
            .zip(bass[range.clone()].iter())
            .map(|(o, b)| o - b)
            .collect();

        assert!(energy(&residual) < 0.1 * energy(&bass[range]));
    }

    #[test]
    fn test_empty_input() {
        let separator = SpectralBassSeparator::new(SeparationConfig::default()).unwrap();
        assert!(matches!(
            separator.separate_bass_line(&[], SR),
            Err(SeparationError::EmptyInput)
        ));
    }
}
