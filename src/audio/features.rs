// Spectral feature extraction and onset detection
// Spectral flux onsets for beat alignment, chroma and RMS for chorus detection

use serde::{Deserialize, Serialize};

use crate::audio::spectrum::{bin_frequency, stft, SpectrumError, StftConfig};
use crate::audio::AudioData;

/// Onset detection result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Onset {
    /// Timestamp in milliseconds from start of audio
    pub timestamp_ms: f64,

    /// Onset strength/confidence [0.0, 1.0]
    /// Higher values indicate stronger spectral changes
    pub strength: f32,
}

/// Configuration for onset detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    /// FFT window size in samples (power of 2)
    pub window_size: usize,

    /// Hop size in samples (advance between frames)
    pub hop_size: usize,

    /// Threshold multiplier for adaptive peak picking
    /// Threshold = mean(flux) + threshold_factor * std(flux)
    pub threshold_factor: f32,

    /// Minimum time between onsets in milliseconds
    /// Prevents duplicate detections
    pub min_onset_gap_ms: f64,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        OnsetConfig {
            window_size: 2048,
            hop_size: 512,
            threshold_factor: 1.5,
            min_onset_gap_ms: 30.0,
        }
    }
}

impl OnsetConfig {
    fn stft_config(&self) -> StftConfig {
        StftConfig {
            n_fft: self.window_size,
            hop_length: self.hop_size,
        }
    }
}

/// Per-frame onset strength (spectral flux) with frame times
#[derive(Debug, Clone, Default)]
pub struct OnsetEnvelope {
    pub values: Vec<f32>,
    pub frame_times: Vec<f64>,
}

impl OnsetEnvelope {
    /// Envelope value at the frame closest to `time_secs`
    pub fn value_at(&self, time_secs: f64) -> f32 {
        if self.frame_times.len() < 2 {
            return self.values.first().copied().unwrap_or(0.0);
        }
        let step = self.frame_times[1] - self.frame_times[0];
        let idx = ((time_secs - self.frame_times[0]) / step).round();
        if idx < 0.0 {
            return 0.0;
        }
        self.values.get(idx as usize).copied().unwrap_or(0.0)
    }
}

/// Compute spectral flux for all frames
/// Spectral flux = sum of positive differences between consecutive magnitude spectra
pub fn onset_envelope(
    samples: &[f32],
    sample_rate: u32,
    config: &OnsetConfig,
) -> Result<OnsetEnvelope, SpectrumError> {
    if samples.is_empty() || sample_rate == 0 {
        return Ok(OnsetEnvelope::default());
    }

    // The complex frames are dropped once magnitudes are taken
    let magnitudes = stft(samples, &config.stft_config())?.magnitudes();

    let mut values = Vec::with_capacity(magnitudes.len());
    let mut prev: Option<&Vec<f32>> = None;

    for spectrum in &magnitudes {
        let frame_flux = match prev {
            Some(prev) => spectrum
                .iter()
                .zip(prev.iter())
                .map(|(curr, prev)| (curr - prev).max(0.0))
                .sum(),
            None => 0.0, // First frame has no flux
        };
        values.push(frame_flux);
        prev = Some(spectrum);
    }

    let frame_times = (0..values.len())
        .map(|i| (i * config.hop_size) as f64 / sample_rate as f64)
        .collect();

    Ok(OnsetEnvelope { values, frame_times })
}

/// Onset envelope of a track together with the onsets picked from it
/// Computed once per track and shared by beat tracking and chorus detection
#[derive(Debug, Clone, Default)]
pub struct OnsetAnalysis {
    pub envelope: OnsetEnvelope,
    pub onsets: Vec<Onset>,
}

/// Spectral flux envelope and onsets of a mono signal
pub fn analyze_onsets(samples: &[f32], sample_rate: u32, config: &OnsetConfig) -> Result<OnsetAnalysis, SpectrumError> {
    if samples.is_empty() {
        return Ok(OnsetAnalysis::default());
    }

    let envelope = onset_envelope(samples, sample_rate, config)?;
    let onsets = pick_onset_peaks(&envelope.values, sample_rate, config);

    Ok(OnsetAnalysis { envelope, onsets })
}

/// Detect onsets using spectral flux
/// Returns list of onset timestamps and strengths
pub fn detect_onsets(audio: &AudioData, config: &OnsetConfig) -> Result<Vec<Onset>, SpectrumError> {
    Ok(analyze_onsets(&audio.to_mono(), audio.sample_rate, config)?.onsets)
}

/// Pick onset peaks from spectral flux using adaptive threshold
fn pick_onset_peaks(flux: &[f32], sample_rate: u32, config: &OnsetConfig) -> Vec<Onset> {
    if flux.len() < 3 || config.hop_size == 0 || sample_rate == 0 {
        return Vec::new();
    }

    let mean = flux.iter().sum::<f32>() / flux.len() as f32;
    let variance = flux.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / flux.len() as f32;
    let std_dev = variance.sqrt();
    let threshold = mean + config.threshold_factor * std_dev;

    let hop_size = config.hop_size;
    let min_gap_samples = (config.min_onset_gap_ms * sample_rate as f64 / 1000.0) as usize;
    let min_gap_frames = min_gap_samples / hop_size;

    let mut onsets = Vec::new();
    let mut last_onset_frame: Option<usize> = None;

    // Find local maxima above threshold
    for i in 1..flux.len() - 1 {
        let is_peak = flux[i] > flux[i - 1] && flux[i] >= flux[i + 1];
        let above_threshold = flux[i] > threshold;
        let gap_ok = last_onset_frame.map_or(true, |last| i - last >= min_gap_frames);

        if is_peak && above_threshold && gap_ok {
            let timestamp_ms = (i * hop_size) as f64 * 1000.0 / sample_rate as f64;
            // 1e-6 protects from division by zero on flat input
            let strength = (flux[i] - threshold) / (std_dev + 1e-6);

            onsets.push(Onset {
                timestamp_ms,
                strength: strength.clamp(0.0, 1.0),
            });

            last_onset_frame = Some(i);
        }
    }

    onsets
}

/// Chroma vector: energy per pitch class, C = 0
pub type Chroma = [f32; 12];

/// Lowest and highest frequencies folded into chroma
const CHROMA_MIN_HZ: f32 = 27.5;
const CHROMA_MAX_HZ: f32 = 5000.0;

/// Fold magnitude spectra into max-normalized chroma vectors
pub fn chroma_from_magnitudes(magnitudes: &[Vec<f32>], sample_rate: u32, n_fft: usize) -> Vec<Chroma> {
    let bin_classes: Vec<Option<usize>> = (0..n_fft / 2 + 1)
        .map(|bin| {
            let freq = bin_frequency(bin, sample_rate, n_fft);
            if !(CHROMA_MIN_HZ..=CHROMA_MAX_HZ).contains(&freq) {
                return None;
            }
            let midi = 12.0 * (freq / 440.0).log2() + 69.0;
            Some((midi.round() as i64).rem_euclid(12) as usize)
        })
        .collect();

    magnitudes
        .iter()
        .map(|spectrum| {
            let mut chroma = [0.0f32; 12];
            for (mag, class) in spectrum.iter().zip(bin_classes.iter()) {
                if let Some(class) = class {
                    chroma[*class] += mag * mag;
                }
            }

            let max = chroma.iter().cloned().fold(0.0f32, f32::max);
            if max > 0.0 {
                for value in chroma.iter_mut() {
                    *value /= max;
                }
            }
            chroma
        })
        .collect()
}

/// Chroma for every STFT frame of a mono signal, with frame times
pub fn chromagram(
    samples: &[f32],
    sample_rate: u32,
    config: &StftConfig,
) -> Result<(Vec<Chroma>, Vec<f64>), SpectrumError> {
    let spectrogram = stft(samples, config)?;
    let chroma = chroma_from_magnitudes(&spectrogram.magnitudes(), sample_rate, config.n_fft);
    let times = (0..chroma.len())
        .map(|i| (i * config.hop_length) as f64 / sample_rate as f64)
        .collect();
    Ok((chroma, times))
}

/// Average chroma between consecutive beats; one vector per beat interval
pub fn beat_sync_chroma(chroma: &[Chroma], frame_times: &[f64], beats: &[f64]) -> Vec<Chroma> {
    beats
        .windows(2)
        .map(|pair| {
            let mut sum = [0.0f32; 12];
            let mut count = 0usize;
            for (frame, &t) in chroma.iter().zip(frame_times.iter()) {
                if t >= pair[0] && t < pair[1] {
                    for (acc, v) in sum.iter_mut().zip(frame.iter()) {
                        *acc += v;
                    }
                    count += 1;
                }
            }
            if count > 0 {
                for acc in sum.iter_mut() {
                    *acc /= count as f32;
                }
            }
            sum
        })
        .collect()
}

/// RMS of a signal between two times in seconds
pub fn segment_rms(samples: &[f32], sample_rate: u32, start_secs: f64, end_secs: f64) -> f32 {
    let start = ((start_secs.max(0.0) * sample_rate as f64) as usize).min(samples.len());
    let end = ((end_secs.max(0.0) * sample_rate as f64) as usize).min(samples.len());
    if start >= end {
        return 0.0;
    }
    let segment = &samples[start..end];
    (segment.iter().map(|s| s * s).sum::<f32>() / segment.len() as f32).sqrt()
}
