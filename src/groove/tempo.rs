// Beat detection - beat grid alignment and BPM estimation from onsets
// With a known BPM the grid phase is fitted to onsets; otherwise the
// tempo is first estimated from an inter-onset interval histogram

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::features::{detect_onsets, Onset, OnsetConfig};
use crate::audio::{AudioData, SpectrumError};
use crate::groove::grid::beat_length;

#[derive(Debug, Error)]
pub enum BeatError {
    #[error("Invalid BPM: {0}")]
    InvalidBpm(f64),

    #[error("No onsets detected, cannot align beat grid")]
    NoOnsets,

    #[error("Tempo could not be determined from {onsets} onsets")]
    TempoUndetermined { onsets: usize },

    #[error("Onset analysis failed: {0}")]
    Spectrum(#[from] SpectrumError),
}

/// Tempo estimation result with BPM and beat grid positions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoEstimate {
    /// Estimated beats per minute
    pub bpm: f64,

    /// Confidence in the estimate [0.0, 1.0]
    /// Higher values indicate stronger periodic structure
    pub confidence: f32,

    /// Estimated beat grid positions in seconds
    pub beat_positions: Vec<f64>,
}

/// Configuration for tempo estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Minimum BPM to consider (typically 60)
    pub min_bpm: f64,

    /// Maximum BPM to consider (typically 180)
    pub max_bpm: f64,

    /// Number of bins for IOI histogram
    pub histogram_bins: usize,

    /// Minimum number of onsets required for estimation
    pub min_onsets: usize,

    /// Number of candidate grid phases tested within one beat
    pub phase_candidates: usize,
}

impl Default for TempoConfig {
    fn default() -> Self {
        TempoConfig {
            min_bpm: 60.0,
            max_bpm: 180.0,
            histogram_bins: 300,
            min_onsets: 8,
            phase_candidates: 48,
        }
    }
}

/// Produces beat positions (seconds) for a track at a known tempo
pub trait BeatTracker {
    fn track_beats(&self, audio: &AudioData, bpm: f64) -> Result<Vec<f64>, BeatError>;
}

/// Beat tracker that fits a constant-tempo grid to spectral flux onsets
#[derive(Debug, Clone, Default)]
pub struct OnsetBeatTracker {
    pub onset_config: OnsetConfig,
    pub tempo_config: TempoConfig,
}

impl OnsetBeatTracker {
    pub fn new(onset_config: OnsetConfig, tempo_config: TempoConfig) -> Self {
        OnsetBeatTracker {
            onset_config,
            tempo_config,
        }
    }

    /// Estimate the tempo of a track whose BPM is not known
    pub fn estimate_tempo(&self, audio: &AudioData) -> Result<TempoEstimate, BeatError> {
        let onsets = detect_onsets(audio, &self.onset_config)?;
        self.estimate_tempo_from_onsets(&onsets, audio.duration_secs())
    }

    /// Tempo and beat grid from already detected onsets
    /// Fails when the onsets show no periodic structure
    pub fn estimate_tempo_from_onsets(&self, onsets: &[Onset], duration_secs: f64) -> Result<TempoEstimate, BeatError> {
        let mut estimate = estimate_tempo_with_config(onsets, &self.tempo_config);
        if estimate.confidence <= 0.0 {
            return Err(BeatError::TempoUndetermined { onsets: onsets.len() });
        }

        estimate.beat_positions = align_beat_grid(
            onsets,
            estimate.bpm,
            duration_secs,
            self.tempo_config.phase_candidates,
        );
        Ok(estimate)
    }

    /// Beat grid at a known tempo from already detected onsets
    pub fn beats_from_onsets(&self, onsets: &[Onset], bpm: f64, duration_secs: f64) -> Result<Vec<f64>, BeatError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(BeatError::InvalidBpm(bpm));
        }
        if onsets.is_empty() {
            return Err(BeatError::NoOnsets);
        }

        let beats = align_beat_grid(onsets, bpm, duration_secs, self.tempo_config.phase_candidates);

        log::debug!(
            "Aligned {} beats at {:.2} BPM to {} onsets",
            beats.len(),
            bpm,
            onsets.len()
        );

        Ok(beats)
    }
}

impl BeatTracker for OnsetBeatTracker {
    fn track_beats(&self, audio: &AudioData, bpm: f64) -> Result<Vec<f64>, BeatError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(BeatError::InvalidBpm(bpm));
        }

        let onsets = detect_onsets(audio, &self.onset_config)?;
        self.beats_from_onsets(&onsets, bpm, audio.duration_secs())
    }
}

/// Estimate tempo from onset detections
///
/// Algorithm:
/// 1. Compute inter-onset intervals (IOIs)
/// 2. Build IOI histogram (with half/double tempo votes)
/// 3. Pick strongest peak in valid BPM range
///
/// Without enough onsets the estimate is 120 BPM with confidence 0
pub fn estimate_tempo_with_config(onsets: &[Onset], config: &TempoConfig) -> TempoEstimate {
    let fallback = TempoEstimate {
        bpm: 120.0,
        confidence: 0.0,
        beat_positions: Vec::new(),
    };

    if onsets.len() < config.min_onsets {
        return fallback;
    }

    let iois = compute_iois(onsets);
    if iois.is_empty() {
        return fallback;
    }

    let histogram = build_ioi_histogram(&iois, config);
    let peaks = find_histogram_peaks(&histogram);
    let (best_interval_ms, confidence) = select_best_tempo(&peaks, &histogram, config);

    let bpm = if best_interval_ms > 0.0 {
        60000.0 / best_interval_ms
    } else {
        120.0
    };

    TempoEstimate {
        bpm: bpm.clamp(config.min_bpm, config.max_bpm),
        confidence,
        beat_positions: Vec::new(),
    }
}

/// Compute inter-onset intervals (time between consecutive onsets)
fn compute_iois(onsets: &[Onset]) -> Vec<f64> {
    onsets
        .windows(2)
        .map(|pair| pair[1].timestamp_ms - pair[0].timestamp_ms)
        .filter(|&interval| interval > 0.0)
        .collect()
}

/// Build histogram of inter-onset intervals
/// Bins are distributed linearly across the tempo range
fn build_ioi_histogram(iois: &[f64], config: &TempoConfig) -> Vec<f32> {
    if config.max_bpm <= 0.0 || config.min_bpm <= 0.0 || config.histogram_bins == 0 {
        return vec![0.0f32; config.histogram_bins];
    }

    let min_interval_ms = 60000.0 / config.max_bpm;
    let max_interval_ms = 60000.0 / config.min_bpm;

    if (max_interval_ms - min_interval_ms).abs() < f64::EPSILON {
        return vec![0.0f32; config.histogram_bins];
    }

    let bin_width = (max_interval_ms - min_interval_ms) / config.histogram_bins as f64;
    let mut histogram = vec![0.0f32; config.histogram_bins];

    let mut vote = |interval: f64, weight: f32| {
        if interval >= min_interval_ms && interval <= max_interval_ms {
            let bin = ((interval - min_interval_ms) / bin_width) as usize;
            histogram[bin.min(config.histogram_bins - 1)] += weight;
        }
    };

    for &ioi in iois {
        vote(ioi, 1.0);
        // Half and double tempo (2:1 and 1:2 relationships), lower weight
        vote(ioi / 2.0, 0.5);
        vote(ioi * 2.0, 0.5);
    }

    smooth_histogram(&histogram, 3)
}

/// Smooth histogram using moving average filter
fn smooth_histogram(histogram: &[f32], window_size: usize) -> Vec<f32> {
    let half_window = window_size / 2;

    (0..histogram.len())
        .map(|i| {
            let start = i.saturating_sub(half_window);
            let end = (i + half_window + 1).min(histogram.len());
            histogram[start..end].iter().sum::<f32>() / (end - start) as f32
        })
        .collect()
}

/// Find peaks in the histogram using local maxima detection
fn find_histogram_peaks(histogram: &[f32]) -> Vec<(usize, f32)> {
    if histogram.len() < 3 {
        return Vec::new();
    }

    let mut peaks: Vec<(usize, f32)> = (1..histogram.len() - 1)
        .filter(|&i| histogram[i] > histogram[i - 1] && histogram[i] >= histogram[i + 1])
        .map(|i| (i, histogram[i]))
        .collect();

    peaks.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    peaks.truncate(5);

    peaks
}

/// Select the best tempo from peaks
fn select_best_tempo(peaks: &[(usize, f32)], histogram: &[f32], config: &TempoConfig) -> (f64, f32) {
    let Some(&(best_bin, peak_strength)) = peaks.first() else {
        return (500.0, 0.0); // Default: 120 BPM
    };

    let min_interval_ms = 60000.0 / config.max_bpm;
    let max_interval_ms = 60000.0 / config.min_bpm;
    let bin_width = (max_interval_ms - min_interval_ms) / config.histogram_bins as f64;

    // Center of the winning bin
    let interval_ms = min_interval_ms + (best_bin as f64 + 0.5) * bin_width;

    // Confidence based on peak strength relative to histogram mean
    let histogram_mean: f32 = histogram.iter().sum::<f32>() / histogram.len() as f32;
    let confidence = if histogram_mean > 0.0 && peak_strength.is_finite() {
        (peak_strength / (histogram_mean * 3.0)).min(1.0)
    } else {
        0.0
    };

    (interval_ms, confidence)
}

/// Fit a constant-tempo beat grid to onsets over the whole track
/// Returns beat positions in seconds within [0, duration_secs]
pub fn align_beat_grid(
    onsets: &[Onset],
    bpm: f64,
    duration_secs: f64,
    phase_candidates: usize,
) -> Vec<f64> {
    if onsets.is_empty() || bpm <= 0.0 || duration_secs <= 0.0 {
        return Vec::new();
    }

    let interval = beat_length(bpm);
    let candidates = phase_candidates.max(1);
    let phase_step = interval / candidates as f64;

    let mut best_phase = 0.0;
    let mut best_score = f64::MIN;

    for i in 0..candidates {
        let phase = i as f64 * phase_step;
        let score = score_beat_alignment(onsets, phase, interval, duration_secs);

        if score > best_score {
            best_score = score;
            best_phase = phase;
        }
    }

    let mut beat_positions = Vec::new();
    let mut k = 0usize;
    loop {
        let beat_time = best_phase + k as f64 * interval;
        if beat_time > duration_secs {
            break;
        }
        beat_positions.push(beat_time);
        k += 1;
    }

    beat_positions
}

/// Score how well a beat grid aligns with detected onsets
/// Returns higher scores for better alignment
fn score_beat_alignment(onsets: &[Onset], phase: f64, interval: f64, end_time: f64) -> f64 {
    let tolerance = interval * 0.15; // 15% tolerance window
    if tolerance <= 0.0 {
        return 0.0;
    }

    onsets
        .iter()
        .map(|onset| {
            let t = onset.timestamp_ms / 1000.0;
            if t > end_time + tolerance {
                return 0.0;
            }
            // Distance to the nearest grid line
            let offset = (t - phase).rem_euclid(interval);
            let distance = offset.min(interval - offset);
            if distance < tolerance {
                (tolerance - distance) / tolerance * (0.5 + onset.strength as f64)
            } else {
                0.0
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular_onsets(interval_ms: f64, offset_ms: f64, count: usize) -> Vec<Onset> {
        (0..count)
            .map(|i| Onset {
                timestamp_ms: offset_ms + i as f64 * interval_ms,
                strength: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_compute_iois() {
        let onsets = regular_onsets(500.0, 0.0, 3);

        let iois = compute_iois(&onsets);
        assert_eq!(iois.len(), 2);
        assert!((iois[0] - 500.0).abs() < 0.01);
        assert!((iois[1] - 500.0).abs() < 0.01);
    }

    #[test]
    fn test_tempo_estimation_regular_beats() {
        // Regular beat pattern at 120 BPM (500ms intervals)
        let onsets = regular_onsets(500.0, 0.0, 16);

        let estimate = estimate_tempo_with_config(&onsets, &TempoConfig::default());

        assert!(estimate.bpm > 115.0 && estimate.bpm < 125.0, "bpm {}", estimate.bpm);
        assert!(estimate.confidence > 0.0);
    }

    #[test]
    fn test_tempo_estimation_insufficient_onsets() {
        let onsets = regular_onsets(500.0, 0.0, 2);

        let estimate = estimate_tempo_with_config(&onsets, &TempoConfig::default());
        assert_eq!(estimate.confidence, 0.0);
        assert_eq!(estimate.bpm, 120.0);
    }

    #[test]
    fn test_grid_locks_onto_onset_phase() {
        // 120 BPM with every onset 130 ms late
        let onsets = regular_onsets(500.0, 130.0, 20);

        let beats = align_beat_grid(&onsets, 120.0, 10.0, 48);

        assert!(!beats.is_empty());
        assert!((beats[0] - 0.130).abs() < 0.011, "first beat {}", beats[0]);
        for pair in beats.windows(2) {
            assert!((pair[1] - pair[0] - 0.5).abs() < 1e-9);
        }
        assert!(*beats.last().unwrap() <= 10.0);
    }

    #[test]
    fn test_grid_ignores_offbeat_noise() {
        let mut onsets = regular_onsets(500.0, 0.0, 20);
        // A few weak off-beat hits
        onsets.extend(regular_onsets(2000.0, 250.0, 4).into_iter().map(|mut o| {
            o.strength = 0.1;
            o
        }));
        onsets.sort_by(|a, b| a.timestamp_ms.partial_cmp(&b.timestamp_ms).unwrap());

        let beats = align_beat_grid(&onsets, 120.0, 10.0, 48);
        assert!(beats[0].abs() < 0.011);
    }

    /// Clicks every `interval_secs`, with a frame hop that divides the interval
    fn click_audio(sample_rate: u32, interval_secs: f64, count: usize) -> AudioData {
        let len = (sample_rate as f64 * interval_secs * (count as f64 + 1.0)) as usize;
        let mut samples = vec![0.0f32; len];
        for k in 0..count {
            let start = (k as f64 * interval_secs * sample_rate as f64) as usize;
            for i in 0..160 {
                samples[start + i] = if i % 2 == 0 { 0.8 } else { -0.8 };
            }
        }
        AudioData::mono(samples, sample_rate).unwrap()
    }

    fn tracker_with_hop(hop_size: usize) -> OnsetBeatTracker {
        OnsetBeatTracker::new(
            OnsetConfig {
                hop_size,
                ..Default::default()
            },
            TempoConfig::default(),
        )
    }

    #[test]
    fn test_estimate_tempo_from_audio() {
        // 8000 Hz, hop 250: one beat is exactly 16 frames at 120 BPM
        let audio = click_audio(8000, 0.5, 24);

        let estimate = tracker_with_hop(250).estimate_tempo(&audio).unwrap();

        assert!((estimate.bpm - 120.0).abs() < 3.0, "bpm {}", estimate.bpm);
        assert!(estimate.confidence > 0.0);
        assert!(estimate.beat_positions.len() >= 20);
    }

    #[test]
    fn test_tempo_undetermined_with_few_onsets() {
        // 3 clicks are below the onset minimum
        let audio = click_audio(8000, 2.0, 3);

        assert!(matches!(
            tracker_with_hop(250).estimate_tempo(&audio),
            Err(BeatError::TempoUndetermined { .. })
        ));
    }

    #[test]
    fn test_estimate_from_onsets_rejects_placeholder() {
        let tracker = OnsetBeatTracker::default();
        assert!(matches!(
            tracker.estimate_tempo_from_onsets(&regular_onsets(500.0, 0.0, 2), 10.0),
            Err(BeatError::TempoUndetermined { onsets: 2 })
        ));

        let estimate = tracker
            .estimate_tempo_from_onsets(&regular_onsets(500.0, 0.0, 16), 8.0)
            .unwrap();
        assert!(!estimate.beat_positions.is_empty());
    }

    #[test]
    fn test_invalid_bpm_rejected() {
        let audio = AudioData::mono(vec![0.0; 44100], 44100).unwrap();
        let tracker = OnsetBeatTracker::default();

        assert!(matches!(
            tracker.track_beats(&audio, 0.0),
            Err(BeatError::InvalidBpm(_))
        ));
    }

    #[test]
    fn test_silence_has_no_onsets() {
        let audio = AudioData::mono(vec![0.0; 44100], 44100).unwrap();
        let tracker = OnsetBeatTracker::default();

        assert!(matches!(
            tracker.track_beats(&audio, 120.0),
            Err(BeatError::NoOnsets)
        ));
    }
}
