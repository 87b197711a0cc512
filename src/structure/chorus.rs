// Chorus detection - finds the most repeated (and loudest) section of a song
// Works on beat-synchronous chroma so candidate windows line up with beats

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::features::{beat_sync_chroma, chromagram, onset_envelope, segment_rms, Chroma};
use crate::audio::{AudioData, OnsetConfig, OnsetEnvelope, SpectrumError, StftConfig};
use crate::groove::grid::{downbeat_phase, BEATS_PER_BAR};

#[derive(Debug, Error)]
pub enum ChorusError {
    #[error("Track too short: {beats} beats detected, a chorus needs {required}")]
    TrackTooShort { beats: usize, required: usize },

    #[error("Number of bars must be positive")]
    InvalidBarCount,

    #[error("Chorus start beat {start} is out of range ({beats} beats)")]
    StartOutOfRange { start: usize, beats: usize },

    #[error("Extracted chorus is empty")]
    EmptyExcerpt,

    #[error("Spectral analysis failed: {0}")]
    Spectrum(#[from] SpectrumError),
}

/// Configuration for chorus detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChorusConfig {
    /// Chorus length in bars
    pub n_bars: usize,

    /// How far (in beats) the detected start may move to land on a bar line
    pub epsilon: usize,

    /// STFT used for the chromagram
    pub stft: StftConfig,

    /// Share of the score given to loudness [0.0, 1.0]
    pub loudness_weight: f32,
}

impl Default for ChorusConfig {
    fn default() -> Self {
        ChorusConfig {
            n_bars: 4,
            epsilon: 2,
            stft: StftConfig {
                n_fft: 4096,
                hop_length: 1024,
            },
            loudness_weight: 0.5,
        }
    }
}

impl ChorusConfig {
    /// Number of beat intervals in one chorus
    pub fn window_beats(&self) -> usize {
        self.n_bars * BEATS_PER_BAR
    }
}

/// Locates the chorus of a track on its beat grid
pub trait ChorusDetector {
    /// Returns the index of the beat where the chorus starts
    fn estimate_chorus(
        &self,
        audio: &AudioData,
        beats: &[f64],
        epsilon: usize,
    ) -> Result<usize, ChorusError>;
}

/// Chorus detector scoring every beat-aligned window by how well it repeats elsewhere
#[derive(Debug, Clone, Default)]
pub struct RepetitionChorusDetector {
    pub config: ChorusConfig,
    pub onset_config: OnsetConfig,
}

impl RepetitionChorusDetector {
    pub fn new(config: ChorusConfig, onset_config: OnsetConfig) -> Self {
        RepetitionChorusDetector { config, onset_config }
    }

    /// Chorus start beat of a mono track whose onset envelope is already known
    pub fn locate_chorus(
        &self,
        mono: &[f32],
        sample_rate: u32,
        beats: &[f64],
        epsilon: usize,
        envelope: &OnsetEnvelope,
    ) -> Result<usize, ChorusError> {
        let window = self.config.window_beats();
        if window == 0 {
            return Err(ChorusError::InvalidBarCount);
        }
        if beats.len() < window + 1 {
            return Err(ChorusError::TrackTooShort {
                beats: beats.len(),
                required: window + 1,
            });
        }

        let scores = self.candidate_scores(mono, sample_rate, beats)?;
        let best = scores
            .iter()
            .enumerate()
            .fold((0usize, f32::MIN), |acc, (i, &s)| if s > acc.1 { (i, s) } else { acc })
            .0;

        let phase = downbeat_phase(beats, envelope);
        let start = align_to_bar(best, phase, epsilon, scores.len() - 1);

        log::debug!(
            "Chorus candidate beat {} (score {:.3}), downbeat phase {}, start beat {}",
            best,
            scores[best],
            phase,
            start
        );

        Ok(start)
    }

    /// Repetition score of each candidate start beat
    fn candidate_scores(&self, mono: &[f32], sample_rate: u32, beats: &[f64]) -> Result<Vec<f32>, ChorusError> {
        let window = self.config.window_beats();

        let (chroma, frame_times) = chromagram(mono, sample_rate, &self.config.stft)?;
        let synced = beat_sync_chroma(&chroma, &frame_times, beats);

        let loudness: Vec<f32> = beats
            .windows(2)
            .map(|pair| segment_rms(mono, sample_rate, pair[0], pair[1]))
            .collect();

        let repetition = repetition_scores(&synced, window);

        let window_loudness: Vec<f32> = (0..repetition.len())
            .map(|i| loudness[i..i + window].iter().sum::<f32>() / window as f32)
            .collect();
        let max_loudness = window_loudness.iter().cloned().fold(0.0f32, f32::max);

        let weight = self.config.loudness_weight.clamp(0.0, 1.0);
        Ok(repetition
            .iter()
            .zip(window_loudness.iter())
            .map(|(&rep, &loud)| {
                let relative = if max_loudness > 0.0 { loud / max_loudness } else { 0.0 };
                rep * (1.0 - weight + weight * relative)
            })
            .collect())
    }
}

impl ChorusDetector for RepetitionChorusDetector {
    fn estimate_chorus(
        &self,
        audio: &AudioData,
        beats: &[f64],
        epsilon: usize,
    ) -> Result<usize, ChorusError> {
        let mono = audio.to_mono();
        let envelope = onset_envelope(&mono, audio.sample_rate, &self.onset_config)?;
        self.locate_chorus(&mono, audio.sample_rate, beats, epsilon, &envelope)
    }
}

/// Best mean cosine similarity of each window against any non-overlapping window
pub fn repetition_scores(beat_chroma: &[Chroma], window: usize) -> Vec<f32> {
    if window == 0 || beat_chroma.len() < window {
        return Vec::new();
    }

    let n = beat_chroma.len();
    let similarity: Vec<Vec<f32>> = (0..n)
        .map(|i| (0..n).map(|j| cosine(&beat_chroma[i], &beat_chroma[j])).collect())
        .collect();

    let candidates = n - window + 1;
    (0..candidates)
        .map(|i| {
            (0..candidates)
                .filter(|&j| i.abs_diff(j) >= window)
                .map(|j| (0..window).map(|k| similarity[i + k][j + k]).sum::<f32>() / window as f32)
                .fold(0.0f32, f32::max)
        })
        .collect()
}

fn cosine(a: &Chroma, b: &Chroma) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Move `start` onto the nearest downbeat within `epsilon` beats, if one fits
pub fn align_to_bar(start: usize, phase: usize, epsilon: usize, max_start: usize) -> usize {
    let low = start.saturating_sub(epsilon);
    let high = (start + epsilon).min(max_start);

    (low..=high)
        .filter(|c| c % BEATS_PER_BAR == phase % BEATS_PER_BAR)
        .min_by_key(|c| c.abs_diff(start))
        .unwrap_or(start)
}

/// An extracted chorus excerpt
#[derive(Debug, Clone)]
pub struct Chorus {
    /// Index of the first chorus beat in the track's beat positions
    pub start_beat_idx: usize,

    /// Beat positions (seconds, track time) from the first to the closing beat
    pub beat_positions: Vec<f64>,

    /// Mono chorus samples
    pub samples: Vec<f32>,

    pub sample_rate: u32,
}

/// Cut `n_bars` bars starting at beat `start` out of the track
///
/// When the beat grid ends before the chorus does, the remaining beats are
/// extrapolated with the mean beat spacing and the audio is clipped to the track.
pub fn extract_chorus(
    audio: &AudioData,
    beats: &[f64],
    start: usize,
    n_bars: usize,
) -> Result<Chorus, ChorusError> {
    if n_bars == 0 {
        return Err(ChorusError::InvalidBarCount);
    }
    if start >= beats.len() {
        return Err(ChorusError::StartOutOfRange {
            start,
            beats: beats.len(),
        });
    }

    let window = n_bars * BEATS_PER_BAR;
    let spacing = if beats.len() > 1 {
        (beats[beats.len() - 1] - beats[0]) / (beats.len() - 1) as f64
    } else {
        return Err(ChorusError::TrackTooShort {
            beats: beats.len(),
            required: window + 1,
        });
    };

    let last = beats.len() - 1;
    let beat_positions: Vec<f64> = (start..=start + window)
        .map(|idx| {
            if idx <= last {
                beats[idx]
            } else {
                beats[last] + (idx - last) as f64 * spacing
            }
        })
        .collect();

    let chorus_start = beat_positions[0];
    let chorus_end = beat_positions[window];
    let samples = audio.slice_secs(chorus_start, chorus_end);

    if samples.is_empty() {
        return Err(ChorusError::EmptyExcerpt);
    }

    Ok(Chorus {
        start_beat_idx: start,
        beat_positions,
        samples,
        sample_rate: audio.sample_rate,
    })
}
