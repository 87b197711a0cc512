// F0 estimation for bass lines
// pYIN contours sized to the chorus, confidence gating and spectral-peak F0

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::groove::grid::{BEATS_PER_BAR, QUARTER_BEATS_PER_BEAT};
use crate::pitch::yin::{pyin, PyinConfig};
use crate::pitch::PitchError;

/// How the confidence threshold is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceThreshold {
    /// Keep every frame (threshold 0)
    #[default]
    None,

    /// Mean of the confidence
    Mean,

    /// Mean minus half a standard deviation
    MeanReduced,

    /// Fixed value, must lie in (0, 1)
    Fixed(f32),
}

impl fmt::Display for ConfidenceThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceThreshold::None => write!(f, "none"),
            ConfidenceThreshold::Mean => write!(f, "mean"),
            ConfidenceThreshold::MeanReduced => write!(f, "mean_reduced"),
            ConfidenceThreshold::Fixed(value) => write!(f, "{}", value),
        }
    }
}

impl FromStr for ConfidenceThreshold {
    type Err = PitchError;

    /// Accepts "none", "mean", "mean_reduced" or a number in (0, 1)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ConfidenceThreshold::None),
            "mean" => Ok(ConfidenceThreshold::Mean),
            "mean_reduced" => Ok(ConfidenceThreshold::MeanReduced),
            other => {
                let value: f32 = other
                    .parse()
                    .map_err(|_| PitchError::UnknownThreshold(s.to_string()))?;
                validate_fixed(value)?;
                Ok(ConfidenceThreshold::Fixed(value))
            }
        }
    }
}

fn validate_fixed(value: f32) -> Result<f32, PitchError> {
    if value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(PitchError::InvalidThreshold(value))
    }
}

/// Configuration for bass-line F0 estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    /// Analysis frames per beat; the frame spans 1/frame_factor of a beat
    pub frame_factor: usize,

    pub threshold: ConfidenceThreshold,

    pub pyin: PyinConfig,
}

impl Default for PitchConfig {
    fn default() -> Self {
        PitchConfig {
            frame_factor: 8,
            threshold: ConfidenceThreshold::None,
            pyin: PyinConfig::default(),
        }
    }
}

/// A pitch contour: equal-length time (seconds) and frequency (Hz) sequences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PitchTrack {
    pub times: Vec<f64>,
    pub frequencies: Vec<f32>,
}

/// Raw and confidence-gated contours of one excerpt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct F0Estimate {
    pub raw: PitchTrack,
    pub filtered: PitchTrack,
    pub confidence: Vec<f32>,
    /// Threshold the filtered contour was gated with
    pub threshold: f32,
}

/// Population mean and standard deviation
pub fn mean_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, variance.sqrt())
}

/// Turn a threshold choice into a value for these confidences
pub fn resolve_threshold(confidence: &[f32], threshold: ConfidenceThreshold) -> Result<f32, PitchError> {
    let (mean, std) = mean_std(confidence);
    match threshold {
        ConfidenceThreshold::None => Ok(0.0),
        ConfidenceThreshold::Mean => Ok(mean),
        ConfidenceThreshold::MeanReduced => Ok(mean - std / 2.0),
        ConfidenceThreshold::Fixed(value) => validate_fixed(value),
    }
}

/// Silence the frames whose confidence is below the threshold
/// Frames without a confidence value count as zero confidence
pub fn confidence_filter(f0: &[f32], confidence: &[f32], threshold: f32) -> Vec<f32> {
    f0.iter()
        .enumerate()
        .map(|(idx, &f)| {
            let c = confidence.get(idx).copied().unwrap_or(0.0);
            if c >= threshold {
                f
            } else {
                0.0
            }
        })
        .collect()
}

/// Frames needed to cover `n_bars` bars with `frame_factor` frames per beat
/// at the quarter-frame hop
pub fn required_length(frame_factor: usize, n_bars: usize) -> usize {
    n_bars * BEATS_PER_BAR * QUARTER_BEATS_PER_BEAT * frame_factor
}

/// Truncate or pad a sequence to exactly `required_length(frame_factor, n_bars)`
///
/// Padding appends the tail of the sequence, repeated as often as needed;
/// an empty sequence is filled with default values.
pub fn ensure_sequence_length<T: Copy + Default>(sequence: &[T], frame_factor: usize, n_bars: usize) -> Vec<T> {
    let required = required_length(frame_factor, n_bars);

    if sequence.len() >= required {
        return sequence[..required].to_vec();
    }
    if sequence.is_empty() {
        return vec![T::default(); required];
    }

    let mut out = Vec::with_capacity(required);
    out.extend_from_slice(sequence);
    while out.len() < required {
        let take = (required - out.len()).min(sequence.len());
        out.extend_from_slice(&sequence[sequence.len() - take..]);
    }
    out
}

fn round_hz(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// pYIN F0 of a bass excerpt spanning `n_bars` bars
///
/// The analysis frame covers 1/frame_factor of a beat and the hop a quarter of
/// the frame, so the contour holds `required_length` frames for the whole excerpt.
pub fn pyin_f0(
    samples: &[f32],
    sample_rate: u32,
    beat_length: f64,
    n_bars: usize,
    config: &PitchConfig,
) -> Result<F0Estimate, PitchError> {
    if !(beat_length.is_finite() && beat_length > 0.0) {
        return Err(PitchError::InvalidBeatLength(beat_length));
    }
    if config.frame_factor == 0 {
        return Err(PitchError::InvalidFrame {
            frame_length: 0,
            hop_length: 0,
        });
    }

    let frame_length = ((beat_length / config.frame_factor as f64) * sample_rate as f64) as usize;
    let hop_length = frame_length / 4;

    let result = pyin(samples, sample_rate, frame_length, hop_length, &config.pyin)?;

    let threshold = resolve_threshold(&result.voiced_prob, config.threshold)?;
    let (mean, std) = mean_std(&result.voiced_prob);
    log::info!(
        "Mean of the confidence levels: {:.3}, standard deviation: {:.3}, threshold: {:.3}",
        mean,
        std,
        threshold
    );

    let rounded: Vec<f32> = result.f0.iter().map(|&f| round_hz(f)).collect();
    let f0 = ensure_sequence_length(&rounded, config.frame_factor, n_bars);
    let confidence = ensure_sequence_length(&result.voiced_prob, config.frame_factor, n_bars);
    let filtered = confidence_filter(&f0, &confidence, threshold);

    let times: Vec<f64> = (0..f0.len())
        .map(|i| i as f64 * hop_length as f64 / sample_rate as f64)
        .collect();

    Ok(F0Estimate {
        raw: PitchTrack {
            times: times.clone(),
            frequencies: f0,
        },
        filtered: PitchTrack {
            times,
            frequencies: filtered,
        },
        confidence,
        threshold,
    })
}

/// F0 as the frequency of the strongest bin in each spectrogram frame
/// `magnitudes` is frames-major with `n_fft / 2 + 1` bins per frame
pub fn argmax_f0(magnitudes: &[Vec<f32>], sample_rate: u32, hop_length: usize) -> PitchTrack {
    let times = (0..magnitudes.len())
        .map(|i| i as f64 * hop_length as f64 / sample_rate as f64)
        .collect();

    let frequencies = magnitudes
        .iter()
        .map(|frame| {
            if frame.len() < 2 {
                return 0.0;
            }
            let n_fft = 2 * (frame.len() - 1);
            let peak = frame
                .iter()
                .enumerate()
                .fold((0usize, f32::MIN), |acc, (i, &m)| if m > acc.1 { (i, m) } else { acc })
                .0;
            peak as f32 * sample_rate as f32 / n_fft as f32
        })
        .collect();

    PitchTrack { times, frequencies }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_length() {
        // 4 bars * 4 beats * 4 hops per frame * 8 frames per beat
        assert_eq!(required_length(8, 4), 512);
        assert_eq!(required_length(8, 1), 128);
    }

    #[test]
    fn test_truncates_long_sequences() {
        let seq: Vec<f32> = (0..600).map(|i| i as f32).collect();
        let out = ensure_sequence_length(&seq, 8, 4);
        assert_eq!(out.len(), 512);
        assert_eq!(out[511], 511.0);
    }

    #[test]
    fn test_pads_with_tail() {
        let seq: Vec<f32> = (0..126).map(|i| i as f32).collect();
        let out = ensure_sequence_length(&seq, 8, 1);
        assert_eq!(out.len(), 128);
        assert_eq!(&out[126..], &[124.0, 125.0]);
    }

    #[test]
    fn test_pads_short_sequences_repeatedly() {
        let out = ensure_sequence_length(&[1.0f32, 2.0, 3.0], 1, 1);
        assert_eq!(out.len(), 16);
        assert_eq!(&out[..6], &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
        assert_eq!(out[15], 3.0);

        let empty: Vec<f32> = ensure_sequence_length(&[], 1, 1);
        assert_eq!(empty, vec![0.0; 16]);
    }

    #[test]
    fn test_resolve_threshold() {
        let confidence = [0.2, 0.4, 0.6, 0.8];
        let (mean, std) = mean_std(&confidence);
        assert!((mean - 0.5).abs() < 1e-6);

        assert_eq!(resolve_threshold(&confidence, ConfidenceThreshold::None).unwrap(), 0.0);
        assert!((resolve_threshold(&confidence, ConfidenceThreshold::Mean).unwrap() - 0.5).abs() < 1e-6);
        let reduced = resolve_threshold(&confidence, ConfidenceThreshold::MeanReduced).unwrap();
        assert!((reduced - (0.5 - std / 2.0)).abs() < 1e-6);
        assert_eq!(resolve_threshold(&confidence, ConfidenceThreshold::Fixed(0.3)).unwrap(), 0.3);
    }

    #[test]
    fn test_fixed_threshold_bounds() {
        for bad in [0.0, 1.0, -0.2, 1.5] {
            assert!(matches!(
                resolve_threshold(&[0.5], ConfidenceThreshold::Fixed(bad)),
                Err(PitchError::InvalidThreshold(_))
            ));
        }
    }

    #[test]
    fn test_threshold_from_str() {
        assert_eq!("mean".parse::<ConfidenceThreshold>().unwrap(), ConfidenceThreshold::Mean);
        assert_eq!(
            "Mean_Reduced".parse::<ConfidenceThreshold>().unwrap(),
            ConfidenceThreshold::MeanReduced
        );
        assert_eq!("0.25".parse::<ConfidenceThreshold>().unwrap(), ConfidenceThreshold::Fixed(0.25));
        assert!("2".parse::<ConfidenceThreshold>().is_err());
        assert!("median".parse::<ConfidenceThreshold>().is_err());
    }

    #[test]
    fn test_confidence_filter() {
        let f0 = [50.0, 60.0, 70.0, 80.0];
        let confidence = [0.9, 0.1, 0.5];

        let filtered = confidence_filter(&f0, &confidence, 0.5);
        assert_eq!(filtered, vec![50.0, 0.0, 70.0, 0.0]);
    }

    #[test]
    fn test_argmax_f0() {
        // 5 bins -> n_fft 8; at 800 Hz each bin is 100 Hz
        let frames = vec![vec![0.0, 1.0, 0.2, 0.0, 0.0], vec![0.0, 0.0, 0.0, 3.0, 0.1]];
        let track = argmax_f0(&frames, 800, 4);

        assert_eq!(track.frequencies, vec![100.0, 300.0]);
        assert_eq!(track.times, vec![0.0, 0.005]);
    }

    #[test]
    fn test_pyin_f0_fixed_length_contour() {
        let sr = 22050;
        let beat_length = 0.5; // 120 BPM
        let n_bars = 1;
        let len = (beat_length * 4.0 * sr as f64) as usize;
        let signal: Vec<f32> = (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 65.41 * i as f32 / sr as f32).sin())
            .collect();

        let config = PitchConfig {
            threshold: ConfidenceThreshold::Mean,
            ..Default::default()
        };
        let estimate = pyin_f0(&signal, sr, beat_length, n_bars, &config).unwrap();

        assert_eq!(estimate.raw.frequencies.len(), 128);
        assert_eq!(estimate.filtered.frequencies.len(), 128);
        assert_eq!(estimate.confidence.len(), 128);
        assert_eq!(estimate.raw.times, estimate.filtered.times);

        // Frame = 1378 samples, hop = 344
        assert!((estimate.raw.times[1] - 344.0 / sr as f64).abs() < 1e-12);

        let middle = estimate.raw.frequencies[64];
        assert!((middle - 65.41).abs() < 1.5, "f0 {}", middle);
        // Two decimal rounding
        assert!(((middle * 100.0).round() - middle * 100.0).abs() < 1e-2);
    }

    #[test]
    fn test_pyin_f0_invalid_beat_length() {
        assert!(matches!(
            pyin_f0(&[0.0; 100], 22050, 0.0, 4, &PitchConfig::default()),
            Err(PitchError::InvalidBeatLength(_))
        ));
    }
}
