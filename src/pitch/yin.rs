// Probabilistic YIN pitch tracking
// Mauch & Dixon 2014, first stage: trough probabilities from a Beta prior
// over YIN thresholds. Frames are centered with zero padding.

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use std::sync::Arc;

use crate::pitch::PitchError;

/// pYIN analysis parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PyinConfig {
    /// Lowest detectable frequency in Hz
    pub fmin: f32,

    /// Highest detectable frequency in Hz
    pub fmax: f32,

    /// Number of YIN thresholds in the prior
    pub n_thresholds: usize,

    /// Beta distribution parameters of the threshold prior
    pub beta_parameters: (f32, f32),

    /// Decay of the preference for earlier troughs
    pub boltzmann_parameter: f32,

    /// Weight given to the global minimum when no trough is under a threshold
    pub no_trough_prob: f32,

    /// Frames with a lower voiced probability are reported as unvoiced
    pub voicing_threshold: f32,
}

impl Default for PyinConfig {
    fn default() -> Self {
        PyinConfig {
            fmin: 31.0,
            fmax: 130.0,
            n_thresholds: 100,
            beta_parameters: (2.0, 18.0),
            boltzmann_parameter: 2.0,
            no_trough_prob: 0.01,
            voicing_threshold: 0.5,
        }
    }
}

/// Per-frame output of the pitch tracker
#[derive(Debug, Clone, Default)]
pub struct PyinResult {
    /// F0 in Hz, 0.0 for unvoiced frames
    pub f0: Vec<f32>,

    /// Probability that each frame is voiced, used as confidence
    pub voiced_prob: Vec<f32>,
}

/// Run pYIN over a mono signal
pub fn pyin(
    samples: &[f32],
    sample_rate: u32,
    frame_length: usize,
    hop_length: usize,
    config: &PyinConfig,
) -> Result<PyinResult, PitchError> {
    if frame_length < 4 || hop_length == 0 {
        return Err(PitchError::InvalidFrame {
            frame_length,
            hop_length,
        });
    }
    if !(config.fmin > 0.0 && config.fmax > config.fmin) {
        return Err(PitchError::InvalidRange {
            fmin: config.fmin,
            fmax: config.fmax,
        });
    }

    let win_length = frame_length / 2;
    let sr = sample_rate as f32;
    let min_period = ((sr / config.fmax).floor() as usize).max(1);
    let max_period = ((sr / config.fmin).ceil() as usize).min(frame_length - win_length - 1);

    if min_period + 1 >= max_period {
        return Err(PitchError::FrameTooShort {
            frame_length,
            fmin: config.fmin,
        });
    }

    let pad = frame_length / 2;
    let mut padded = vec![0.0f32; samples.len() + 2 * pad];
    padded[pad..pad + samples.len()].copy_from_slice(samples);

    let num_frames = 1 + samples.len() / hop_length;
    let threshold_probs = beta_threshold_probabilities(config);
    let analyzer = DifferenceFunction::new(frame_length, win_length);

    let mut result = PyinResult {
        f0: Vec::with_capacity(num_frames),
        voiced_prob: Vec::with_capacity(num_frames),
    };

    let mut frame = vec![0.0f32; frame_length];
    for frame_idx in 0..num_frames {
        let start = frame_idx * hop_length;
        for (i, value) in frame.iter_mut().enumerate() {
            *value = padded.get(start + i).copied().unwrap_or(0.0);
        }

        let cmnd = analyzer.cmnd(&frame, max_period)?;
        let (period, voiced_prob) =
            best_period(&cmnd, min_period, max_period, &threshold_probs, config);

        let f0 = match period {
            Some(tau) if voiced_prob >= config.voicing_threshold => sr / tau,
            _ => 0.0,
        };

        result.f0.push(f0);
        result.voiced_prob.push(voiced_prob);
    }

    Ok(result)
}

/// Probability mass of each threshold under the Beta prior
fn beta_threshold_probabilities(config: &PyinConfig) -> Vec<(f32, f32)> {
    let n = config.n_thresholds.max(1);
    let (a, b) = config.beta_parameters;

    // Density at bin midpoints, normalized to a probability mass
    let points: Vec<(f32, f32)> = (0..n)
        .map(|i| {
            let threshold = (i as f32 + 1.0) / n as f32;
            let mid = (i as f32 + 0.5) / n as f32;
            let density = mid.powf(a - 1.0) * (1.0 - mid).powf(b - 1.0);
            (threshold, density)
        })
        .collect();

    let total: f32 = points.iter().map(|(_, d)| d).sum();
    points
        .into_iter()
        .map(|(t, d)| (t, if total > 0.0 { d / total } else { 0.0 }))
        .collect()
}

/// Most probable period (interpolated) and total voiced probability of a frame
fn best_period(
    cmnd: &[f32],
    min_period: usize,
    max_period: usize,
    threshold_probs: &[(f32, f32)],
    config: &PyinConfig,
) -> (Option<f32>, f32) {
    // Local minima of the normalized difference in the period range
    let troughs: Vec<usize> = (min_period..=max_period)
        .filter(|&tau| {
            let left = if tau > min_period { cmnd[tau - 1] } else { f32::INFINITY };
            let right = if tau < max_period { cmnd[tau + 1] } else { f32::INFINITY };
            cmnd[tau] <= left && cmnd[tau] < right
        })
        .collect();

    if troughs.is_empty() {
        return (None, 0.0);
    }

    let global_min = troughs
        .iter()
        .copied()
        .min_by(|&a, &b| cmnd[a].partial_cmp(&cmnd[b]).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or(troughs[0]);

    let mut probs = vec![0.0f32; troughs.len()];
    let lambda = config.boltzmann_parameter;

    for &(threshold, mass) in threshold_probs {
        let below = troughs.iter().filter(|&&tau| cmnd[tau] < threshold).count();

        if below == 0 {
            if let Some(pos) = troughs.iter().position(|&t| t == global_min) {
                probs[pos] += config.no_trough_prob * mass;
            }
            continue;
        }

        // Boltzmann prior: earlier troughs under the threshold are preferred
        let norm = (1.0 - (-lambda).exp()) / (1.0 - (-lambda * below as f32).exp());
        let mut k = 0;
        for (pos, &tau) in troughs.iter().enumerate() {
            if cmnd[tau] < threshold {
                probs[pos] += mass * norm * (-lambda * k as f32).exp();
                k += 1;
            }
        }
    }

    let voiced_prob: f32 = probs.iter().sum::<f32>().clamp(0.0, 1.0);
    let (best_pos, _) = probs
        .iter()
        .enumerate()
        .fold((0usize, f32::MIN), |acc, (i, &p)| if p > acc.1 { (i, p) } else { acc });

    (Some(parabolic_interpolation(cmnd, troughs[best_pos])), voiced_prob)
}

/// Refine a trough position with a parabola through its neighbours
fn parabolic_interpolation(values: &[f32], tau: usize) -> f32 {
    if tau == 0 || tau + 1 >= values.len() {
        return tau as f32;
    }
    let a = values[tau - 1];
    let b = values[tau];
    let c = values[tau + 1];
    let denom = a - 2.0 * b + c;
    if denom.abs() < 1e-8 {
        tau as f32
    } else {
        let shift = (0.5 * (a - c) / denom).clamp(-1.0, 1.0);
        tau as f32 + shift
    }
}

/// Cumulative mean normalized difference via FFT cross-correlation
struct DifferenceFunction {
    frame_length: usize,
    win_length: usize,
    fft_size: usize,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
}

impl DifferenceFunction {
    fn new(frame_length: usize, win_length: usize) -> Self {
        let fft_size = (frame_length + win_length).next_power_of_two();
        let mut planner = RealFftPlanner::<f32>::new();
        DifferenceFunction {
            frame_length,
            win_length,
            fft_size,
            forward: planner.plan_fft_forward(fft_size),
            inverse: planner.plan_fft_inverse(fft_size),
        }
    }

    fn cmnd(&self, frame: &[f32], max_period: usize) -> Result<Vec<f32>, PitchError> {
        let w = self.win_length;
        let n = self.fft_size;

        // cross[tau] = sum_{j < w} x[j] * x[j + tau]
        let forward = &self.forward;
        let inverse = &self.inverse;

        let mut signal = vec![0.0f32; n];
        signal[..self.frame_length].copy_from_slice(frame);
        let mut kernel = vec![0.0f32; n];
        for (m, value) in kernel.iter_mut().take(w).enumerate() {
            *value = frame[w - 1 - m];
        }

        let mut signal_spec = forward.make_output_vec();
        let mut kernel_spec = forward.make_output_vec();
        forward.process(&mut signal, &mut signal_spec)?;
        forward.process(&mut kernel, &mut kernel_spec)?;

        for (s, k) in signal_spec.iter_mut().zip(kernel_spec.iter()) {
            *s = *s * *k;
        }
        if let Some(first) = signal_spec.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = signal_spec.last_mut() {
            last.im = 0.0;
        }

        let mut conv = inverse.make_output_vec();
        inverse.process(&mut signal_spec, &mut conv)?;
        let scale = 1.0 / n as f32;

        // Energy of x[tau .. tau + w] via prefix sums
        let mut prefix = vec![0.0f64; self.frame_length + 1];
        for (i, &x) in frame.iter().enumerate() {
            prefix[i + 1] = prefix[i] + (x as f64) * (x as f64);
        }
        let energy = |tau: usize| (prefix[tau + w] - prefix[tau]) as f32;

        let mut diff = vec![0.0f32; max_period + 1];
        for (tau, d) in diff.iter_mut().enumerate().skip(1) {
            let cross = conv[tau + w - 1] * scale;
            *d = (energy(0) + energy(tau) - 2.0 * cross).max(0.0);
        }

        let mut cmnd = vec![1.0f32; max_period + 1];
        let mut running = 0.0f32;
        for tau in 1..=max_period {
            running += diff[tau];
            cmnd[tau] = if running > 1e-12 {
                diff[tau] * tau as f32 / running
            } else {
                1.0
            };
        }

        Ok(cmnd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 22050;

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.6 * (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    #[test]
    fn test_beta_prior_sums_to_one() {
        let probs = beta_threshold_probabilities(&PyinConfig::default());
        assert_eq!(probs.len(), 100);
        let total: f32 = probs.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-4);
        // Beta(2, 18) puts most mass on low thresholds
        assert!(probs[5].1 > probs[50].1);
    }

    #[test]
    fn test_difference_function_of_periodic_signal() {
        let frame = sine(100.0, 2048);
        let analyzer = DifferenceFunction::new(2048, 1024);

        let cmnd = analyzer.cmnd(&frame, 600).unwrap();
        // One period of 100 Hz at 22050 Hz is ~220.5 samples
        assert!(cmnd[220] < 0.05 || cmnd[221] < 0.05);
        assert!(cmnd[110] > 0.5);
    }

    #[test]
    fn test_tracks_bass_tone() {
        let signal = sine(55.0, SR as usize);

        let result = pyin(&signal, SR, 2048, 512, &PyinConfig::default()).unwrap();

        assert_eq!(result.f0.len(), 1 + signal.len() / 512);
        let middle = result.f0.len() / 2;
        assert!((result.f0[middle] - 55.0).abs() < 1.0, "f0 {}", result.f0[middle]);
        assert!(result.voiced_prob[middle] > 0.5);
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let result = pyin(&vec![0.0; 8192], SR, 2048, 512, &PyinConfig::default()).unwrap();
        assert!(result.f0.iter().all(|&f| f == 0.0));
    }

    #[test]
    fn test_rejects_bad_frames() {
        assert!(matches!(
            pyin(&[0.0; 100], SR, 2048, 0, &PyinConfig::default()),
            Err(PitchError::InvalidFrame { .. })
        ));
        // 31 Hz needs ~711 samples of lag, far more than a 16 sample frame holds
        assert!(matches!(
            pyin(&[0.0; 100], SR, 16, 4, &PyinConfig::default()),
            Err(PitchError::FrameTooShort { .. })
        ));
    }
}
