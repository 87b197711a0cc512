// Short-time Fourier transform and its inverse
// Frames are centered (half a window of zero padding on both sides)

use realfft::num_complex::Complex;
use realfft::{FftError, RealFftPlanner};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpectrumError {
    #[error("FFT failed: {0}")]
    Fft(#[from] FftError),

    #[error("Invalid STFT configuration: n_fft={n_fft}, hop_length={hop_length}")]
    InvalidConfig { n_fft: usize, hop_length: usize },
}

/// STFT parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StftConfig {
    /// FFT window size in samples (even)
    pub n_fft: usize,

    /// Hop size in samples (advance between frames)
    pub hop_length: usize,
}

impl Default for StftConfig {
    fn default() -> Self {
        StftConfig {
            n_fft: 2048,
            hop_length: 512,
        }
    }
}

impl StftConfig {
    fn validate(&self) -> Result<(), SpectrumError> {
        if self.n_fft < 2 || self.n_fft % 2 != 0 || self.hop_length == 0 {
            return Err(SpectrumError::InvalidConfig {
                n_fft: self.n_fft,
                hop_length: self.hop_length,
            });
        }
        Ok(())
    }
}

/// Complex spectrogram, one Vec of `n_fft / 2 + 1` bins per frame
#[derive(Debug, Clone)]
pub struct Stft {
    pub frames: Vec<Vec<Complex<f32>>>,
    pub config: StftConfig,
    /// Length of the analysed signal, used to trim the inverse transform
    pub signal_len: usize,
}

impl Stft {
    pub fn num_bins(&self) -> usize {
        self.config.n_fft / 2 + 1
    }

    /// Magnitude spectrogram, frames-major
    pub fn magnitudes(&self) -> Vec<Vec<f32>> {
        self.frames
            .iter()
            .map(|frame| frame.iter().map(|c| c.norm()).collect())
            .collect()
    }
}

/// Periodic Hann window of length n
pub fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos()))
        .collect()
}

/// Center frequency of an FFT bin in Hz
pub fn bin_frequency(bin: usize, sample_rate: u32, n_fft: usize) -> f32 {
    bin as f32 * sample_rate as f32 / n_fft as f32
}

/// Compute the centered STFT of a mono signal
pub fn stft(samples: &[f32], config: &StftConfig) -> Result<Stft, SpectrumError> {
    config.validate()?;

    let n_fft = config.n_fft;
    let hop = config.hop_length;
    let pad = n_fft / 2;

    let mut padded = vec![0.0f32; samples.len() + 2 * pad];
    padded[pad..pad + samples.len()].copy_from_slice(samples);

    let num_frames = 1 + samples.len() / hop;
    let window = hann_window(n_fft);

    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut input = fft.make_input_vec();

    let mut frames = Vec::with_capacity(num_frames);
    for frame_idx in 0..num_frames {
        let start = frame_idx * hop;
        for (i, value) in input.iter_mut().enumerate() {
            *value = padded.get(start + i).copied().unwrap_or(0.0) * window[i];
        }

        let mut spectrum = fft.make_output_vec();
        fft.process(&mut input, &mut spectrum)?;
        frames.push(spectrum);
    }

    Ok(Stft {
        frames,
        config: *config,
        signal_len: samples.len(),
    })
}

/// Inverse STFT by weighted overlap-add; output has the original signal length
pub fn istft(spectrogram: &Stft) -> Result<Vec<f32>, SpectrumError> {
    let config = spectrogram.config;
    config.validate()?;

    let n_fft = config.n_fft;
    let hop = config.hop_length;
    let pad = n_fft / 2;

    let num_frames = spectrogram.frames.len();
    let total_len = (num_frames.saturating_sub(1)) * hop + n_fft;
    let window = hann_window(n_fft);

    let mut planner = RealFftPlanner::<f32>::new();
    let ifft = planner.plan_fft_inverse(n_fft);
    let mut time_frame = ifft.make_output_vec();

    let mut output = vec![0.0f32; total_len];
    let mut window_sum = vec![0.0f32; total_len];
    let scale = 1.0 / n_fft as f32;

    for (frame_idx, frame) in spectrogram.frames.iter().enumerate() {
        let mut spectrum = frame.clone();
        // DC and Nyquist must be purely real for the inverse real FFT
        if let Some(first) = spectrum.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = spectrum.last_mut() {
            last.im = 0.0;
        }

        ifft.process(&mut spectrum, &mut time_frame)?;

        let start = frame_idx * hop;
        for i in 0..n_fft {
            output[start + i] += time_frame[i] * scale * window[i];
            window_sum[start + i] += window[i] * window[i];
        }
    }

    for (sample, norm) in output.iter_mut().zip(window_sum.iter()) {
        if *norm > 1e-8 {
            *sample /= norm;
        }
    }

    let end = (pad + spectrogram.signal_len).min(output.len());
    let mut signal = output[pad.min(end)..end].to_vec();
    signal.resize(spectrogram.signal_len, 0.0);

    Ok(signal)
}
